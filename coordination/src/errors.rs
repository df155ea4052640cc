//! Failure taxonomy for model invocations.
//!
//! Adapter and dispatch failures never escape a batch as `Err`; they are
//! recorded as [`InvocationFailure`] values inside the result for the model
//! that produced them. Callers branch on [`FailureKind`] without string
//! matching.
//!
//! | Kind                 | Origin     | Retried |
//! |----------------------|------------|---------|
//! | `UnknownModel`       | registry   | no      |
//! | `InvalidModelConfig` | registry   | no      |
//! | `AuthError`          | remote API | no      |
//! | `RateLimited`        | remote API | yes     |
//! | `NetworkError`       | remote API | yes     |
//! | `MalformedResponse`  | remote API | no      |
//! | `ProcessSpawnError`  | process    | no      |
//! | `ProcessNonZeroExit` | process    | no      |
//! | `ProcessTimeout`     | process    | yes     |
//! | `Cancelled`          | dispatcher | no      |

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Classification of a failed invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// No alias, id or custom entry matched the requested name.
    UnknownModel,
    /// The registry entry is missing or has contradictory connection info.
    InvalidModelConfig,
    /// Credentials missing or rejected (401/403).
    AuthError,
    /// Provider asked us to slow down (429).
    RateLimited,
    /// Connection, timeout or 5xx failure.
    NetworkError,
    /// The provider answered but the body could not be turned into text.
    MalformedResponse,
    /// The local command could not be started.
    ProcessSpawnError,
    /// The local command exited unsuccessfully.
    ProcessNonZeroExit,
    /// The local command did not finish before its deadline.
    ProcessTimeout,
    /// The batch or round was cancelled while this invocation was in flight.
    Cancelled,
}

impl FailureKind {
    /// Whether the dispatcher may retry after this failure.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::NetworkError | Self::ProcessTimeout
        )
    }

    /// Whether the failure came from model resolution rather than invocation.
    pub fn is_registry_error(self) -> bool {
        matches!(self, Self::UnknownModel | Self::InvalidModelConfig)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownModel => write!(f, "unknown_model"),
            Self::InvalidModelConfig => write!(f, "invalid_model_config"),
            Self::AuthError => write!(f, "auth_error"),
            Self::RateLimited => write!(f, "rate_limited"),
            Self::NetworkError => write!(f, "network_error"),
            Self::MalformedResponse => write!(f, "malformed_response"),
            Self::ProcessSpawnError => write!(f, "process_spawn_error"),
            Self::ProcessNonZeroExit => write!(f, "process_non_zero_exit"),
            Self::ProcessTimeout => write!(f, "process_timeout"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Structured, provider-agnostic failure for one model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{model_id}: {kind}: {message}")]
pub struct InvocationFailure {
    pub kind: FailureKind,
    /// Model id (or the unresolved name for registry failures).
    pub model_id: String,
    pub message: String,
    /// Provider-supplied minimum wait before retrying, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

impl InvocationFailure {
    pub fn new(kind: FailureKind, model_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            model_id: model_id.into(),
            message: message.into(),
            retry_after_ms: None,
        }
    }

    pub fn cancelled(model_id: impl Into<String>) -> Self {
        Self::new(
            FailureKind::Cancelled,
            model_id,
            "invocation abandoned after cancellation",
        )
    }

    pub fn with_retry_after(mut self, wait: Duration) -> Self {
        self.retry_after_ms = Some(wait.as_millis() as u64);
        self
    }

    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after_ms.map(Duration::from_millis)
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}
