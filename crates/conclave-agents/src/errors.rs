//! Engine error taxonomy.
//!
//! Per-model failures stay inside batch results as
//! [`InvocationFailure`] values. An [`EngineError`] is only returned when a
//! whole tool call cannot produce a useful answer.
//!
//! | Variant              | Raised                                            |
//! |----------------------|---------------------------------------------------|
//! | `InvalidRequest`     | request shape rejected before resolution          |
//! | `NoResolvableModels` | no requested model resolved; no network activity  |
//! | `AllModelsFailed`    | every invocation of a single-shot batch failed    |
//! | `Session`            | chat turn referenced an unknown session           |
//! | `Debate`             | debate driven out of phase order                  |
//! | `Config` / `Registry`| engine construction                               |

use coordination::debate::TransitionError;
use coordination::errors::InvocationFailure;
use coordination::{ConfigError, RegistryError, SessionError};
use thiserror::Error;

/// Error surfaced to the transport for a whole tool call.
#[derive(Debug, Error)]
pub enum EngineError {
    // ── Request ───────────────────────────────────────────────────────────
    /// The request failed shape validation.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// None of the requested names resolved. Carries one failure per name.
    #[error("no requested model could be resolved: {}", describe(.failures))]
    NoResolvableModels { failures: Vec<InvocationFailure> },

    /// Every model in the batch failed. Carries every per-model failure.
    #[error("all {} model(s) failed: {}", .failures.len(), describe(.failures))]
    AllModelsFailed { failures: Vec<InvocationFailure> },

    #[error(transparent)]
    Session(#[from] SessionError),

    /// The debate state machine refused a transition.
    #[error(transparent)]
    Debate(#[from] TransitionError),

    // ── Construction ──────────────────────────────────────────────────────
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl EngineError {
    /// Per-model failures carried by the aggregate variants.
    pub fn failures(&self) -> &[InvocationFailure] {
        match self {
            Self::NoResolvableModels { failures } | Self::AllModelsFailed { failures } => failures,
            _ => &[],
        }
    }
}

fn describe(failures: &[InvocationFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({})", f.model_id, f.kind))
        .collect::<Vec<_>>()
        .join(", ")
}
