//! Conclave coordination core
//!
//! Deterministic building blocks of the multi-model consensus engine:
//!
//! - [`registry`]: alias resolution into invocable model descriptors
//! - [`invocation`] / [`errors`]: requests, results and the failure taxonomy
//! - [`findings`]: normalized findings extracted from free-form responses
//! - [`consensus`]: cross-model clustering, tiers and category scores
//! - [`debate`]: the Independent → CrossExamination → Synthesis state machine
//! - [`session`]: per-session conversation history
//! - [`tool_schema`] / [`config`]: the transport contract and engine settings
//!
//! Nothing here performs I/O. The async runtime pieces (adapters, dispatcher,
//! debate driver) live in `conclave-agents`.

#![allow(clippy::uninlined_format_args)]

pub mod config;
pub mod consensus;
pub mod debate;
pub mod errors;
pub mod findings;
pub mod invocation;
pub mod perf_control;
pub mod registry;
pub mod resilience;
pub mod session;
pub mod tool_schema;

pub use config::{ConfigError, EngineConfig};
pub use consensus::{
    ConfidenceTier, ConsensusReport, ConsensusScorer, FindingCluster, ScoringConfig,
    SimilarityMetric, TokenJaccard,
};
pub use debate::{DebateConfig, DebatePhase, DebateRound, DebateSession, RoundKind};
pub use errors::{FailureKind, InvocationFailure};
pub use findings::{Finding, FindingCategory, Location, ModelAssessment, Severity};
pub use invocation::{
    ContextBlock, InvocationOptions, InvocationOutcome, InvocationRequest, InvocationResult,
};
pub use perf_control::{DispatchConfig, RetryPolicy};
pub use registry::{
    ApiStyle, ModelDescriptor, ModelEntry, ModelRegistry, ProviderConfig, ProviderKind,
    RegistryError,
};
pub use resilience::DegradationLevel;
pub use session::{SessionError, SessionId, SessionManager, Turn, TurnGuard};
pub use tool_schema::{ToolKind, ToolRequest, ToolResponse};
