//! Debate Orchestration: multi-model deliberation
//!
//! Linear state machine driven one round at a time. Each round is a single
//! dispatcher batch; the driver hands the batch results to
//! [`state::transition`], which records the round and advances exactly one
//! phase.
//!
//! # Debate Flow
//!
//! ```text
//! Independent ──► CrossExamination ──► Synthesis ──► Sealed
//!  (baseline        (critiques only,     (final
//!   consensus)       no consensus)        consensus + provenance)
//! ```
//!
//! Failed or timed-out rounds never stall the machine: an empty
//! cross-examination degrades the synthesis, and a session with no
//! independent answers seals with a "no data" consensus.

pub mod prompts;
pub mod state;
pub mod synthesis;

pub use state::{
    transition, DebatePhase, DebateRound, DebateSession, DebateTransition, RoundInput, RoundKind,
    TransitionError,
};
pub use synthesis::{FindingProvenance, Provenance, SynthesisOutcome};

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Debate limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebateConfig {
    /// Deadline for one round's batch, stragglers included.
    pub round_timeout_secs: u64,
    /// Model name or alias asked for a narrative synthesis, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synthesizer: Option<String>,
}

impl Default for DebateConfig {
    fn default() -> Self {
        Self {
            round_timeout_secs: 180,
            synthesizer: None,
        }
    }
}

impl DebateConfig {
    pub fn round_timeout(&self) -> Duration {
        Duration::from_secs(self.round_timeout_secs)
    }
}
