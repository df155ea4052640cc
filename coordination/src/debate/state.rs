//! Debate state machine: phases, rounds, and the transition function.
//!
//! [`transition`] is the only way a session moves forward. It takes the
//! batch results for the current phase, records them as a round, and
//! advances exactly one phase. It is synchronous and does no I/O, so the
//! whole protocol can be exercised without a runtime.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::synthesis::{self, FindingProvenance};
use crate::consensus::{ConsensusReport, ConsensusScorer};
use crate::errors::InvocationFailure;
use crate::findings;
use crate::invocation::InvocationResult;
use crate::resilience;

/// Phase of a debate session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebatePhase {
    /// Each participant answers the topic alone.
    Independent,
    /// Each participant critiques its peers and may revise.
    CrossExamination,
    /// Revisions are aggregated into the final consensus.
    Synthesis,
    /// Final; nothing changes after this.
    Sealed,
}

impl DebatePhase {
    /// Whether this is a terminal phase.
    pub fn is_terminal(self) -> bool {
        self == Self::Sealed
    }

    /// Valid transitions from this phase.
    pub fn valid_transitions(self) -> &'static [DebatePhase] {
        match self {
            Self::Independent => &[Self::CrossExamination],
            Self::CrossExamination => &[Self::Synthesis],
            Self::Synthesis => &[Self::Sealed],
            Self::Sealed => &[],
        }
    }

    /// The single successor, if any.
    pub fn next(self) -> Option<DebatePhase> {
        self.valid_transitions().first().copied()
    }

    /// Round recorded while in this phase.
    pub fn round_kind(self) -> Option<RoundKind> {
        match self {
            Self::Independent => Some(RoundKind::Independent),
            Self::CrossExamination => Some(RoundKind::CrossExamination),
            Self::Synthesis => Some(RoundKind::Synthesis),
            Self::Sealed => None,
        }
    }
}

impl std::fmt::Display for DebatePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Independent => write!(f, "independent"),
            Self::CrossExamination => write!(f, "cross_examination"),
            Self::Synthesis => write!(f, "synthesis"),
            Self::Sealed => write!(f, "sealed"),
        }
    }
}

/// Kind of a recorded round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundKind {
    Independent,
    CrossExamination,
    Synthesis,
}

impl std::fmt::Display for RoundKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Independent => write!(f, "independent"),
            Self::CrossExamination => write!(f, "cross_examination"),
            Self::Synthesis => write!(f, "synthesis"),
        }
    }
}

/// One synchronized batch within a debate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateRound {
    /// Round number (1-indexed).
    pub index: u32,
    pub kind: RoundKind,
    pub per_model_outputs: BTreeMap<String, InvocationResult>,
    /// Absent for cross-examination rounds.
    pub round_consensus: Option<ConsensusReport>,
    pub degraded: bool,
    /// The round hit its own deadline and stragglers were cancelled.
    pub timed_out: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl DebateRound {
    /// `(model_id, text)` for every successful output, ordered by model id.
    pub fn successful_outputs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.per_model_outputs
            .iter()
            .filter_map(|(id, result)| result.text().map(|t| (id.as_str(), t)))
    }

    pub fn success_count(&self) -> usize {
        self.per_model_outputs.values().filter(|r| r.is_success()).count()
    }
}

/// Batch results handed to [`transition`].
#[derive(Debug, Clone)]
pub struct RoundInput {
    pub results: Vec<InvocationResult>,
    pub started_at: DateTime<Utc>,
    pub timed_out: bool,
    /// Narrative from a designated synthesizer; only read in `Synthesis`.
    pub narrative: Option<String>,
}

impl RoundInput {
    pub fn new(results: Vec<InvocationResult>) -> Self {
        Self {
            results,
            started_at: Utc::now(),
            timed_out: false,
            narrative: None,
        }
    }

    pub fn timed_out(mut self, timed_out: bool) -> Self {
        self.timed_out = timed_out;
        self
    }

    pub fn with_narrative(mut self, narrative: Option<String>) -> Self {
        self.narrative = narrative;
        self
    }
}

/// A phase transition record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateTransition {
    /// Previous phase.
    pub from: DebatePhase,
    /// New phase.
    pub to: DebatePhase,
    /// When the transition occurred.
    pub timestamp: DateTime<Utc>,
    /// Reason for the transition.
    pub reason: String,
}

/// Error for invalid state transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionError {
    pub from: DebatePhase,
    pub reason: String,
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cannot advance debate from {}: {}", self.from, self.reason)
    }
}

impl std::error::Error for TransitionError {}

/// A debate session. Appended to once per round; frozen once sealed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateSession {
    /// Unique session identifier.
    pub id: String,
    pub topic: String,
    /// Participating model ids, in request order.
    pub participants: Vec<String>,
    /// Requested names that never resolved. They count as requested but
    /// silent in every round.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unresolved: Vec<String>,
    pub phase: DebatePhase,
    pub rounds: Vec<DebateRound>,
    pub transitions: Vec<DebateTransition>,
    pub final_consensus: Option<ConsensusReport>,
    /// Fate of each independent-round finding after synthesis.
    pub provenance: Vec<FindingProvenance>,
    /// Free-text synthesis from the designated synthesizer, if one ran.
    pub narrative: Option<String>,
    pub created_at: DateTime<Utc>,
    pub sealed_at: Option<DateTime<Utc>>,
}

impl DebateSession {
    pub fn new(topic: impl Into<String>, participants: Vec<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            topic: topic.into(),
            participants,
            unresolved: Vec::new(),
            phase: DebatePhase::Independent,
            rounds: Vec::new(),
            transitions: Vec::new(),
            final_consensus: None,
            provenance: Vec::new(),
            narrative: None,
            created_at: Utc::now(),
            sealed_at: None,
        }
    }

    pub fn with_unresolved(mut self, names: Vec<String>) -> Self {
        self.unresolved = names;
        self
    }

    /// Models the caller asked for, resolved or not.
    pub fn requested_models(&self) -> usize {
        self.participants.len() + self.unresolved.len()
    }

    pub fn is_sealed(&self) -> bool {
        self.phase.is_terminal()
    }

    pub fn round(&self, kind: RoundKind) -> Option<&DebateRound> {
        self.rounds.iter().find(|r| r.kind == kind)
    }

    /// Whether any participant produced an independent-round answer.
    pub fn has_independent_data(&self) -> bool {
        self.round(RoundKind::Independent)
            .is_some_and(|r| r.success_count() > 0)
    }

    /// Compact status line.
    pub fn status_line(&self) -> String {
        let tier = self
            .final_consensus
            .as_ref()
            .map(|c| c.confidence_tier.to_string())
            .unwrap_or_else(|| "-".to_string());
        format!(
            "[{}] {} rounds | {} participants | confidence={}",
            self.phase,
            self.rounds.len(),
            self.participants.len(),
            tier
        )
    }

    fn advance(&mut self, reason: &str) -> DebatePhase {
        let from = self.phase;
        // Only called on non-terminal phases.
        let to = from.next().unwrap_or(DebatePhase::Sealed);
        self.transitions.push(DebateTransition {
            from,
            to,
            timestamp: Utc::now(),
            reason: reason.to_string(),
        });
        self.phase = to;
        to
    }

    /// Index results by model id. Participants without a result are recorded
    /// as cancelled so every round covers the whole panel.
    fn collect_outputs(
        &self,
        results: Vec<InvocationResult>,
        cover_participants: bool,
    ) -> BTreeMap<String, InvocationResult> {
        let mut outputs = BTreeMap::new();
        for result in results {
            outputs.entry(result.model_id.clone()).or_insert(result);
        }
        if cover_participants {
            for id in &self.participants {
                outputs.entry(id.clone()).or_insert_with(|| {
                    InvocationResult::failed(
                        InvocationFailure::cancelled(id.clone()),
                        std::time::Duration::ZERO,
                        0,
                    )
                });
            }
        }
        outputs
    }
}

/// Record `input` as the current phase's round and advance one phase.
pub fn transition(
    session: &mut DebateSession,
    input: RoundInput,
    scorer: &ConsensusScorer,
) -> Result<DebatePhase, TransitionError> {
    let kind = session.phase.round_kind().ok_or_else(|| TransitionError {
        from: session.phase,
        reason: "session is sealed".to_string(),
    })?;
    let requested = session.requested_models();
    let index = session.rounds.len() as u32 + 1;

    let next = match kind {
        RoundKind::Independent => {
            let outputs = session.collect_outputs(input.results, true);
            let results: Vec<InvocationResult> = outputs.values().cloned().collect();
            let report = scorer.score(requested, &findings::assess_all(&results));
            let degraded = report.degraded;
            info!(
                session_id = %session.id,
                responding = report.responding_models(),
                tier = %report.confidence_tier,
                "independent round scored"
            );
            session.rounds.push(DebateRound {
                index,
                kind,
                per_model_outputs: outputs,
                round_consensus: Some(report),
                degraded,
                timed_out: input.timed_out,
                started_at: input.started_at,
                completed_at: Utc::now(),
            });
            session.advance("independent round complete")
        }
        RoundKind::CrossExamination => {
            let outputs = session.collect_outputs(input.results, true);
            let successes = outputs.values().filter(|r| r.is_success()).count();
            let degraded = resilience::is_degraded(requested, successes);
            if degraded {
                warn!(
                    session_id = %session.id,
                    successes,
                    requested,
                    "cross-examination incomplete, synthesis will be degraded"
                );
            }
            session.rounds.push(DebateRound {
                index,
                kind,
                per_model_outputs: outputs,
                round_consensus: None,
                degraded,
                timed_out: input.timed_out,
                started_at: input.started_at,
                completed_at: Utc::now(),
            });
            session.advance("cross-examination complete")
        }
        RoundKind::Synthesis => {
            let outcome = synthesis::synthesize(session, scorer);
            let outputs = session.collect_outputs(input.results, false);
            info!(
                session_id = %session.id,
                tier = %outcome.report.confidence_tier,
                degraded = outcome.report.degraded,
                "debate synthesized"
            );
            session.rounds.push(DebateRound {
                index,
                kind,
                per_model_outputs: outputs,
                round_consensus: Some(outcome.report.clone()),
                degraded: outcome.report.degraded,
                timed_out: input.timed_out,
                started_at: input.started_at,
                completed_at: Utc::now(),
            });
            session.final_consensus = Some(outcome.report);
            session.provenance = outcome.provenance;
            session.narrative = input.narrative.filter(|n| !n.trim().is_empty());
            session.sealed_at = Some(Utc::now());
            session.advance("synthesis complete")
        }
    };
    Ok(next)
}
