//! Deterministic synthesis of a debate's final consensus.
//!
//! Each participant's latest usable answer counts once: its cross-examination
//! revision when it produced one, otherwise its independent answer. The
//! revisions are scored with the same tier policy as a single-shot batch, then
//! every independent-round cluster is traced into the final report.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::state::{DebateSession, RoundKind};
use crate::consensus::{ConfidenceTier, ConsensusReport, ConsensusScorer, FindingCluster};
use crate::findings::{self, FindingCategory, ModelAssessment, Severity};
use crate::resilience;

/// What happened to a finding between the independent round and synthesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Present in both, same category and severity.
    Survived,
    /// Present in both, but severity or category changed.
    Revised,
    /// Dropped during cross-examination.
    Discarded,
    /// First raised during cross-examination.
    Introduced,
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Survived => write!(f, "survived"),
            Self::Revised => write!(f, "revised"),
            Self::Discarded => write!(f, "discarded"),
            Self::Introduced => write!(f, "introduced"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindingProvenance {
    pub status: Provenance,
    pub description: String,
    /// Category and severity as of the final report (original, if discarded).
    pub category: FindingCategory,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_support: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_support: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_tier: Option<ConfidenceTier>,
}

#[derive(Debug, Clone)]
pub struct SynthesisOutcome {
    pub report: ConsensusReport,
    pub provenance: Vec<FindingProvenance>,
}

/// Build the final consensus from whatever rounds the session holds.
pub fn synthesize(session: &DebateSession, scorer: &ConsensusScorer) -> SynthesisOutcome {
    let requested = session.requested_models();
    let independent = session.round(RoundKind::Independent);
    let cross = session.round(RoundKind::CrossExamination);

    if !session.has_independent_data() {
        warn!(session_id = %session.id, "no independent-round data, sealing with no-data consensus");
        return SynthesisOutcome {
            report: ConsensusReport::no_data(requested),
            provenance: Vec::new(),
        };
    }

    let mut finals: Vec<ModelAssessment> = Vec::new();
    for id in &session.participants {
        let revised = cross
            .and_then(|r| r.per_model_outputs.get(id))
            .and_then(findings::assess);
        let original = || {
            independent
                .and_then(|r| r.per_model_outputs.get(id))
                .and_then(findings::assess)
        };
        if let Some(assessment) = revised.or_else(original) {
            finals.push(assessment);
        }
    }

    let mut report = scorer.score(requested, &finals);
    let cross_successes = cross.map_or(0, |r| r.success_count());
    if resilience::is_degraded(requested, cross_successes) {
        report = report.into_degraded();
    }

    let baseline = independent
        .and_then(|r| r.round_consensus.as_ref())
        .map(|r| r.clusters().cloned().collect::<Vec<_>>())
        .unwrap_or_default();
    let provenance = trace(&baseline, &report, scorer);

    SynthesisOutcome { report, provenance }
}

/// Match every baseline cluster to a final cluster and label the outcome.
fn trace(
    baseline: &[FindingCluster],
    report: &ConsensusReport,
    scorer: &ConsensusScorer,
) -> Vec<FindingProvenance> {
    let finals: Vec<&FindingCluster> = report.clusters().collect();
    let mut matched: BTreeSet<usize> = BTreeSet::new();
    let mut out = Vec::with_capacity(baseline.len() + finals.len());

    for original in baseline {
        let same_category = finals
            .iter()
            .position(|f| clusters_match(scorer, original, f, false));
        let hit = same_category.or_else(|| {
            finals
                .iter()
                .position(|f| clusters_match(scorer, original, f, true))
        });

        match hit {
            Some(i) => {
                matched.insert(i);
                let f = finals[i];
                let status = if f.category == original.category && f.severity == original.severity {
                    Provenance::Survived
                } else {
                    Provenance::Revised
                };
                out.push(FindingProvenance {
                    status,
                    description: original.description.clone(),
                    category: f.category,
                    severity: f.severity,
                    original_support: Some(original.support()),
                    final_support: Some(f.support()),
                    final_tier: Some(f.tier),
                });
            }
            None => out.push(FindingProvenance {
                status: Provenance::Discarded,
                description: original.description.clone(),
                category: original.category,
                severity: original.severity,
                original_support: Some(original.support()),
                final_support: None,
                final_tier: None,
            }),
        }
    }

    for (i, f) in finals.iter().enumerate() {
        if matched.contains(&i) {
            continue;
        }
        out.push(FindingProvenance {
            status: Provenance::Introduced,
            description: f.description.clone(),
            category: f.category,
            severity: f.severity,
            original_support: None,
            final_support: Some(f.support()),
            final_tier: Some(f.tier),
        });
    }
    out
}

/// Any member of `a` similar to any member of `b`. With `ignore_category`
/// the comparison is done as if both were filed under `b`'s category.
fn clusters_match(
    scorer: &ConsensusScorer,
    a: &FindingCluster,
    b: &FindingCluster,
    ignore_category: bool,
) -> bool {
    a.members.iter().any(|ma| {
        let mut probe = ma.finding.clone();
        if ignore_category {
            probe.category = b.category;
        }
        b.members.iter().any(|mb| scorer.similar(&probe, &mb.finding))
    })
}
