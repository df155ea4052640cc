//! Consensus: cross-model agreement over extracted findings.
//!
//! Findings from every responding model are clustered (same category plus
//! similar description or overlapping location). A cluster's support is the
//! number of distinct models in it, which fixes its tier:
//!
//! | support               | tier   |
//! |-----------------------|--------|
//! | all responding models | High   |
//! | strict majority       | Medium |
//! | minority              | Low    |
//!
//! When fewer than half of the requested models responded the report is
//! degraded and no tier exceeds Medium.

pub mod scorer;
pub mod similarity;

pub use scorer::ConsensusScorer;
pub use similarity::{SimilarityMetric, TokenJaccard};

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::findings::{Finding, FindingCategory, Location, Severity};
use crate::resilience::DegradationLevel;

/// Agreement tier. Ordered `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTier {
    Low,
    Medium,
    High,
}

impl ConfidenceTier {
    /// Tier for a cluster backed by `support` of `responding` models.
    pub fn for_support(support: usize, responding: usize) -> Self {
        if responding > 0 && support >= responding {
            Self::High
        } else if support * 2 > responding {
            Self::Medium
        } else {
            Self::Low
        }
    }

    /// Never above `ceiling`.
    pub fn capped(self, ceiling: ConfidenceTier) -> Self {
        self.min(ceiling)
    }
}

impl fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Clustering thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Minimum description similarity for two findings to cluster.
    pub similarity_threshold: f64,
    /// Lower bar used when both findings point at overlapping locations.
    pub location_similarity_threshold: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.5,
            location_similarity_threshold: 0.2,
        }
    }
}

impl ScoringConfig {
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("similarity_threshold", self.similarity_threshold),
            ("location_similarity_threshold", self.location_similarity_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("scoring.{name} must be within 0.0..=1.0"));
            }
        }
        Ok(())
    }
}

/// A finding as reported by one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributedFinding {
    pub model_id: String,
    pub finding: Finding,
}

/// Semantically equivalent findings from one or more models.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindingCluster {
    pub category: FindingCategory,
    /// Highest severity any member reported.
    pub severity: Severity,
    /// Description of the first member.
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    pub supporting_models: BTreeSet<String>,
    pub tier: ConfidenceTier,
    pub members: Vec<AttributedFinding>,
}

impl FindingCluster {
    pub fn support(&self) -> usize {
        self.supporting_models.len()
    }
}

impl fmt::Display for FindingCluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}][{}] {} (support {}, {})",
            self.severity,
            self.category,
            self.description,
            self.support(),
            self.tier
        )
    }
}

/// Result of scoring one batch or debate round. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusReport {
    /// 0–10 per category.
    pub per_category_score: BTreeMap<FindingCategory, f64>,
    pub confidence_tier: ConfidenceTier,
    /// Fewer than half of the requested models responded.
    pub degraded: bool,
    pub degradation: DegradationLevel,
    pub requested_models: usize,
    pub contributing_model_ids: BTreeSet<String>,
    /// Clusters supported by a strict majority of responding models.
    pub agreed_findings: Vec<FindingCluster>,
    /// Clusters supported by a minority.
    pub dissenting_findings: Vec<FindingCluster>,
}

impl ConsensusReport {
    /// Explicit "no data" report: nobody responded.
    pub fn no_data(requested_models: usize) -> Self {
        Self {
            per_category_score: BTreeMap::new(),
            confidence_tier: ConfidenceTier::Low,
            degraded: true,
            degradation: DegradationLevel::Unavailable,
            requested_models,
            contributing_model_ids: BTreeSet::new(),
            agreed_findings: Vec::new(),
            dissenting_findings: Vec::new(),
        }
    }

    pub fn is_no_data(&self) -> bool {
        self.contributing_model_ids.is_empty()
    }

    pub fn responding_models(&self) -> usize {
        self.contributing_model_ids.len()
    }

    /// Copy flagged as degraded, with every tier capped at Medium.
    pub fn into_degraded(mut self) -> Self {
        self.degraded = true;
        if self.degradation == DegradationLevel::Full {
            self.degradation = DegradationLevel::Partial;
        }
        self.confidence_tier = self.confidence_tier.capped(ConfidenceTier::Medium);
        for cluster in self
            .agreed_findings
            .iter_mut()
            .chain(self.dissenting_findings.iter_mut())
        {
            cluster.tier = cluster.tier.capped(ConfidenceTier::Medium);
        }
        self
    }

    /// Every cluster, agreed first.
    pub fn clusters(&self) -> impl Iterator<Item = &FindingCluster> {
        self.agreed_findings.iter().chain(self.dissenting_findings.iter())
    }

    pub fn score(&self, category: FindingCategory) -> Option<f64> {
        self.per_category_score.get(&category).copied()
    }

    /// Short plain-text digest, used when recording chat turns.
    pub fn summary(&self) -> String {
        if self.is_no_data() {
            return format!("no data ({} models requested, none responded)", self.requested_models);
        }
        let mut out = format!(
            "confidence {} from {}/{} models{}",
            self.confidence_tier,
            self.responding_models(),
            self.requested_models,
            if self.degraded { " (degraded)" } else { "" }
        );
        for cluster in &self.agreed_findings {
            out.push_str("\n- ");
            out.push_str(&cluster.to_string());
        }
        out
    }
}
