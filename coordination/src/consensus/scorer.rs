//! Consensus scorer: clusters findings and computes tiers and category scores.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{debug, warn};

use super::{
    AttributedFinding, ConfidenceTier, ConsensusReport, FindingCluster, ScoringConfig,
    SimilarityMetric, TokenJaccard,
};
use crate::findings::{self, Finding, FindingCategory, ModelAssessment, NEUTRAL_SCORE};
use crate::invocation::InvocationResult;
use crate::resilience::{self, DegradationLevel};

/// Deterministic scorer. Same inputs in the same order give the same report.
#[derive(Debug, Clone)]
pub struct ConsensusScorer {
    config: ScoringConfig,
    metric: Arc<dyn SimilarityMetric>,
}

impl Default for ConsensusScorer {
    fn default() -> Self {
        Self::new(ScoringConfig::default())
    }
}

impl ConsensusScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self::with_metric(config, Arc::new(TokenJaccard))
    }

    pub fn with_metric(config: ScoringConfig, metric: Arc<dyn SimilarityMetric>) -> Self {
        Self { config, metric }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Extract and score a dispatched batch. Every result counts as requested.
    pub fn score_results(&self, results: &[InvocationResult]) -> ConsensusReport {
        let assessments = findings::assess_all(results);
        self.score(results.len(), &assessments)
    }

    /// Score plain finding lists keyed by model id.
    pub fn score_findings(
        &self,
        requested: usize,
        by_model: &BTreeMap<String, Vec<Finding>>,
    ) -> ConsensusReport {
        let assessments: Vec<ModelAssessment> = by_model
            .iter()
            .map(|(id, findings)| ModelAssessment::new(id.clone(), findings.clone()))
            .collect();
        self.score(requested, &assessments)
    }

    /// Build the report for `assessments` out of `requested` models.
    pub fn score(&self, requested: usize, assessments: &[ModelAssessment]) -> ConsensusReport {
        let responding = assessments.len();
        let requested = requested.max(responding);
        if responding == 0 {
            warn!(requested, "no model responded, returning no-data report");
            return ConsensusReport::no_data(requested);
        }

        let degraded = resilience::is_degraded(requested, responding);
        let ceiling = if degraded {
            ConfidenceTier::Medium
        } else {
            ConfidenceTier::High
        };

        let mut clusters = self.cluster(assessments);
        for cluster in &mut clusters {
            cluster.tier = ConfidenceTier::for_support(cluster.support(), responding).capped(ceiling);
        }
        // Stable sort keeps first-seen order among equals.
        clusters.sort_by(|a, b| {
            b.tier
                .cmp(&a.tier)
                .then(b.severity.cmp(&a.severity))
                .then(b.support().cmp(&a.support()))
        });

        let per_category_score = FindingCategory::ALL
            .iter()
            .map(|&category| {
                let score = self.category_score(category, assessments, &clusters, responding);
                (category, score)
            })
            .collect();

        let confidence_tier = overall_tier(&clusters, responding).capped(ceiling);
        let (agreed_findings, dissenting_findings): (Vec<_>, Vec<_>) = clusters
            .into_iter()
            .partition(|c| c.support() * 2 > responding);

        if degraded {
            warn!(requested, responding, "consensus report is degraded");
        }
        debug!(
            requested,
            responding,
            agreed = agreed_findings.len(),
            dissenting = dissenting_findings.len(),
            tier = %confidence_tier,
            "scored consensus"
        );

        ConsensusReport {
            per_category_score,
            confidence_tier,
            degraded,
            degradation: DegradationLevel::from_counts(requested, responding),
            requested_models: requested,
            contributing_model_ids: assessments.iter().map(|a| a.model_id.clone()).collect(),
            agreed_findings,
            dissenting_findings,
        }
    }

    /// Whether two findings describe the same issue.
    pub fn similar(&self, a: &Finding, b: &Finding) -> bool {
        if a.category != b.category {
            return false;
        }
        let sim = self.metric.similarity(&a.description, &b.description);
        let overlapping = matches!(
            (&a.location, &b.location),
            (Some(la), Some(lb)) if la.overlaps(lb)
        );
        if overlapping {
            sim >= self.config.location_similarity_threshold
        } else {
            sim >= self.config.similarity_threshold
        }
    }

    /// Greedy single-linkage clustering in model order. Each finding joins the
    /// cluster holding its most similar member, or starts a new one. Tiers are
    /// left at `Low` for the caller to assign.
    pub fn cluster(&self, assessments: &[ModelAssessment]) -> Vec<FindingCluster> {
        let mut clusters: Vec<FindingCluster> = Vec::new();
        for assessment in assessments {
            for finding in &assessment.findings {
                let best = clusters
                    .iter()
                    .enumerate()
                    .filter(|(_, c)| c.category == finding.category)
                    .filter_map(|(i, c)| {
                        c.members
                            .iter()
                            .filter(|m| self.similar(&m.finding, finding))
                            .map(|m| self.metric.similarity(&m.finding.description, &finding.description))
                            .fold(None, |acc: Option<f64>, s| Some(acc.map_or(s, |a| a.max(s))))
                            .map(|s| (i, s))
                    })
                    // first cluster wins ties
                    .fold(None, |acc: Option<(usize, f64)>, (i, s)| match acc {
                        Some((_, best)) if best >= s => acc,
                        _ => Some((i, s)),
                    });

                let member = AttributedFinding {
                    model_id: assessment.model_id.clone(),
                    finding: finding.clone(),
                };
                match best {
                    Some((i, _)) => {
                        let cluster = &mut clusters[i];
                        cluster.severity = cluster.severity.max(finding.severity);
                        if cluster.location.is_none() {
                            cluster.location = finding.location.clone();
                        }
                        cluster.supporting_models.insert(assessment.model_id.clone());
                        cluster.members.push(member);
                    }
                    None => clusters.push(FindingCluster {
                        category: finding.category,
                        severity: finding.severity,
                        description: finding.description.clone(),
                        location: finding.location.clone(),
                        supporting_models: BTreeSet::from([assessment.model_id.clone()]),
                        tier: ConfidenceTier::Low,
                        members: vec![member],
                    }),
                }
            }
        }
        clusters
    }

    /// Weighted mean of per-model category scores.
    ///
    /// A model with findings in the category is weighted by the mean support
    /// ratio of its clusters there. A model without findings in it scores its
    /// explicit value or [`NEUTRAL_SCORE`], weighted by the share of models
    /// outside the best-supported cluster.
    fn category_score(
        &self,
        category: FindingCategory,
        assessments: &[ModelAssessment],
        clusters: &[FindingCluster],
        responding: usize,
    ) -> f64 {
        let in_category: Vec<&FindingCluster> =
            clusters.iter().filter(|c| c.category == category).collect();
        let max_support = in_category.iter().map(|c| c.support()).max().unwrap_or(0);
        let silent_weight = (responding - max_support.min(responding)) as f64 / responding as f64;

        let mut weighted = 0.0;
        let mut total = 0.0;
        for assessment in assessments {
            let ratios: Vec<f64> = in_category
                .iter()
                .filter(|c| c.supporting_models.contains(&assessment.model_id))
                .map(|c| c.support() as f64 / responding as f64)
                .collect();
            let weight = if ratios.is_empty() {
                silent_weight
            } else {
                ratios.iter().sum::<f64>() / ratios.len() as f64
            };
            weighted += weight * assessment.category_score(category);
            total += weight;
        }

        let score = if total > 0.0 {
            weighted / total
        } else {
            NEUTRAL_SCORE
        };
        (score * 100.0).round() / 100.0
    }
}

fn overall_tier(clusters: &[FindingCluster], responding: usize) -> ConfidenceTier {
    if clusters.is_empty() {
        return ConfidenceTier::High;
    }
    if clusters.iter().all(|c| c.support() >= responding) {
        return ConfidenceTier::High;
    }
    let majority = clusters.iter().filter(|c| c.support() * 2 > responding).count();
    if majority * 2 >= clusters.len() {
        ConfidenceTier::Medium
    } else {
        ConfidenceTier::Low
    }
}
