//! Findings: normalized observations extracted from model responses.
//!
//! A [`Finding`] is derived once from a model's text and never mutated.
//! [`ModelAssessment`] bundles one model's findings with any explicit
//! per-category scores it stated.

pub mod extract;

pub use extract::{assess, assess_all, extract, extract_text};

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Score a model gets for a category it said nothing about.
pub const NEUTRAL_SCORE: f64 = 5.0;

/// Finding category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingCategory {
    Quality,
    Security,
    Performance,
    Architecture,
    Other,
}

impl FindingCategory {
    pub const ALL: [FindingCategory; 5] = [
        Self::Quality,
        Self::Security,
        Self::Performance,
        Self::Architecture,
        Self::Other,
    ];

    /// Parse a category label such as a markdown header or a `[tag]`.
    pub fn parse(label: &str) -> Option<Self> {
        let label = label.trim().trim_matches(|c: char| !c.is_alphanumeric());
        let label = label.to_ascii_lowercase();
        let label = label.as_str();
        match label {
            "quality" | "code quality" | "correctness" | "maintainability" | "readability"
            | "style" | "bug" | "bugs" => Some(Self::Quality),
            "security" | "vulnerability" | "vulnerabilities" | "safety" => Some(Self::Security),
            "performance" | "perf" | "efficiency" | "scalability" => Some(Self::Performance),
            "architecture" | "design" | "structure" => Some(Self::Architecture),
            "other" | "general" | "misc" | "miscellaneous" | "notes" => Some(Self::Other),
            _ => {
                // "Security Issues", "Performance concerns", ...
                let first = label.split_whitespace().next()?;
                if first == label {
                    None
                } else {
                    Self::parse(first)
                }
            }
        }
    }

    /// Best-effort category from free-text keywords.
    pub fn infer(description: &str) -> Self {
        const SECURITY: &[&str] = &[
            "injection", "xss", "csrf", "secret", "credential", "password", "auth",
            "vulnerab", "sanitiz", "escape", "unsafe", "overflow", "privilege", "token",
        ];
        const PERFORMANCE: &[&str] = &[
            "performance", "slow", "latency", "allocation", "allocat", "o(n", "quadratic",
            "cache", "memory", "clone", "blocking", "throughput",
        ];
        const ARCHITECTURE: &[&str] = &[
            "architecture", "coupling", "abstraction", "module", "layer", "dependency",
            "responsibilit", "interface", "design",
        ];
        const QUALITY: &[&str] = &[
            "unwrap", "panic", "error handling", "naming", "duplicat", "test", "readab",
            "dead code", "bug", "null", "edge case", "off-by-one",
        ];

        let text = description.to_ascii_lowercase();
        let hit = |words: &[&str]| words.iter().any(|w| text.contains(w));
        if hit(SECURITY) {
            Self::Security
        } else if hit(PERFORMANCE) {
            Self::Performance
        } else if hit(ARCHITECTURE) {
            Self::Architecture
        } else if hit(QUALITY) {
            Self::Quality
        } else {
            Self::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Quality => "quality",
            Self::Security => "security",
            Self::Performance => "performance",
            Self::Architecture => "architecture",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for FindingCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Ordered severity: `Info < Warning < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn parse(marker: &str) -> Option<Self> {
        match marker.trim().to_ascii_lowercase().as_str() {
            "critical" | "high" | "blocker" | "error" | "severe" => Some(Self::Critical),
            "warning" | "warn" | "medium" | "moderate" | "major" => Some(Self::Warning),
            "info" | "low" | "minor" | "note" | "nit" | "suggestion" => Some(Self::Info),
            _ => None,
        }
    }

    /// Points deducted from a perfect 10 when deriving a category score.
    pub fn penalty(&self) -> f64 {
        match self {
            Self::Critical => 6.0,
            Self::Warning => 2.0,
            Self::Info => 0.5,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// File plus optional line range.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_line: Option<u32>,
}

impl Location {
    pub fn file(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            start_line: None,
            end_line: None,
        }
    }

    pub fn lines(file: impl Into<String>, start: u32, end: u32) -> Self {
        Self {
            file: file.into(),
            start_line: Some(start.min(end)),
            end_line: Some(start.max(end)),
        }
    }

    fn normalized_file(&self) -> &str {
        self.file.trim().trim_start_matches("./")
    }

    /// Same file and intersecting line ranges. A location without lines
    /// covers the whole file.
    pub fn overlaps(&self, other: &Location) -> bool {
        if self.normalized_file() != other.normalized_file() {
            return false;
        }
        match (self.range(), other.range()) {
            (Some((a0, a1)), Some((b0, b1))) => a0 <= b1 && b0 <= a1,
            _ => true,
        }
    }

    fn range(&self) -> Option<(u32, u32)> {
        let start = self.start_line?;
        Some((start, self.end_line.unwrap_or(start)))
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.range() {
            Some((s, e)) if s == e => write!(f, "{}:{}", self.file, s),
            Some((s, e)) => write!(f, "{}:{}-{}", self.file, s, e),
            None => write!(f, "{}", self.file),
        }
    }
}

/// One normalized observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub category: FindingCategory,
    pub severity: Severity,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

impl Finding {
    pub fn new(category: FindingCategory, severity: Severity, description: impl Into<String>) -> Self {
        Self {
            category,
            severity,
            description: description.into(),
            location: None,
        }
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}][{}] {}", self.severity, self.category, self.description)?;
        if let Some(loc) = &self.location {
            write!(f, " ({loc})")?;
        }
        Ok(())
    }
}

/// Everything one model said, normalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelAssessment {
    pub model_id: String,
    pub findings: Vec<Finding>,
    /// Scores the model stated explicitly (0–10).
    #[serde(default)]
    pub category_scores: BTreeMap<FindingCategory, f64>,
}

impl ModelAssessment {
    pub fn new(model_id: impl Into<String>, findings: Vec<Finding>) -> Self {
        Self {
            model_id: model_id.into(),
            findings,
            category_scores: BTreeMap::new(),
        }
    }

    pub fn with_score(mut self, category: FindingCategory, score: f64) -> Self {
        self.category_scores.insert(category, score.clamp(0.0, 10.0));
        self
    }

    /// Whether the model expressed anything about `category`.
    pub fn has_opinion(&self, category: FindingCategory) -> bool {
        self.category_scores.contains_key(&category)
            || self.findings.iter().any(|f| f.category == category)
    }

    /// Explicit score, else derived from findings, else neutral.
    pub fn category_score(&self, category: FindingCategory) -> f64 {
        if let Some(score) = self.category_scores.get(&category) {
            return *score;
        }
        let mut penalty = 0.0;
        let mut any = false;
        for finding in self.findings.iter().filter(|f| f.category == category) {
            penalty += finding.severity.penalty();
            any = true;
        }
        if any {
            (10.0 - penalty).clamp(0.0, 10.0)
        } else {
            NEUTRAL_SCORE
        }
    }
}
