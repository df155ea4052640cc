//! Resilience: degraded-batch classification
//!
//! A batch never fails just because some models did. Instead the result is
//! tagged with how much of the requested panel actually answered:
//!
//! ```text
//! requested = 4
//!   ├─ 4 respond        → Full
//!   ├─ 2..=3 respond    → Partial      (still a usable quorum)
//!   ├─ 1 responds       → Partial      (degraded: fewer than half)
//!   └─ 0 respond        → Unavailable  (degraded)
//! ```
//!
//! "Degraded" is the stricter signal consumers key off: strictly fewer than
//! half of the requested models contributed.

use serde::{Deserialize, Serialize};

/// How much of the requested panel contributed to a result.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum DegradationLevel {
    /// Every requested model responded.
    #[default]
    Full,
    /// Some responded, some did not.
    Partial,
    /// Nobody responded.
    Unavailable,
}

impl DegradationLevel {
    pub fn from_counts(requested: usize, responding: usize) -> Self {
        if responding == 0 {
            Self::Unavailable
        } else if responding >= requested {
            Self::Full
        } else {
            Self::Partial
        }
    }
}

impl std::fmt::Display for DegradationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Partial => write!(f, "partial"),
            Self::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// Strictly fewer than half of the requested models responded.
///
/// An empty request is not degraded; there was nothing to lose.
pub fn is_degraded(requested: usize, responding: usize) -> bool {
    requested > 0 && responding * 2 < requested
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_from_counts() {
        assert_eq!(DegradationLevel::from_counts(3, 3), DegradationLevel::Full);
        assert_eq!(DegradationLevel::from_counts(3, 2), DegradationLevel::Partial);
        assert_eq!(DegradationLevel::from_counts(3, 0), DegradationLevel::Unavailable);
        assert_eq!(DegradationLevel::from_counts(0, 0), DegradationLevel::Unavailable);
    }

    #[test]
    fn test_degraded_threshold_is_strictly_less_than_half() {
        assert!(!is_degraded(4, 2));
        assert!(is_degraded(4, 1));
        assert!(!is_degraded(3, 2));
        assert!(is_degraded(3, 1));
        assert!(!is_degraded(1, 1));
        assert!(is_degraded(1, 0));
        assert!(!is_degraded(0, 0));
    }

    #[test]
    fn test_level_ordering_worsens() {
        assert!(DegradationLevel::Full < DegradationLevel::Partial);
        assert!(DegradationLevel::Partial < DegradationLevel::Unavailable);
    }
}
