//! Typed claims extracted from free-form stage output.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kinds of claim the extraction engine can look for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimKind {
    /// A named-entity mention.
    Entity,
    /// A labeled numeric quantity.
    Numeric,
    /// A percentage statement.
    Percentage,
    /// A trend statement.
    Trend,
}

impl ClaimKind {
    /// All claim kinds, in check order.
    pub const ALL: [Self; 4] = [Self::Entity, Self::Numeric, Self::Percentage, Self::Trend];
}

/// Byte span of a claim within the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    /// Start byte offset, inclusive.
    pub start: usize,
    /// End byte offset, exclusive.
    pub end: usize,
}

impl Span {
    /// Creates a new span.
    #[must_use]
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// Claimed direction of a trend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    /// Values are rising over time.
    Increasing,
    /// Values are falling over time.
    Declining,
    /// Values are flat over time.
    Stable,
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Increasing => write!(f, "increasing"),
            Self::Declining => write!(f, "declining"),
            Self::Stable => write!(f, "stable"),
        }
    }
}

/// A typed claim found in stage output text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Claim {
    /// A mention of a named entity.
    Entity {
        /// The mentioned name, as written.
        name: String,
        /// Where it appears.
        span: Span,
    },
    /// A numeric quantity with its surrounding label.
    Numeric {
        /// The label context (e.g. "Total Damage").
        label: String,
        /// The claimed value.
        value: f64,
        /// Where the claim appears.
        span: Span,
    },
    /// A percentage statement.
    Percentage {
        /// The claimed percentage value.
        value: f64,
        /// True if phrased as a change (e.g. "increased by 12%").
        is_delta: bool,
        /// True if phrased as a share of a whole (e.g. "40% of the damage").
        is_share: bool,
        /// Where the claim appears.
        span: Span,
    },
    /// A trend statement.
    Trend {
        /// The subject label (e.g. "gold per minute").
        label: String,
        /// Claimed direction.
        direction: TrendDirection,
        /// Optional claimed magnitude in percent.
        magnitude_pct: Option<f64>,
        /// Where the claim appears.
        span: Span,
    },
}

impl Claim {
    /// Returns the kind of this claim.
    #[must_use]
    pub fn kind(&self) -> ClaimKind {
        match self {
            Self::Entity { .. } => ClaimKind::Entity,
            Self::Numeric { .. } => ClaimKind::Numeric,
            Self::Percentage { .. } => ClaimKind::Percentage,
            Self::Trend { .. } => ClaimKind::Trend,
        }
    }

    /// Returns the claim's span in the source text.
    #[must_use]
    pub fn span(&self) -> Span {
        match self {
            Self::Entity { span, .. }
            | Self::Numeric { span, .. }
            | Self::Percentage { span, .. }
            | Self::Trend { span, .. } => *span,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_kind_accessor() {
        let claim = Claim::Entity {
            name: "Ana".to_string(),
            span: Span::new(0, 3),
        };
        assert_eq!(claim.kind(), ClaimKind::Entity);
        assert_eq!(claim.span(), Span::new(0, 3));
    }

    #[test]
    fn test_trend_direction_display() {
        assert_eq!(TrendDirection::Declining.to_string(), "declining");
    }

    #[test]
    fn test_claim_serde_tagging() {
        let claim = Claim::Numeric {
            label: "Total Damage".to_string(),
            value: 120_000.0,
            span: Span::new(4, 24),
        };
        let json = serde_json::to_string(&claim).unwrap();
        assert!(json.contains(r#""kind":"numeric""#));
    }
}
