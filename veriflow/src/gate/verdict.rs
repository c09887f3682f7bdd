//! Validation verdicts and discrepancy records.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of discrepancy a validation check found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscrepancyKind {
    /// An entity mention not present in the known-entity set.
    FabricatedEntity,
    /// A labeled numeric claim outside tolerance of every ground-truth value.
    NumericMismatch,
    /// A claimed trend direction contradicting the fitted slope.
    TrendMismatch,
    /// Enumerated percentage shares that do not sum to a whole.
    ProportionMismatch,
}

impl fmt::Display for DiscrepancyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FabricatedEntity => write!(f, "fabricated_entity"),
            Self::NumericMismatch => write!(f, "numeric_mismatch"),
            Self::TrendMismatch => write!(f, "trend_mismatch"),
            Self::ProportionMismatch => write!(f, "proportion_mismatch"),
        }
    }
}

/// One itemized discrepancy between a stage output and ground truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discrepancy {
    /// The check that produced this discrepancy.
    pub kind: DiscrepancyKind,
    /// Human-readable description.
    pub description: String,
    /// The offending text span or claim.
    pub claim_text: String,
    /// The expected value, if one is known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
}

impl Discrepancy {
    /// Creates a new discrepancy.
    #[must_use]
    pub fn new(
        kind: DiscrepancyKind,
        description: impl Into<String>,
        claim_text: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            description: description.into(),
            claim_text: claim_text.into(),
            expected: None,
        }
    }

    /// Sets the expected value.
    #[must_use]
    pub fn with_expected(mut self, expected: impl Into<String>) -> Self {
        self.expected = Some(expected.into());
        self
    }
}

/// The outcome of running a stage output through the validation gate.
///
/// Produced fresh per stage invocation and appended to the container's
/// processing history; never reused across stages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    /// Ordered discrepancies, in check order.
    pub discrepancies: Vec<Discrepancy>,
}

impl Verdict {
    /// Creates a clean verdict.
    #[must_use]
    pub fn clean() -> Self {
        Self::default()
    }

    /// Creates a verdict from a discrepancy list.
    #[must_use]
    pub fn from_discrepancies(discrepancies: Vec<Discrepancy>) -> Self {
        Self { discrepancies }
    }

    /// True iff at least one discrepancy was recorded.
    #[must_use]
    pub fn tripwire(&self) -> bool {
        !self.discrepancies.is_empty()
    }

    /// Renders the discrepancy list as numbered lines, for amended
    /// retry guidance and error records.
    #[must_use]
    pub fn itemize(&self) -> String {
        self.discrepancies
            .iter()
            .enumerate()
            .map(|(i, d)| format!("{}. [{}] {}", i + 1, d.kind, d.description))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_verdict_no_tripwire() {
        let verdict = Verdict::clean();
        assert!(!verdict.tripwire());
        assert!(verdict.itemize().is_empty());
    }

    #[test]
    fn test_tripwire_on_any_discrepancy() {
        let verdict = Verdict::from_discrepancies(vec![Discrepancy::new(
            DiscrepancyKind::FabricatedEntity,
            "unknown entity 'Cid'",
            "Cid",
        )]);
        assert!(verdict.tripwire());
        assert!(verdict.itemize().contains("fabricated_entity"));
        assert!(verdict.itemize().starts_with("1. "));
    }

    #[test]
    fn test_verdict_serialization() {
        let verdict = Verdict::from_discrepancies(vec![Discrepancy::new(
            DiscrepancyKind::NumericMismatch,
            "claimed 135000, closest ground truth 114622",
            "Total Damage: 135000",
        )
        .with_expected("114622")]);

        let json = serde_json::to_string(&verdict).unwrap();
        let back: Verdict = serde_json::from_str(&json).unwrap();
        assert_eq!(verdict, back);
        assert!(json.contains("numeric_mismatch"));
    }
}
