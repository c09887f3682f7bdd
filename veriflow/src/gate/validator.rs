//! The validation gate: checks extracted claims against ground truth.

use super::{Discrepancy, DiscrepancyKind, Verdict};
use crate::claims::{Claim, ClaimExtractor, ClaimKind, TrendDirection};
use crate::groundtruth::{normalize_label, GroundTruth};
use std::collections::BTreeSet;
use tracing::debug;

/// Tolerances applied by the validation checks.
#[derive(Debug, Clone, PartialEq)]
pub struct GateConfig {
    /// Relative tolerance for numeric claims, as a fraction.
    pub numeric_tolerance: f64,
    /// Allowed deviation of a proportion sum from 100, in points.
    pub proportion_tolerance_points: f64,
    /// Relative slope magnitude below which a series counts as stable.
    pub stable_slope_threshold: f64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            numeric_tolerance: 0.05,
            proportion_tolerance_points: 2.0,
            stable_slope_threshold: 0.05,
        }
    }
}

/// Validates stage output text against accumulated ground truth.
///
/// Every check is read-only over the ground truth and produces an
/// itemized [`Verdict`]; the gate never mutates or repairs the output.
#[derive(Debug)]
pub struct ValidationGate {
    config: GateConfig,
    extractor: ClaimExtractor,
}

impl ValidationGate {
    /// Creates a gate with the given tolerances.
    #[must_use]
    pub fn new(config: GateConfig) -> Self {
        Self {
            config,
            extractor: ClaimExtractor::new(),
        }
    }

    /// Runs all checks over `text` and returns the combined verdict.
    ///
    /// `known_entities` is the closed-world vocabulary; when it is empty
    /// the entity check is skipped, since nothing has been retrieved yet
    /// to assert a closed world against.
    #[must_use]
    pub fn validate(
        &self,
        text: &str,
        ground_truth: &GroundTruth,
        known_entities: &BTreeSet<String>,
    ) -> Verdict {
        let claims = self.extractor.extract(text, &ClaimKind::ALL, known_entities);

        let mut discrepancies = Vec::new();
        if !known_entities.is_empty() {
            self.check_entities(&claims, known_entities, &mut discrepancies);
        }
        self.check_numerics(&claims, ground_truth, &mut discrepancies);
        self.check_trends(&claims, ground_truth, &mut discrepancies);
        self.check_proportions(&claims, text, &mut discrepancies);

        if !discrepancies.is_empty() {
            debug!(
                discrepancies = discrepancies.len(),
                claims = claims.len(),
                "validation tripwire"
            );
        }
        Verdict::from_discrepancies(discrepancies)
    }

    fn check_entities(
        &self,
        claims: &[Claim],
        known_entities: &BTreeSet<String>,
        out: &mut Vec<Discrepancy>,
    ) {
        let vocabulary: BTreeSet<String> = known_entities
            .iter()
            .map(|e| normalize_label(e))
            .collect();

        let mut reported: BTreeSet<String> = BTreeSet::new();
        for claim in claims {
            let Claim::Entity { name, .. } = claim else {
                continue;
            };
            let normalized = normalize_label(name);
            if normalized.is_empty() || vocabulary.contains(&normalized) {
                continue;
            }
            if reported.insert(normalized) {
                out.push(Discrepancy::new(
                    DiscrepancyKind::FabricatedEntity,
                    format!("entity '{name}' does not appear in any retrieved result"),
                    name.clone(),
                ));
            }
        }
    }

    fn check_numerics(
        &self,
        claims: &[Claim],
        ground_truth: &GroundTruth,
        out: &mut Vec<Discrepancy>,
    ) {
        for claim in claims {
            let Claim::Numeric { label, value, .. } = claim else {
                continue;
            };
            let values = lookup_values(ground_truth, label);
            if values.is_empty() {
                // No ground truth under this label: nothing to contradict.
                continue;
            }

            let within = values
                .iter()
                .any(|g| relative_error(*value, *g) <= self.config.numeric_tolerance);
            if within {
                continue;
            }

            let closest = values
                .iter()
                .copied()
                .min_by(|a, b| {
                    relative_error(*value, *a)
                        .total_cmp(&relative_error(*value, *b))
                })
                .unwrap_or(f64::NAN);
            out.push(
                Discrepancy::new(
                    DiscrepancyKind::NumericMismatch,
                    format!(
                        "claimed {label} of {value} is outside tolerance of every \
                         retrieved value (closest: {closest})"
                    ),
                    format!("{label}: {value}"),
                )
                .with_expected(closest.to_string()),
            );
        }
    }

    fn check_trends(
        &self,
        claims: &[Claim],
        ground_truth: &GroundTruth,
        out: &mut Vec<Discrepancy>,
    ) {
        for claim in claims {
            let Claim::Trend {
                label, direction, ..
            } = claim
            else {
                continue;
            };
            let series = lookup_series(ground_truth, label);
            // A direction over fewer than three points is not checkable.
            if series.len() < 3 {
                continue;
            }
            let observed = classify_trend(&series, self.config.stable_slope_threshold);
            if observed == *direction {
                continue;
            }
            out.push(
                Discrepancy::new(
                    DiscrepancyKind::TrendMismatch,
                    format!(
                        "claimed {label} is {direction}, but the retrieved series \
                         is {observed}"
                    ),
                    format!("{label} {direction}"),
                )
                .with_expected(observed.to_string()),
            );
        }
    }

    fn check_proportions(&self, claims: &[Claim], text: &str, out: &mut Vec<Discrepancy>) {
        let shares: Vec<f64> = claims
            .iter()
            .filter_map(|c| match c {
                Claim::Percentage {
                    value,
                    is_share: true,
                    is_delta: false,
                    ..
                } => Some(*value),
                _ => None,
            })
            .collect();
        // A single share is not an enumeration of a whole.
        if shares.len() < 2 {
            return;
        }

        let sum: f64 = shares.iter().sum();
        if (sum - 100.0).abs() <= self.config.proportion_tolerance_points {
            return;
        }
        let rendered: Vec<String> = shares.iter().map(|s| format!("{s}%")).collect();
        out.push(
            Discrepancy::new(
                DiscrepancyKind::ProportionMismatch,
                format!(
                    "enumerated shares {} sum to {sum}%, not 100%",
                    rendered.join(" + ")
                ),
                truncate(text, 120),
            )
            .with_expected("100".to_string()),
        );
    }
}

impl Default for ValidationGate {
    fn default() -> Self {
        Self::new(GateConfig::default())
    }
}

/// Relative error against a ground-truth value, with a floor of 1 on the
/// denominator so small references do not blow up the ratio.
fn relative_error(claimed: f64, reference: f64) -> f64 {
    (claimed - reference).abs() / reference.abs().max(1.0)
}

/// Looks up numeric values under a label, retrying with leading words of
/// the label trimmed so that "the total damage" still reaches a column
/// named "TotalDamage" or "damage".
fn lookup_values(ground_truth: &GroundTruth, label: &str) -> Vec<f64> {
    for candidate in label_candidates(label) {
        let values = ground_truth.values_for_label(&candidate);
        if !values.is_empty() {
            return values;
        }
    }
    Vec::new()
}

fn lookup_series(ground_truth: &GroundTruth, label: &str) -> Vec<f64> {
    for candidate in label_candidates(label) {
        let series = ground_truth.series_for_label(&candidate);
        if !series.is_empty() {
            return series;
        }
    }
    Vec::new()
}

fn label_candidates(label: &str) -> Vec<String> {
    let words: Vec<&str> = label.split_whitespace().collect();
    (0..words.len()).map(|i| words[i..].join(" ")).collect()
}

/// Classifies a series by its least-squares slope, scaled to the series
/// magnitude so absolute units do not matter.
fn classify_trend(series: &[f64], stable_threshold: f64) -> TrendDirection {
    let n = series.len() as f64;
    let mean_x = (n - 1.0) / 2.0;
    let mean_y: f64 = series.iter().sum::<f64>() / n;

    let mut num = 0.0;
    let mut den = 0.0;
    for (i, y) in series.iter().enumerate() {
        let dx = i as f64 - mean_x;
        num += dx * (y - mean_y);
        den += dx * dx;
    }
    let slope = if den == 0.0 { 0.0 } else { num / den };

    let scale = (series.iter().map(|y| y.abs()).sum::<f64>() / n).max(1.0);
    let relative = slope * (n - 1.0) / scale;

    if relative.abs() < stable_threshold {
        TrendDirection::Stable
    } else if relative > 0.0 {
        TrendDirection::Increasing
    } else {
        TrendDirection::Declining
    }
}

fn truncate(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let mut end = limit;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::groundtruth::{Column, ColumnType, ColumnValue, ResultSet, RetrievedRecord};
    use pretty_assertions::assert_eq;

    fn damage_ground_truth() -> GroundTruth {
        let result = ResultSet::new(vec![
            Column::new("Player", ColumnType::Text),
            Column::new("TotalDamage", ColumnType::Integer),
        ])
        .with_row(vec![
            ColumnValue::Text("Ana".to_string()),
            ColumnValue::Integer(114_622),
        ])
        .with_row(vec![
            ColumnValue::Text("Bo".to_string()),
            ColumnValue::Integer(98_410),
        ]);
        let mut gt = GroundTruth::new();
        gt.push(RetrievedRecord::succeeded(
            "q1",
            "damage totals",
            "SELECT ...",
            10.0,
            result,
        ));
        gt
    }

    fn gate() -> ValidationGate {
        ValidationGate::default()
    }

    #[test]
    fn test_numeric_within_tolerance_passes() {
        let gt = damage_ground_truth();
        // 120000 vs 114622 is about 4.7% off, inside the 5% tolerance.
        let verdict = gate().validate("Total Damage: 120000", &gt, &gt.known_entities());
        assert!(!verdict.tripwire(), "{:?}", verdict.discrepancies);
    }

    #[test]
    fn test_numeric_outside_tolerance_flagged() {
        let gt = damage_ground_truth();
        let verdict = gate().validate("Total Damage: 135000", &gt, &gt.known_entities());
        assert!(verdict.tripwire());
        assert_eq!(
            verdict.discrepancies[0].kind,
            DiscrepancyKind::NumericMismatch
        );
        assert_eq!(verdict.discrepancies[0].expected.as_deref(), Some("114622"));
    }

    #[test]
    fn test_unmatched_label_not_flagged() {
        let gt = damage_ground_truth();
        let verdict = gate().validate("Healing Done: 50000", &gt, &gt.known_entities());
        assert!(!verdict.tripwire());
    }

    #[test]
    fn test_fabricated_entity_reported_once() {
        let gt = damage_ground_truth();
        let verdict = gate().validate(
            "Cid dealt the most damage. Cid was unstoppable.",
            &gt,
            &gt.known_entities(),
        );
        let fabricated: Vec<_> = verdict
            .discrepancies
            .iter()
            .filter(|d| d.kind == DiscrepancyKind::FabricatedEntity)
            .collect();
        assert_eq!(fabricated.len(), 1);
        assert_eq!(fabricated[0].claim_text, "Cid");
    }

    #[test]
    fn test_known_entity_passes() {
        let gt = damage_ground_truth();
        let verdict = gate().validate("Ana led the match in damage.", &gt, &gt.known_entities());
        assert!(!verdict.tripwire());
    }

    #[test]
    fn test_entity_check_skipped_without_vocabulary() {
        let gt = GroundTruth::new();
        let verdict = gate().validate("Cid dealt heavy damage.", &gt, &BTreeSet::new());
        assert!(!verdict.tripwire());
    }

    #[test]
    fn test_proportion_sum_flagged() {
        let gt = GroundTruth::new();
        let text = "Ana took 40% of the damage, Bo took 35% of it, and the rest \
                    accounted for 20% of the total.";
        let verdict = gate().validate(text, &gt, &BTreeSet::new());
        assert!(verdict.tripwire());
        assert_eq!(
            verdict.discrepancies[0].kind,
            DiscrepancyKind::ProportionMismatch
        );
    }

    #[test]
    fn test_proportion_sum_within_tolerance_passes() {
        let gt = GroundTruth::new();
        let text = "Ana took 45% of the damage, Bo took 35% of it, and the rest \
                    accounted for 20% of the total.";
        let verdict = gate().validate(text, &gt, &BTreeSet::new());
        assert!(!verdict.tripwire(), "{:?}", verdict.discrepancies);
    }

    #[test]
    fn test_trend_mismatch_flagged() {
        let result = ResultSet::new(vec![Column::new("GoldPerMinute", ColumnType::Float)])
            .with_row(vec![ColumnValue::Float(402.0)])
            .with_row(vec![ColumnValue::Float(355.0)])
            .with_row(vec![ColumnValue::Float(310.0)]);
        let mut gt = GroundTruth::new();
        gt.push(RetrievedRecord::succeeded(
            "q2",
            "gold over time",
            "SELECT ...",
            8.0,
            result,
        ));

        let verdict = gate().validate(
            "gold per minute is increasing across the match",
            &gt,
            &BTreeSet::new(),
        );
        assert!(verdict.tripwire());
        assert_eq!(verdict.discrepancies[0].kind, DiscrepancyKind::TrendMismatch);
        assert_eq!(verdict.discrepancies[0].expected.as_deref(), Some("declining"));
    }

    #[test]
    fn test_trend_short_series_skipped() {
        let result = ResultSet::new(vec![Column::new("GoldPerMinute", ColumnType::Float)])
            .with_row(vec![ColumnValue::Float(402.0)])
            .with_row(vec![ColumnValue::Float(355.0)]);
        let mut gt = GroundTruth::new();
        gt.push(RetrievedRecord::succeeded(
            "q2",
            "gold over time",
            "SELECT ...",
            8.0,
            result,
        ));

        let verdict = gate().validate(
            "gold per minute is increasing across the match",
            &gt,
            &BTreeSet::new(),
        );
        assert!(!verdict.tripwire());
    }

    #[test]
    fn test_classify_trend_stable() {
        let series = vec![100.0, 100.4, 99.8, 100.1];
        assert_eq!(classify_trend(&series, 0.05), TrendDirection::Stable);
    }
}
