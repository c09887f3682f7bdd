//! Pattern-based claim extraction.
//!
//! Extraction is best-effort and conservative: missed claims are tolerated,
//! false positives are minimized by requiring label context for numeric
//! claims and verb context for entity candidates. Pure function of the
//! input text and entity vocabulary; deterministic and restartable.

use super::{Claim, ClaimKind, Span, TrendDirection};
use regex::Regex;
use std::collections::BTreeSet;

const NUMBER: &str = r"\d{1,3}(?:,\d{3})+|\d+(?:\.\d+)?";

/// Words that mark a percentage as a change rather than a share.
const DELTA_WORDS: &[&str] = &[
    "increased",
    "decreased",
    "declined",
    "grew",
    "rose",
    "fell",
    "dropped",
    "up",
    "down",
    "higher",
    "lower",
    "more",
    "less",
];

/// Extracts typed claims from free-form stage output.
#[derive(Debug)]
pub struct ClaimExtractor {
    labeled_colon: Regex,
    labeled_of: Regex,
    verb_numeric: Regex,
    percentage: Regex,
    trend: Regex,
    entity_candidate: Regex,
}

impl ClaimExtractor {
    /// Creates an extractor with the default conservative patterns.
    #[must_use]
    pub fn new() -> Self {
        Self {
            // "Total Damage: 120,000"
            labeled_colon: compile(&format!(
                r"(?i)\b([a-z][\w]*(?: [a-z][\w]*){{0,2}})\s*:\s*({NUMBER})(\s*%|\s*percent\b)?"
            )),
            // "damage of 114,622"
            labeled_of: compile(&format!(
                r"(?i)\b([a-z][\w]*(?: [a-z][\w]*){{0,2}})\s+of\s+({NUMBER})(\s*%|\s*percent\b)?"
            )),
            // "dealt 114,622 damage"
            verb_numeric: compile(&format!(
                r"(?i)\b(?:dealt|took|earned|recorded|totaled|totalled)\s+({NUMBER})(\s*%|\s*percent\b)?(?:\s+([a-z][\w]*))?"
            )),
            // "45%" / "45 percent"
            percentage: compile(r"(\d{1,3}(?:\.\d+)?)\s*(?:%|percent\b)"),
            // "gold per minute is increasing by 12%"
            trend: compile(
                r"(?i)\b([a-z][\w]*(?: [a-z][\w]*){0,2})\s+(?:is|are|was|were|has been|have been|remains|remained)\s+(increasing|rising|growing|climbing|increased|declining|decreasing|falling|dropping|decreased|stable|steady|flat|unchanged)\b(?:\s+by\s+(\d+(?:\.\d+)?)\s*%)?",
            ),
            // Capitalized token in verb context, per the conservative rule:
            // a bare capitalized word is not evidence of an entity claim.
            entity_candidate: compile(
                r"\b([A-Z][a-z]{2,})\s+(?:dealt|scored|healed|had|was|did|led|finished|topped|recorded|contributed|killed|died)\b",
            ),
        }
    }

    /// Extracts all claims of the requested kinds from `text`.
    ///
    /// `vocabulary` is the caller-supplied known-entity set; vocabulary
    /// mentions are always reported as entity claims so the gate can
    /// confirm them, and capitalized tokens in verb context are reported
    /// as candidates for the closed-world check.
    #[must_use]
    pub fn extract(
        &self,
        text: &str,
        kinds: &[ClaimKind],
        vocabulary: &BTreeSet<String>,
    ) -> Vec<Claim> {
        let mut claims = Vec::new();

        if kinds.contains(&ClaimKind::Entity) {
            self.extract_entities(text, vocabulary, &mut claims);
        }
        if kinds.contains(&ClaimKind::Numeric) {
            self.extract_numeric(text, &mut claims);
        }
        if kinds.contains(&ClaimKind::Percentage) {
            self.extract_percentages(text, &mut claims);
        }
        if kinds.contains(&ClaimKind::Trend) {
            self.extract_trends(text, &mut claims);
        }

        claims.sort_by_key(|c| c.span().start);
        claims
    }

    fn extract_entities(
        &self,
        text: &str,
        vocabulary: &BTreeSet<String>,
        claims: &mut Vec<Claim>,
    ) {
        let mut seen: BTreeSet<(usize, usize)> = BTreeSet::new();

        for name in vocabulary {
            if name.is_empty() {
                continue;
            }
            let pattern = compile(&format!(r"(?i)\b{}\b", regex::escape(name)));
            for m in pattern.find_iter(text) {
                if seen.insert((m.start(), m.end())) {
                    claims.push(Claim::Entity {
                        name: m.as_str().to_string(),
                        span: Span::new(m.start(), m.end()),
                    });
                }
            }
        }

        for caps in self.entity_candidate.captures_iter(text) {
            if let Some(m) = caps.get(1) {
                if seen.insert((m.start(), m.end())) {
                    claims.push(Claim::Entity {
                        name: m.as_str().to_string(),
                        span: Span::new(m.start(), m.end()),
                    });
                }
            }
        }
    }

    fn extract_numeric(&self, text: &str, claims: &mut Vec<Claim>) {
        for caps in self.labeled_colon.captures_iter(text) {
            // A percent suffix means this is a percentage, not a quantity.
            if caps.get(3).is_some() {
                continue;
            }
            if let (Some(label), Some(value), Some(whole)) =
                (caps.get(1), caps.get(2), caps.get(0))
            {
                if let Some(value) = parse_number(value.as_str()) {
                    claims.push(Claim::Numeric {
                        label: label.as_str().to_string(),
                        value,
                        span: Span::new(whole.start(), whole.end()),
                    });
                }
            }
        }

        for caps in self.labeled_of.captures_iter(text) {
            if caps.get(3).is_some() {
                continue;
            }
            if let (Some(label), Some(value), Some(whole)) =
                (caps.get(1), caps.get(2), caps.get(0))
            {
                if let Some(value) = parse_number(value.as_str()) {
                    claims.push(Claim::Numeric {
                        label: label.as_str().to_string(),
                        value,
                        span: Span::new(whole.start(), whole.end()),
                    });
                }
            }
        }

        for caps in self.verb_numeric.captures_iter(text) {
            if caps.get(2).is_some() {
                continue;
            }
            // No trailing label word means no label context: skip.
            let Some(label) = caps.get(3) else { continue };
            if let (Some(value), Some(whole)) = (caps.get(1), caps.get(0)) {
                if let Some(value) = parse_number(value.as_str()) {
                    claims.push(Claim::Numeric {
                        label: label.as_str().to_string(),
                        value,
                        span: Span::new(whole.start(), whole.end()),
                    });
                }
            }
        }
    }

    fn extract_percentages(&self, text: &str, claims: &mut Vec<Claim>) {
        for caps in self.percentage.captures_iter(text) {
            let (Some(value), Some(whole)) = (caps.get(1), caps.get(0)) else {
                continue;
            };
            let Some(value) = parse_number(value.as_str()) else {
                continue;
            };
            claims.push(Claim::Percentage {
                value,
                is_delta: has_delta_context(text, whole.start()),
                is_share: has_share_context(text, whole.end()),
                span: Span::new(whole.start(), whole.end()),
            });
        }
    }

    fn extract_trends(&self, text: &str, claims: &mut Vec<Claim>) {
        for caps in self.trend.captures_iter(text) {
            let (Some(label), Some(word), Some(whole)) =
                (caps.get(1), caps.get(2), caps.get(0))
            else {
                continue;
            };
            let Some(direction) = classify_direction(word.as_str()) else {
                continue;
            };
            let magnitude_pct = caps.get(3).and_then(|m| parse_number(m.as_str()));
            claims.push(Claim::Trend {
                label: label.as_str().to_string(),
                direction,
                magnitude_pct,
                span: Span::new(whole.start(), whole.end()),
            });
        }
    }
}

impl Default for ClaimExtractor {
    fn default() -> Self {
        Self::new()
    }
}

// Patterns are fixed or built from escaped input; compilation cannot
// fail for any reachable value.
#[allow(clippy::expect_used)]
fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("claim pattern is valid")
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.replace(',', "").parse::<f64>().ok()
}

fn classify_direction(word: &str) -> Option<TrendDirection> {
    match word.to_ascii_lowercase().as_str() {
        "increasing" | "rising" | "growing" | "climbing" | "increased" => {
            Some(TrendDirection::Increasing)
        }
        "declining" | "decreasing" | "falling" | "dropping" | "decreased" => {
            Some(TrendDirection::Declining)
        }
        "stable" | "steady" | "flat" | "unchanged" => Some(TrendDirection::Stable),
        _ => None,
    }
}

fn has_delta_context(text: &str, start: usize) -> bool {
    let window_start = start.saturating_sub(32);
    let window = &text[floor_char_boundary(text, window_start)..start];
    window.split_whitespace().rev().take(4).any(|w| {
        let w = w
            .trim_matches(|c: char| !c.is_alphanumeric())
            .to_ascii_lowercase();
        DELTA_WORDS.contains(&w.as_str())
    })
}

fn has_share_context(text: &str, end: usize) -> bool {
    let window_end = (end + 24).min(text.len());
    let window = &text[end..ceil_char_boundary(text, window_end)];
    window.trim_start().to_ascii_lowercase().starts_with("of ")
}

fn floor_char_boundary(text: &str, mut idx: usize) -> usize {
    while idx > 0 && !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_char_boundary(text: &str, mut idx: usize) -> usize {
    while idx < text.len() && !text.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}
