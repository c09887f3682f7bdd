//! Attempt tracking: retry with amended guidance, then fallback.
//!
//! Each stage invocation gets a fresh tracker. A failed validation leads
//! to a bounded number of retries whose guidance itemizes the exact
//! discrepancies found; identical outputs across attempts short-circuit
//! to fallback, since repeating the same guidance cannot change them.

use crate::gate::Verdict;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

/// Retry limits for one stage invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Re-invocations allowed after the first attempt.
    pub max_retries: u32,
    /// Identical consecutive outputs tolerated before falling back.
    pub stagnation_limit: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            stagnation_limit: 2,
        }
    }
}

/// Where a tracked attempt sequence currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptState {
    /// An attempt is in flight.
    Attempting,
    /// The output passed the gate.
    Succeeded,
    /// The last output failed and a retry was issued.
    Retrying,
    /// Retries were exhausted and a fallback was substituted.
    FallbackEmitted,
    /// The attempt sequence was abandoned.
    Aborted,
}

/// What the controller decided after an attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptDecision {
    /// Accept the output as-is.
    Accept,
    /// Re-invoke the stage with amended guidance.
    Retry {
        /// Base guidance plus the itemized discrepancies to fix.
        amended_guidance: String,
    },
    /// Substitute the stage's conservative fallback output.
    Fallback,
}

/// Tracks one stage invocation's attempt sequence.
#[derive(Debug)]
pub struct AttemptTracker {
    stage: String,
    policy: RetryPolicy,
    retry_count: u32,
    state: AttemptState,
    last_hash: Option<String>,
    stagnant_hits: u32,
}

impl AttemptTracker {
    /// Creates a tracker for one stage invocation.
    #[must_use]
    pub fn new(stage: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            stage: stage.into(),
            policy,
            retry_count: 0,
            state: AttemptState::Attempting,
            last_hash: None,
            stagnant_hits: 0,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> AttemptState {
        self.state
    }

    /// Retries issued so far.
    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Decides what to do after a validated attempt.
    pub fn decide(
        &mut self,
        base_guidance: &str,
        output_text: &str,
        verdict: &Verdict,
    ) -> AttemptDecision {
        let hash = hash_output(output_text);
        if self.last_hash.as_deref() == Some(hash.as_str()) {
            self.stagnant_hits += 1;
        } else {
            self.stagnant_hits = 0;
        }
        self.last_hash = Some(hash);

        if !verdict.tripwire() {
            self.state = AttemptState::Succeeded;
            return AttemptDecision::Accept;
        }

        if self.stagnant_hits >= self.policy.stagnation_limit {
            warn!(
                stage = %self.stage,
                stagnant_hits = self.stagnant_hits,
                "output unchanged across retries, falling back"
            );
            self.state = AttemptState::FallbackEmitted;
            return AttemptDecision::Fallback;
        }

        if self.retry_count < self.policy.max_retries {
            self.retry_count += 1;
            self.state = AttemptState::Retrying;
            info!(
                stage = %self.stage,
                retry = self.retry_count,
                discrepancies = verdict.discrepancies.len(),
                "retrying with amended guidance"
            );
            return AttemptDecision::Retry {
                amended_guidance: amend_guidance(base_guidance, verdict),
            };
        }

        warn!(stage = %self.stage, "retries exhausted, falling back");
        self.state = AttemptState::FallbackEmitted;
        AttemptDecision::Fallback
    }

    /// Decides what to do after an attempt that errored before producing
    /// validatable output. Errors count against the same retry budget.
    pub fn note_failure(&mut self, base_guidance: &str) -> AttemptDecision {
        if self.retry_count < self.policy.max_retries {
            self.retry_count += 1;
            self.state = AttemptState::Retrying;
            return AttemptDecision::Retry {
                amended_guidance: base_guidance.to_string(),
            };
        }
        self.state = AttemptState::FallbackEmitted;
        AttemptDecision::Fallback
    }

    /// Marks the sequence abandoned.
    pub fn abort(&mut self) {
        self.state = AttemptState::Aborted;
    }
}

/// Appends the itemized discrepancies to the base guidance.
fn amend_guidance(base_guidance: &str, verdict: &Verdict) -> String {
    format!(
        "{base_guidance}\n\nThe previous attempt contained the following \
         discrepancies against the retrieved data. Correct each one and \
         state nothing that the data does not support:\n{}",
        verdict.itemize()
    )
}

/// Content hash used for stagnation detection.
#[must_use]
pub fn hash_output(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::{Discrepancy, DiscrepancyKind};
    use pretty_assertions::assert_eq;

    fn tripping_verdict() -> Verdict {
        Verdict::from_discrepancies(vec![Discrepancy::new(
            DiscrepancyKind::FabricatedEntity,
            "entity 'Cid' does not appear in any retrieved result",
            "Cid",
        )])
    }

    #[test]
    fn test_clean_verdict_accepts() {
        let mut tracker = AttemptTracker::new("compose", RetryPolicy::default());
        let decision = tracker.decide("base", "output", &Verdict::clean());
        assert_eq!(decision, AttemptDecision::Accept);
        assert_eq!(tracker.state(), AttemptState::Succeeded);
    }

    #[test]
    fn test_retry_then_fallback_sequence() {
        let mut tracker = AttemptTracker::new("compose", RetryPolicy::default());
        let verdict = tripping_verdict();

        // Attempt 1 trips: first retry, guidance itemizes the discrepancy.
        match tracker.decide("base", "output one", &verdict) {
            AttemptDecision::Retry { amended_guidance } => {
                assert!(amended_guidance.starts_with("base"));
                assert!(amended_guidance.contains("1. [fabricated_entity]"));
            }
            other => panic!("expected retry, got {other:?}"),
        }

        // Attempt 2 trips: second and last retry.
        assert!(matches!(
            tracker.decide("base", "output two", &verdict),
            AttemptDecision::Retry { .. }
        ));

        // Attempt 3 trips: budget exhausted.
        assert_eq!(
            tracker.decide("base", "output three", &verdict),
            AttemptDecision::Fallback
        );
        assert_eq!(tracker.state(), AttemptState::FallbackEmitted);
    }

    #[test]
    fn test_stagnant_output_short_circuits() {
        let policy = RetryPolicy {
            max_retries: 5,
            stagnation_limit: 2,
        };
        let mut tracker = AttemptTracker::new("analyze", policy);
        let verdict = tripping_verdict();

        assert!(matches!(
            tracker.decide("base", "same output", &verdict),
            AttemptDecision::Retry { .. }
        ));
        assert!(matches!(
            tracker.decide("base", "same output", &verdict),
            AttemptDecision::Retry { .. }
        ));
        // Third identical output: retries remain, but nothing is changing.
        assert_eq!(
            tracker.decide("base", "same output", &verdict),
            AttemptDecision::Fallback
        );
    }

    #[test]
    fn test_error_attempts_share_the_budget() {
        let mut tracker = AttemptTracker::new("plan", RetryPolicy::default());
        assert!(matches!(
            tracker.note_failure("base"),
            AttemptDecision::Retry { .. }
        ));
        assert!(matches!(
            tracker.note_failure("base"),
            AttemptDecision::Retry { .. }
        ));
        assert_eq!(tracker.note_failure("base"), AttemptDecision::Fallback);
    }

    #[test]
    fn test_hash_is_stable() {
        assert_eq!(hash_output("abc"), hash_output("abc"));
        assert_ne!(hash_output("abc"), hash_output("abd"));
    }
}
