//! Publish gate: turns a validation outcome into a publish decision.

use autofix_core::{PublishDecision, SkipReason, ValidationOutcome};
use serde::{Deserialize, Serialize};

/// Policy knobs for the gate.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublishPolicy {
    /// Skip publishing when the candidate equals the original content.
    /// Off by default: every passing run commits, even when nothing changed.
    pub skip_unchanged: bool,
}

/// Gate evaluation verdict.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GateVerdict {
    pub decision: PublishDecision,

    /// Summary message.
    pub message: String,
}

impl GateVerdict {
    pub fn passed(&self) -> bool {
        self.decision.should_publish()
    }
}

/// Publish gate rules.
pub struct PublishGate;

impl PublishGate {
    /// Evaluate whether a validated candidate may be published.
    ///
    /// Gate rule:
    /// - Anything but `Passed` skips.
    /// - `Passed` publishes, unless the candidate is unchanged and the
    ///   policy asks for the no-op short-circuit.
    pub fn evaluate(
        outcome: ValidationOutcome,
        unchanged: bool,
        policy: &PublishPolicy,
    ) -> GateVerdict {
        let decision = match PublishDecision::from_outcome(outcome) {
            PublishDecision::Publish if unchanged && policy.skip_unchanged => {
                PublishDecision::Skip(SkipReason::Unchanged)
            }
            other => other,
        };

        let message = match decision {
            PublishDecision::Publish if unchanged => {
                "Candidate passed validation (content unchanged)".to_string()
            }
            PublishDecision::Publish => "Candidate passed validation".to_string(),
            PublishDecision::Skip(reason) => format!("Publish skipped: {}", reason),
        };

        GateVerdict { decision, message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passed_publishes() {
        let verdict = PublishGate::evaluate(ValidationOutcome::Passed, false, &PublishPolicy::default());
        assert!(verdict.passed());
        assert_eq!(verdict.decision, PublishDecision::Publish);
    }

    #[test]
    fn test_failures_skip() {
        for outcome in [ValidationOutcome::BuildFailed, ValidationOutcome::RuntimeFailed] {
            let verdict = PublishGate::evaluate(outcome, false, &PublishPolicy::default());
            assert!(!verdict.passed());
            assert!(verdict.message.contains(outcome.as_str()));
        }
    }

    #[test]
    fn test_unchanged_publishes_by_default() {
        let verdict = PublishGate::evaluate(ValidationOutcome::Passed, true, &PublishPolicy::default());
        assert!(verdict.passed());
        assert!(verdict.message.contains("unchanged"));
    }

    #[test]
    fn test_unchanged_short_circuit() {
        let policy = PublishPolicy {
            skip_unchanged: true,
        };
        let verdict = PublishGate::evaluate(ValidationOutcome::Passed, true, &policy);
        assert_eq!(verdict.decision, PublishDecision::Skip(SkipReason::Unchanged));

        // The short-circuit never turns a failure into anything else.
        let verdict = PublishGate::evaluate(ValidationOutcome::BuildFailed, true, &policy);
        assert_eq!(
            verdict.decision,
            PublishDecision::Skip(SkipReason::ValidationFailed {
                outcome: ValidationOutcome::BuildFailed
            })
        );
    }
}
