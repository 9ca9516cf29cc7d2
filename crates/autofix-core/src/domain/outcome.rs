//! Validation outcomes and the publish decision derived from them.

use serde::{Deserialize, Serialize};

/// Result of building and running a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationOutcome {
    Passed,
    BuildFailed,
    RuntimeFailed,
}

impl ValidationOutcome {
    pub fn passed(&self) -> bool {
        matches!(self, ValidationOutcome::Passed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationOutcome::Passed => "passed",
            ValidationOutcome::BuildFailed => "build_failed",
            ValidationOutcome::RuntimeFailed => "runtime_failed",
        }
    }
}

impl std::fmt::Display for ValidationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a run did not publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// Validation did not pass.
    ValidationFailed { outcome: ValidationOutcome },

    /// Candidate equals the original and the no-op short-circuit is on.
    Unchanged,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::ValidationFailed { outcome } => write!(f, "validation {outcome}"),
            SkipReason::Unchanged => f.write_str("candidate unchanged"),
        }
    }
}

/// Whether the validated candidate gets committed and pushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum PublishDecision {
    Publish,
    Skip(SkipReason),
}

impl PublishDecision {
    /// `Passed` publishes, everything else skips.
    pub fn from_outcome(outcome: ValidationOutcome) -> Self {
        if outcome.passed() {
            PublishDecision::Publish
        } else {
            PublishDecision::Skip(SkipReason::ValidationFailed { outcome })
        }
    }

    pub fn should_publish(&self) -> bool {
        matches!(self, PublishDecision::Publish)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_passed_publishes() {
        assert_eq!(
            PublishDecision::from_outcome(ValidationOutcome::Passed),
            PublishDecision::Publish
        );
        for outcome in [ValidationOutcome::BuildFailed, ValidationOutcome::RuntimeFailed] {
            let decision = PublishDecision::from_outcome(outcome);
            assert!(!decision.should_publish());
            assert_eq!(
                decision,
                PublishDecision::Skip(SkipReason::ValidationFailed { outcome })
            );
        }
    }

    #[test]
    fn test_outcome_serializes_snake_case() {
        let json = serde_json::to_string(&ValidationOutcome::BuildFailed).expect("serialize");
        assert_eq!(json, "\"build_failed\"");
    }

    #[test]
    fn test_skip_reason_display() {
        let reason = SkipReason::ValidationFailed {
            outcome: ValidationOutcome::RuntimeFailed,
        };
        assert_eq!(reason.to_string(), "validation runtime_failed");
        assert_eq!(SkipReason::Unchanged.to_string(), "candidate unchanged");
    }
}
