//! Trigger guard: a run only proceeds for pushes to the configured branch.

use serde::{Deserialize, Serialize};

/// Event name GitHub Actions reports for pushes.
pub const PUSH_EVENT: &str = "push";

/// Trigger information taken from the CI environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerContext {
    /// `GITHUB_EVENT_NAME`, e.g. `push` or `pull_request`.
    pub event_name: Option<String>,

    /// `GITHUB_REF`, e.g. `refs/heads/main`.
    pub git_ref: Option<String>,
}

/// Whether the pipeline should run for this trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum TriggerDecision {
    Run { branch: String },
    Ignore { reason: String },
}

impl TriggerContext {
    pub fn from_env() -> Self {
        Self {
            event_name: std::env::var("GITHUB_EVENT_NAME").ok(),
            git_ref: std::env::var("GITHUB_REF").ok(),
        }
    }

    /// Branch named by `git_ref`, if it points at a branch.
    pub fn branch(&self) -> Option<&str> {
        self.git_ref
            .as_deref()
            .and_then(|r| r.strip_prefix("refs/heads/"))
    }

    /// Decide whether to run for `expected_branch`.
    ///
    /// Environment values win; `local_branch` (the checked-out branch) is
    /// only consulted when no ref was provided.
    pub fn evaluate(&self, expected_branch: &str, local_branch: Option<&str>) -> TriggerDecision {
        if let Some(event) = self.event_name.as_deref() {
            if event != PUSH_EVENT {
                return TriggerDecision::Ignore {
                    reason: format!("event '{event}' is not a push"),
                };
            }
        }

        let branch = match (&self.git_ref, self.branch()) {
            (Some(_), Some(b)) => Some(b),
            (Some(r), None) => {
                return TriggerDecision::Ignore {
                    reason: format!("ref '{r}' is not a branch"),
                }
            }
            (None, _) => local_branch,
        };

        match branch {
            Some(b) if b == expected_branch => TriggerDecision::Run {
                branch: b.to_string(),
            },
            Some(b) => TriggerDecision::Ignore {
                reason: format!("branch '{b}' is not '{expected_branch}'"),
            },
            None => TriggerDecision::Ignore {
                reason: "could not determine the triggering branch".to_string(),
            },
        }
    }
}
