//! Run lifecycle: the pipeline state machine and its recorded history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{AutofixError, Result};
use super::outcome::ValidationOutcome;

/// Pipeline step in which a run failed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    Lock,
    Load,
    Request,
    Validate,
    Publish,
}

impl RunStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStage::Lock => "lock",
            RunStage::Load => "load",
            RunStage::Request => "request",
            RunStage::Validate => "validate",
            RunStage::Publish => "publish",
        }
    }
}

/// State of a single run.
///
/// `Idle → Loaded → Requested → Validated → Published | Skipped`, with
/// `Failed` reachable from every non-terminal state. There is no way back to
/// `Idle`; each trigger starts a fresh run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Loaded,
    Requested,
    Validated { outcome: ValidationOutcome },
    Published,
    Skipped,
    Failed { stage: RunStage },
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Published | RunState::Skipped | RunState::Failed { .. }
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::Loaded => "loaded",
            RunState::Requested => "requested",
            RunState::Validated { .. } => "validated",
            RunState::Published => "published",
            RunState::Skipped => "skipped",
            RunState::Failed { .. } => "failed",
        }
    }

    /// Whether `self → next` is an edge of the run state machine.
    pub fn can_transition_to(&self, next: &RunState) -> bool {
        use RunState::*;
        match (self, next) {
            (Idle, Loaded) | (Loaded, Requested) | (Requested, Validated { .. }) => true,
            (Validated { outcome }, Published) => outcome.passed(),
            (Validated { .. }, Skipped) => true,
            (from, Failed { .. }) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Validated { outcome } => write!(f, "validated({outcome})"),
            RunState::Failed { stage } => write!(f, "failed({})", stage.as_str()),
            other => f.write_str(other.name()),
        }
    }
}

/// One recorded state change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateTransition {
    pub from: RunState,
    pub to: RunState,
    pub at: DateTime<Utc>,
}

/// Tracks the current state of a run and every transition taken.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunLifecycle {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    state: RunState,
    history: Vec<StateTransition>,
}

impl RunLifecycle {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            state: RunState::Idle,
            history: Vec::new(),
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn history(&self) -> &[StateTransition] {
        &self.history
    }

    /// Move to `next`, rejecting edges the state machine does not have.
    pub fn advance(&mut self, next: RunState) -> Result<()> {
        if !self.state.can_transition_to(&next) {
            return Err(AutofixError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        let at = Utc::now();
        self.history.push(StateTransition {
            from: self.state,
            to: next,
            at,
        });
        self.state = next;
        if next.is_terminal() {
            self.finished_at = Some(at);
        }
        Ok(())
    }

    /// Record a failure in `stage`. A no-op once the run is terminal.
    pub fn fail(&mut self, stage: RunStage) {
        if !self.state.is_terminal() {
            // Failed is reachable from every non-terminal state.
            let _ = self.advance(RunState::Failed { stage });
        }
    }

    pub fn duration_ms(&self) -> u64 {
        let end = self.finished_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_milliseconds().max(0) as u64
    }
}

impl Default for RunLifecycle {
    fn default() -> Self {
        Self::new()
    }
}
