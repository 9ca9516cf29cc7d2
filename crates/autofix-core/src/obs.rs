//! Structured observability hooks for the run lifecycle.
//!
//! - `run_span` builds the run-scoped span so every log line carries `run_id`
//! - `emit_*` functions log the key lifecycle events at `info!`
//!
//! Candidate text is only ever logged at `debug!`; credentials never are.

use tracing::{debug, info, warn};

use crate::domain::{PublishDecision, RunState, ValidationOutcome};

/// Run-scoped span tagged with the run_id.
///
/// Attach it to the run's future with `tracing::Instrument` rather than
/// entering it, since the run awaits.
pub fn run_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("autofix.run", run_id = %run_id)
}

/// Emit event: run started for a source file.
pub fn emit_run_started(run_id: &str, source: &str, spec_digest: &str) {
    info!(event = "run.started", run_id = %run_id, source = %source, spec_digest = %spec_digest);
}

/// Emit event: run state changed.
pub fn emit_state_changed(from: &RunState, to: &RunState) {
    debug!(event = "run.state_changed", from = %from, to = %to);
}

/// Emit event: a completion candidate arrived.
pub fn emit_candidate_received(bytes: usize, truncated: bool, candidate: &str) {
    info!(event = "repair.candidate_received", bytes = bytes, truncated = truncated);
    if truncated {
        warn!(event = "repair.candidate_truncated", "candidate hit the max_tokens cap");
    }
    debug!(event = "repair.candidate", "\n{}", candidate);
}

/// Emit event: one toolchain stage finished.
pub fn emit_stage_completed(stage: &str, exit_code: i32, duration_ms: u64, success: bool) {
    info!(
        event = "stage.completed",
        stage = %stage,
        exit_code = exit_code,
        duration_ms = duration_ms,
        success = success,
    );
}

/// Emit event: validation finished, with whether the original was restored.
pub fn emit_validation_finished(outcome: ValidationOutcome, restored: bool) {
    if outcome.passed() {
        info!(event = "validation.finished", outcome = %outcome);
    } else {
        warn!(event = "validation.finished", outcome = %outcome, restored = restored);
    }
}

/// Emit event: the publish gate decided.
pub fn emit_publish_decided(decision: &PublishDecision) {
    match decision {
        PublishDecision::Publish => info!(event = "publish.decided", decision = "publish"),
        PublishDecision::Skip(reason) => {
            info!(event = "publish.decided", decision = "skip", reason = %reason)
        }
    }
}

/// Emit event: run finished in a terminal state.
pub fn emit_run_finished(run_id: &str, state: &RunState, duration_ms: u64) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        state = %state,
        duration_ms = duration_ms,
    );
}

/// Emit event: a pipeline step failed (warning level).
pub fn emit_run_error(run_id: &str, kind: &str, error: &dyn std::fmt::Display) {
    warn!(event = "run.error", run_id = %run_id, kind = %kind, error = %error);
}
