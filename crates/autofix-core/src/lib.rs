//! autofix core library
//!
//! Domain model, error taxonomy and ambient plumbing (git, tracing, reports)
//! shared by the repair pipeline and the `autofix` binary.

pub mod digest;
pub mod domain;
pub mod git;
pub mod obs;
pub mod reporting;
pub mod telemetry;
pub mod trigger;

pub use digest::ContentDigest;

pub use domain::{
    AutofixError, GenerationParams, PublishDecision, RepairRequest, RepairResponse,
    ResponseStatus, Result, RunLifecycle, RunStage, RunState, SkipReason, SourceArtifact,
    StateTransition, ValidationOutcome, DEFAULT_INSTRUCTION, DEFAULT_MAX_TOKENS, DEFAULT_MODEL,
    DEFAULT_TEMPERATURE,
};

pub use git::{capture_head_sha, current_branch, is_git_repo, repo_root};

pub use obs::{
    emit_candidate_received, emit_publish_decided, emit_run_error, emit_run_finished,
    emit_run_started, emit_stage_completed, emit_state_changed, emit_validation_finished,
    run_span,
};
pub use reporting::{
    append_run_summary_md, render_run_summary_md, tail_lines, write_run_report_json,
    ErrorReport, RunReport, StageReport, REPORT_SCHEMA_VERSION,
};
pub use telemetry::init_tracing;
pub use trigger::{TriggerContext, TriggerDecision};

/// autofix version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
