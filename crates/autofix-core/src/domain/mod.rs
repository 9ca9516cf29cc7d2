//! Domain models for autofix.
//!
//! Canonical definitions for the core entities:
//! - `SourceArtifact`: The file under repair
//! - `RepairRequest` / `RepairResponse`: The completion exchange
//! - `ValidationOutcome` / `PublishDecision`: What validation concluded
//! - `RunLifecycle`: The run state machine

pub mod artifact;
pub mod error;
pub mod outcome;
pub mod repair;
pub mod run;

// Re-export main types and errors
pub use artifact::SourceArtifact;
pub use error::{AutofixError, Result};
pub use outcome::{PublishDecision, SkipReason, ValidationOutcome};
pub use repair::{
    GenerationParams, RepairRequest, RepairResponse, ResponseStatus, DEFAULT_INSTRUCTION,
    DEFAULT_MAX_TOKENS, DEFAULT_MODEL, DEFAULT_TEMPERATURE,
};
pub use run::{RunLifecycle, RunStage, RunState, StateTransition};
