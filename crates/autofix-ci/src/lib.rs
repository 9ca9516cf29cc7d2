//! autofix CI - the repair pipeline stages
//!
//! Provides a pipeline that:
//! - Loads the designated source file
//! - Asks a completion service for a fixed version
//! - Builds and runs the candidate, restoring the original on failure
//! - Commits and pushes only candidates that passed

pub mod fakes;
pub mod gate;
pub mod loader;
pub mod lock;
pub mod pipeline;
pub mod publisher;
pub mod requester;
pub mod runner;
pub mod spec;
pub mod stage;
pub mod validator;

// Re-export key types
pub use gate::{GateVerdict, PublishGate, PublishPolicy};
pub use loader::SourceLoader;
pub use lock::RunLock;
pub use pipeline::{PipelineResult, RepairPipeline};
pub use publisher::{
    BotIdentity, GitPublisher, PublishConfig, PublishReceipt, Publisher, DEFAULT_BOT_EMAIL,
    DEFAULT_BOT_NAME, DEFAULT_COMMIT_MESSAGE,
};
pub use requester::{
    normalize_candidate, ApiKey, CompletionApi, CompletionClient, CompletionConfig,
    HttpCompletionClient,
};
pub use runner::{CiRunner, StageResult};
pub use spec::RepairSpec;
pub use stage::{BuiltinToolchain, StageConfig, StageKind, ToolchainConfig};
pub use validator::{BackupGuard, ValidationReport, Validator};
