//! Repair specification and identity.

use std::path::PathBuf;

use autofix_core::{ContentDigest, GenerationParams, Result, DEFAULT_INSTRUCTION};
use serde::{Deserialize, Serialize};

use crate::gate::PublishPolicy;
use crate::stage::ToolchainConfig;

/// Everything that determines what a run does, apart from the source
/// content and the secret.
///
/// Two runs with the same spec differ only in the file they start from and
/// what the service answers; the digest names that configuration in logs
/// and reports.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RepairSpec {
    /// File under repair.
    pub source: PathBuf,

    /// Text placed before the source in the prompt.
    pub instruction: String,

    pub params: GenerationParams,

    pub toolchain: ToolchainConfig,

    pub policy: PublishPolicy,

    /// Leave a failed candidate on disk instead of restoring the original.
    pub keep_failed_candidate: bool,
}

impl RepairSpec {
    /// Spec with the default instruction, generation parameters and Java
    /// toolchain.
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            instruction: DEFAULT_INSTRUCTION.to_string(),
            params: GenerationParams::default(),
            toolchain: ToolchainConfig::default(),
            policy: PublishPolicy::default(),
            keep_failed_candidate: false,
        }
    }

    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = instruction.into();
        self
    }

    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_toolchain(mut self, toolchain: ToolchainConfig) -> Self {
        self.toolchain = toolchain;
        self
    }

    pub fn with_policy(mut self, policy: PublishPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn keep_failed_candidate(mut self, keep: bool) -> Self {
        self.keep_failed_candidate = keep;
        self
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.params.validate()
    }

    /// Deterministic digest of the run configuration.
    ///
    /// Parts are hashed in a fixed order; the toolchain contributes its
    /// command lines, so changing a timeout alone keeps the digest.
    pub fn digest(&self) -> ContentDigest {
        let mut parts = vec![
            self.source.to_string_lossy().into_owned(),
            self.instruction.clone(),
            self.params.model.clone(),
            self.params.max_tokens.to_string(),
            format!("{:.3}", self.params.temperature),
        ];
        parts.extend(self.toolchain.command_lines());
        parts.push(format!("skip_unchanged={}", self.policy.skip_unchanged));
        ContentDigest::from_parts(parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::BuiltinToolchain;

    #[test]
    fn test_repair_spec_defaults() {
        let spec = RepairSpec::new("src/Main.java");
        assert_eq!(spec.source, PathBuf::from("src/Main.java"));
        assert_eq!(spec.instruction, "Fix this Java code:");
        assert_eq!(spec.params.max_tokens, 300);
        assert!(!spec.policy.skip_unchanged);
        assert!(!spec.keep_failed_candidate);
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_digest_deterministic() {
        let a = RepairSpec::new("Main.java");
        let b = RepairSpec::new("Main.java");
        assert_eq!(a.digest(), b.digest());
        assert_eq!(a.digest().as_str().len(), 64);
    }

    #[test]
    fn test_digest_tracks_configuration() {
        let base = RepairSpec::new("Main.java");
        let other_file = RepairSpec::new("Other.java");
        let other_prompt = RepairSpec::new("Main.java").with_instruction("Fix this:");
        let other_toolchain = RepairSpec::new("Main.java")
            .with_toolchain(ToolchainConfig::from_builtin(BuiltinToolchain::Python));
        let skip = RepairSpec::new("Main.java").with_policy(PublishPolicy {
            skip_unchanged: true,
        });

        for other in [other_file, other_prompt, other_toolchain, skip] {
            assert_ne!(base.digest(), other.digest());
        }
    }

    #[test]
    fn test_invalid_params_rejected() {
        let params = GenerationParams {
            max_tokens: 0,
            ..Default::default()
        };
        assert!(RepairSpec::new("Main.java").with_params(params).validate().is_err());
    }
}
