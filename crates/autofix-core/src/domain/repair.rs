//! Repair request and response types exchanged with the completion service.

use serde::{Deserialize, Serialize};

use super::artifact::SourceArtifact;
use super::error::{AutofixError, Result};

/// Instruction prefix sent ahead of the source text.
pub const DEFAULT_INSTRUCTION: &str = "Fix this Java code:";

/// Default completion model.
pub const DEFAULT_MODEL: &str = "text-davinci-003";

/// Default cap on generated tokens.
pub const DEFAULT_MAX_TOKENS: u32 = 300;

/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f32 = 0.2;

/// Generation parameters for one completion call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    /// Model identifier understood by the completion service.
    pub model: String,

    /// Maximum number of output tokens.
    pub max_tokens: u32,

    /// Randomness level; kept low so repairs are close to deterministic.
    pub temperature: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

impl GenerationParams {
    /// Reject parameters the completion service would refuse.
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(AutofixError::InvalidConfig(
                "model must not be empty".to_string(),
            ));
        }
        if self.max_tokens == 0 {
            return Err(AutofixError::InvalidConfig(
                "max_tokens must be positive".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(AutofixError::InvalidConfig(format!(
                "temperature {} outside [0, 2]",
                self.temperature
            )));
        }
        Ok(())
    }
}

/// Immutable request for one repair. Built once per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairRequest {
    pub instruction: String,
    pub source_text: String,
    pub params: GenerationParams,
}

impl RepairRequest {
    pub fn new(instruction: impl Into<String>, source_text: String, params: GenerationParams) -> Self {
        Self {
            instruction: instruction.into(),
            source_text,
            params,
        }
    }

    pub fn from_artifact(
        artifact: &SourceArtifact,
        instruction: impl Into<String>,
        params: GenerationParams,
    ) -> Self {
        Self::new(instruction, artifact.content.clone(), params)
    }

    /// Instruction and source joined by a newline.
    ///
    /// This is only ever placed into a structured payload field; it is never
    /// spliced into a request body as text.
    pub fn prompt(&self) -> String {
        format!("{}\n{}", self.instruction, self.source_text)
    }
}

/// Candidate text returned by the completion service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairResponse {
    /// Proposed replacement for the source file.
    pub candidate: String,

    /// Model that produced the candidate, when reported.
    pub model: Option<String>,

    /// Finish reason of the first choice, e.g. `stop` or `length`.
    pub finish_reason: Option<String>,
}

impl RepairResponse {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            model: None,
            finish_reason: None,
        }
    }

    /// Whether generation stopped at the token cap, i.e. the candidate is
    /// probably cut short.
    pub fn truncated(&self) -> bool {
        self.finish_reason.as_deref() == Some("length")
    }
}

/// Status of the repair exchange, as recorded in run reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Success,
    ServiceError,
    Malformed,
}

impl ResponseStatus {
    pub fn from_result(result: &Result<RepairResponse>) -> Self {
        match result {
            Ok(_) => ResponseStatus::Success,
            Err(AutofixError::MalformedResponse(_)) => ResponseStatus::Malformed,
            Err(_) => ResponseStatus::ServiceError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_joins_instruction_and_source() {
        let req = RepairRequest::new(
            DEFAULT_INSTRUCTION,
            "class Main {}".to_string(),
            GenerationParams::default(),
        );
        assert_eq!(req.prompt(), "Fix this Java code:\nclass Main {}");
    }

    #[test]
    fn test_default_params_are_valid() {
        let params = GenerationParams::default();
        assert_eq!(params.max_tokens, 300);
        assert!((params.temperature - 0.2).abs() < f32::EPSILON);
        params.validate().expect("defaults valid");
    }

    #[test]
    fn test_params_validation() {
        let zero = GenerationParams {
            max_tokens: 0,
            ..Default::default()
        };
        assert!(zero.validate().is_err());

        let hot = GenerationParams {
            temperature: 3.5,
            ..Default::default()
        };
        assert!(hot.validate().is_err());
    }

    #[test]
    fn test_response_status_from_result() {
        let ok: Result<RepairResponse> = Ok(RepairResponse::new("x"));
        assert_eq!(ResponseStatus::from_result(&ok), ResponseStatus::Success);

        let malformed: Result<RepairResponse> =
            Err(AutofixError::MalformedResponse("no choices".into()));
        assert_eq!(
            ResponseStatus::from_result(&malformed),
            ResponseStatus::Malformed
        );

        let auth: Result<RepairResponse> = Err(AutofixError::AuthError { status: 401 });
        assert_eq!(
            ResponseStatus::from_result(&auth),
            ResponseStatus::ServiceError
        );
    }

    #[test]
    fn test_truncated() {
        let mut resp = RepairResponse::new("class Main {");
        assert!(!resp.truncated());
        resp.finish_reason = Some("length".to_string());
        assert!(resp.truncated());
    }
}
