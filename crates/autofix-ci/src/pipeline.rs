//! Repair pipeline orchestration and run recording.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use autofix_core::{
    emit_candidate_received, emit_publish_decided, emit_run_error, emit_run_finished,
    emit_run_started, emit_state_changed, run_span, AutofixError, ContentDigest, ErrorReport,
    PublishDecision, RepairRequest, ResponseStatus, RunLifecycle, RunReport, RunStage, RunState,
    SkipReason, ValidationOutcome, REPORT_SCHEMA_VERSION,
};
use chrono::Utc;
use tracing::{info, warn, Instrument};

use crate::gate::{GateVerdict, PublishGate};
use crate::loader::SourceLoader;
use crate::lock::RunLock;
use crate::publisher::{PublishReceipt, Publisher};
use crate::requester::CompletionClient;
use crate::runner::StageResult;
use crate::spec::RepairSpec;
use crate::validator::{ValidationReport, Validator};

/// Result of one pipeline run. Produced for failed runs too.
#[derive(Debug)]
pub struct PipelineResult {
    pub lifecycle: RunLifecycle,

    /// File under repair.
    pub source: PathBuf,

    /// Digest of the repair specification.
    pub spec_digest: ContentDigest,

    pub original_digest: Option<ContentDigest>,
    pub candidate_digest: Option<ContentDigest>,
    pub response_status: Option<ResponseStatus>,
    pub validation: Option<ValidationReport>,
    pub verdict: Option<GateVerdict>,
    pub receipt: Option<PublishReceipt>,

    /// Error that ended the run, if any.
    pub error: Option<AutofixError>,
}

impl PipelineResult {
    fn new(source: PathBuf, spec_digest: ContentDigest) -> Self {
        Self {
            lifecycle: RunLifecycle::new(),
            source,
            spec_digest,
            original_digest: None,
            candidate_digest: None,
            response_status: None,
            validation: None,
            verdict: None,
            receipt: None,
            error: None,
        }
    }

    /// Result for a run that could not get going, such as one whose
    /// completion client failed to build. Ends in `Failed{stage}` so reports
    /// are written as for any other failed run.
    pub fn aborted(spec: &RepairSpec, stage: RunStage, error: AutofixError) -> Self {
        let mut result = Self::new(spec.source.clone(), spec.digest());
        result.record_failure(StageFailure { stage, error });
        emit_run_finished(&result.run_id(), &result.state(), result.duration_ms());
        result
    }

    fn record_failure(&mut self, failure: StageFailure) {
        let from = self.state();
        self.lifecycle.fail(failure.stage);
        emit_state_changed(&from, &self.state());
        emit_run_error(&self.run_id(), failure.error.kind(), &failure.error);
        self.error = Some(failure.error);
    }

    pub fn run_id(&self) -> String {
        self.lifecycle.run_id.to_string()
    }

    pub fn state(&self) -> RunState {
        self.lifecycle.state()
    }

    pub fn outcome(&self) -> Option<ValidationOutcome> {
        self.validation.as_ref().map(|v| v.outcome)
    }

    pub fn decision(&self) -> Option<PublishDecision> {
        self.verdict.as_ref().map(|v| v.decision)
    }

    pub fn stages(&self) -> &[StageResult] {
        self.validation
            .as_ref()
            .map(|v| v.stages.as_slice())
            .unwrap_or_default()
    }

    /// Published, or deliberately skipped because nothing changed.
    pub fn success(&self) -> bool {
        match self.state() {
            RunState::Published => true,
            RunState::Skipped => self.decision() == Some(PublishDecision::Skip(SkipReason::Unchanged)),
            _ => false,
        }
    }

    /// Number of stages that passed.
    pub fn passed_count(&self) -> usize {
        self.stages().iter().filter(|s| s.passed()).count()
    }

    /// Number of stages that failed.
    pub fn failed_count(&self) -> usize {
        self.stages().iter().filter(|s| !s.passed()).count()
    }

    pub fn duration_ms(&self) -> u64 {
        self.lifecycle.duration_ms()
    }

    /// Canonical report artifact for this run.
    pub fn to_report(&self) -> RunReport {
        RunReport {
            schema_version: REPORT_SCHEMA_VERSION.to_string(),
            run_id: self.lifecycle.run_id,
            generated_at: Utc::now(),
            source: self.source.to_string_lossy().into_owned(),
            spec_digest: self.spec_digest.to_string(),
            original_digest: self.original_digest.as_ref().map(ToString::to_string),
            candidate_digest: self.candidate_digest.as_ref().map(ToString::to_string),
            final_state: self.state(),
            history: self.lifecycle.history().to_vec(),
            response_status: self.response_status,
            outcome: self.outcome(),
            stages: self
                .validation
                .as_ref()
                .map(ValidationReport::stage_reports)
                .unwrap_or_default(),
            decision: self.decision(),
            restored: self.validation.as_ref().is_some_and(|v| v.restored),
            commit_sha: self.receipt.as_ref().map(|r| r.commit_sha.clone()),
            error: self.error.as_ref().map(|e| ErrorReport {
                kind: e.kind().to_string(),
                message: e.to_string(),
            }),
            duration_ms: self.duration_ms(),
        }
    }
}

/// Error together with the stage it ended the run in.
struct StageFailure {
    stage: RunStage,
    error: AutofixError,
}

impl StageFailure {
    fn at(stage: RunStage) -> impl FnOnce(AutofixError) -> StageFailure {
        move |error| StageFailure { stage, error }
    }
}

/// Repair pipeline: lock, load, request, validate, gate, publish.
pub struct RepairPipeline {
    client: Arc<dyn CompletionClient>,
    publisher: Arc<dyn Publisher>,
    lock_path: Option<PathBuf>,
    lock_wait: Duration,
}

impl RepairPipeline {
    pub fn new(client: Arc<dyn CompletionClient>, publisher: Arc<dyn Publisher>) -> Self {
        Self {
            client,
            publisher,
            lock_path: None,
            lock_wait: Duration::ZERO,
        }
    }

    /// Hold the run lock at `path` for the whole run.
    pub fn with_lock(mut self, path: impl Into<PathBuf>) -> Self {
        self.lock_path = Some(path.into());
        self
    }

    /// How long to wait for a held lock before failing with `LockHeld`.
    pub fn with_lock_wait(mut self, wait: Duration) -> Self {
        self.lock_wait = wait;
        self
    }

    /// Execute one run.
    ///
    /// Never returns early with an error: failures end the run in
    /// `Failed{stage}` and are carried in the result so the caller can still
    /// write reports. Load and request failures leave the working tree
    /// untouched; the publisher is only called for a `Publish` decision.
    pub async fn run(&self, spec: &RepairSpec) -> PipelineResult {
        let result = PipelineResult::new(spec.source.clone(), spec.digest());
        let span = run_span(&result.run_id());
        self.run_recorded(spec, result).instrument(span).await
    }

    async fn run_recorded(&self, spec: &RepairSpec, mut result: PipelineResult) -> PipelineResult {
        let run_id = result.run_id();
        emit_run_started(
            &run_id,
            &spec.source.to_string_lossy(),
            result.spec_digest.short(),
        );

        if let Err(failure) = self.execute(spec, &mut result).await {
            result.record_failure(failure);
        }

        emit_run_finished(&run_id, &result.state(), result.duration_ms());
        result
    }

    async fn execute(
        &self,
        spec: &RepairSpec,
        result: &mut PipelineResult,
    ) -> std::result::Result<(), StageFailure> {
        let _lock = match &self.lock_path {
            Some(path) => Some(
                RunLock::acquire(path, self.lock_wait)
                    .await
                    .map_err(StageFailure::at(RunStage::Lock))?,
            ),
            None => None,
        };

        // Load
        let artifact = SourceLoader::load(&spec.source)
            .await
            .map_err(StageFailure::at(RunStage::Load))?;
        result.original_digest = Some(artifact.digest.clone());
        transition(result, RunState::Loaded, RunStage::Load)?;

        // Request
        spec.validate().map_err(StageFailure::at(RunStage::Request))?;
        let request = RepairRequest::from_artifact(&artifact, &spec.instruction, spec.params.clone());
        let response = self.client.complete(&request).await;
        result.response_status = Some(ResponseStatus::from_result(&response));
        let response = response.map_err(StageFailure::at(RunStage::Request))?;

        let truncated = response.truncated();
        let candidate = response.candidate;
        emit_candidate_received(candidate.len(), truncated, &candidate);
        if truncated {
            warn!(
                max_tokens = spec.params.max_tokens,
                "Candidate hit the token limit and may be incomplete"
            );
        }
        result.candidate_digest = Some(ContentDigest::from_bytes(candidate.as_bytes()));
        transition(result, RunState::Requested, RunStage::Request)?;

        // Validate
        let unchanged = artifact.same_content(&candidate);
        let validator = Validator::new(spec.toolchain.clone())
            .keep_failed_candidate(spec.keep_failed_candidate);
        let report = validator
            .validate(&spec.source, &candidate)
            .await
            .map_err(StageFailure::at(RunStage::Validate))?;
        let outcome = report.outcome;
        result.validation = Some(report);
        transition(result, RunState::Validated { outcome }, RunStage::Validate)?;

        // Gate
        let verdict = PublishGate::evaluate(outcome, unchanged, &spec.policy);
        emit_publish_decided(&verdict.decision);
        info!("{}", verdict.message);
        let publish = verdict.passed();
        result.verdict = Some(verdict);

        if !publish {
            return transition(result, RunState::Skipped, RunStage::Publish);
        }

        // Publish
        let receipt = self
            .publisher
            .publish(&spec.source)
            .await
            .map_err(StageFailure::at(RunStage::Publish))?;
        result.receipt = Some(receipt);
        transition(result, RunState::Published, RunStage::Publish)
    }
}

fn transition(
    result: &mut PipelineResult,
    next: RunState,
    stage: RunStage,
) -> std::result::Result<(), StageFailure> {
    let from = result.state();
    result
        .lifecycle
        .advance(next)
        .map_err(StageFailure::at(stage))?;
    emit_state_changed(&from, &next);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{FakeCompletionClient, RecordingPublisher};
    use crate::gate::PublishPolicy;
    use crate::stage::{StageConfig, ToolchainConfig};
    use autofix_core::RepairResponse;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    fn spec_for(path: &std::path::Path, build: &str, run: &str) -> RepairSpec {
        RepairSpec::new(path).with_toolchain(ToolchainConfig {
            build: StageConfig::custom("build".to_string(), sh(build), 30),
            run: StageConfig::custom("run".to_string(), sh(run), 30),
        })
    }

    fn pipeline(
        client: FakeCompletionClient,
    ) -> (RepairPipeline, Arc<FakeCompletionClient>, Arc<RecordingPublisher>) {
        let client = Arc::new(client);
        let publisher = Arc::new(RecordingPublisher::new());
        (
            RepairPipeline::new(client.clone(), publisher.clone()),
            client,
            publisher,
        )
    }

    #[tokio::test]
    async fn test_passed_run_publishes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Main.java");
        std::fs::write(&path, "broken\n").unwrap();

        let (pipeline, client, publisher) = pipeline(FakeCompletionClient::returning("fixed\n"));
        let result = pipeline
            .run(&spec_for(&path, "grep -q fixed {file}", "true"))
            .await;

        assert!(result.error.is_none(), "{:?}", result.error);
        assert_eq!(result.state(), RunState::Published);
        assert!(result.success());
        assert_eq!(result.passed_count(), 2);
        assert_eq!(client.call_count(), 1);
        assert_eq!(publisher.call_count(), 1);
        assert_eq!(publisher.calls()[0].content.as_deref(), Some("fixed\n"));

        let report = result.to_report();
        assert_eq!(report.final_state, RunState::Published);
        assert_eq!(report.response_status, Some(ResponseStatus::Success));
        assert!(report.commit_sha.is_some());
        let states: Vec<&str> = report.history.iter().map(|t| t.to.name()).collect();
        assert_eq!(states, ["loaded", "requested", "validated", "published"]);
    }

    #[tokio::test]
    async fn test_build_failure_skips_and_restores() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Main.java");
        std::fs::write(&path, "broken\n").unwrap();

        let (pipeline, _client, publisher) = pipeline(FakeCompletionClient::returning("worse\n"));
        let result = pipeline.run(&spec_for(&path, "exit 1", "true")).await;

        assert_eq!(result.state(), RunState::Skipped);
        assert!(!result.success());
        assert_eq!(result.outcome(), Some(ValidationOutcome::BuildFailed));
        assert_eq!(publisher.call_count(), 0);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "broken\n");
        assert!(result.to_report().restored);
    }

    #[tokio::test]
    async fn test_missing_source_fails_at_load() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, client, _publisher) = pipeline(FakeCompletionClient::returning("x\n"));
        let result = pipeline
            .run(&spec_for(&dir.path().join("Gone.java"), "true", "true"))
            .await;

        assert_eq!(result.state(), RunState::Failed { stage: RunStage::Load });
        assert!(matches!(result.error, Some(AutofixError::NotFound(_))));
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn test_service_error_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Main.java");
        std::fs::write(&path, "broken\n").unwrap();

        let (pipeline, _client, publisher) = pipeline(FakeCompletionClient::failing(|| {
            AutofixError::ServiceUnavailable("HTTP 503".to_string())
        }));
        let result = pipeline.run(&spec_for(&path, "true", "true")).await;

        assert_eq!(result.state(), RunState::Failed { stage: RunStage::Request });
        assert_eq!(result.response_status, Some(ResponseStatus::ServiceError));
        assert_eq!(publisher.call_count(), 0);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "broken\n");

        let report = result.to_report();
        assert_eq!(report.error.unwrap().kind, "service_unavailable");
    }

    #[tokio::test]
    async fn test_unchanged_candidate_short_circuit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Main.java");
        std::fs::write(&path, "same\n").unwrap();

        let (pipeline, _client, publisher) = pipeline(FakeCompletionClient::echoing());
        let spec = spec_for(&path, "true", "true").with_policy(PublishPolicy {
            skip_unchanged: true,
        });
        let result = pipeline.run(&spec).await;

        assert_eq!(result.state(), RunState::Skipped);
        assert_eq!(result.decision(), Some(PublishDecision::Skip(SkipReason::Unchanged)));
        assert!(result.success());
        assert_eq!(publisher.call_count(), 0);
    }

    #[tokio::test]
    async fn test_unchanged_candidate_publishes_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Main.java");
        std::fs::write(&path, "same\n").unwrap();

        let (pipeline, _client, publisher) = pipeline(FakeCompletionClient::echoing());
        let result = pipeline.run(&spec_for(&path, "true", "true")).await;

        assert_eq!(result.state(), RunState::Published);
        assert_eq!(publisher.call_count(), 1);
    }

    #[tokio::test]
    async fn test_publish_error_is_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Main.java");
        std::fs::write(&path, "broken\n").unwrap();

        let client = Arc::new(FakeCompletionClient::returning("fixed\n"));
        let publisher = Arc::new(RecordingPublisher::failing_at("push"));
        let result = RepairPipeline::new(client, publisher.clone())
            .run(&spec_for(&path, "true", "true"))
            .await;

        assert_eq!(result.state(), RunState::Failed { stage: RunStage::Publish });
        assert_eq!(publisher.call_count(), 1);
        assert_eq!(result.outcome(), Some(ValidationOutcome::Passed));
    }

    #[tokio::test]
    async fn test_truncated_candidate_still_validated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Main.java");
        std::fs::write(&path, "broken\n").unwrap();

        let (pipeline, _client, _publisher) = pipeline(FakeCompletionClient::with_reply(|_| {
            Ok(RepairResponse {
                candidate: "half\n".to_string(),
                model: None,
                finish_reason: Some("length".to_string()),
            })
        }));
        let result = pipeline.run(&spec_for(&path, "exit 1", "true")).await;
        assert_eq!(result.outcome(), Some(ValidationOutcome::BuildFailed));
    }

    #[tokio::test]
    async fn test_held_lock_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Main.java");
        std::fs::write(&path, "broken\n").unwrap();
        let lock_path = dir.path().join("run.lock");
        let _held = RunLock::acquire(&lock_path, Duration::ZERO).await.unwrap();

        let (pipeline, client, _publisher) = pipeline(FakeCompletionClient::returning("fixed\n"));
        let result = pipeline
            .with_lock(&lock_path)
            .run(&spec_for(&path, "true", "true"))
            .await;

        assert_eq!(result.state(), RunState::Failed { stage: RunStage::Lock });
        assert!(matches!(result.error, Some(AutofixError::LockHeld(_))));
        assert_eq!(client.call_count(), 0);
    }

    #[test]
    fn test_aborted_run_reports_failure() {
        let spec = RepairSpec::new("Main.java");
        let result = PipelineResult::aborted(
            &spec,
            RunStage::Request,
            AutofixError::InvalidConfig("no API key configured".to_string()),
        );

        assert_eq!(result.state(), RunState::Failed { stage: RunStage::Request });
        assert!(!result.success());
        assert!(result.lifecycle.finished_at.is_some());

        let report = result.to_report();
        assert_eq!(report.spec_digest, spec.digest().to_string());
        assert_eq!(report.final_state, RunState::Failed { stage: RunStage::Request });
        assert_eq!(report.error.unwrap().kind, "invalid_config");
        assert!(report.stages.is_empty());
    }
}
