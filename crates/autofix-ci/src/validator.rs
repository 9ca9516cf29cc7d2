//! Validator: writes a candidate over the source file, then builds and runs
//! it with the toolchain.
//!
//! The original content is snapshotted in a [`BackupGuard`] before the
//! overwrite. Any outcome other than `Passed` puts it back (unless the
//! validator is told to keep failed candidates), and so does dropping the
//! guard on an early return.

use std::path::{Path, PathBuf};

use autofix_core::{
    emit_stage_completed, emit_validation_finished, AutofixError, Result, StageReport,
    ValidationOutcome,
};
use tracing::{debug, info, warn};

use crate::runner::{CiRunner, StageResult};
use crate::stage::ToolchainConfig;

/// What validation found, with the evidence.
#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub outcome: ValidationOutcome,

    /// Stages that actually ran, in order. A failed build means no run stage.
    pub stages: Vec<StageResult>,

    /// Whether the original content was written back.
    pub restored: bool,
}

impl ValidationReport {
    pub fn stage_reports(&self) -> Vec<StageReport> {
        self.stages.iter().map(StageResult::to_report).collect()
    }
}

/// Snapshot of a file's bytes that is written back unless disarmed.
pub struct BackupGuard {
    path: PathBuf,
    original: Vec<u8>,
    armed: bool,
}

impl BackupGuard {
    /// Copy the current content of `path`.
    pub async fn snapshot(path: &Path) -> Result<Self> {
        let original = tokio::fs::read(path)
            .await
            .map_err(|e| AutofixError::ReadError {
                path: path.to_path_buf(),
                reason: format!("snapshot failed: {e}"),
            })?;
        debug!(path = %path.display(), bytes = original.len(), "Snapshotted original");
        Ok(Self {
            path: path.to_path_buf(),
            original,
            armed: true,
        })
    }

    pub fn original(&self) -> &[u8] {
        &self.original
    }

    /// Write the snapshot back and disarm.
    pub async fn restore(mut self) -> Result<()> {
        self.armed = false;
        tokio::fs::write(&self.path, &self.original)
            .await
            .map_err(|e| AutofixError::WriteError {
                path: self.path.clone(),
                reason: format!("restore failed: {e}"),
            })?;
        info!(path = %self.path.display(), "Restored original content");
        Ok(())
    }

    /// Keep whatever is on disk now.
    pub fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for BackupGuard {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = std::fs::write(&self.path, &self.original) {
                warn!(path = %self.path.display(), error = %e, "Failed to restore original content");
            } else {
                warn!(path = %self.path.display(), "Restored original content on early exit");
            }
        }
    }
}

/// Builds and runs candidates with a configured toolchain.
#[derive(Debug, Clone)]
pub struct Validator {
    toolchain: ToolchainConfig,
    restore_on_failure: bool,
}

impl Validator {
    pub fn new(toolchain: ToolchainConfig) -> Self {
        Self {
            toolchain,
            restore_on_failure: true,
        }
    }

    /// Leave a failed candidate on disk instead of restoring the original.
    pub fn keep_failed_candidate(mut self, keep: bool) -> Self {
        self.restore_on_failure = !keep;
        self
    }

    pub fn toolchain(&self) -> &ToolchainConfig {
        &self.toolchain
    }

    /// Overwrite `path` with `candidate`, then build and run it.
    ///
    /// Errors only when the file cannot be snapshotted, overwritten or
    /// restored. Build and run failures are reported as outcomes.
    pub async fn validate(&self, path: &Path, candidate: &str) -> Result<ValidationReport> {
        let path = absolute(path)?;
        let guard = BackupGuard::snapshot(&path).await?;

        tokio::fs::write(&path, candidate)
            .await
            .map_err(|e| AutofixError::WriteError {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        info!(path = %path.display(), bytes = candidate.len(), "Wrote candidate");

        let mut report = self.check(&path).await?;

        if report.outcome.passed() || !self.restore_on_failure {
            guard.keep();
        } else {
            guard.restore().await?;
            report.restored = true;
        }

        emit_validation_finished(report.outcome, report.restored);
        Ok(report)
    }

    /// Build and run whatever is currently at `path`, without writing.
    pub async fn check(&self, path: &Path) -> Result<ValidationReport> {
        let path = absolute(path)?;
        let work_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let mut stages = Vec::with_capacity(2);

        let build = CiRunner::execute_stage_lenient(&self.toolchain.build.resolve(&path), &work_dir).await;
        emit_stage_completed(&build.stage_name, build.exit_code, build.duration_ms, build.passed());
        let build_passed = build.passed();
        stages.push(build);
        if !build_passed {
            warn!("Compilation failed");
            return Ok(ValidationReport {
                outcome: ValidationOutcome::BuildFailed,
                stages,
                restored: false,
            });
        }

        let run = CiRunner::execute_stage_lenient(&self.toolchain.run.resolve(&path), &work_dir).await;
        emit_stage_completed(&run.stage_name, run.exit_code, run.duration_ms, run.passed());
        if !run.stdout.is_empty() {
            info!(stage = %run.stage_name, "Program output:\n{}", run.stdout.trim_end());
        }
        let outcome = if run.passed() {
            ValidationOutcome::Passed
        } else {
            ValidationOutcome::RuntimeFailed
        };
        stages.push(run);

        Ok(ValidationReport {
            outcome,
            stages,
            restored: false,
        })
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}
