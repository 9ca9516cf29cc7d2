//! Toolchain stage execution.

use crate::stage::StageConfig;
use autofix_core::{tail_lines, StageReport};
use std::path::Path;
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;

/// Lines of stderr kept in reports for failed stages.
const STDERR_TAIL_LINES: usize = 20;

/// Result of a stage execution.
#[derive(Debug, Clone)]
pub struct StageResult {
    /// Stage name.
    pub stage_name: String,

    /// Resolved command line.
    pub command: Vec<String>,

    /// Exit code (0 = success, -1 = killed, timed out or never started).
    pub exit_code: i32,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr.
    pub stderr: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,

    /// Whether execution succeeded.
    pub success: bool,
}

impl StageResult {
    /// Whether this stage passed (exit code 0).
    pub fn passed(&self) -> bool {
        self.success && self.exit_code == 0
    }

    /// Result for a stage that could not be executed at all.
    pub fn errored(config: &StageConfig, error: &anyhow::Error, duration_ms: u64) -> Self {
        Self {
            stage_name: config.name.clone(),
            command: config.command.clone(),
            exit_code: -1,
            stdout: String::new(),
            stderr: format!("{error:#}"),
            duration_ms,
            success: false,
        }
    }

    pub fn to_report(&self) -> StageReport {
        StageReport {
            name: self.stage_name.clone(),
            command: self.command.clone(),
            exit_code: self.exit_code,
            duration_ms: self.duration_ms,
            success: self.passed(),
            stderr_tail: if self.passed() {
                String::new()
            } else {
                tail_lines(&self.stderr, STDERR_TAIL_LINES)
            },
        }
    }
}

/// Runs a single toolchain stage as a child process.
pub struct CiRunner;

impl CiRunner {
    /// Execute a single stage inside `work_dir` and return the result.
    ///
    /// Fails only when the process cannot be spawned or exceeds its
    /// timeout; a non-zero exit is a normal, unsuccessful result.
    pub async fn execute_stage(config: &StageConfig, work_dir: &Path) -> anyhow::Result<StageResult> {
        let start = Instant::now();

        if config.command.is_empty() {
            anyhow::bail!("Stage {} has empty command", config.name);
        }

        let exe = &config.command[0];
        let args = &config.command[1..];

        let child = Command::new(exe)
            .args(args)
            .current_dir(work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| anyhow::anyhow!("Stage {} failed to start {}: {}", config.name, exe, e))?;

        let output = if config.timeout_secs > 0 {
            tokio::time::timeout(
                std::time::Duration::from_secs(config.timeout_secs),
                child.wait_with_output(),
            )
            .await
            .map_err(|_| {
                anyhow::anyhow!(
                    "Stage {} timed out after {} seconds",
                    config.name,
                    config.timeout_secs
                )
            })??
        } else {
            child.wait_with_output().await?
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        let exit_code = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        let success = output.status.success();

        Ok(StageResult {
            stage_name: config.name.clone(),
            command: config.command.clone(),
            exit_code,
            stdout,
            stderr,
            duration_ms,
            success,
        })
    }

    /// Like [`CiRunner::execute_stage`], but folds spawn errors and timeouts
    /// into a failed [`StageResult`] with exit code -1.
    pub async fn execute_stage_lenient(config: &StageConfig, work_dir: &Path) -> StageResult {
        let start = Instant::now();
        match Self::execute_stage(config, work_dir).await {
            Ok(result) => result,
            Err(e) => StageResult::errored(config, &e, start.elapsed().as_millis() as u64),
        }
    }
}
