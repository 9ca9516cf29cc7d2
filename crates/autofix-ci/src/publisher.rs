//! Publisher: commits a validated candidate and pushes it to the remote.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use autofix_core::{AutofixError, Result};
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info};

/// Default commit author name.
pub const DEFAULT_BOT_NAME: &str = "GitHub Actions";

/// Default commit author email.
pub const DEFAULT_BOT_EMAIL: &str = "actions@github.com";

/// Default commit message.
pub const DEFAULT_COMMIT_MESSAGE: &str = "Fix Java code using OpenAI";

/// Fixed author identity for repair commits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BotIdentity {
    pub name: String,
    pub email: String,
}

impl Default for BotIdentity {
    fn default() -> Self {
        Self {
            name: DEFAULT_BOT_NAME.to_string(),
            email: DEFAULT_BOT_EMAIL.to_string(),
        }
    }
}

/// Publisher configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublishConfig {
    pub identity: BotIdentity,
    pub message: String,
    pub remote: String,
    pub branch: String,

    /// Push after committing. Off means commit only.
    pub push: bool,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            identity: BotIdentity::default(),
            message: DEFAULT_COMMIT_MESSAGE.to_string(),
            remote: "origin".to_string(),
            branch: "main".to_string(),
            push: true,
        }
    }
}

/// What a successful publish produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublishReceipt {
    pub commit_sha: String,
    pub pushed: bool,
}

/// Something that can publish a modified file.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Stage, commit and (optionally) push `file`. Any failure is terminal.
    async fn publish(&self, file: &Path) -> Result<PublishReceipt>;
}

/// Publishes through the git CLI.
pub struct GitPublisher {
    repo_dir: PathBuf,
    config: PublishConfig,
}

impl GitPublisher {
    pub fn new(repo_dir: impl Into<PathBuf>, config: PublishConfig) -> Self {
        Self {
            repo_dir: repo_dir.into(),
            config,
        }
    }

    pub fn config(&self) -> &PublishConfig {
        &self.config
    }

    /// Run one git step, mapping any failure to `PublishError`.
    async fn git(&self, step: &str, args: &[&str]) -> Result<String> {
        debug!(step = step, args = ?args, "git");
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo_dir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| AutofixError::PublishError {
                step: step.to_string(),
                reason: format!("failed to run git: {e}"),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let reason = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            return Err(AutofixError::PublishError {
                step: step.to_string(),
                reason,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl Publisher for GitPublisher {
    async fn publish(&self, file: &Path) -> Result<PublishReceipt> {
        // git runs in the repository root, so a path relative to our cwd
        // would not name the same file there.
        let file = file.canonicalize().map_err(|e| AutofixError::PublishError {
            step: "stage".to_string(),
            reason: format!("cannot resolve {}: {e}", file.display()),
        })?;
        let file_arg = file.to_string_lossy();
        self.git("stage", &["add", "--", &file_arg]).await?;

        let name = format!("user.name={}", self.config.identity.name);
        let email = format!("user.email={}", self.config.identity.email);
        // --allow-empty: a passing run commits even when the candidate
        // matches what is already checked in.
        self.git(
            "commit",
            &[
                "-c",
                &name,
                "-c",
                &email,
                "commit",
                "--allow-empty",
                "-m",
                &self.config.message,
            ],
        )
        .await?;

        let commit_sha = self.git("commit", &["rev-parse", "HEAD"]).await?;
        info!(commit = %commit_sha, "Committed repair");

        if self.config.push {
            let refspec = format!("HEAD:refs/heads/{}", self.config.branch);
            self.git("push", &["push", &self.config.remote, &refspec])
                .await?;
            info!(remote = %self.config.remote, branch = %self.config.branch, "Pushed repair");
        }

        Ok(PublishReceipt {
            commit_sha,
            pushed: self.config.push,
        })
    }
}
