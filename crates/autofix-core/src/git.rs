//! Git helpers for locating the repository and branch a run works on.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::domain::error::{AutofixError, Result};

fn git_stdout(dir: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .map_err(|e| AutofixError::GitError(format!("failed to run git: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(AutofixError::GitError(format!(
            "git {} failed: {}",
            args.join(" "),
            stderr.trim()
        )));
    }

    let out = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if out.is_empty() {
        return Err(AutofixError::GitError(format!(
            "git {} returned empty output",
            args.join(" ")
        )));
    }
    Ok(out)
}

/// Capture the HEAD commit SHA from a git repository.
pub fn capture_head_sha(repo_dir: &Path) -> Result<String> {
    git_stdout(repo_dir, &["rev-parse", "HEAD"])
}

/// Name of the checked-out branch. Fails on a detached HEAD.
pub fn current_branch(repo_dir: &Path) -> Result<String> {
    let name = git_stdout(repo_dir, &["rev-parse", "--abbrev-ref", "HEAD"])?;
    if name == "HEAD" {
        return Err(AutofixError::GitError("HEAD is detached".to_string()));
    }
    Ok(name)
}

/// Top-level directory of the work tree containing `dir`.
pub fn repo_root(dir: &Path) -> Result<PathBuf> {
    git_stdout(dir, &["rev-parse", "--show-toplevel"]).map(PathBuf::from)
}

/// Check whether a directory is inside a git work tree.
pub fn is_git_repo(dir: &Path) -> bool {
    Command::new("git")
        .args(["rev-parse", "--is-inside-work-tree"])
        .current_dir(dir)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}
