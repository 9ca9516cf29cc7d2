//! Run-level lock keyed on repository and branch.
//!
//! Two runs against the same branch of the same repository would race on the
//! source file and the push. The lock is an advisory exclusive lock on a file
//! in the system temp directory, released when the guard drops.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use autofix_core::{AutofixError, ContentDigest, Result};
use fs2::FileExt;
use tracing::debug;

const LOCK_RETRY_MS: u64 = 200;

/// Held lock. Unlocks on drop.
#[derive(Debug)]
pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

impl RunLock {
    /// Lock file path for a repository/branch pair inside `lock_dir`.
    pub fn path_for(lock_dir: &Path, repo_root: &Path, branch: &str) -> PathBuf {
        let key = ContentDigest::from_parts([repo_root.to_string_lossy().as_bytes(), branch.as_bytes()]);
        lock_dir.join(format!("autofix-{}.lock", key.short()))
    }

    /// Lock file for `repo_root`/`branch` in the system temp directory.
    pub fn default_path(repo_root: &Path, branch: &str) -> PathBuf {
        let root = repo_root
            .canonicalize()
            .unwrap_or_else(|_| repo_root.to_path_buf());
        Self::path_for(&std::env::temp_dir(), &root, branch)
    }

    /// Take the exclusive lock at `path`, retrying for up to `wait`.
    ///
    /// A zero `wait` fails immediately with `LockHeld` if another run holds it.
    /// Retries sleep on the runtime timer, so waiting never blocks a worker.
    pub async fn acquire(path: &Path, wait: Duration) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let start = Instant::now();
        loop {
            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => break,
                Err(err) => {
                    if err.kind() != ErrorKind::WouldBlock
                        && err.raw_os_error() != fs2::lock_contended_error().raw_os_error()
                    {
                        return Err(err.into());
                    }
                    if start.elapsed() >= wait {
                        return Err(AutofixError::LockHeld(path.to_path_buf()));
                    }
                    tokio::time::sleep(Duration::from_millis(LOCK_RETRY_MS)).await;
                }
            }
        }

        // Owner pid, for whoever finds the lock held.
        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;
        debug!(path = %path.display(), "Acquired run lock");

        Ok(RunLock {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
