//! Source loader: reads the file under repair from the working tree.

use std::io::ErrorKind;
use std::path::Path;

use autofix_core::{AutofixError, Result, SourceArtifact};
use tracing::debug;

/// Reads the designated source file.
pub struct SourceLoader;

impl SourceLoader {
    /// Return the file's full text content. No side effects.
    ///
    /// `NotFound` if the path does not exist, `ReadError` for every other
    /// failure, including content that is not valid UTF-8.
    pub async fn load(path: &Path) -> Result<SourceArtifact> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => AutofixError::NotFound(path.to_path_buf()),
                _ => AutofixError::ReadError {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                },
            })?;

        let artifact = SourceArtifact::new(path, content);
        debug!(
            path = %path.display(),
            bytes = artifact.len(),
            digest = %artifact.digest.short(),
            "Loaded source"
        );
        Ok(artifact)
    }
}
