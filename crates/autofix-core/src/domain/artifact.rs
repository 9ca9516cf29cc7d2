//! Source artifact: the text of the file under repair.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::digest::ContentDigest;

/// The text content of one file, identified by its path.
///
/// Created by the loader at the start of a run and owned by that run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceArtifact {
    /// Path the content was read from.
    pub path: PathBuf,

    /// Full text content.
    pub content: String,

    /// SHA-256 of `content`.
    pub digest: ContentDigest,
}

impl SourceArtifact {
    pub fn new(path: impl Into<PathBuf>, content: String) -> Self {
        let digest = ContentDigest::from_bytes(content.as_bytes());
        Self {
            path: path.into(),
            content,
            digest,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name component, falling back to the full path.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    /// Whether `text` is byte-identical to this artifact's content.
    pub fn same_content(&self, text: &str) -> bool {
        ContentDigest::from_bytes(text.as_bytes()) == self.digest
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}
