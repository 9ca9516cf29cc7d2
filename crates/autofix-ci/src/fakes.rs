//! In-memory fakes for the pipeline seams (testing only)
//!
//! `FakeCompletionClient` answers with a canned candidate or error and
//! remembers every request; `RecordingPublisher` records every publish call
//! and can be told to fail.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use autofix_core::{AutofixError, ContentDigest, RepairRequest, RepairResponse, Result};

use crate::publisher::{PublishReceipt, Publisher};
use crate::requester::CompletionClient;

// ---------------------------------------------------------------------------
// FakeCompletionClient
// ---------------------------------------------------------------------------

type Reply = Box<dyn Fn(&RepairRequest) -> Result<RepairResponse> + Send + Sync>;

/// Completion client that never touches the network.
pub struct FakeCompletionClient {
    reply: Reply,
    requests: Mutex<Vec<RepairRequest>>,
}

impl FakeCompletionClient {
    /// Answer every request with `candidate`.
    pub fn returning(candidate: impl Into<String>) -> Self {
        let candidate = candidate.into();
        Self::with_reply(move |_| Ok(RepairResponse::new(candidate.clone())))
    }

    /// Answer every request with the source text unchanged.
    pub fn echoing() -> Self {
        Self::with_reply(|req| Ok(RepairResponse::new(req.source_text.clone())))
    }

    /// Fail every request with the error built by `make`.
    pub fn failing(make: impl Fn() -> AutofixError + Send + Sync + 'static) -> Self {
        Self::with_reply(move |_| Err(make()))
    }

    pub fn with_reply(
        reply: impl Fn(&RepairRequest) -> Result<RepairResponse> + Send + Sync + 'static,
    ) -> Self {
        Self {
            reply: Box::new(reply),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<RepairRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionClient for FakeCompletionClient {
    async fn complete(&self, request: &RepairRequest) -> Result<RepairResponse> {
        self.requests.lock().unwrap().push(request.clone());
        (self.reply)(request)
    }
}

// ---------------------------------------------------------------------------
// RecordingPublisher
// ---------------------------------------------------------------------------

/// What the publisher saw: the path and the file content at publish time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishCall {
    pub file: PathBuf,
    pub content: Option<String>,
}

/// Publisher that records calls instead of running git.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    calls: Mutex<Vec<PublishCall>>,
    fail_step: Option<String>,
    seq: AtomicUsize,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every publish with a `PublishError` at `step`.
    pub fn failing_at(step: &str) -> Self {
        Self {
            fail_step: Some(step.to_string()),
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<PublishCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, file: &Path) -> Result<PublishReceipt> {
        let content = std::fs::read_to_string(file).ok();
        self.calls.lock().unwrap().push(PublishCall {
            file: file.to_path_buf(),
            content,
        });

        if let Some(step) = &self.fail_step {
            return Err(AutofixError::PublishError {
                step: step.clone(),
                reason: "injected failure".to_string(),
            });
        }

        // Distinct fake sha per call.
        let n = self.seq.fetch_add(1, Ordering::SeqCst).to_le_bytes();
        let sha = ContentDigest::from_parts([file.to_string_lossy().as_bytes(), n.as_slice()]);
        Ok(PublishReceipt {
            commit_sha: sha.as_str()[..40].to_string(),
            pushed: true,
        })
    }
}
