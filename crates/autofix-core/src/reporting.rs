use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use uuid::Uuid;

use crate::domain::{
    PublishDecision, ResponseStatus, RunState, StateTransition, ValidationOutcome,
};

pub const REPORT_SCHEMA_VERSION: &str = "1.0";

/// One toolchain stage as persisted in the run report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageReport {
    pub name: String,
    pub command: Vec<String>,
    pub exit_code: i32,
    pub duration_ms: u64,
    pub success: bool,
    /// Last lines of stderr, for failed stages.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stderr_tail: String,
}

/// Error that ended a run early.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorReport {
    pub kind: String,
    pub message: String,
}

/// Canonical run artifact written for CI logs and step summaries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunReport {
    pub schema_version: String,
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub source: String,
    pub spec_digest: String,
    pub original_digest: Option<String>,
    pub candidate_digest: Option<String>,
    pub final_state: RunState,
    pub history: Vec<StateTransition>,
    pub response_status: Option<ResponseStatus>,
    pub outcome: Option<ValidationOutcome>,
    pub stages: Vec<StageReport>,
    pub decision: Option<PublishDecision>,
    /// Whether the original content was put back after a failed validation.
    pub restored: bool,
    pub commit_sha: Option<String>,
    pub error: Option<ErrorReport>,
    pub duration_ms: u64,
}

/// Keep the last `max_lines` lines of `text`.
pub fn tail_lines(text: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}

/// Write the run report in pretty JSON format.
pub fn write_run_report_json(path: &Path, report: &RunReport) -> Result<()> {
    let content = serde_json::to_string_pretty(report).context("serialize run report")?;
    std::fs::write(path, content).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

/// Render a markdown summary for the CI step summary.
pub fn render_run_summary_md(report: &RunReport) -> String {
    let mut out = String::new();
    out.push_str("# autofix run\n\n");
    out.push_str(&format!("- run: `{}`\n", report.run_id));
    out.push_str(&format!("- source: `{}`\n", report.source));
    out.push_str(&format!("- state: **{}**\n", report.final_state));
    if let Some(outcome) = report.outcome {
        out.push_str(&format!("- validation: {}\n", outcome));
    }
    match report.decision {
        Some(PublishDecision::Publish) => out.push_str("- publish: yes\n"),
        Some(PublishDecision::Skip(reason)) => {
            out.push_str(&format!("- publish: skipped ({})\n", reason))
        }
        None => {}
    }
    if report.restored {
        out.push_str("- original content restored\n");
    }
    if let Some(sha) = &report.commit_sha {
        out.push_str(&format!("- commit: `{}`\n", sha));
    }
    out.push_str(&format!("- duration: {}ms\n", report.duration_ms));

    if !report.stages.is_empty() {
        out.push_str("\n## Stages\n\n| stage | exit | ms |\n|---|---|---|\n");
        for stage in &report.stages {
            let mark = if stage.success { "✓" } else { "✗" };
            out.push_str(&format!(
                "| {} {} | {} | {} |\n",
                mark, stage.name, stage.exit_code, stage.duration_ms
            ));
        }
        for stage in report.stages.iter().filter(|s| !s.stderr_tail.is_empty()) {
            out.push_str(&format!(
                "\n### {} stderr\n\n```\n{}\n```\n",
                stage.name, stage.stderr_tail
            ));
        }
    }

    if let Some(err) = &report.error {
        out.push_str(&format!("\n## Error\n\n`{}`: {}\n", err.kind, err.message));
    }
    out
}

/// Append the markdown summary to `path` (the step summary file is shared
/// with other steps, so it is never truncated).
pub fn append_run_summary_md(path: &Path, report: &RunReport) -> Result<()> {
    let md = render_run_summary_md(report);
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open {:?}", path))?;
    file.write_all(md.as_bytes())
        .with_context(|| format!("write {:?}", path))?;
    Ok(())
}
