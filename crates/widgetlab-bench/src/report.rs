//! Per-submission reports and the run summary.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::rules::{RuleResult, Subtask};

/// Score for one model on one case, written to `results/<case>/<model>/report.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReport {
    pub case_id: String,
    pub model: String,
    pub subtask: Subtask,
    pub results: Vec<RuleResult>,
    pub score: f64,
    pub total_rules: usize,
    pub passed_rules: usize,
}

impl SubmissionReport {
    /// Score is `passed / total`, or 0 when there are no rules.
    pub fn new(
        case_id: impl Into<String>,
        model: impl Into<String>,
        subtask: Subtask,
        results: Vec<RuleResult>,
    ) -> Self {
        let total_rules = results.len();
        let passed_rules = results.iter().filter(|r| r.pass).count();
        let score = if total_rules == 0 {
            0.0
        } else {
            passed_rules as f64 / total_rules as f64
        };
        Self {
            case_id: case_id.into(),
            model: model.into(),
            subtask,
            results,
            score,
            total_rules,
            passed_rules,
        }
    }

    /// `Score: 3/5 (60.0%)`
    pub fn score_line(&self) -> String {
        format!(
            "Score: {}/{} ({:.1}%)",
            self.passed_rules,
            self.total_rules,
            self.score * 100.0
        )
    }

    /// One line of the final summary.
    pub fn summary_line(&self) -> String {
        format!(
            "  {} / {}: {}/{} ({:.1}%)",
            self.case_id,
            self.model,
            self.passed_rules,
            self.total_rules,
            self.score * 100.0
        )
    }

    pub fn entry(&self) -> SummaryEntry {
        SummaryEntry {
            case_id: self.case_id.clone(),
            model: self.model.clone(),
            passed_rules: self.passed_rules,
            total_rules: self.total_rules,
            score: self.score,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryEntry {
    pub case_id: String,
    pub model: String,
    pub passed_rules: usize,
    pub total_rules: usize,
    pub score: f64,
}

/// `results/summary.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: String,
    pub generated_at: DateTime<Utc>,
    pub reports: Vec<SummaryEntry>,
}

impl RunSummary {
    pub fn new(run_id: impl Into<String>, reports: &[SubmissionReport]) -> Self {
        Self {
            run_id: run_id.into(),
            generated_at: Utc::now(),
            reports: reports.iter().map(SubmissionReport::entry).collect(),
        }
    }
}

/// Write `value` as pretty JSON, creating parent directories.
pub async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(value).context("serialize report")?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("write {}", path.display()))
}
