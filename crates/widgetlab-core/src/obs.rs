//! Structured lifecycle events for compiles and benchmark runs.
//!
//! Every event carries an `event` field (`compile.finished`, `bench.case_started`, ...)
//! so JSON logs can be filtered without parsing messages.

use tracing::{info, warn};

use crate::compile::WidgetCompileError;
use crate::digest::SourceDigest;

/// Span that scopes log lines to one benchmark run.
///
/// ```ignore
/// run(...).instrument(bench_span("4f0c...")).await
/// ```
pub fn bench_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("widgetlab.bench", run_id = %run_id)
}

pub fn emit_compile_finished(
    digest: &SourceDigest,
    transform: &str,
    duration_ms: u64,
    error: Option<&WidgetCompileError>,
) {
    match error {
        None => info!(
            event = "compile.finished",
            digest = %digest.short(),
            transform = %transform,
            duration_ms = duration_ms,
            success = true,
        ),
        Some(err) => info!(
            event = "compile.finished",
            digest = %digest.short(),
            transform = %transform,
            duration_ms = duration_ms,
            success = false,
            kind = %err.kind(),
            error = %err,
        ),
    }
}

pub fn emit_case_started(case_id: &str, subtask: &str, rules: usize) {
    info!(event = "bench.case_started", case_id = %case_id, subtask = %subtask, rules = rules);
}

pub fn emit_case_skipped(case_id: &str, reason: &str) {
    warn!(event = "bench.case_skipped", case_id = %case_id, reason = %reason);
}

pub fn emit_rule_evaluated(case_id: &str, model: &str, rule_type: &str, pass: bool) {
    info!(
        event = "bench.rule_evaluated",
        case_id = %case_id,
        model = %model,
        rule = %rule_type,
        pass = pass,
    );
}

pub fn emit_submission_scored(case_id: &str, model: &str, passed: usize, total: usize, score: f64) {
    info!(
        event = "bench.submission_scored",
        case_id = %case_id,
        model = %model,
        passed = passed,
        total = total,
        score = score,
    );
}

pub fn emit_run_finished(run_id: &str, reports: usize, duration_ms: u64) {
    info!(
        event = "bench.run_finished",
        run_id = %run_id,
        reports = reports,
        duration_ms = duration_ms,
    );
}
