//! Benchmark run: render every ground truth and submission, score them, write reports.
//!
//! Layout of a case directory:
//!
//! ```text
//! <cases>/<case>/gt/{widget.tsx,data.json}
//! <cases>/<case>/meta/eval.json
//! <cases>/<case>/submissions/<model>/{widget.tsx,data.json}
//! ```
//!
//! Cases and models run strictly one after another through a single renderer.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::Instrument;
use widgetlab_core::obs;

use crate::config::BenchConfig;
use crate::engine::{evaluate_rules, EvalContext};
use crate::renderer::{WidgetFiles, WidgetRenderer};
use crate::report::{write_json, RunSummary, SubmissionReport};
use crate::rules::{load_eval_config, EvalConfig, EvalRule, RuleResult, Subtask};

const RULE_LINE: &str = "============================================================";

/// Where a run reads cases from and writes results to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchLayout {
    pub cases_dir: PathBuf,
    pub results_dir: PathBuf,
}

impl BenchLayout {
    pub fn new(cases_dir: impl Into<PathBuf>, results_dir: impl Into<PathBuf>) -> Self {
        Self {
            cases_dir: cases_dir.into(),
            results_dir: results_dir.into(),
        }
    }

    pub fn from_config(config: &BenchConfig) -> Self {
        Self::new(&config.cases_dir, &config.results_dir)
    }

    pub fn case_dir(&self, case: &str) -> PathBuf {
        self.cases_dir.join(case)
    }

    pub fn eval_config(&self, case: &str) -> PathBuf {
        self.case_dir(case).join("meta").join("eval.json")
    }

    pub fn gt_dir(&self, case: &str) -> PathBuf {
        self.case_dir(case).join("gt")
    }

    pub fn gt_screenshot(&self, case: &str) -> PathBuf {
        self.gt_dir(case).join("target.png")
    }

    pub fn meta_target(&self, case: &str) -> PathBuf {
        self.case_dir(case).join("meta").join("target.png")
    }

    pub fn submissions_dir(&self, case: &str) -> PathBuf {
        self.case_dir(case).join("submissions")
    }

    pub fn submission_dir(&self, case: &str, model: &str) -> PathBuf {
        self.submissions_dir(case).join(model)
    }

    pub fn submission_screenshot(&self, case: &str, model: &str) -> PathBuf {
        self.submission_dir(case, model).join("widget.png")
    }

    pub fn report_dir(&self, case: &str, model: &str) -> PathBuf {
        self.results_dir.join(case).join(model)
    }

    pub fn summary_path(&self) -> PathBuf {
        self.results_dir.join("summary.json")
    }

    /// `path` relative to the cases directory, for console output.
    fn display(&self, path: &Path) -> String {
        path.strip_prefix(&self.cases_dir)
            .unwrap_or(path)
            .display()
            .to_string()
    }
}

/// Restrict a run to one case and/or one model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BenchFilter {
    pub case: Option<String>,
    pub model: Option<String>,
}

impl BenchFilter {
    fn allows_case(&self, case: &str) -> bool {
        self.case.as_deref().map_or(true, |c| c == case)
    }

    fn allows_model(&self, model: &str) -> bool {
        self.model.as_deref().map_or(true, |m| m == model)
    }
}

/// Sorted names of the subdirectories of `dir`. A missing directory has none.
pub async fn list_subdirs(dir: &Path) -> Result<Vec<String>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err).with_context(|| format!("read {}", dir.display())),
    };
    let mut names = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .with_context(|| format!("read {}", dir.display()))?
    {
        if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

/// Viewport requested by the first screenshot rule that sets both dimensions.
fn screenshot_viewport(config: &EvalConfig) -> Option<(u32, u32)> {
    config.rules.iter().find_map(|rule| match rule {
        EvalRule::Screenshot {
            viewport_width: Some(width),
            viewport_height: Some(height),
            ..
        } => Some((*width, *height)),
        _ => None,
    })
}

/// Delete a screenshot left by an earlier run so it is never scored as fresh.
async fn remove_stale(png: &Path) -> Result<()> {
    match tokio::fs::remove_file(png).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("remove stale {}", png.display())),
    }
}

/// Load `dir` into the renderer and save a stage screenshot to `png` when available.
async fn render_into(
    renderer: &mut dyn WidgetRenderer,
    dir: &Path,
    viewport: Option<(u32, u32)>,
    png: &Path,
) -> Result<bool> {
    remove_stale(png).await?;
    let files = WidgetFiles::read(dir).await?;
    renderer.load(&files, viewport).await?;
    match renderer.screenshot_stage().await? {
        Some(bytes) => {
            tokio::fs::write(png, bytes)
                .await
                .with_context(|| format!("write {}", png.display()))?;
            Ok(true)
        }
        None => Ok(false),
    }
}

async fn render_with_timeout(
    renderer: &mut dyn WidgetRenderer,
    dir: &Path,
    viewport: Option<(u32, u32)>,
    png: &Path,
    timeout: Duration,
) -> Result<bool> {
    match tokio::time::timeout(timeout, render_into(renderer, dir, viewport, png)).await {
        Ok(result) => result,
        Err(_) => anyhow::bail!("render timed out after {}s", timeout.as_secs()),
    }
}

fn failed_results(rules: &[EvalRule], message: &str) -> Vec<RuleResult> {
    rules
        .iter()
        .map(|rule| RuleResult::new(rule, false, message))
        .collect()
}

/// Run the benchmark over every case in `config.cases_dir`.
///
/// A missing or invalid `eval.json` aborts the run. A ground truth that fails to render
/// skips its case; a submission that fails to render scores zero.
pub async fn run_benchmark(
    renderer: &mut dyn WidgetRenderer,
    config: &BenchConfig,
    filter: &BenchFilter,
    out: &mut (dyn Write + Send),
) -> Result<RunSummary> {
    let run_id = uuid::Uuid::new_v4().to_string();
    run_cases(renderer, config, filter, out, &run_id)
        .instrument(obs::bench_span(&run_id))
        .await
}

async fn run_cases(
    renderer: &mut dyn WidgetRenderer,
    config: &BenchConfig,
    filter: &BenchFilter,
    out: &mut (dyn Write + Send),
    run_id: &str,
) -> Result<RunSummary> {
    let layout = BenchLayout::from_config(config);
    let started = Instant::now();

    let cases: Vec<String> = list_subdirs(&layout.cases_dir)
        .await?
        .into_iter()
        .filter(|case| filter.allows_case(case))
        .collect();
    if cases.is_empty() {
        writeln!(out, "No cases found.")?;
    }

    let mut reports = Vec::new();
    for case in &cases {
        let eval = load_eval_config(&layout.eval_config(case)).await?;
        writeln!(out, "\n{RULE_LINE}")?;
        writeln!(out, "Case: {} ({case})", eval.name)?;
        writeln!(out, "Subtask: {}", eval.subtask)?;
        writeln!(out, "{RULE_LINE}")?;
        obs::emit_case_started(case, eval.subtask.as_str(), eval.rules.len());

        let viewport = screenshot_viewport(&eval);
        let gt_png = layout.gt_screenshot(case);
        writeln!(out, "Rendering ground truth...")?;
        match render_with_timeout(
            renderer,
            &layout.gt_dir(case),
            viewport,
            &gt_png,
            config.case_timeout(),
        )
        .await
        {
            Ok(true) => {
                writeln!(out, "  GT screenshot saved: {}", layout.display(&gt_png))?;
                if eval.subtask == Subtask::InstructionImageTarget {
                    let target = layout.meta_target(case);
                    tokio::fs::copy(&gt_png, &target)
                        .await
                        .with_context(|| {
                            format!("copy {} to {}", gt_png.display(), target.display())
                        })?;
                    writeln!(out, "  Copied target to meta/target.png")?;
                }
            }
            Ok(false) => {}
            Err(err) => {
                writeln!(out, "  Ground truth render failed: {err:#}")?;
                obs::emit_case_skipped(case, &format!("ground truth render failed: {err:#}"));
                continue;
            }
        }

        let models: Vec<String> = list_subdirs(&layout.submissions_dir(case))
            .await?
            .into_iter()
            .filter(|model| filter.allows_model(model))
            .collect();
        if models.is_empty() {
            writeln!(out, "  No submissions found.")?;
            obs::emit_case_skipped(case, "no submissions");
            continue;
        }

        for model in &models {
            writeln!(out, "\n  Model: {model}")?;
            let report =
                score_submission(renderer, &layout, config, case, model, &eval, out).await?;
            reports.push(report);
        }
    }

    writeln!(out, "\n{RULE_LINE}")?;
    writeln!(out, "SUMMARY")?;
    writeln!(out, "{RULE_LINE}")?;
    for report in &reports {
        writeln!(out, "{}", report.summary_line())?;
    }

    let summary = RunSummary::new(run_id, &reports);
    write_json(&layout.summary_path(), &summary).await?;
    obs::emit_run_finished(run_id, reports.len(), started.elapsed().as_millis() as u64);
    Ok(summary)
}

async fn score_submission(
    renderer: &mut dyn WidgetRenderer,
    layout: &BenchLayout,
    config: &BenchConfig,
    case: &str,
    model: &str,
    eval: &EvalConfig,
    out: &mut (dyn Write + Send),
) -> Result<SubmissionReport> {
    let widget_png = layout.submission_screenshot(case, model);
    let report_dir = layout.report_dir(case, model);

    let rendered = render_with_timeout(
        renderer,
        &layout.submission_dir(case, model),
        screenshot_viewport(eval),
        &widget_png,
        config.case_timeout(),
    )
    .await;

    let results = match rendered {
        Ok(saved) => {
            if saved {
                writeln!(out, "    Screenshot saved: {}", layout.display(&widget_png))?;
            }
            let ctx = EvalContext {
                gt_screenshot: layout.gt_screenshot(case),
                submission_screenshot: widget_png,
                diff_path: report_dir.join("diff.png"),
                subtask: eval.subtask,
            };
            evaluate_rules(renderer.page(), &eval.rules, &ctx).await
        }
        Err(err) => failed_results(&eval.rules, &format!("Render failed: {err:#}")),
    };

    for result in &results {
        let icon = if result.pass { "PASS" } else { "FAIL" };
        writeln!(out, "    [{icon}] {}", result.message)?;
        obs::emit_rule_evaluated(case, model, result.rule.type_name(), result.pass);
    }

    let report = SubmissionReport::new(case, model, eval.subtask, results);
    let report_path = report_dir.join("report.json");
    write_json(&report_path, &report).await?;
    obs::emit_submission_scored(case, model, report.passed_rules, report.total_rules, report.score);
    writeln!(out, "    {}", report.score_line())?;
    writeln!(out, "    Report saved: {}", layout.display(&report_path))?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_paths() {
        let layout = BenchLayout::new("/b/cases", "/b/results");
        assert_eq!(layout.eval_config("c1"), PathBuf::from("/b/cases/c1/meta/eval.json"));
        assert_eq!(layout.gt_screenshot("c1"), PathBuf::from("/b/cases/c1/gt/target.png"));
        assert_eq!(
            layout.submission_screenshot("c1", "m"),
            PathBuf::from("/b/cases/c1/submissions/m/widget.png")
        );
        assert_eq!(layout.report_dir("c1", "m"), PathBuf::from("/b/results/c1/m"));
        assert_eq!(layout.display(&layout.gt_screenshot("c1")), "c1/gt/target.png");
    }

    #[test]
    fn test_filter() {
        let filter = BenchFilter {
            case: Some("a".into()),
            model: None,
        };
        assert!(filter.allows_case("a"));
        assert!(!filter.allows_case("b"));
        assert!(filter.allows_model("anything"));
    }

    #[tokio::test]
    async fn test_list_subdirs_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_subdirs(&dir.path().join("nope")).await.unwrap().is_empty());
        std::fs::create_dir(dir.path().join("b")).unwrap();
        std::fs::create_dir(dir.path().join("a")).unwrap();
        std::fs::write(dir.path().join("file.txt"), "x").unwrap();
        assert_eq!(list_subdirs(dir.path()).await.unwrap(), vec!["a", "b"]);
    }
}
