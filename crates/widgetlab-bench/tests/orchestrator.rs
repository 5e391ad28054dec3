//! End-to-end benchmark runs over temporary case directories.
//!
//! Widgets are rendered in-process with the static renderer; screenshot behaviour is
//! covered with a renderer that returns canned PNGs.

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use image::{ImageFormat, Rgba, RgbaImage};
use widgetlab_bench::{
    run_benchmark, BenchConfig, BenchFilter, RenderedPage, StaticPage, StaticRenderer,
    SubmissionReport, WidgetFiles, WidgetRenderer,
};
use widgetlab_core::compile::{CompileOptions, PassthroughTransform};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

const LIST_WIDGET: &str = r#"const data = require("./data.json");
module.exports.default = function Forecast() {
  return React.createElement(
    "section",
    { "data-eid": "card", className: "card" },
    React.createElement("h1", { style: { fontWeight: 700 } }, data.city),
    React.createElement(
      "ul",
      null,
      data.days.map((d) => React.createElement("li", { key: d, className: "day" }, d))
    )
  );
};"#;

const FOUR_DAYS: &str = r#"{"city":"Paris","days":["Mon","Tue","Wed","Thu"]}"#;
const TWO_DAYS: &str = r#"{"city":"Lyon","days":["Mon","Tue"]}"#;

const RULES: &str = r#"[
  {"type": "exists", "target": {"eid": "card", "description": "card"}},
  {"type": "count", "selector": "li.day", "description": "days", "expected": 4, "op": "eq"},
  {"type": "count", "selector": "li.day", "description": "days", "expected": 3, "op": "gte"},
  {"type": "count", "selector": "li.day", "description": "days", "expected": 4, "op": "lte"},
  {"type": "text-contains", "target": {"selector": "h1", "description": "title"}, "expected": "Paris"}
]"#;

fn write(path: &Path, text: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, text).unwrap();
}

fn eval_json(case: &str, subtask: &str, rules: &str) -> String {
    format!(r#"{{"caseId":"{case}","name":"Forecast {case}","subtask":"{subtask}","rules":{rules}}}"#)
}

fn write_widget(dir: &Path, source: &str, data: &str) {
    write(&dir.join("widget.tsx"), source);
    write(&dir.join("data.json"), data);
}

fn config(root: &Path) -> BenchConfig {
    BenchConfig {
        cases_dir: root.join("cases"),
        results_dir: root.join("results"),
        ..BenchConfig::default()
    }
}

fn static_renderer() -> StaticRenderer {
    StaticRenderer::new(CompileOptions::with_transform(PassthroughTransform))
}

fn read_report(root: &Path, case: &str, model: &str) -> SubmissionReport {
    let path = root.join("results").join(case).join(model).join("report.json");
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

#[tokio::test]
async fn scores_each_submission_and_writes_reports() {
    let root = tempfile::tempdir().unwrap();
    let case = root.path().join("cases/forecast");
    write(&case.join("meta/eval.json"), &eval_json("forecast", "instruction-only", RULES));
    write_widget(&case.join("gt"), LIST_WIDGET, FOUR_DAYS);
    write_widget(&case.join("submissions/exact"), LIST_WIDGET, FOUR_DAYS);
    write_widget(&case.join("submissions/short"), LIST_WIDGET, TWO_DAYS);

    let mut out = Vec::new();
    let summary = run_benchmark(
        &mut static_renderer(),
        &config(root.path()),
        &BenchFilter::default(),
        &mut out,
    )
    .await
    .unwrap();

    assert_eq!(summary.reports.len(), 2);

    let exact = read_report(root.path(), "forecast", "exact");
    assert_eq!(exact.passed_rules, 5);
    assert_eq!(exact.score, 1.0);

    // 2 days: eq 4 fails, gte 3 fails, lte 4 passes; title is Lyon.
    let short = read_report(root.path(), "forecast", "short");
    assert_eq!(short.total_rules, 5);
    assert_eq!(short.passed_rules, 2);
    assert!((short.score - 0.4).abs() < 1e-9);
    assert_eq!(
        short.results[1].message,
        "Count check failed: \"days\" found 2 (expected eq 4)"
    );

    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("Case: Forecast forecast (forecast)"));
    assert!(text.contains("    [FAIL] Count check failed: \"days\" found 2 (expected gte 3)"));
    assert!(text.contains("  forecast / exact: 5/5 (100.0%)"));
    assert!(text.contains("  forecast / short: 2/5 (40.0%)"));

    let written: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(root.path().join("results/summary.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(written["reports"][1]["model"], "short");
    assert_eq!(written["reports"][1]["passedRules"], 2);
    assert!(written["runId"].as_str().is_some_and(|id| !id.is_empty()));
}

#[tokio::test]
async fn model_filter_restricts_submissions() {
    let root = tempfile::tempdir().unwrap();
    let case = root.path().join("cases/forecast");
    write(&case.join("meta/eval.json"), &eval_json("forecast", "instruction-only", RULES));
    write_widget(&case.join("gt"), LIST_WIDGET, FOUR_DAYS);
    write_widget(&case.join("submissions/a"), LIST_WIDGET, FOUR_DAYS);
    write_widget(&case.join("submissions/b"), LIST_WIDGET, FOUR_DAYS);

    let filter = BenchFilter {
        case: Some("forecast".into()),
        model: Some("b".into()),
    };
    let summary = run_benchmark(
        &mut static_renderer(),
        &config(root.path()),
        &filter,
        &mut Vec::new(),
    )
    .await
    .unwrap();
    assert_eq!(summary.reports.len(), 1);
    assert_eq!(summary.reports[0].model, "b");
    assert!(!root.path().join("results/forecast/a/report.json").exists());
}

#[tokio::test]
async fn render_failure_scores_zero() {
    let root = tempfile::tempdir().unwrap();
    let case = root.path().join("cases/forecast");
    write(&case.join("meta/eval.json"), &eval_json("forecast", "instruction-only", RULES));
    write_widget(&case.join("gt"), LIST_WIDGET, FOUR_DAYS);
    write_widget(&case.join("submissions/broken"), LIST_WIDGET, "{ not json");

    let summary = run_benchmark(
        &mut static_renderer(),
        &config(root.path()),
        &BenchFilter::default(),
        &mut Vec::new(),
    )
    .await
    .unwrap();
    assert_eq!(summary.reports[0].score, 0.0);

    let report = read_report(root.path(), "forecast", "broken");
    assert_eq!(report.total_rules, 5);
    assert!(report.results.iter().all(|r| !r.pass));
    assert_eq!(
        report.results[0].message,
        "Render failed: widget compile_error: data.json must contain valid JSON."
    );
}

// ---------------------------------------------------------------------------
// Case handling
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_submissions_skip_the_case() {
    let root = tempfile::tempdir().unwrap();
    let case = root.path().join("cases/lonely");
    write(&case.join("meta/eval.json"), &eval_json("lonely", "instruction-only", RULES));
    write_widget(&case.join("gt"), LIST_WIDGET, FOUR_DAYS);

    let mut out = Vec::new();
    let summary = run_benchmark(
        &mut static_renderer(),
        &config(root.path()),
        &BenchFilter::default(),
        &mut out,
    )
    .await
    .unwrap();
    assert!(summary.reports.is_empty());
    assert!(String::from_utf8(out).unwrap().contains("  No submissions found."));
    assert!(root.path().join("results/summary.json").exists());
}

#[tokio::test]
async fn malformed_eval_config_fails_the_run() {
    let root = tempfile::tempdir().unwrap();
    let case = root.path().join("cases/bad");
    write(&case.join("meta/eval.json"), r#"{"caseId": "bad", "rules": "#);
    write_widget(&case.join("gt"), LIST_WIDGET, FOUR_DAYS);

    let result = run_benchmark(
        &mut static_renderer(),
        &config(root.path()),
        &BenchFilter::default(),
        &mut Vec::new(),
    )
    .await;
    let err = result.unwrap_err();
    assert!(format!("{err:#}").contains("eval.json"), "{err:#}");
}

#[tokio::test]
async fn reference_subtask_skips_screenshot_rule() {
    let root = tempfile::tempdir().unwrap();
    let case = root.path().join("cases/ref");
    write(
        &case.join("meta/eval.json"),
        &eval_json(
            "ref",
            "instruction-image-reference",
            r#"[{"type": "screenshot", "maxPixelDiffPercent": 1}]"#,
        ),
    );
    write_widget(&case.join("gt"), LIST_WIDGET, FOUR_DAYS);
    write_widget(&case.join("submissions/m"), LIST_WIDGET, TWO_DAYS);

    run_benchmark(
        &mut static_renderer(),
        &config(root.path()),
        &BenchFilter::default(),
        &mut Vec::new(),
    )
    .await
    .unwrap();
    let report = read_report(root.path(), "ref", "m");
    assert_eq!(report.passed_rules, 1);
    assert_eq!(
        report.results[0].message,
        "Screenshot comparison skipped for instruction-image-reference subtask"
    );
}

// ---------------------------------------------------------------------------
// Screenshots
// ---------------------------------------------------------------------------

/// Renders nothing; the screenshot is a solid square whose colour comes from `data.json`.
#[derive(Default)]
struct SwatchRenderer {
    page: StaticPage,
    color: [u8; 4],
}

#[async_trait]
impl WidgetRenderer for SwatchRenderer {
    async fn load(&mut self, files: &WidgetFiles, _viewport: Option<(u32, u32)>) -> Result<()> {
        let data: serde_json::Value = serde_json::from_str(&files.data_source)?;
        let channel = |i: usize| data["rgb"][i].as_u64().unwrap_or(0) as u8;
        self.color = [channel(0), channel(1), channel(2), 255];
        self.page
            .set_html(r#"<div class="viewer-widget-stage"><div class="swatch"></div></div>"#);
        Ok(())
    }

    async fn screenshot_stage(&mut self) -> Result<Option<Vec<u8>>> {
        let image = RgbaImage::from_pixel(10, 10, Rgba(self.color));
        let mut bytes = Vec::new();
        image.write_to(&mut std::io::Cursor::new(&mut bytes), ImageFormat::Png)?;
        Ok(Some(bytes))
    }

    fn page(&self) -> &dyn RenderedPage {
        &self.page
    }

    fn name(&self) -> &str {
        "swatch"
    }
}

#[tokio::test]
async fn screenshot_rule_compares_against_ground_truth() {
    let root = tempfile::tempdir().unwrap();
    let case = root.path().join("cases/swatch");
    write(
        &case.join("meta/eval.json"),
        &eval_json(
            "swatch",
            "instruction-image-target",
            r#"[{"type": "screenshot", "maxPixelDiffPercent": 5}]"#,
        ),
    );
    write_widget(&case.join("gt"), "", r#"{"rgb":[255,255,255]}"#);
    write_widget(&case.join("submissions/same"), "", r#"{"rgb":[255,255,255]}"#);
    write_widget(&case.join("submissions/dark"), "", r#"{"rgb":[0,0,0]}"#);

    run_benchmark(
        &mut SwatchRenderer::default(),
        &config(root.path()),
        &BenchFilter::default(),
        &mut Vec::new(),
    )
    .await
    .unwrap();

    assert!(case.join("gt/target.png").exists());
    assert!(case.join("meta/target.png").exists());
    assert!(case.join("submissions/same/widget.png").exists());

    let same = read_report(root.path(), "swatch", "same");
    assert!(same.results[0].pass);
    assert_eq!(
        same.results[0].message,
        "Screenshot diff: 0.00% pixels differ (threshold: 5%)"
    );

    let dark = read_report(root.path(), "swatch", "dark");
    assert!(!dark.results[0].pass);
    assert_eq!(
        dark.results[0].message,
        "Screenshot diff too high: 100.00% pixels differ (threshold: 5%)"
    );
    assert!(root.path().join("results/swatch/dark/diff.png").exists());
}

#[tokio::test]
async fn screenshots_from_an_earlier_run_are_not_scored() {
    let root = tempfile::tempdir().unwrap();
    let case = root.path().join("cases/stale");
    write(
        &case.join("meta/eval.json"),
        &eval_json(
            "stale",
            "instruction-image-target",
            r#"[{"type": "screenshot", "maxPixelDiffPercent": 5}]"#,
        ),
    );
    write_widget(&case.join("gt"), LIST_WIDGET, FOUR_DAYS);
    write_widget(&case.join("submissions/m"), LIST_WIDGET, FOUR_DAYS);

    let mut black = Vec::new();
    RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]))
        .write_to(&mut std::io::Cursor::new(&mut black), ImageFormat::Png)
        .unwrap();
    std::fs::write(case.join("gt/target.png"), &black).unwrap();
    std::fs::write(case.join("submissions/m/widget.png"), &black).unwrap();

    // The static renderer takes no screenshots.
    run_benchmark(
        &mut static_renderer(),
        &config(root.path()),
        &BenchFilter::default(),
        &mut Vec::new(),
    )
    .await
    .unwrap();

    assert!(!case.join("gt/target.png").exists());
    assert!(!case.join("submissions/m/widget.png").exists());

    let report = read_report(root.path(), "stale", "m");
    assert!(!report.results[0].pass);
    assert!(
        report.results[0]
            .message
            .starts_with("Screenshot comparison failed: ground truth screenshot not found at "),
        "{}",
        report.results[0].message
    );
}
