//! widgetlab bench: score rendered widgets against per-case rules.
//!
//! A case carries a ground truth widget, an `eval.json` rule list and one submission per
//! model. [`orchestrator::run_benchmark`] renders each of them through a
//! [`renderer::WidgetRenderer`], evaluates the rules with [`engine::evaluate_rule`] and
//! writes a report per submission plus a run summary.

pub mod browser;
pub mod config;
pub mod engine;
pub mod evaluators;
pub mod orchestrator;
pub mod page;
pub mod renderer;
pub mod report;
pub mod rules;
pub mod target;
pub mod visual;

pub use browser::{BrowserPage, PlaygroundBrowser};
pub use config::BenchConfig;
pub use engine::{evaluate_rule, evaluate_rules, EvalContext};
pub use orchestrator::{run_benchmark, BenchFilter, BenchLayout};
pub use page::{RenderedPage, StaticPage};
pub use renderer::{StaticRenderer, WidgetFiles, WidgetRenderer};
pub use report::{RunSummary, SubmissionReport, SummaryEntry};
pub use rules::{CountOp, EvalConfig, EvalRule, EvalTarget, RuleResult, Subtask};
