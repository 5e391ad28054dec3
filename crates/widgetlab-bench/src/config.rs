//! Benchmark run configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default dev server address the browser renderer talks to.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:43073";

/// Settings for a benchmark run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BenchConfig {
    /// Playground dev server base URL.
    pub base_url: String,

    /// Directory holding one folder per case.
    pub cases_dir: PathBuf,

    /// Where reports, diffs and `summary.json` go.
    pub results_dir: PathBuf,

    /// Maximum wait for the widget stage to become ready (milliseconds).
    pub content_timeout_ms: u64,

    /// Fixed delay after readiness before the screenshot (milliseconds).
    pub settle_ms: u64,

    /// Upper bound for rendering and scoring one widget (milliseconds).
    pub case_timeout_ms: u64,

    /// Browser window size used unless a screenshot rule overrides it.
    pub viewport: (u32, u32),
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            cases_dir: PathBuf::from("benchmark/cases"),
            results_dir: PathBuf::from("benchmark/results"),
            content_timeout_ms: 15_000,
            settle_ms: 500,
            case_timeout_ms: 120_000,
            viewport: (1280, 900),
        }
    }
}

impl BenchConfig {
    pub fn content_timeout(&self) -> Duration {
        Duration::from_millis(self.content_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn case_timeout(&self) -> Duration {
        Duration::from_millis(self.case_timeout_ms)
    }

    /// API endpoint the renderer writes widget files to.
    pub fn source_endpoint(&self) -> String {
        format!("{}/api/widget/source", self.base_url.trim_end_matches('/'))
    }
}
