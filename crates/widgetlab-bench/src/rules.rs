//! Benchmark case configuration (`meta/eval.json`) and rule results.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// The element a rule inspects. `eid` wins over `selector` when both are given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalTarget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eid: Option<String>,
    pub description: String,
}

impl EvalTarget {
    pub fn selector(selector: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            selector: Some(selector.into()),
            eid: None,
            description: description.into(),
        }
    }

    pub fn eid(eid: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            selector: None,
            eid: Some(eid.into()),
            description: description.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CountOp {
    Eq,
    Gte,
    Lte,
}

impl CountOp {
    pub fn check(self, actual: usize, expected: usize) -> bool {
        match self {
            CountOp::Eq => actual == expected,
            CountOp::Gte => actual >= expected,
            CountOp::Lte => actual <= expected,
        }
    }
}

impl std::fmt::Display for CountOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CountOp::Eq => write!(f, "eq"),
            CountOp::Gte => write!(f, "gte"),
            CountOp::Lte => write!(f, "lte"),
        }
    }
}

/// One assertion against a rendered submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum EvalRule {
    Exists {
        target: EvalTarget,
    },
    Count {
        selector: String,
        description: String,
        expected: usize,
        op: CountOp,
    },
    Hierarchy {
        parent: EvalTarget,
        child: EvalTarget,
    },
    TextContains {
        target: EvalTarget,
        expected: String,
    },
    /// Same check as `TextContains`; kept as a separate name for case authors.
    TextExists {
        target: EvalTarget,
        expected: String,
    },
    Style {
        target: EvalTarget,
        property: String,
        expected: String,
    },
    Screenshot {
        #[serde(rename = "maxPixelDiffPercent")]
        max_pixel_diff_percent: f64,
        #[serde(rename = "viewportWidth", default, skip_serializing_if = "Option::is_none")]
        viewport_width: Option<u32>,
        #[serde(rename = "viewportHeight", default, skip_serializing_if = "Option::is_none")]
        viewport_height: Option<u32>,
    },
}

impl EvalRule {
    /// The `type` tag as written in `eval.json`.
    pub fn type_name(&self) -> &'static str {
        match self {
            EvalRule::Exists { .. } => "exists",
            EvalRule::Count { .. } => "count",
            EvalRule::Hierarchy { .. } => "hierarchy",
            EvalRule::TextContains { .. } => "text-contains",
            EvalRule::TextExists { .. } => "text-exists",
            EvalRule::Style { .. } => "style",
            EvalRule::Screenshot { .. } => "screenshot",
        }
    }

    fn targets(&self) -> Vec<&EvalTarget> {
        match self {
            EvalRule::Exists { target }
            | EvalRule::TextContains { target, .. }
            | EvalRule::TextExists { target, .. }
            | EvalRule::Style { target, .. } => vec![target],
            EvalRule::Hierarchy { parent, child } => vec![parent, child],
            EvalRule::Count { .. } | EvalRule::Screenshot { .. } => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Subtask {
    InstructionOnly,
    InstructionImageTarget,
    InstructionImageReference,
}

impl Subtask {
    pub fn as_str(self) -> &'static str {
        match self {
            Subtask::InstructionOnly => "instruction-only",
            Subtask::InstructionImageTarget => "instruction-image-target",
            Subtask::InstructionImageReference => "instruction-image-reference",
        }
    }
}

impl std::fmt::Display for Subtask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Contents of `meta/eval.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvalConfig {
    pub case_id: String,
    pub name: String,
    pub subtask: Subtask,
    pub rules: Vec<EvalRule>,
}

impl EvalConfig {
    /// Reject configurations that would make rules meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.case_id.trim().is_empty() {
            bail!("caseId must not be empty");
        }
        for (index, rule) in self.rules.iter().enumerate() {
            for target in rule.targets() {
                let has_eid = target.eid.as_deref().is_some_and(|e| !e.is_empty());
                let has_selector = target.selector.as_deref().is_some_and(|s| !s.trim().is_empty());
                if !has_eid && !has_selector {
                    bail!(
                        "rule {index} ({}): target \"{}\" needs a selector or an eid",
                        rule.type_name(),
                        target.description
                    );
                }
            }
            match rule {
                EvalRule::Count { selector, .. } if selector.trim().is_empty() => {
                    bail!("rule {index} (count): selector must not be empty")
                }
                EvalRule::Screenshot {
                    max_pixel_diff_percent,
                    ..
                } if !(0.0..=100.0).contains(max_pixel_diff_percent) => {
                    bail!("rule {index} (screenshot): maxPixelDiffPercent must be within 0..=100")
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Parse and validate an `eval.json` document.
pub fn parse_eval_config(text: &str) -> Result<EvalConfig> {
    let config: EvalConfig = serde_json::from_str(text).context("parse eval config")?;
    config.validate()?;
    Ok(config)
}

/// Load `meta/eval.json` from disk.
pub async fn load_eval_config(path: &Path) -> Result<EvalConfig> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("read {}", path.display()))?;
    parse_eval_config(&text).with_context(|| format!("invalid eval config {}", path.display()))
}

/// Outcome of one rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleResult {
    pub rule: EvalRule,
    pub pass: bool,
    pub message: String,
}

impl RuleResult {
    pub fn new(rule: &EvalRule, pass: bool, message: impl Into<String>) -> Self {
        Self {
            rule: rule.clone(),
            pass,
            message: message.into(),
        }
    }
}
