//! Rule dispatch.

use std::path::PathBuf;

use anyhow::Result;

use crate::evaluators::{eval_count, eval_exists, eval_hierarchy, eval_style, eval_text_contains};
use crate::page::RenderedPage;
use crate::rules::{EvalRule, RuleResult, Subtask};
use crate::visual::eval_screenshot;

/// Files and task metadata a rule may need besides the page.
#[derive(Debug, Clone)]
pub struct EvalContext {
    pub gt_screenshot: PathBuf,
    pub submission_screenshot: PathBuf,
    pub diff_path: PathBuf,
    pub subtask: Subtask,
}

/// Evaluate one rule against a rendered page.
pub async fn evaluate_rule(
    page: &dyn RenderedPage,
    rule: &EvalRule,
    ctx: &EvalContext,
) -> Result<RuleResult> {
    match rule {
        EvalRule::Exists { target } => eval_exists(page, rule, target).await,
        EvalRule::Count {
            selector,
            description,
            expected,
            op,
        } => eval_count(page, rule, selector, description, *expected, *op).await,
        EvalRule::Hierarchy { parent, child } => eval_hierarchy(page, rule, parent, child).await,
        EvalRule::TextContains { target, expected } | EvalRule::TextExists { target, expected } => {
            eval_text_contains(page, rule, target, expected).await
        }
        EvalRule::Style {
            target,
            property,
            expected,
        } => eval_style(page, rule, target, property, expected).await,
        EvalRule::Screenshot {
            max_pixel_diff_percent,
            ..
        } => {
            // Reference images are inspiration, not a pixel target.
            if ctx.subtask == Subtask::InstructionImageReference {
                return Ok(RuleResult::new(
                    rule,
                    true,
                    "Screenshot comparison skipped for instruction-image-reference subtask",
                ));
            }
            eval_screenshot(
                rule,
                *max_pixel_diff_percent,
                &ctx.gt_screenshot,
                &ctx.submission_screenshot,
                &ctx.diff_path,
            )
            .await
        }
    }
}

/// Evaluate every rule in order. An evaluator error becomes a failed result so one
/// broken rule does not hide the others.
pub async fn evaluate_rules(
    page: &dyn RenderedPage,
    rules: &[EvalRule],
    ctx: &EvalContext,
) -> Vec<RuleResult> {
    let mut results = Vec::with_capacity(rules.len());
    for rule in rules {
        let result = match evaluate_rule(page, rule, ctx).await {
            Ok(result) => result,
            Err(err) => RuleResult::new(rule, false, format!("Rule evaluation error: {err:#}")),
        };
        results.push(result);
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::StaticPage;
    use crate::rules::EvalTarget;

    fn ctx(subtask: Subtask) -> EvalContext {
        EvalContext {
            gt_screenshot: PathBuf::from("/nonexistent/gt/target.png"),
            submission_screenshot: PathBuf::from("/nonexistent/submission/widget.png"),
            diff_path: PathBuf::from("/nonexistent/diff.png"),
            subtask,
        }
    }

    fn screenshot() -> EvalRule {
        EvalRule::Screenshot {
            max_pixel_diff_percent: 1.0,
            viewport_width: None,
            viewport_height: None,
        }
    }

    #[tokio::test]
    async fn test_screenshot_skipped_for_reference_subtask() {
        let page = StaticPage::default();
        let result = evaluate_rule(&page, &screenshot(), &ctx(Subtask::InstructionImageReference))
            .await
            .unwrap();
        assert!(result.pass);
        assert_eq!(
            result.message,
            "Screenshot comparison skipped for instruction-image-reference subtask"
        );
    }

    #[tokio::test]
    async fn test_screenshot_missing_ground_truth() {
        let page = StaticPage::default();
        let result = evaluate_rule(&page, &screenshot(), &ctx(Subtask::InstructionOnly))
            .await
            .unwrap();
        assert!(!result.pass);
        assert_eq!(
            result.message,
            "Screenshot comparison failed: ground truth screenshot not found at /nonexistent/gt/target.png"
        );
    }

    #[tokio::test]
    async fn test_evaluator_error_becomes_failed_result() {
        let page = StaticPage::new(r#"<div class="viewer-widget-stage"><p>x</p></div>"#);
        let rules = vec![
            EvalRule::Exists {
                target: EvalTarget::selector("p[", "broken"),
            },
            EvalRule::Exists {
                target: EvalTarget::selector("p", "paragraph"),
            },
        ];
        let results = evaluate_rules(&page, &rules, &ctx(Subtask::InstructionOnly)).await;
        assert_eq!(results.len(), 2);
        assert!(!results[0].pass);
        assert!(results[0].message.starts_with("Rule evaluation error:"));
        assert!(results[1].pass);
    }
}
