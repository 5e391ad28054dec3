//! DOM, text and style rule evaluators.
//!
//! Every selector is scoped under the render stage. A target that matches nothing is a
//! failed rule with a message, never an error; errors are reserved for a page that
//! cannot be queried at all.

use anyhow::Result;
use widgetlab_core::markup::css_property_name;

use crate::page::RenderedPage;
use crate::rules::{CountOp, EvalRule, EvalTarget, RuleResult};
use crate::target::{resolve_selector, scoped, scoped_within};

const TEXT_PREVIEW_CHARS: usize = 200;

pub async fn eval_exists(
    page: &dyn RenderedPage,
    rule: &EvalRule,
    target: &EvalTarget,
) -> Result<RuleResult> {
    let selector = resolve_selector(target);
    let count = page.count(&scoped(&selector)).await?;
    let pass = count > 0;
    let message = if pass {
        format!("Found \"{}\" ({selector})", target.description)
    } else {
        format!("Missing \"{}\" ({selector})", target.description)
    };
    Ok(RuleResult::new(rule, pass, message))
}

pub async fn eval_count(
    page: &dyn RenderedPage,
    rule: &EvalRule,
    selector: &str,
    description: &str,
    expected: usize,
    op: CountOp,
) -> Result<RuleResult> {
    let count = page.count(&scoped(selector)).await?;
    let pass = op.check(count, expected);
    let verdict = if pass { "passed" } else { "failed" };
    Ok(RuleResult::new(
        rule,
        pass,
        format!(
            "Count check {verdict}: \"{description}\" found {count} (expected {op} {expected})"
        ),
    ))
}

pub async fn eval_hierarchy(
    page: &dyn RenderedPage,
    rule: &EvalRule,
    parent: &EvalTarget,
    child: &EvalTarget,
) -> Result<RuleResult> {
    let selector = scoped_within(&resolve_selector(parent), &resolve_selector(child));
    let count = page.count(&selector).await?;
    let pass = count > 0;
    let message = if pass {
        format!(
            "Hierarchy check passed: \"{}\" found inside \"{}\"",
            child.description, parent.description
        )
    } else {
        format!(
            "Hierarchy check failed: \"{}\" not found inside \"{}\"",
            child.description, parent.description
        )
    };
    Ok(RuleResult::new(rule, pass, message))
}

/// Shared by `text-contains` and `text-exists`.
pub async fn eval_text_contains(
    page: &dyn RenderedPage,
    rule: &EvalRule,
    target: &EvalTarget,
    expected: &str,
) -> Result<RuleResult> {
    let selector = resolve_selector(target);
    let Some(text) = page.first_text(&scoped(&selector)).await? else {
        return Ok(RuleResult::new(
            rule,
            false,
            format!(
                "Text check failed: element \"{}\" ({selector}) not found",
                target.description
            ),
        ));
    };

    let pass = text.contains(expected);
    let message = if pass {
        format!("Text contains \"{expected}\" in \"{}\"", target.description)
    } else {
        let preview: String = text.chars().take(TEXT_PREVIEW_CHARS).collect();
        format!(
            "Text does not contain \"{expected}\" in \"{}\" (got: \"{preview}\")",
            target.description
        )
    };
    Ok(RuleResult::new(rule, pass, message))
}

pub async fn eval_style(
    page: &dyn RenderedPage,
    rule: &EvalRule,
    target: &EvalTarget,
    property: &str,
    expected: &str,
) -> Result<RuleResult> {
    let selector = resolve_selector(target);
    let css_property = css_property_name(property);
    let Some(actual) = page
        .first_computed_style(&scoped(&selector), &css_property)
        .await?
    else {
        return Ok(RuleResult::new(
            rule,
            false,
            format!(
                "Style check failed: element \"{}\" ({selector}) not found",
                target.description
            ),
        ));
    };

    let pass = actual == expected;
    Ok(RuleResult::new(
        rule,
        pass,
        format!(
            "Style \"{property}\" on \"{}\" = \"{actual}\" (expected \"{expected}\")",
            target.description
        ),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::StaticPage;

    fn page() -> StaticPage {
        StaticPage::new(
            r#"<div class="viewer-widget-stage">
                 <section data-eid="card" class="card">
                   <h1 style="font-weight:700">Paris</h1>
                   <span class="day">Mon</span><span class="day">Tue</span>
                 </section>
               </div>
               <h2 class="outside">Outside</h2>"#,
        )
    }

    #[tokio::test]
    async fn test_exists_is_scoped_to_stage() {
        let target = EvalTarget::selector(".outside", "outside heading");
        let rule = EvalRule::Exists { target: target.clone() };
        let result = eval_exists(&page(), &rule, &target).await.unwrap();
        assert!(!result.pass);
        assert_eq!(result.message, "Missing \"outside heading\" (.outside)");
    }

    #[tokio::test]
    async fn test_selector_list_stays_inside_stage() {
        let rule = EvalRule::Count {
            selector: ".day, .outside".into(),
            description: "days".into(),
            expected: 2,
            op: CountOp::Eq,
        };
        let result = eval_count(&page(), &rule, ".day, .outside", "days", 2, CountOp::Eq)
            .await
            .unwrap();
        assert!(result.pass, "{}", result.message);
    }

    #[tokio::test]
    async fn test_exists_by_eid() {
        let target = EvalTarget::eid("card", "card");
        let rule = EvalRule::Exists { target: target.clone() };
        let result = eval_exists(&page(), &rule, &target).await.unwrap();
        assert!(result.pass);
        assert_eq!(result.message, "Found \"card\" ([data-eid=\"card\"])");
    }

    #[tokio::test]
    async fn test_hierarchy() {
        let parent = EvalTarget::eid("card", "card");
        let child = EvalTarget::selector("h1", "title");
        let rule = EvalRule::Hierarchy { parent: parent.clone(), child: child.clone() };
        let result = eval_hierarchy(&page(), &rule, &parent, &child).await.unwrap();
        assert!(result.pass);
        assert_eq!(result.message, "Hierarchy check passed: \"title\" found inside \"card\"");

        let stray = EvalTarget::selector("table", "table");
        let result = eval_hierarchy(&page(), &rule, &parent, &stray).await.unwrap();
        assert!(!result.pass);
        assert_eq!(result.message, "Hierarchy check failed: \"table\" not found inside \"card\"");
    }

    #[tokio::test]
    async fn test_text_mismatch_shows_preview() {
        let target = EvalTarget::selector("h1", "title");
        let rule = EvalRule::TextContains { target: target.clone(), expected: "London".into() };
        let result = eval_text_contains(&page(), &rule, &target, "London").await.unwrap();
        assert!(!result.pass);
        assert_eq!(
            result.message,
            "Text does not contain \"London\" in \"title\" (got: \"Paris\")"
        );
    }

    #[tokio::test]
    async fn test_text_missing_element_fails_without_error() {
        let target = EvalTarget::selector(".nope", "ghost");
        let rule = EvalRule::TextExists { target: target.clone(), expected: "x".into() };
        let result = eval_text_contains(&page(), &rule, &target, "x").await.unwrap();
        assert!(!result.pass);
        assert_eq!(result.message, "Text check failed: element \"ghost\" (.nope) not found");
    }

    #[tokio::test]
    async fn test_style_camel_case_property() {
        let target = EvalTarget::selector("h1", "title");
        let rule = EvalRule::Style {
            target: target.clone(),
            property: "fontWeight".into(),
            expected: "700".into(),
        };
        let result = eval_style(&page(), &rule, &target, "fontWeight", "700").await.unwrap();
        assert!(result.pass, "{}", result.message);
        assert_eq!(
            result.message,
            "Style \"fontWeight\" on \"title\" = \"700\" (expected \"700\")"
        );
    }

    #[tokio::test]
    async fn test_style_missing_element() {
        let target = EvalTarget::selector(".nope", "ghost");
        let rule = EvalRule::Style {
            target: target.clone(),
            property: "color".into(),
            expected: "red".into(),
        };
        let result = eval_style(&page(), &rule, &target, "color", "red").await.unwrap();
        assert!(!result.pass);
        assert_eq!(result.message, "Style check failed: element \"ghost\" (.nope) not found");
    }
}
