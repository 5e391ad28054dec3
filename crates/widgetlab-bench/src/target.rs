//! Selector resolution for rule targets.

use widgetlab_core::render::STAGE_SELECTOR;

use crate::rules::EvalTarget;

/// `[data-eid="<eid>"]` when an eid is present, otherwise the target's selector.
pub fn resolve_selector(target: &EvalTarget) -> String {
    match target.eid.as_deref() {
        Some(eid) if !eid.is_empty() => format!("[data-eid=\"{eid}\"]"),
        _ => target.selector.clone().unwrap_or_default(),
    }
}

/// Split a selector list on its top-level commas.
///
/// Commas inside `()`, `[]` or quotes belong to a single selector.
pub fn split_selector_list(selector: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;
    for (i, c) in selector.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match (quote, c) {
            (_, '\\') => escaped = true,
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '(' | '[') => depth += 1,
            (None, ')' | ']') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                parts.push(selector[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(selector[start..].trim());
    parts.retain(|part| !part.is_empty());
    parts
}

/// Scope `selector` to descendants of the render stage. Every branch of a selector list
/// is scoped, so no branch can match outside the stage.
pub fn scoped(selector: &str) -> String {
    scoped_descendants(&[], selector)
}

/// Scope `child` under `parent` under the render stage. Lists on either side expand to
/// every parent/child pairing.
pub fn scoped_within(parent: &str, child: &str) -> String {
    scoped_descendants(&split_selector_list(parent), child)
}

fn scoped_descendants(parents: &[&str], child: &str) -> String {
    let children = split_selector_list(child);
    let mut branches = Vec::new();
    for child in &children {
        if parents.is_empty() {
            branches.push(format!("{STAGE_SELECTOR} {child}"));
        }
        for parent in parents {
            branches.push(format!("{STAGE_SELECTOR} {parent} {child}"));
        }
    }
    if branches.is_empty() {
        return format!("{STAGE_SELECTOR} {}", child.trim());
    }
    branches.join(", ")
}

/// Scoped selector for `target`.
pub fn scoped_target(target: &EvalTarget) -> String {
    scoped(&resolve_selector(target))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eid_wins_over_selector() {
        let target = EvalTarget {
            selector: Some(".ignored".into()),
            eid: Some("hero".into()),
            description: "hero".into(),
        };
        assert_eq!(resolve_selector(&target), "[data-eid=\"hero\"]");
        assert_eq!(
            scoped_target(&target),
            ".viewer-widget-stage [data-eid=\"hero\"]"
        );
    }

    #[test]
    fn test_selector_used_without_eid() {
        let target = EvalTarget::selector(".card h2", "heading");
        assert_eq!(scoped_target(&target), ".viewer-widget-stage .card h2");
    }

    #[test]
    fn test_empty_eid_falls_back() {
        let target = EvalTarget {
            selector: Some("p".into()),
            eid: Some(String::new()),
            description: "p".into(),
        };
        assert_eq!(resolve_selector(&target), "p");
    }

    #[test]
    fn test_every_list_branch_is_scoped() {
        assert_eq!(
            scoped("h1, .title"),
            ".viewer-widget-stage h1, .viewer-widget-stage .title"
        );
        assert_eq!(
            scoped("li:is(.a, .b) , [title=\"x,y\"]"),
            ".viewer-widget-stage li:is(.a, .b), .viewer-widget-stage [title=\"x,y\"]"
        );
    }

    #[test]
    fn test_hierarchy_lists_expand_pairwise() {
        assert_eq!(
            scoped_within(".card, .panel", "h2"),
            ".viewer-widget-stage .card h2, .viewer-widget-stage .panel h2"
        );
    }
}
