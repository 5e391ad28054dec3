//! Host node tree and its HTML serialisation.
//!
//! The JS runtime expands a widget into plain `{tag, attrs, children}` objects; this
//! module turns them into markup using React DOM's attribute and style conventions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One node of an expanded widget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HostNode {
    Text(String),
    Element {
        tag: String,
        #[serde(default)]
        attrs: BTreeMap<String, Value>,
        #[serde(default)]
        children: Vec<HostNode>,
    },
}

impl HostNode {
    pub fn text(text: impl Into<String>) -> Self {
        HostNode::Text(text.into())
    }

    pub fn element(tag: impl Into<String>, children: Vec<HostNode>) -> Self {
        HostNode::Element {
            tag: tag.into(),
            attrs: BTreeMap::new(),
            children,
        }
    }

    /// Builder-style attribute setter for element nodes; text nodes are returned as-is.
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        if let HostNode::Element { attrs, .. } = &mut self {
            attrs.insert(name.into(), value.into());
        }
        self
    }
}

const VOID_ELEMENTS: [&str; 13] = [
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

const UNITLESS_PROPERTIES: [&str; 27] = [
    "animationIterationCount",
    "aspectRatio",
    "columnCount",
    "columns",
    "fillOpacity",
    "flex",
    "flexGrow",
    "flexNegative",
    "flexPositive",
    "flexShrink",
    "fontWeight",
    "gridArea",
    "gridColumn",
    "gridColumnEnd",
    "gridColumnStart",
    "gridRow",
    "gridRowEnd",
    "gridRowStart",
    "lineClamp",
    "lineHeight",
    "opacity",
    "order",
    "orphans",
    "strokeOpacity",
    "strokeWidth",
    "zIndex",
    "zoom",
];

/// React prop names that do not map to their lowercase or hyphenated form.
fn attribute_name(prop: &str) -> String {
    match prop {
        "className" => "class".to_string(),
        "htmlFor" => "for".to_string(),
        "tabIndex" | "readOnly" | "maxLength" | "minLength" | "colSpan" | "rowSpan"
        | "autoComplete" | "autoFocus" | "crossOrigin" | "srcSet" | "spellCheck"
        | "contentEditable" | "encType" | "accessKey" | "dateTime" | "cellPadding"
        | "cellSpacing" | "useMap" | "frameBorder" | "noValidate" | "formAction" => {
            prop.to_ascii_lowercase()
        }
        "strokeWidth" | "strokeLinecap" | "strokeLinejoin" | "strokeDasharray"
        | "strokeDashoffset" | "strokeOpacity" | "strokeMiterlimit" | "fillOpacity"
        | "fillRule" | "clipRule" | "clipPath" | "textAnchor" | "dominantBaseline"
        | "stopColor" | "stopOpacity" | "fontSize" | "fontFamily" | "fontWeight"
        | "alignmentBaseline" | "colorInterpolationFilters" | "floodColor" | "floodOpacity"
        | "vectorEffect" | "shapeRendering" | "textDecoration" | "letterSpacing" => {
            css_property_name(prop)
        }
        other => other.to_string(),
    }
}

/// CSS property for a camelCase style key: `fontSize` → `font-size`,
/// `WebkitTransform` → `-webkit-transform`, `msFlex` → `-ms-flex`.
/// Custom properties (`--accent`) pass through.
pub fn css_property_name(camel: &str) -> String {
    if camel.starts_with("--") {
        return camel.to_string();
    }
    let mut out = String::with_capacity(camel.len() + 4);
    for c in camel.chars() {
        if c.is_ascii_uppercase() {
            out.push('-');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn is_unitless(prop: &str) -> bool {
    prop.starts_with("--") || UNITLESS_PROPERTIES.contains(&prop)
}

fn style_value(prop: &str, value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => {
            let zero = n.as_f64().is_some_and(|f| f == 0.0);
            if zero || is_unitless(prop) {
                Some(n.to_string())
            } else {
                Some(format!("{n}px"))
            }
        }
        Value::Bool(true) => Some("true".to_string()),
        _ => None,
    }
}

/// Serialise a style object the way React DOM writes the `style` attribute.
pub fn style_to_css(style: &serde_json::Map<String, Value>) -> String {
    style
        .iter()
        .filter_map(|(prop, value)| {
            style_value(prop, value).map(|v| format!("{}:{}", css_property_name(prop), v))
        })
        .collect::<Vec<_>>()
        .join(";")
}

/// Parse an inline `style` attribute into hyphenated property → value pairs.
pub fn parse_inline_style(style: &str) -> BTreeMap<String, String> {
    split_declarations(style)
        .into_iter()
        .filter_map(|decl| {
            let (prop, value) = decl.split_once(':')?;
            let prop = prop.trim();
            if prop.is_empty() {
                return None;
            }
            let prop = if prop.starts_with("--") {
                prop.to_string()
            } else {
                prop.to_ascii_lowercase()
            };
            Some((prop, value.trim().to_string()))
        })
        .collect()
}

/// Split on `;` outside parentheses and quotes, so `url(data:...;base64,...)` stays whole.
fn split_declarations(style: &str) -> Vec<&str> {
    let mut decls = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;
    for (i, c) in style.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match (quote, c) {
            (_, '\\') => escaped = true,
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => depth = depth.saturating_sub(1),
            (None, ';') if depth == 0 => {
                decls.push(&style[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    decls.push(&style[start..]);
    decls
}

pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn escape_attr(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

fn write_attrs(out: &mut String, attrs: &BTreeMap<String, Value>) {
    for (prop, value) in attrs {
        if prop == "dangerouslySetInnerHTML" || prop == "children" {
            continue;
        }
        let name = attribute_name(prop);
        let stringified = name.starts_with("data-") || name.starts_with("aria-");
        let rendered = match (prop.as_str(), value) {
            ("style", Value::Object(style)) => {
                let css = style_to_css(style);
                if css.is_empty() {
                    continue;
                }
                css
            }
            (_, Value::Bool(b)) if stringified => b.to_string(),
            (_, Value::Bool(true)) => String::new(),
            (_, Value::Bool(false)) | (_, Value::Null) => continue,
            (_, Value::String(s)) => s.clone(),
            (_, Value::Number(n)) => n.to_string(),
            _ => continue,
        };
        out.push(' ');
        out.push_str(&name);
        out.push_str("=\"");
        out.push_str(&escape_attr(&rendered));
        out.push('"');
    }
}

fn write_node(out: &mut String, node: &HostNode) {
    match node {
        HostNode::Text(text) => out.push_str(&escape_text(text)),
        HostNode::Element {
            tag,
            attrs,
            children,
        } => {
            let tag = tag.as_str();
            out.push('<');
            out.push_str(tag);
            write_attrs(out, attrs);
            if VOID_ELEMENTS.contains(&tag) {
                out.push_str("/>");
                return;
            }
            out.push('>');
            let inner = attrs
                .get("dangerouslySetInnerHTML")
                .and_then(|v| v.get("__html"))
                .and_then(Value::as_str);
            match inner {
                Some(html) => out.push_str(html),
                None => {
                    for child in children {
                        write_node(out, child);
                    }
                }
            }
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
        }
    }
}

/// Render a list of sibling nodes to HTML.
pub fn render_html(nodes: &[HostNode]) -> String {
    let mut out = String::new();
    for node in nodes {
        write_node(&mut out, node);
    }
    out
}
