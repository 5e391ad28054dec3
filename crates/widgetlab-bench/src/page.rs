//! The queries rule evaluators run against a rendered widget.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use scraper::{Html, Selector};
use widgetlab_core::markup::{css_property_name, parse_inline_style};

/// Read-only view of a rendered page.
#[async_trait]
pub trait RenderedPage: Send + Sync {
    /// Number of elements matching `selector`.
    async fn count(&self, selector: &str) -> Result<usize>;

    /// `textContent` of the first match, `None` when nothing matches.
    async fn first_text(&self, selector: &str) -> Result<Option<String>>;

    /// Style value of `property` (hyphenated) on the first match, `None` when nothing matches.
    async fn first_computed_style(&self, selector: &str, property: &str) -> Result<Option<String>>;
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|err| anyhow!("invalid selector {selector:?}: {err}"))
}

/// A page backed by static HTML.
///
/// Styles come from the inline `style` attribute only; there is no cascade, so rules
/// that depend on stylesheets need the browser-backed page.
#[derive(Debug, Clone, Default)]
pub struct StaticPage {
    html: String,
}

impl StaticPage {
    pub fn new(html: impl Into<String>) -> Self {
        Self { html: html.into() }
    }

    pub fn html(&self) -> &str {
        &self.html
    }

    pub fn set_html(&mut self, html: impl Into<String>) {
        self.html = html.into();
    }

    fn document(&self) -> Html {
        Html::parse_document(&self.html)
    }
}

impl StaticPage {
    fn query_count(&self, selector: &str) -> Result<usize> {
        let selector = parse_selector(selector)?;
        Ok(self.document().select(&selector).count())
    }

    fn query_text(&self, selector: &str) -> Result<Option<String>> {
        let selector = parse_selector(selector)?;
        let document = self.document();
        let text = document
            .select(&selector)
            .next()
            .map(|el| el.text().collect::<String>());
        Ok(text)
    }

    fn query_style(&self, selector: &str, property: &str) -> Result<Option<String>> {
        let selector = parse_selector(selector)?;
        let document = self.document();
        let Some(element) = document.select(&selector).next() else {
            return Ok(None);
        };
        let declared = element
            .value()
            .attr("style")
            .map(parse_inline_style)
            .unwrap_or_default();
        let property = css_property_name(property);
        Ok(Some(declared.get(&property).cloned().unwrap_or_default()))
    }
}

// scraper documents are not `Send`; every query parses and drops its own.
#[async_trait]
impl RenderedPage for StaticPage {
    async fn count(&self, selector: &str) -> Result<usize> {
        self.query_count(selector)
    }

    async fn first_text(&self, selector: &str) -> Result<Option<String>> {
        self.query_text(selector)
    }

    async fn first_computed_style(&self, selector: &str, property: &str) -> Result<Option<String>> {
        self.query_style(selector, property)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><body>
        <div class="viewer-widget-stage">
          <ul class="list"><li>a</li><li style="font-weight: 700; color: red">b <b>bold</b></li></ul>
        </div>
    </body></html>"#;

    #[tokio::test]
    async fn test_count_and_text() {
        let page = StaticPage::new(PAGE);
        assert_eq!(page.count(".viewer-widget-stage li").await.unwrap(), 2);
        assert_eq!(page.count(".viewer-widget-stage table").await.unwrap(), 0);
        assert_eq!(
            page.first_text(".viewer-widget-stage li:nth-child(2)").await.unwrap(),
            Some("b bold".to_string())
        );
        assert_eq!(page.first_text(".missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_inline_style_lookup() {
        let page = StaticPage::new(PAGE);
        let weight = page
            .first_computed_style(".viewer-widget-stage li:nth-child(2)", "font-weight")
            .await
            .unwrap();
        assert_eq!(weight.as_deref(), Some("700"));
        let unset = page
            .first_computed_style(".viewer-widget-stage li", "color")
            .await
            .unwrap();
        assert_eq!(unset.as_deref(), Some(""));
    }

    #[tokio::test]
    async fn test_invalid_selector_is_error() {
        let page = StaticPage::new(PAGE);
        assert!(page.count("li[").await.is_err());
    }
}
