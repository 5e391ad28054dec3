//! Widget renderers used by the orchestrator.

use std::path::Path;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use widgetlab_core::compile::{instantiate, transform_widget, CompileOptions, TransformedWidget};
use widgetlab_core::render::{RenderSupervisor, ViewerView};
use widgetlab_core::store::{DATA_FILE, DEFAULT_WIDGET_FILE};

use crate::page::{RenderedPage, StaticPage};

/// `widget.tsx` and `data.json` of one ground truth or submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetFiles {
    pub source: String,
    pub data_source: String,
}

impl WidgetFiles {
    pub fn new(source: impl Into<String>, data_source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            data_source: data_source.into(),
        }
    }

    /// Read `widget.tsx` and `data.json` from `dir`.
    pub async fn read(dir: &Path) -> Result<Self> {
        let widget = dir.join(DEFAULT_WIDGET_FILE);
        let data = dir.join(DATA_FILE);
        let source = tokio::fs::read_to_string(&widget)
            .await
            .with_context(|| format!("read {}", widget.display()))?;
        let data_source = tokio::fs::read_to_string(&data)
            .await
            .with_context(|| format!("read {}", data.display()))?;
        Ok(Self::new(source, data_source))
    }
}

/// Something that can show a widget and answer DOM queries about it.
#[async_trait]
pub trait WidgetRenderer: Send {
    /// Render `files`, replacing whatever was shown before. `viewport` is a
    /// width × height hint; renderers without a viewport ignore it.
    async fn load(&mut self, files: &WidgetFiles, viewport: Option<(u32, u32)>) -> Result<()>;

    /// PNG of the render stage, `None` when the renderer cannot take screenshots.
    async fn screenshot_stage(&mut self) -> Result<Option<Vec<u8>>>;

    /// The page of the last successful `load`.
    fn page(&self) -> &dyn RenderedPage;

    fn name(&self) -> &str;
}

/// In-process renderer: compile with widgetlab-core and expand to static HTML.
///
/// No layout engine is involved, so it cannot take screenshots and style rules only
/// see inline styles.
#[derive(Debug, Default)]
pub struct StaticRenderer {
    options: CompileOptions,
    page: StaticPage,
}

impl StaticRenderer {
    pub fn new(options: CompileOptions) -> Self {
        Self {
            options,
            page: StaticPage::default(),
        }
    }
}

// The compiled widget holds a JS context that is not `Send`, so evaluation stays in a
// plain function that never crosses an await.
fn render_view(transformed: &TransformedWidget, options: &CompileOptions) -> ViewerView {
    let mut supervisor = RenderSupervisor::new();
    match instantiate(transformed, options) {
        Ok(mut widget) => supervisor.view(Ok(&mut widget)),
        Err(err) => supervisor.view(Err(&err)),
    }
}

#[async_trait]
impl WidgetRenderer for StaticRenderer {
    async fn load(&mut self, files: &WidgetFiles, _viewport: Option<(u32, u32)>) -> Result<()> {
        let source = widgetlab_core::WidgetSource::new(&files.source, &files.data_source);
        let view = match transform_widget(&source, &self.options).await {
            Ok(transformed) => render_view(&transformed, &self.options),
            Err(err) => ViewerView::CompileError {
                message: err.message().to_string(),
            },
        };
        match &view {
            ViewerView::Rendered { .. } => {
                self.page
                    .set_html(format!("<html><body>{}</body></html>", view.to_html()));
                Ok(())
            }
            ViewerView::CompileError { message } | ViewerView::RuntimeError { message } => {
                bail!("widget {}: {message}", view.label())
            }
            ViewerView::Empty => bail!("widget rendered nothing"),
        }
    }

    async fn screenshot_stage(&mut self) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }

    fn page(&self) -> &dyn RenderedPage {
        &self.page
    }

    fn name(&self) -> &str {
        "static"
    }
}
