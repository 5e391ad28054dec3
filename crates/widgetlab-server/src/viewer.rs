//! Server-rendered viewer page.

use std::sync::Arc;

use axum::extract::State;
use axum::response::Html;
use tracing::warn;
use widgetlab_core::compile::{instantiate, transform_widget, WidgetSource};
use widgetlab_core::markup::escape_text;
use widgetlab_core::render::ViewerView;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

const PAGE_STYLE: &str = "body{margin:0;font-family:system-ui,sans-serif;background:#f5f5f4}\
.viewer-widget-stage{display:inline-block;padding:16px}\
.error-panel{margin:16px;padding:12px 16px;border:1px solid #fca5a5;background:#fef2f2;color:#991b1b}\
.error-panel pre{white-space:pre-wrap;margin:0}\
.empty-state{margin:16px;color:#78716c}";

/// Compile and render the current widget into one viewer state.
pub async fn current_view(state: &AppState) -> ApiResult<ViewerView> {
    let current = state.store.read_widget_source().await?;
    let data_source = state.store.read_widget_data_source(current.origin).await?;
    let source = WidgetSource::new(current.source, data_source);

    let transformed = transform_widget(&source, &state.options).await;
    let options = Arc::clone(&state.options);
    let supervisor = Arc::clone(&state.supervisor);
    tokio::task::spawn_blocking(move || {
        let mut supervisor = supervisor.lock().unwrap_or_else(|p| p.into_inner());
        match transformed {
            Ok(transformed) => match instantiate(&transformed, &options) {
                Ok(mut widget) => supervisor.view(Ok(&mut widget)),
                Err(err) => supervisor.view(Err(&err)),
            },
            Err(err) => supervisor.view(Err(&err)),
        }
    })
    .await
    .map_err(|err| ApiError::Internal(format!("render task failed: {err}")))
}

pub fn page_html(view: &ViewerView, title: &str) -> String {
    format!(
        "<!doctype html><html><head><meta charset=\"utf-8\"><title>{}</title><style>{PAGE_STYLE}</style></head>\
<body data-view-state=\"{}\">{}</body></html>",
        escape_text(title),
        view.label(),
        view.to_html()
    )
}

pub async fn viewer_page(State(state): State<AppState>) -> ApiResult<Html<String>> {
    let view = current_view(&state).await?;
    if !view.is_rendered() {
        warn!(state = view.label(), "viewer shows no widget");
    }
    Ok(Html(page_html(&view, "widgetlab viewer")))
}
