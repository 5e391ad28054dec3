//! Render supervision and the viewer's four mutually exclusive states.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::compile::{CompiledWidget, WidgetCompileError};
use crate::digest::SourceDigest;
use crate::markup::escape_text;

/// CSS class of the element that holds a rendered widget.
pub const STAGE_CLASS: &str = "viewer-widget-stage";

/// Selector for the render stage.
pub const STAGE_SELECTOR: &str = ".viewer-widget-stage";

/// Text shown when there is nothing to render.
pub const EMPTY_STATE_TEXT: &str =
    "Write a valid default component export in widget.tsx to render it.";

/// An exception thrown while rendering a compiled widget.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct RenderFault {
    message: String,
}

impl RenderFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Supervisor state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderState {
    Idle,
    Rendering { digest: SourceDigest },
    Faulted { digest: SourceDigest, fault: RenderFault },
}

/// Error boundary for widget renders.
///
/// A fault sticks to the source digest that produced it: rendering the same source again
/// returns the recorded fault without running the widget, and any new digest starts
/// from `Idle`.
#[derive(Debug)]
pub struct RenderSupervisor {
    state: RenderState,
}

impl Default for RenderSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderSupervisor {
    pub fn new() -> Self {
        Self {
            state: RenderState::Idle,
        }
    }

    pub fn state(&self) -> &RenderState {
        &self.state
    }

    /// The recorded fault, if the supervisor is faulted.
    pub fn fault(&self) -> Option<&RenderFault> {
        match &self.state {
            RenderState::Faulted { fault, .. } => Some(fault),
            _ => None,
        }
    }

    /// Forget any fault not belonging to `digest`.
    pub fn observe_source(&mut self, digest: SourceDigest) {
        let stale = match &self.state {
            RenderState::Idle => false,
            RenderState::Rendering { digest: current } => *current != digest,
            RenderState::Faulted { digest: current, .. } => *current != digest,
        };
        if stale {
            self.state = RenderState::Idle;
        }
    }

    /// Render `widget` to markup under supervision.
    pub fn render(&mut self, widget: &mut CompiledWidget) -> Result<String, RenderFault> {
        let digest = widget.digest();
        self.observe_source(digest);
        if let RenderState::Faulted { fault, .. } = &self.state {
            return Err(fault.clone());
        }

        self.state = RenderState::Rendering { digest };
        match widget.render_markup() {
            Ok(html) => {
                self.state = RenderState::Idle;
                Ok(html)
            }
            Err(fault) => {
                warn!(digest = %digest.short(), error = %fault, "widget render failed");
                self.state = RenderState::Faulted {
                    digest,
                    fault: fault.clone(),
                };
                Err(fault)
            }
        }
    }

    /// Compile result in, viewer state out.
    pub fn view(
        &mut self,
        compiled: Result<&mut CompiledWidget, &WidgetCompileError>,
    ) -> ViewerView {
        match compiled {
            Err(err) => ViewerView::CompileError {
                message: err.message().to_string(),
            },
            Ok(widget) => match self.render(widget) {
                Ok(html) if html.trim().is_empty() => ViewerView::Empty,
                Ok(html) => ViewerView::Rendered { html },
                Err(fault) => ViewerView::RuntimeError {
                    message: fault.message().to_string(),
                },
            },
        }
    }
}

/// What the viewer shows. Exactly one state at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ViewerView {
    CompileError { message: String },
    RuntimeError { message: String },
    Empty,
    Rendered { html: String },
}

impl ViewerView {
    /// Viewer markup. Compile errors and the empty state sit outside the stage;
    /// runtime errors replace the widget inside it.
    pub fn to_html(&self) -> String {
        match self {
            ViewerView::CompileError { message } => format!(
                "<div class=\"error-panel\"><h3>Compile Error</h3><pre>{}</pre></div>",
                escape_text(message)
            ),
            ViewerView::Empty => format!("<div class=\"empty-state\">{EMPTY_STATE_TEXT}</div>"),
            ViewerView::Rendered { html } => {
                format!("<div class=\"{STAGE_CLASS}\">{html}</div>")
            }
            ViewerView::RuntimeError { message } => format!(
                "<div class=\"{STAGE_CLASS}\"><div class=\"error-panel\"><h3>Runtime Error</h3><pre>{}</pre></div></div>",
                escape_text(message)
            ),
        }
    }

    pub fn is_rendered(&self) -> bool {
        matches!(self, ViewerView::Rendered { .. })
    }

    /// Short name for logs and JSON output.
    pub fn label(&self) -> &'static str {
        match self {
            ViewerView::CompileError { .. } => "compile_error",
            ViewerView::RuntimeError { .. } => "runtime_error",
            ViewerView::Empty => "empty",
            ViewerView::Rendered { .. } => "rendered",
        }
    }
}
