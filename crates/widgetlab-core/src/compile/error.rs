//! Error type for the compile pipeline.

use serde::{Deserialize, Serialize};

/// Message used when `data.json` is not valid JSON.
pub const INVALID_DATA_MESSAGE: &str = "data.json must contain valid JSON.";

/// Message used when the module has no default export.
pub const MISSING_DEFAULT_EXPORT_MESSAGE: &str =
    "widget.tsx must export a default React component.";

/// Message used when the default export is neither a function nor an object.
pub const INVALID_DEFAULT_EXPORT_MESSAGE: &str =
    "Default export from widget.tsx must be a renderable React component.";

/// Pipeline stage that produced a [`WidgetCompileError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompileErrorKind {
    /// `data.json` did not parse.
    Data,
    /// The TSX transform failed.
    Transform,
    /// `require` was called with a disallowed specifier.
    Policy,
    /// The default export is missing or not renderable.
    Export,
    /// Module code threw while executing.
    Evaluation,
}

impl std::fmt::Display for CompileErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompileErrorKind::Data => write!(f, "data"),
            CompileErrorKind::Transform => write!(f, "transform"),
            CompileErrorKind::Policy => write!(f, "policy"),
            CompileErrorKind::Export => write!(f, "export"),
            CompileErrorKind::Evaluation => write!(f, "evaluation"),
        }
    }
}

/// The single error every compile failure funnels into.
///
/// Callers display [`message`](Self::message); the text already names the failing
/// stage, so no branching on [`kind`](Self::kind) is required.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct WidgetCompileError {
    kind: CompileErrorKind,
    message: String,
}

impl WidgetCompileError {
    pub fn new(kind: CompileErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn invalid_data() -> Self {
        Self::new(CompileErrorKind::Data, INVALID_DATA_MESSAGE)
    }

    pub fn kind(&self) -> CompileErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
