//! Import policy for widget modules.
//!
//! A widget is a single file: it may import the three whitelisted libraries and
//! its own `./data.json`, nothing else. The checks here are pure so that both the
//! sandboxed `require` and any tooling can share them.

use serde::{Deserialize, Serialize};

/// Library specifiers a widget may import.
pub const ALLOWED_IMPORTS: [&str; 3] = ["react", "recharts", "lucide-react"];

/// The only local specifier a widget may import.
pub const DATA_SPECIFIER: &str = "./data.json";

/// Why an import was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
    /// A relative or absolute path other than [`DATA_SPECIFIER`].
    Relative,
    /// A bare specifier that is not in [`ALLOWED_IMPORTS`].
    NotWhitelisted,
}

/// Outcome of checking one module specifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportVerdict {
    Allowed,
    Rejected { kind: RejectionKind, reason: String },
}

impl ImportVerdict {
    /// Returns `true` when the verdict is `Allowed`.
    pub fn is_allowed(&self) -> bool {
        matches!(self, ImportVerdict::Allowed)
    }

    /// The rejection message, if any.
    pub fn reason(&self) -> Option<&str> {
        match self {
            ImportVerdict::Allowed => None,
            ImportVerdict::Rejected { reason, .. } => Some(reason),
        }
    }
}

fn is_relative_specifier(specifier: &str) -> bool {
    specifier.starts_with('.') || specifier.starts_with('/')
}

/// Whether `specifier` is one of the whitelisted libraries.
pub fn is_allowed_import(specifier: &str) -> bool {
    ALLOWED_IMPORTS.contains(&specifier)
}

/// The whitelist as shown to widget authors: `react, recharts, lucide-react`.
pub fn allowed_imports_text() -> String {
    ALLOWED_IMPORTS.join(", ")
}

/// Check a specifier. Rules apply in order: the data file, relative paths,
/// the whitelist, then rejection.
pub fn evaluate_import(specifier: &str) -> ImportVerdict {
    if specifier == DATA_SPECIFIER {
        return ImportVerdict::Allowed;
    }

    if is_relative_specifier(specifier) {
        return ImportVerdict::Rejected {
            kind: RejectionKind::Relative,
            reason: format!(
                "Relative imports are not supported in widget.tsx: \"{specifier}\". Only \"{DATA_SPECIFIER}\" is allowed."
            ),
        };
    }

    if is_allowed_import(specifier) {
        return ImportVerdict::Allowed;
    }

    ImportVerdict::Rejected {
        kind: RejectionKind::NotWhitelisted,
        reason: format!(
            "Import \"{specifier}\" is not allowed. Allowed imports: {}.",
            allowed_imports_text()
        ),
    }
}

/// `None` when `specifier` is allowed, otherwise a message for the author.
pub fn validate_import_specifier(specifier: &str) -> Option<String> {
    match evaluate_import(specifier) {
        ImportVerdict::Allowed => None,
        ImportVerdict::Rejected { reason, .. } => Some(reason),
    }
}
