use std::path::PathBuf;

use thiserror::Error;

/// Errors from the on-disk widget store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Invalid example id.")]
    InvalidExampleId,

    #[error("Invalid widget file name.")]
    InvalidWidgetFileName,

    #[error("Example \"{0}\" not found.")]
    ExampleNotFound(String),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the error comes from bad caller input rather than the filesystem.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            StoreError::InvalidExampleId | StoreError::InvalidWidgetFileName
        )
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            StoreError::ExampleNotFound(_) => true,
            StoreError::Io { source, .. } => source.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
