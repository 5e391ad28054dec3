//! Export names of the stub libraries, loaded once per process.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::info;

use crate::compile::{sandbox, CompileErrorKind, WidgetCompileError};

/// Libraries listed in the catalog.
pub const CATALOG_LIBRARIES: [&str; 2] = ["recharts", "lucide-react"];

static CATALOG: OnceCell<LibraryCatalog> = OnceCell::const_new();
static LOADS: AtomicUsize = AtomicUsize::new(0);

/// Library name → sorted export names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryCatalog {
    pub libraries: BTreeMap<String, Vec<String>>,
}

impl LibraryCatalog {
    pub fn exports(&self, library: &str) -> Option<&[String]> {
        self.libraries.get(library).map(Vec::as_slice)
    }
}

/// Build the catalog from a fresh runtime. Blocking.
pub fn load_library_catalog() -> Result<LibraryCatalog, WidgetCompileError> {
    LOADS.fetch_add(1, Ordering::SeqCst);
    let mut libraries = BTreeMap::new();
    for library in CATALOG_LIBRARIES {
        let mut names = sandbox::library_export_names(library)?;
        names.sort();
        names.dedup();
        libraries.insert(library.to_string(), names);
    }
    Ok(LibraryCatalog { libraries })
}

/// The process-wide catalog. Concurrent first callers share one load.
pub async fn library_catalog() -> Result<&'static LibraryCatalog, WidgetCompileError> {
    CATALOG
        .get_or_try_init(|| async {
            let catalog = tokio::task::spawn_blocking(load_library_catalog)
                .await
                .map_err(|err| {
                    WidgetCompileError::new(CompileErrorKind::Evaluation, err.to_string())
                })??;
            info!(
                libraries = catalog.libraries.len(),
                "library catalog loaded"
            );
            Ok(catalog)
        })
        .await
}

/// How many times the catalog has been built in this process.
pub fn catalog_load_count() -> usize {
    LOADS.load(Ordering::SeqCst)
}
