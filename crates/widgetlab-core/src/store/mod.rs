//! File-backed widget storage under a project root.
//!
//! Layout:
//!
//! ```text
//! <root>/widget.example.tsx        bundled example
//! <root>/data.example.json
//! <root>/.local/widget.tsx          working copy (wins when present)
//! <root>/.local/data.json
//! <root>/.local/snapshots/<stamp>-<name>/{widget.tsx,data.json}
//! <root>/examples/<id>/{widget.tsx,widget.*.tsx,data.json}
//! ```

pub mod error;

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::NaiveDateTime;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub use error::{StoreError, StoreResult};

/// Default widget file inside an example folder.
pub const DEFAULT_WIDGET_FILE: &str = "widget.tsx";
/// Data file inside an example or snapshot folder.
pub const DATA_FILE: &str = "data.json";

/// Where the widget currently being edited came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WidgetOrigin {
    Local,
    Example,
}

impl std::fmt::Display for WidgetOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WidgetOrigin::Local => write!(f, "local"),
            WidgetOrigin::Example => write!(f, "example"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetSourceResult {
    pub origin: WidgetOrigin,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamedSnapshot {
    pub dir_name: String,
    pub dir_path: PathBuf,
    pub widget_file_path: PathBuf,
    pub data_file_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WidgetExample {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetExampleSource {
    pub id: String,
    pub name: String,
    pub widget_file_name: String,
    pub widget_files: Vec<String>,
    pub source: String,
    pub data_source: String,
}

/// Resolved paths for one project root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetStorePaths {
    pub example_file: PathBuf,
    pub example_data_file: PathBuf,
    pub local_file: PathBuf,
    pub local_data_file: PathBuf,
    pub snapshots_dir: PathBuf,
    pub examples_dir: PathBuf,
}

impl WidgetStorePaths {
    pub fn resolve(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        let local = root.join(".local");
        Self {
            example_file: root.join("widget.example.tsx"),
            example_data_file: root.join("data.example.json"),
            local_file: local.join("widget.tsx"),
            local_data_file: local.join("data.json"),
            snapshots_dir: local.join("snapshots"),
            examples_dir: root.join("examples"),
        }
    }
}

fn example_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9._-]*$").expect("valid regex"))
}

fn widget_file_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^widget(\.[a-zA-Z0-9_-]+)*\.tsx$").expect("valid regex")
    })
}

pub fn is_valid_example_id(id: &str) -> bool {
    example_id_pattern().is_match(id) && !id.contains("..")
}

pub fn is_valid_widget_file_name(name: &str) -> bool {
    widget_file_pattern().is_match(name)
}

/// `alpha-demo` → `Alpha Demo`.
pub fn example_display_name(id: &str) -> String {
    id.split(['-', '_'])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Make a user-supplied snapshot name safe for use as a directory name.
pub fn sanitize_snapshot_name(name: &str) -> String {
    static RULES: OnceLock<[Regex; 5]> = OnceLock::new();
    let rules = RULES.get_or_init(|| {
        [
            Regex::new(r"[^a-zA-Z0-9._\s-]").expect("valid regex"),
            Regex::new(r"\s+").expect("valid regex"),
            Regex::new(r"-+").expect("valid regex"),
            Regex::new(r"^\.+").expect("valid regex"),
            Regex::new(r"[.-]+$").expect("valid regex"),
        ]
    });
    let mut out = name.trim().to_string();
    out = rules[0].replace_all(&out, "-").into_owned();
    out = rules[1].replace_all(&out, "-").into_owned();
    out = rules[2].replace_all(&out, "-").into_owned();
    out = rules[3].replace(&out, "").into_owned();
    out = rules[4].replace(&out, "").into_owned();
    if out.is_empty() {
        "widget".to_string()
    } else {
        out
    }
}

pub fn format_snapshot_timestamp(now: NaiveDateTime) -> String {
    now.format("%Y%m%d-%H%M%S").to_string()
}

async fn read_text(path: &Path) -> StoreResult<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|err| StoreError::io(path, err))
}

async fn read_optional(path: &Path) -> StoreResult<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Ok(Some(text)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(StoreError::io(path, err)),
    }
}

async fn write_text(path: &Path, text: &str) -> StoreResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|err| StoreError::io(parent, err))?;
    }
    tokio::fs::write(path, text)
        .await
        .map_err(|err| StoreError::io(path, err))
}

async fn delete_if_exists(path: &Path) -> StoreResult<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(StoreError::io(path, err)),
    }
}

/// Reads and writes widgets for one project root.
#[derive(Debug, Clone)]
pub struct WidgetStore {
    paths: WidgetStorePaths,
}

impl WidgetStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            paths: WidgetStorePaths::resolve(root),
        }
    }

    pub fn paths(&self) -> &WidgetStorePaths {
        &self.paths
    }

    pub async fn read_example_source(&self) -> StoreResult<String> {
        read_text(&self.paths.example_file).await
    }

    pub async fn read_example_data_source(&self) -> StoreResult<String> {
        read_text(&self.paths.example_data_file).await
    }

    /// The local working copy if present, otherwise the bundled example.
    pub async fn read_widget_source(&self) -> StoreResult<WidgetSourceResult> {
        if let Some(source) = read_optional(&self.paths.local_file).await? {
            return Ok(WidgetSourceResult {
                origin: WidgetOrigin::Local,
                source,
            });
        }
        Ok(WidgetSourceResult {
            origin: WidgetOrigin::Example,
            source: self.read_example_source().await?,
        })
    }

    /// Data matching `origin`; a local widget without local data falls back to the example data.
    pub async fn read_widget_data_source(&self, origin: WidgetOrigin) -> StoreResult<String> {
        if origin == WidgetOrigin::Local {
            if let Some(data) = read_optional(&self.paths.local_data_file).await? {
                return Ok(data);
            }
        }
        self.read_example_data_source().await
    }

    pub async fn write_widget_source(&self, source: &str, data_source: &str) -> StoreResult<()> {
        write_text(&self.paths.local_file, source).await?;
        write_text(&self.paths.local_data_file, data_source).await?;
        debug!(path = %self.paths.local_file.display(), "local widget saved");
        Ok(())
    }

    /// Save as the working copy and as a timestamped snapshot.
    pub async fn save_named_snapshot(
        &self,
        source: &str,
        data_source: &str,
        name: &str,
        now: NaiveDateTime,
    ) -> StoreResult<NamedSnapshot> {
        let dir_name = format!(
            "{}-{}",
            format_snapshot_timestamp(now),
            sanitize_snapshot_name(name)
        );
        let dir_path = self.paths.snapshots_dir.join(&dir_name);
        let widget_file_path = dir_path.join(DEFAULT_WIDGET_FILE);
        let data_file_path = dir_path.join(DATA_FILE);

        self.write_widget_source(source, data_source).await?;
        write_text(&widget_file_path, source).await?;
        write_text(&data_file_path, data_source).await?;
        debug!(snapshot = %dir_name, "widget snapshot saved");

        Ok(NamedSnapshot {
            dir_name,
            dir_path,
            widget_file_path,
            data_file_path,
        })
    }

    /// Remove the working copy. Missing files are not an error.
    pub async fn delete_local_widget_source(&self) -> StoreResult<()> {
        delete_if_exists(&self.paths.local_file).await?;
        delete_if_exists(&self.paths.local_data_file).await
    }

    async fn widget_files_in(dir: &Path) -> StoreResult<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(StoreError::io(dir, err)),
        };
        let mut others = Vec::new();
        let mut has_default = false;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| StoreError::io(dir, err))?
        {
            let is_file = entry
                .file_type()
                .await
                .map(|t| t.is_file())
                .unwrap_or(false);
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if !is_file || !is_valid_widget_file_name(&name) {
                continue;
            }
            if name == DEFAULT_WIDGET_FILE {
                has_default = true;
            } else {
                others.push(name);
            }
        }
        others.sort();
        let mut files = Vec::with_capacity(others.len() + 1);
        if has_default {
            files.push(DEFAULT_WIDGET_FILE.to_string());
        }
        files.extend(others);
        Ok(files)
    }

    /// Example folders that contain `data.json` and at least one widget file, sorted by id.
    pub async fn list_examples(&self) -> StoreResult<Vec<WidgetExample>> {
        let dir = &self.paths.examples_dir;
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(StoreError::io(dir, err)),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| StoreError::io(dir, err))?
        {
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            let Ok(id) = entry.file_name().into_string() else {
                continue;
            };
            if !is_dir || !is_valid_example_id(&id) {
                continue;
            }
            let path = entry.path();
            let has_data = tokio::fs::metadata(path.join(DATA_FILE))
                .await
                .map(|m| m.is_file())
                .unwrap_or(false);
            if has_data && !Self::widget_files_in(&path).await?.is_empty() {
                ids.push(id);
            }
        }
        ids.sort();

        Ok(ids
            .into_iter()
            .map(|id| WidgetExample {
                name: example_display_name(&id),
                id,
            })
            .collect())
    }

    /// Widget files of one example: `widget.tsx` first, then the rest by name.
    pub async fn list_example_widget_files(&self, id: &str) -> StoreResult<Vec<String>> {
        if !is_valid_example_id(id) {
            return Err(StoreError::InvalidExampleId);
        }
        Self::widget_files_in(&self.paths.examples_dir.join(id)).await
    }

    /// Read one example. `file` defaults to the first listed widget file.
    pub async fn read_example(
        &self,
        id: &str,
        file: Option<&str>,
    ) -> StoreResult<WidgetExampleSource> {
        if !is_valid_example_id(id) {
            return Err(StoreError::InvalidExampleId);
        }
        if let Some(file) = file {
            if !is_valid_widget_file_name(file) {
                return Err(StoreError::InvalidWidgetFileName);
            }
        }

        let dir = self.paths.examples_dir.join(id);
        let widget_files = Self::widget_files_in(&dir).await?;
        let widget_file_name = match file {
            Some(file) if widget_files.iter().any(|f| f == file) => file.to_string(),
            Some(_) => return Err(StoreError::ExampleNotFound(id.to_string())),
            None => widget_files
                .first()
                .cloned()
                .ok_or_else(|| StoreError::ExampleNotFound(id.to_string()))?,
        };

        let source = read_text(&dir.join(&widget_file_name)).await?;
        let data_source = match read_optional(&dir.join(DATA_FILE)).await? {
            Some(data) => data,
            None => return Err(StoreError::ExampleNotFound(id.to_string())),
        };

        Ok(WidgetExampleSource {
            id: id.to_string(),
            name: example_display_name(id),
            widget_file_name,
            widget_files,
            source,
            data_source,
        })
    }
}
