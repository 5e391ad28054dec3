//! Compile-and-evaluate pipeline for widget sources.
//!
//! `widget.tsx` + `data.json` go through four steps: parse the data, transform the TSX
//! into CommonJS, evaluate the module with a restricted `require`, and pull out the
//! default export. Every failure along the way becomes one [`WidgetCompileError`].
//!
//! The async half ([`transform_widget`]) is `Send` and can run on any runtime worker;
//! [`instantiate`] owns a JavaScript context and must stay on one thread.

pub mod error;
pub mod modules;
pub mod sandbox;
pub mod transform;

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

pub use error::{CompileErrorKind, WidgetCompileError};
pub use modules::ModuleMap;
pub use sandbox::CompiledWidget;
pub use transform::{EsbuildTransform, PassthroughTransform, SourceTransform, TransformError};

use crate::digest::SourceDigest;
use crate::obs;

/// The two files a widget consists of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetSource {
    pub code: String,
    pub data_json: String,
}

impl WidgetSource {
    pub fn new(code: impl Into<String>, data_json: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            data_json: data_json.into(),
        }
    }

    pub fn digest(&self) -> SourceDigest {
        SourceDigest::compute(&self.code, &self.data_json)
    }
}

/// A source whose data parsed and whose code transformed, not yet evaluated.
#[derive(Debug, Clone)]
pub struct TransformedWidget {
    pub code: String,
    pub data: serde_json::Value,
    pub data_json: String,
    pub digest: SourceDigest,
}

/// Injection points for the pipeline.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub transform: Arc<dyn SourceTransform>,
    pub modules: ModuleMap,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            transform: Arc::new(EsbuildTransform::default()),
            modules: ModuleMap::default(),
        }
    }
}

impl CompileOptions {
    pub fn with_transform(transform: impl SourceTransform + 'static) -> Self {
        Self {
            transform: Arc::new(transform),
            modules: ModuleMap::default(),
        }
    }

    pub fn modules(mut self, modules: ModuleMap) -> Self {
        self.modules = modules;
        self
    }
}

/// Parse the data and transform the code.
///
/// Data is checked first, so invalid JSON wins over any problem in the code.
pub async fn transform_widget(
    source: &WidgetSource,
    options: &CompileOptions,
) -> Result<TransformedWidget, WidgetCompileError> {
    let data: serde_json::Value =
        serde_json::from_str(&source.data_json).map_err(|_| WidgetCompileError::invalid_data())?;

    let code = options
        .transform
        .transform(&source.code)
        .await
        .map_err(|err| WidgetCompileError::new(CompileErrorKind::Transform, err.to_string()))?;

    Ok(TransformedWidget {
        code,
        data,
        data_json: source.data_json.clone(),
        digest: source.digest(),
    })
}

/// Evaluate a transformed widget and extract its default export.
pub fn instantiate(
    transformed: &TransformedWidget,
    options: &CompileOptions,
) -> Result<CompiledWidget, WidgetCompileError> {
    sandbox::evaluate_module(
        &transformed.code,
        &transformed.data_json,
        &options.modules,
        transformed.digest,
    )
}

/// Run the whole pipeline on the current thread.
pub async fn compile_widget(
    source: &WidgetSource,
    options: &CompileOptions,
) -> Result<CompiledWidget, WidgetCompileError> {
    let started = Instant::now();
    let digest = source.digest();
    let result = match transform_widget(source, options).await {
        Ok(transformed) => instantiate(&transformed, options),
        Err(err) => Err(err),
    };
    obs::emit_compile_finished(
        &digest,
        options.transform.name(),
        started.elapsed().as_millis() as u64,
        result.as_ref().err(),
    );
    result
}
