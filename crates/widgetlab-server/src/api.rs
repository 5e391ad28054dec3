//! `/api/widget/*` handlers.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use widgetlab_core::store::{WidgetExample, WidgetExampleSource};
use widgetlab_core::{library_catalog, LibraryCatalog, WidgetOrigin};

use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Body of `GET` and `DELETE /api/widget/source`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourcePayload {
    pub source: String,
    pub data_source: String,
    pub example_source: String,
    pub example_data_source: String,
    pub origin: WidgetOrigin,
}

/// Validated `PUT /api/widget/source` body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveRequest {
    pub source: String,
    pub data_source: String,
    pub name: Option<String>,
}

fn required_string(body: &Value, key: &str) -> Option<String> {
    body.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}

impl SaveRequest {
    pub fn parse(body: &[u8]) -> ApiResult<Self> {
        let body: Value = serde_json::from_slice(body)
            .map_err(|_| ApiError::bad_request("Request body must be valid JSON."))?;
        let source = required_string(&body, "source").ok_or_else(|| {
            ApiError::bad_request("Request body must include a non-empty \"source\" string.")
        })?;
        let data_source = required_string(&body, "dataSource").ok_or_else(|| {
            ApiError::bad_request("Request body must include a non-empty \"dataSource\" string.")
        })?;
        if serde_json::from_str::<Value>(&data_source).is_err() {
            return Err(ApiError::bad_request("\"dataSource\" must be valid JSON."));
        }
        let name = required_string(&body, "name");
        Ok(Self {
            source,
            data_source,
            name,
        })
    }
}

async fn source_payload(state: &AppState) -> ApiResult<SourcePayload> {
    let current = state.store.read_widget_source().await?;
    let data_source = state.store.read_widget_data_source(current.origin).await?;
    Ok(SourcePayload {
        source: current.source,
        data_source,
        example_source: state.store.read_example_source().await?,
        example_data_source: state.store.read_example_data_source().await?,
        origin: current.origin,
    })
}

pub async fn get_source(State(state): State<AppState>) -> ApiResult<Json<SourcePayload>> {
    Ok(Json(source_payload(&state).await?))
}

pub async fn put_source(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<Value>> {
    let request = SaveRequest::parse(&body)?;
    match request.name {
        Some(name) => {
            let now = chrono::Local::now().naive_local();
            let snapshot = state
                .store
                .save_named_snapshot(&request.source, &request.data_source, &name, now)
                .await?;
            info!(snapshot = %snapshot.dir_name, "widget snapshot saved");
            Ok(Json(serde_json::json!({
                "ok": true,
                "snapshotPath": snapshot.dir_path,
            })))
        }
        None => {
            state
                .store
                .write_widget_source(&request.source, &request.data_source)
                .await?;
            Ok(Json(serde_json::json!({ "ok": true })))
        }
    }
}

pub async fn delete_source(State(state): State<AppState>) -> ApiResult<Json<SourcePayload>> {
    state.store.delete_local_widget_source().await?;
    info!("local widget reset to example");
    Ok(Json(source_payload(&state).await?))
}

#[derive(Debug, Serialize)]
pub struct ExamplesPayload {
    pub examples: Vec<WidgetExample>,
}

pub async fn list_examples(State(state): State<AppState>) -> ApiResult<Json<ExamplesPayload>> {
    let examples = state.store.list_examples().await?;
    Ok(Json(ExamplesPayload { examples }))
}

#[derive(Debug, Deserialize)]
pub struct ExampleQuery {
    pub file: Option<String>,
}

pub async fn get_example(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ExampleQuery>,
) -> ApiResult<Json<WidgetExampleSource>> {
    if id.trim().is_empty() {
        return Err(ApiError::bad_request("Example id is required."));
    }
    let file = query.file.as_deref().filter(|f| !f.is_empty());
    Ok(Json(state.store.read_example(&id, file).await?))
}

pub async fn missing_example_id() -> ApiError {
    ApiError::bad_request("Example id is required.")
}

pub async fn get_catalog() -> ApiResult<Json<&'static LibraryCatalog>> {
    let catalog = library_catalog()
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;
    Ok(Json(catalog))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_request_validation() {
        let err = SaveRequest::parse(br#"{"dataSource":"{}"}"#).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Request body must include a non-empty \"source\" string."
        );

        let err = SaveRequest::parse(br#"{"source":"x","dataSource":"  "}"#).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Request body must include a non-empty \"dataSource\" string."
        );

        let err = SaveRequest::parse(br#"{"source":"x","dataSource":"{oops"}"#).unwrap_err();
        assert_eq!(err.to_string(), "\"dataSource\" must be valid JSON.");

        let ok = SaveRequest::parse(br#"{"source":"x","dataSource":"{}","name":"demo"}"#).unwrap();
        assert_eq!(ok.name.as_deref(), Some("demo"));
    }

    #[test]
    fn test_blank_name_is_plain_save() {
        let ok = SaveRequest::parse(br#"{"source":"x","dataSource":"[]","name":" "}"#).unwrap();
        assert_eq!(ok.name, None);
    }
}
