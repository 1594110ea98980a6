//! Management endpoints for records, metadata and connections

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::handlers::{AppState, ErrorResponse, SuccessResponse};
use crate::catalog;
use crate::models::{
    ConnectionRequest, CreateEntityRequest, Entity, EntityKind, EntityWithMeta, Relation,
};
use crate::storage::StorageError;

type ApiError = (StatusCode, Json<ErrorResponse>);

#[derive(Deserialize)]
pub struct ListQuery {
    pub kind: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

fn storage_error(err: StorageError) -> ApiError {
    match err {
        StorageError::NotFound(_) => api_error(StatusCode::NOT_FOUND, err.to_string()),
        StorageError::Conflict(_) => api_error(StatusCode::CONFLICT, err.to_string()),
        StorageError::Invalid(_) => api_error(StatusCode::BAD_REQUEST, err.to_string()),
        StorageError::Other(e) => {
            tracing::error!(error = %e, "storage operation failed");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

fn internal_error(err: anyhow::Error) -> ApiError {
    storage_error(StorageError::Other(err))
}

/// Create a record, optionally with metadata
pub async fn create_entity(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateEntityRequest>,
) -> Result<(StatusCode, Json<EntityWithMeta>), ApiError> {
    let created = catalog::create_entity(
        state.storage.as_ref(),
        payload.kind,
        &payload.title,
        &payload.meta,
    )
    .await
    .map_err(storage_error)?;

    Ok((StatusCode::CREATED, Json(created)))
}

/// List records, newest first
pub async fn list_entities(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Entity>>, ApiError> {
    let kind = query
        .kind
        .as_deref()
        .map(str::parse::<EntityKind>)
        .transpose()
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;
    let limit = query.limit.clamp(1, 1000);
    let offset = query.offset.max(0);

    state
        .storage
        .list_entities(kind, limit, offset)
        .await
        .map(Json)
        .map_err(internal_error)
}

/// Get a record with its metadata
pub async fn get_entity(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<EntityWithMeta>, ApiError> {
    match catalog::load(state.storage.as_ref(), id).await {
        Ok(Some(entity)) => Ok(Json(entity)),
        Ok(None) => Err(storage_error(StorageError::NotFound(id))),
        Err(e) => Err(internal_error(e)),
    }
}

/// Delete a record with its metadata and connections
pub async fn delete_entity(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<SuccessResponse>, ApiError> {
    match state.storage.delete_entity(id).await {
        Ok(true) => Ok(Json(SuccessResponse {
            message: format!("Record {id} deleted"),
        })),
        Ok(false) => Err(storage_error(StorageError::NotFound(id))),
        Err(e) => Err(internal_error(e)),
    }
}

/// Save metadata; an empty value deletes its key
pub async fn update_meta(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(meta): Json<BTreeMap<String, String>>,
) -> Result<Json<EntityWithMeta>, ApiError> {
    catalog::update_meta(state.storage.as_ref(), id, &meta)
        .await
        .map(Json)
        .map_err(storage_error)
}

/// Connect two records
pub async fn connect(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ConnectionRequest>,
) -> Result<(StatusCode, Json<ConnectionRequest>), ApiError> {
    state
        .storage
        .connect(payload.relation, payload.from, payload.to)
        .await
        .map_err(storage_error)?;

    Ok((StatusCode::CREATED, Json(payload)))
}

/// Remove a connection
pub async fn disconnect(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ConnectionRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    match state
        .storage
        .disconnect(payload.relation, payload.from, payload.to)
        .await
    {
        Ok(true) => Ok(Json(SuccessResponse {
            message: "Connection removed".to_string(),
        })),
        Ok(false) => Err(api_error(StatusCode::NOT_FOUND, "Connection not found")),
        Err(e) => Err(internal_error(e)),
    }
}

/// Records connected to `id` through `relation`
pub async fn connected(
    State(state): State<Arc<AppState>>,
    Path((id, relation)): Path<(i64, String)>,
) -> Result<Json<Vec<Entity>>, ApiError> {
    let relation: Relation = relation
        .parse()
        .map_err(|e: crate::models::ModelError| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;

    catalog::connected_entities(state.storage.as_ref(), relation, id)
        .await
        .map(Json)
        .map_err(internal_error)
}
