use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use parley_context::DocumentInfo;
use parley_core::ParleyError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::AppState;
use crate::error::ApiResult;

#[derive(Debug, Deserialize)]
pub struct CreateRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub content: String,
}

/// Body of `PUT /context/{name}` and `PUT /claude-md`.
#[derive(Debug, Deserialize)]
pub struct ContentRequest {
    #[serde(default)]
    pub content: Option<String>,
}

impl ContentRequest {
    fn into_content(self) -> Result<String, ParleyError> {
        self.content
            .ok_or_else(|| ParleyError::InvalidRequest("content required".into()))
    }
}

#[derive(Serialize)]
pub struct ListResponse {
    context_files: Vec<DocumentInfo>,
    total: usize,
}

#[derive(Serialize)]
pub struct DocumentResponse {
    name: String,
    content: String,
    modified: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct RootResponse {
    content: String,
    modified: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct StatusResponse {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

impl StatusResponse {
    fn named(status: &'static str, name: impl Into<String>) -> Self {
        Self {
            status,
            name: Some(name.into()),
        }
    }
}

pub async fn list_handler(State(state): State<Arc<AppState>>) -> ApiResult<Json<ListResponse>> {
    let context_files = state.documents().list().await?;
    Ok(Json(ListResponse {
        total: context_files.len(),
        context_files,
    }))
}

pub async fn create_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<StatusResponse>)> {
    let Json(req) = payload?;
    if req.name.is_empty() {
        return Err(ParleyError::InvalidRequest("name required".into()).into());
    }
    let doc = state.documents().create(&req.name, &req.content).await?;
    Ok((
        StatusCode::CREATED,
        Json(StatusResponse::named("created", doc.name)),
    ))
}

pub async fn get_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<DocumentResponse>> {
    let doc = state.documents().get(&name).await?;
    Ok(Json(DocumentResponse {
        name: doc.name,
        content: doc.content,
        modified: doc.last_modified,
    }))
}

pub async fn put_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    payload: Result<Json<ContentRequest>, JsonRejection>,
) -> ApiResult<Json<StatusResponse>> {
    let Json(req) = payload?;
    let content = req.into_content()?;
    let doc = state.documents().put(&name, &content).await?;
    Ok(Json(StatusResponse::named("saved", doc.name)))
}

pub async fn delete_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<StatusResponse>> {
    state.documents().delete(&name).await?;
    Ok(Json(StatusResponse::named("deleted", name)))
}

pub async fn get_root_handler(State(state): State<Arc<AppState>>) -> ApiResult<Json<RootResponse>> {
    let doc = state.documents().root().await?;
    Ok(Json(RootResponse {
        content: doc.content,
        modified: doc.last_modified,
    }))
}

pub async fn put_root_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ContentRequest>, JsonRejection>,
) -> ApiResult<Json<StatusResponse>> {
    let Json(req) = payload?;
    let content = req.into_content()?;
    state.documents().put_root(&content).await?;
    Ok(Json(StatusResponse {
        status: "saved",
        name: None,
    }))
}
