use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use parley_core::ParleyError;
use parley_skills::{RemoteSkill, SyncReport};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::AppState;
use crate::error::ApiResult;

#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct PullRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub overwrite: bool,
}

#[derive(Serialize)]
pub struct AvailableResponse {
    skills: Vec<RemoteSkill>,
    total: usize,
}

#[derive(Serialize)]
pub struct PublishResponse {
    status: &'static str,
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<String>,
}

#[derive(Serialize)]
pub struct PullResponse {
    status: &'static str,
    name: String,
    size: usize,
}

fn require_name(name: &str) -> Result<(), ParleyError> {
    if name.is_empty() {
        return Err(ParleyError::InvalidRequest("name required".into()));
    }
    Ok(())
}

pub async fn available_handler(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<AvailableResponse>> {
    let skills = state.skills.available().await?;
    Ok(Json(AvailableResponse {
        total: skills.len(),
        skills,
    }))
}

pub async fn publish_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<PublishRequest>, JsonRejection>,
) -> ApiResult<Json<PublishResponse>> {
    let Json(req) = payload?;
    require_name(&req.name)?;
    let ack = state.skills.publish(&req.name).await?;
    Ok(Json(PublishResponse {
        status: "published",
        name: req.name,
        version: ack.version,
    }))
}

pub async fn pull_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<PullRequest>, JsonRejection>,
) -> ApiResult<Json<PullResponse>> {
    let Json(req) = payload?;
    require_name(&req.name)?;
    let doc = state.skills.pull(&req.name, req.overwrite).await?;
    Ok(Json(PullResponse {
        status: "pulled",
        size: doc.content.len(),
        name: doc.name,
    }))
}

pub async fn sync_handler(State(state): State<Arc<AppState>>) -> ApiResult<Json<SyncReport>> {
    Ok(Json(state.skills.sync_all().await?))
}
