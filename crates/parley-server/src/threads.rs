use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use parley_core::{Message, MessageOrigin, ThreadId, ThreadStatus, ThreadSummary};
use parley_runtime::Delivery;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::AppState;
use crate::error::ApiResult;

/// Thread used when a message names none.
pub const DEFAULT_THREAD: &str = "general";

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    /// Answer `202 Accepted` right away and finish in the background.
    #[serde(default)]
    pub detach: bool,
}

#[derive(Serialize)]
struct MessageResponse {
    thread_id: ThreadId,
    reply: String,
    status: ThreadStatus,
}

#[derive(Serialize)]
struct AcceptedResponse {
    status: &'static str,
    thread_id: ThreadId,
}

#[derive(Serialize)]
pub struct ThreadListResponse {
    threads: Vec<ThreadSummary>,
    total: usize,
}

#[derive(Serialize)]
pub struct HistoryResponse {
    thread_id: ThreadId,
    status: ThreadStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_error: Option<String>,
    messages: Vec<Message>,
}

#[derive(Serialize)]
pub struct DeletedResponse {
    status: &'static str,
    thread_id: ThreadId,
}

pub async fn message_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<MessageRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(req) = payload?;
    let thread_id = ThreadId::parse(req.thread_id.as_deref().unwrap_or(DEFAULT_THREAD))?;
    let defaults = MessageOrigin::default();
    let origin = MessageOrigin {
        sender: req.sender.unwrap_or(defaults.sender),
        channel: req.channel.unwrap_or(defaults.channel),
    };
    let delivery = Delivery::new(req.message)
        .to_thread(thread_id)
        .from_origin(origin);

    if req.detach {
        let thread_id = state.engine.deliver_detached(delivery)?;
        let body = AcceptedResponse {
            status: "accepted",
            thread_id,
        };
        return Ok((StatusCode::ACCEPTED, Json(body)).into_response());
    }

    let exchange = state.engine.deliver(delivery).await?;
    Ok(Json(MessageResponse {
        thread_id: exchange.thread.id,
        reply: exchange.reply.text,
        status: exchange.thread.status,
    })
    .into_response())
}

pub async fn list_handler(State(state): State<Arc<AppState>>) -> ApiResult<Json<ThreadListResponse>> {
    let threads = state.engine.threads().list().await?;
    Ok(Json(ThreadListResponse {
        total: threads.len(),
        threads,
    }))
}

pub async fn history_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<HistoryResponse>> {
    let id = ThreadId::parse(&id)?;
    let thread = state.engine.threads().get(&id).await?;
    Ok(Json(HistoryResponse {
        thread_id: thread.id,
        status: thread.status,
        last_error: thread.last_error,
        messages: thread.messages,
    }))
}

pub async fn delete_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<DeletedResponse>> {
    let id = ThreadId::parse(&id)?;
    state.engine.delete_thread(&id).await?;
    Ok(Json(DeletedResponse {
        status: "deleted",
        thread_id: id,
    }))
}
