//! # parley-server
//!
//! HTTP dispatcher for the listener. Every route maps onto one engine,
//! context-store or skill-sync operation; failures are rendered through
//! [`ApiError`] with a stable error code and a retry hint.
//!
//! - `/message`, `/threads`: conversation delivery and thread records
//! - `/context`, `/claude-md`: static and root context documents
//! - `/skills/*`: registry sync

pub mod context;
pub mod error;
pub mod skills;
pub mod threads;

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use parley_config::ParleyConfig;
use parley_context::ContextStore;
use parley_runtime::Engine;
use parley_skills::SkillSync;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub use error::{ApiError, ApiResult};

/// Shared server state.
pub struct AppState {
    pub config: Arc<ParleyConfig>,
    pub engine: Arc<Engine>,
    pub skills: SkillSync,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: Arc<ParleyConfig>, engine: Arc<Engine>, skills: SkillSync) -> Self {
        Self {
            config,
            engine,
            skills,
            started_at: Instant::now(),
        }
    }

    pub fn documents(&self) -> &ContextStore {
        self.engine.composer().store()
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    agent: String,
    version: &'static str,
    threads: usize,
    uptime_secs: u64,
}

#[derive(Serialize)]
struct VersionResponse {
    version: &'static str,
    agent: String,
}

/// Build the Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = state.config.server.cors;

    let router = Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/message", post(threads::message_handler))
        .route("/threads", get(threads::list_handler))
        .route("/threads/{id}", axum::routing::delete(threads::delete_handler))
        .route("/threads/{id}/history", get(threads::history_handler))
        .route(
            "/context",
            get(context::list_handler).post(context::create_handler),
        )
        .route(
            "/context/{name}",
            get(context::get_handler)
                .put(context::put_handler)
                .delete(context::delete_handler),
        )
        .route(
            "/claude-md",
            get(context::get_root_handler).put(context::put_root_handler),
        )
        .route("/skills/available", get(skills::available_handler))
        .route("/skills/publish", post(skills::publish_handler))
        .route("/skills/pull", post(skills::pull_handler))
        .route("/skills/sync", post(skills::sync_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

async fn health_handler(State(state): State<Arc<AppState>>) -> ApiResult<Json<HealthResponse>> {
    let threads = state.engine.threads().list().await?.len();
    Ok(Json(HealthResponse {
        status: "ok",
        agent: state.config.agent.name.clone(),
        version: env!("CARGO_PKG_VERSION"),
        threads,
        uptime_secs: state.started_at.elapsed().as_secs(),
    }))
}

async fn version_handler(State(state): State<Arc<AppState>>) -> Json<VersionResponse> {
    Json(VersionResponse {
        version: env!("CARGO_PKG_VERSION"),
        agent: state.config.agent.name.clone(),
    })
}

/// Bind `server.listen` and serve until `shutdown` resolves.
pub async fn start_server(
    state: Arc<AppState>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> parley_core::Result<()> {
    let listen = state.config.server.listen.clone();
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(&listen)
        .await
        .map_err(|e| parley_core::ParleyError::Config(format!("failed to bind {listen}: {e}")))?;
    info!(listen = %listen, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("server stopped");
    Ok(())
}
