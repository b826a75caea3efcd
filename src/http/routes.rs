//! HTTP route definitions

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::Serialize;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::app::AppState;
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;

/// Arena renders allowed in flight at once; further requests wait their turn
pub const ARENA_RENDER_LIMIT: usize = 2;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/health", get(health_handler))
        .route("/websocket", get(ws_handler))
        .route(
            "/arena.pgm",
            get(arena_handler).layer(ConcurrencyLimitLayer::new(ARENA_RENDER_LIMIT)),
        );

    // Client assets, when a directory is configured
    if let Some(dir) = state.config.static_dir.clone() {
        router = router.fallback_service(ServeDir::new(dir));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    players: usize,
    ticks: u64,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        players: state.session.player_count(),
        ticks: state.session.ticks(),
    })
}

// ============================================================================
// Arena render
// ============================================================================

async fn arena_handler(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let image = state
        .session
        .render_arena()
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(([(header::CONTENT_TYPE, "image/x-portable-graymap")], image))
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg.clone())
            }
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
