//! HTTP transport for session and upload operations.
//!
//! Mounts the admin surface (session creation, connectivity probe) and
//! the uploader surface (whole-file uploads, chunk ingestion, assembly,
//! finalization) behind one axum router.

mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::GlobalConfig;
use crate::lifecycle::SessionController;
use crate::{AppError, Result};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// Loaded service configuration.
    pub config: Arc<GlobalConfig>,
    /// Session orchestration facade.
    pub controller: SessionController,
}

/// Build the service router.
#[must_use]
pub fn router(state: AppState) -> Router {
    let body_limit = usize::try_from(state.config.limits.max_upload_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(1024 * 1024);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/admin/sessions", post(handlers::create_session))
        .route("/admin/probe", post(handlers::probe))
        .route("/sessions/{token}", get(handlers::session_status))
        .route("/sessions/{token}/files", post(handlers::upload_file))
        .route("/sessions/{token}/files/retry", post(handlers::retry_file))
        .route(
            "/sessions/{token}/uploads/{upload_id}/chunks/{index}",
            put(handlers::put_chunk),
        )
        .route(
            "/sessions/{token}/uploads/{upload_id}/assemble",
            post(handlers::assemble_upload),
        )
        .route(
            "/sessions/{token}/uploads/{upload_id}",
            delete(handlers::abandon_upload),
        )
        .route("/sessions/{token}/finalize", post(handlers::finalize))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Serve the router until the token is cancelled.
///
/// # Errors
///
/// Returns `AppError::Config` if the listener cannot bind or the
/// server fails.
pub async fn serve(state: AppState, cancel: CancellationToken) -> Result<()> {
    let bind = SocketAddr::from(([0, 0, 0, 0], state.config.http_port));
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|err| AppError::Config(format!("failed to bind on {bind}: {err}")))?;

    info!(%bind, "starting HTTP transport");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            cancel.cancelled().await;
        })
        .await
        .map_err(|err| AppError::Config(format!("http server error: {err}")))
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::DuplicateLabel(_) | Self::IncompleteUpload { .. } | Self::MissingChunk(_) => {
                StatusCode::CONFLICT
            }
            Self::Expired(_) | Self::AlreadyUsed(_) => StatusCode::GONE,
            Self::Validation(_) | Self::ChunkMismatch(_) => StatusCode::BAD_REQUEST,
            Self::Transfer(_) | Self::TransferAborted(_) | Self::IntegrityFailure { .. } => {
                StatusCode::BAD_GATEWAY
            }
            Self::Config(_) | Self::Db(_) | Self::Io(_) | Self::Notify(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
