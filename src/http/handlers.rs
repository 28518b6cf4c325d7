//! Request handlers.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use crate::assembler::ChunkUploadMeta;
use crate::lifecycle::{
    FinalizeReport, ProbeReport, SessionStatus, SessionSummary, UploadReport,
};
use crate::models::transfer::ChunkAck;
use crate::{AppError, Result};

use super::AppState;

/// Liveness probe.
pub async fn health() -> &'static str {
    "ok"
}

#[derive(Deserialize)]
pub struct CreateSessionRequest {
    key: String,
    label: String,
    #[serde(default)]
    reusable: bool,
}

/// `POST /admin/sessions`
pub async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<Json<SessionSummary>> {
    state.config.ensure_admin(&request.key)?;
    let summary = state
        .controller
        .create_session(&request.label, request.reusable)
        .await?;
    Ok(Json(summary))
}

#[derive(Deserialize)]
pub struct ProbeRequest {
    key: String,
    label: String,
}

/// `POST /admin/probe`
///
/// Probes the remote directory of the session named by `label`.
pub async fn probe(
    State(state): State<AppState>,
    Json(request): Json<ProbeRequest>,
) -> Result<Json<ProbeReport>> {
    state.config.ensure_admin(&request.key)?;
    let report = state.controller.connectivity_probe(&request.label).await?;
    Ok(Json(report))
}

/// `GET /sessions/{token}`
pub async fn session_status(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<SessionStatus>> {
    let status = state.controller.session_status(&token).await?;
    Ok(Json(status))
}

#[derive(Deserialize)]
pub struct UploadQuery {
    path: String,
}

/// `POST /sessions/{token}/files?path=...`
pub async fn upload_file(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Query(query): Query<UploadQuery>,
    body: Bytes,
) -> Result<Json<UploadReport>> {
    let report = state
        .controller
        .accept_upload(&token, &query.path, &body)
        .await?;
    Ok(Json(report))
}

#[derive(Deserialize)]
pub struct RetryQuery {
    path: String,
    key: String,
}

/// `POST /sessions/{token}/files/retry?path=...&key=...`
///
/// Bypasses the used/expired guards, so it is gated on the admin key.
pub async fn retry_file(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Query(query): Query<RetryQuery>,
    body: Bytes,
) -> Result<Json<UploadReport>> {
    state.config.ensure_admin(&query.key)?;
    let report = state
        .controller
        .retry_upload(&token, &query.path, &body)
        .await?;
    Ok(Json(report))
}

#[derive(Deserialize)]
pub struct ChunkQuery {
    path: String,
    total: u32,
    hash: Option<String>,
    file_hash: Option<String>,
    file_size: Option<u64>,
}

/// `PUT /sessions/{token}/uploads/{upload_id}/chunks/{index}`
pub async fn put_chunk(
    State(state): State<AppState>,
    Path((token, upload_id, index)): Path<(String, String, u32)>,
    Query(query): Query<ChunkQuery>,
    body: Bytes,
) -> Result<Json<ChunkAck>> {
    state.controller.ensure_accepts_uploads(&token).await?;
    if body.is_empty() {
        return Err(AppError::Validation("chunk body is empty".into()));
    }

    let meta = ChunkUploadMeta {
        relative_path: query.path,
        total_chunks: query.total,
        expected_checksum: query.file_hash,
        expected_size: query.file_size,
    };
    let ack = state
        .controller
        .assembler()
        .put_chunk(
            &token,
            &upload_id,
            index,
            meta,
            &body,
            query.hash.as_deref(),
        )
        .await?;
    Ok(Json(ack))
}

/// `POST /sessions/{token}/uploads/{upload_id}/assemble`
pub async fn assemble_upload(
    State(state): State<AppState>,
    Path((token, upload_id)): Path<(String, String)>,
) -> Result<Json<UploadReport>> {
    let report = state
        .controller
        .finalize_chunked_upload(&token, &upload_id)
        .await?;
    Ok(Json(report))
}

/// `DELETE /sessions/{token}/uploads/{upload_id}`
pub async fn abandon_upload(
    State(state): State<AppState>,
    Path((token, upload_id)): Path<(String, String)>,
) -> Result<()> {
    state.controller.ensure_accepts_uploads(&token).await?;
    state.controller.assembler().abandon(&token, &upload_id).await
}

/// `POST /sessions/{token}/finalize`
pub async fn finalize(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<FinalizeReport>> {
    let report = state.controller.finalize(&token).await?;
    Ok(Json(report))
}
