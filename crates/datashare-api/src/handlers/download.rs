use crate::error::{ErrorResponse, HttpAppError};
use crate::state::AppState;
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderMap, Response, StatusCode},
    response::IntoResponse,
    Json,
};
use datashare_core::models::format::{Compression, DatasetFormat};
use datashare_core::AppError;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

/// Caller identity, forwarded by the upstream gateway.
const USER_ID_HEADER: &str = "x-user-id";

fn caller_id(headers: &HeaderMap) -> Result<Uuid, AppError> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::PermissionDenied("Missing X-User-Id header".to_string()))?
        .parse()
        .map_err(|_| AppError::PermissionDenied("Invalid X-User-Id header".to_string()))
}

/// Parse a `Range: bytes=N-` header into a resume offset. Only the open-ended
/// single-range form is supported; anything else is rejected rather than
/// silently served from zero.
fn range_offset(headers: &HeaderMap) -> Result<u64, AppError> {
    let raw = match headers.get(header::RANGE) {
        Some(value) => value
            .to_str()
            .map_err(|_| AppError::InvalidInput("Malformed Range header".to_string()))?,
        None => return Ok(0),
    };

    let spec = raw
        .strip_prefix("bytes=")
        .ok_or_else(|| AppError::InvalidInput(format!("Unsupported Range unit: {}", raw)))?;
    let start = spec
        .strip_suffix('-')
        .ok_or_else(|| AppError::InvalidInput(format!("Unsupported Range form: {}", raw)))?;
    start
        .parse()
        .map_err(|_| AppError::InvalidInput(format!("Invalid Range offset: {}", raw)))
}

#[derive(Debug, Deserialize)]
pub struct IssueDownloadParams {
    /// Requested output format; defaults to the stored format.
    pub format: Option<String>,
    /// Output compression: none, gzip, or zip.
    pub compression: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct IssueDownloadResponse {
    pub download_token: String,
    /// Correlation id for this issuance; progress is keyed by token.
    pub download_id: Uuid,
    pub expires_at: chrono::DateTime<chrono::Utc>,
    pub resumable: bool,
}

#[utoipa::path(
    get,
    path = "/datasets/{id}/download",
    tag = "downloads",
    params(
        ("id" = Uuid, Path, description = "Dataset ID"),
        ("format" = Option<String>, Query, description = "Output format (csv, json, jsonl)"),
        ("compression" = Option<String>, Query, description = "Output compression (none, gzip, zip)")
    ),
    responses(
        (status = 202, description = "Download token issued", body = IssueDownloadResponse),
        (status = 403, description = "Permission denied", body = ErrorResponse),
        (status = 404, description = "Dataset has no available copy", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, headers), fields(dataset_id = %id, operation = "issue_download"))]
pub async fn issue_download(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(params): Query<IssueDownloadParams>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, HttpAppError> {
    let user_id = caller_id(&headers)?;

    let format = match params.format.as_deref() {
        Some(raw) => raw
            .parse::<DatasetFormat>()
            .map_err(|e| AppError::InvalidInput(e.to_string()))?,
        None => {
            let dataset = state
                .catalog
                .get_dataset(id)
                .await?
                .ok_or_else(|| AppError::DatasetUnavailable(format!("Dataset {} not found", id)))?;
            dataset.stored_format
        }
    };
    let compression = params
        .compression
        .as_deref()
        .unwrap_or("none")
        .parse::<Compression>()
        .map_err(|e| AppError::InvalidInput(e.to_string()))?;

    let info = state
        .tokens
        .issue(id, user_id, format, compression, None)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(IssueDownloadResponse {
            download_token: info.token,
            download_id: Uuid::new_v4(),
            expires_at: info.expires_at,
            resumable: info.resumable,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/datasets/download/{token}",
    tag = "downloads",
    params(
        ("token" = String, Path, description = "Download token"),
        ("Range" = Option<String>, Header, description = "bytes=N- to resume from offset N")
    ),
    responses(
        (status = 200, description = "Dataset byte stream"),
        (status = 206, description = "Resumed byte stream"),
        (status = 404, description = "Token not found", body = ErrorResponse),
        (status = 409, description = "Token already consumed", body = ErrorResponse),
        (status = 410, description = "Token expired", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, headers), fields(operation = "stream_download"))]
pub async fn stream_download(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, HttpAppError> {
    let offset = range_offset(&headers)?;
    let router = state.storage().await;
    let download = state
        .orchestrator
        .begin(&router, &token, offset, false)
        .await?;

    let status = if download.offset > 0 {
        StatusCode::PARTIAL_CONTENT
    } else {
        StatusCode::OK
    };

    let mut builder = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, download.content_type)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", download.filename),
        )
        .header(
            header::ACCEPT_RANGES,
            if download.resumable { "bytes" } else { "none" },
        );

    if let Some(total) = download.total_bytes {
        builder = builder.header(
            header::CONTENT_LENGTH,
            total.saturating_sub(download.offset).to_string(),
        );
        if download.offset > 0 && total > 0 {
            builder = builder.header(
                header::CONTENT_RANGE,
                format!("bytes {}-{}/{}", download.offset, total - 1, total),
            );
        }
    }

    // Wrap the stream for axum Body
    let body_stream = download
        .stream
        .map(|result| result.map_err(|e| std::io::Error::other(e.to_string())));

    let response = builder
        .body(Body::from_stream(body_stream))
        .map_err(|e| AppError::Internal(format!("Failed to build response: {}", e)))?;

    Ok(response)
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProgressResponse {
    pub status: String,
    pub progress_percentage: f64,
    pub bytes_transferred: u64,
    pub file_size_bytes: u64,
    /// Megabits per second over the trailing rate window.
    pub transfer_rate_mbps: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_time_remaining_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub is_resumable: bool,
}

#[utoipa::path(
    get,
    path = "/datasets/download/{token}/progress",
    tag = "downloads",
    params(("token" = String, Path, description = "Download token")),
    responses(
        (status = 200, description = "Session progress", body = ProgressResponse),
        (status = 404, description = "No session for this token", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state), fields(operation = "download_progress"))]
pub async fn download_progress(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, HttpAppError> {
    let session = state.orchestrator.progress(&token)?;
    let is_resumable = state
        .orchestrator
        .token_info(&token, true)
        .map(|info| info.resumable)
        .unwrap_or(false);

    use datashare_core::models::download::DownloadStatus;
    let status = match session.status {
        DownloadStatus::Pending => "pending",
        DownloadStatus::InProgress => "in_progress",
        DownloadStatus::Completed => "completed",
        DownloadStatus::Failed => "failed",
        DownloadStatus::Interrupted => "interrupted",
    };

    Ok(Json(ProgressResponse {
        status: status.to_string(),
        progress_percentage: session.progress_percentage(),
        bytes_transferred: session.bytes_transferred,
        file_size_bytes: session.total_bytes,
        transfer_rate_mbps: session.transfer_rate_bps * 8.0 / 1_000_000.0,
        estimated_time_remaining_seconds: session.eta_seconds,
        error_message: session.error_message.clone(),
        is_resumable,
    }))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RetryResponse {
    pub can_retry: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume_offset: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restart: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[utoipa::path(
    post,
    path = "/datasets/download/{token}/retry",
    tag = "downloads",
    params(("token" = String, Path, description = "Download token")),
    responses(
        (status = 200, description = "Retry decision", body = RetryResponse),
        (status = 404, description = "Token or session not found", body = ErrorResponse),
        (status = 410, description = "Token expired", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state), fields(operation = "retry_download"))]
pub async fn retry_download(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, HttpAppError> {
    match state.orchestrator.retry(&token) {
        Ok(decision) => Ok(Json(RetryResponse {
            can_retry: true,
            resume_offset: Some(decision.resume_offset),
            restart: Some(decision.restart),
            reason: None,
        })),
        // Not retryable is an answer, not an error.
        Err(AppError::InvalidInput(reason)) => Ok(Json(RetryResponse {
            can_retry: false,
            resume_offset: None,
            restart: None,
            reason: Some(reason),
        })),
        Err(other) => Err(other.into()),
    }
}
