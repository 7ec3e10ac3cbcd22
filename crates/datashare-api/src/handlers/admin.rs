//! Storage administration: status, migration, verification, reload.
//!
//! These endpoints sit behind the operator's network boundary; caller
//! authentication is the gateway's concern, like everywhere else in this
//! service.

use crate::error::{ErrorResponse, HttpAppError, ValidatedJson};
use crate::state::AppState;
use axum::{extract::State, response::IntoResponse, Json};
use datashare_core::models::storage::BackendKind;
use datashare_core::{AppError, Config};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, ToSchema)]
pub struct BackendInfo {
    pub backend: String,
    pub registered: bool,
    pub available: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StorageStatusResponse {
    pub current_backend: String,
    pub storage_strategy: String,
    pub local_backend_available: bool,
    pub s3_backend_available: bool,
    pub backend_info: Vec<BackendInfo>,
}

#[utoipa::path(
    get,
    path = "/admin/storage/status",
    tag = "admin",
    responses(
        (status = 200, description = "Backend and strategy status", body = StorageStatusResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state), fields(operation = "storage_status"))]
pub async fn storage_status(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, HttpAppError> {
    let router = state.storage().await;
    let registered = router.registered_kinds();

    let mut backend_info = Vec::new();
    let mut available = std::collections::HashMap::new();
    for kind in [BackendKind::Local, BackendKind::S3] {
        let is_registered = registered.contains(&kind);
        let is_available = is_registered && router.is_available(kind).await;
        available.insert(kind, is_available);
        backend_info.push(BackendInfo {
            backend: kind.to_string(),
            registered: is_registered,
            available: is_available,
        });
    }

    let primary = router
        .primary()
        .map_err(AppError::from)?;

    Ok(Json(StorageStatusResponse {
        current_backend: primary.kind().to_string(),
        storage_strategy: router.strategy().to_string(),
        local_backend_available: available[&BackendKind::Local],
        s3_backend_available: available[&BackendKind::S3],
        backend_info,
    }))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MigrateRequest {
    /// Backend to move data onto: "local" or "s3".
    pub target_backend: String,
    /// Must be true; migration rewrites location records.
    pub confirm: bool,
    /// Remove the source copy after verification. Defaults to false.
    pub delete_source: Option<bool>,
    /// Restrict the run to these datasets; omitted means all candidates.
    pub dataset_ids: Option<Vec<Uuid>>,
}

#[utoipa::path(
    post,
    path = "/admin/storage/migrate",
    tag = "admin",
    request_body = MigrateRequest,
    responses(
        (status = 200, description = "Migration report"),
        (status = 400, description = "Unconfirmed or invalid request", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, request), fields(operation = "migrate_storage", target = %request.target_backend))]
pub async fn migrate_storage(
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<MigrateRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    let target: BackendKind = request
        .target_backend
        .parse()
        .map_err(|e: anyhow::Error| AppError::InvalidInput(e.to_string()))?;

    let router = state.storage().await;
    let source = router
        .registered_kinds()
        .into_iter()
        .find(|kind| *kind != target)
        .ok_or_else(|| {
            AppError::InvalidInput(format!(
                "No source backend to migrate from; only {} is registered",
                target
            ))
        })?;

    let report = state
        .migration
        .migrate(
            &router,
            source,
            target,
            request.dataset_ids,
            request.delete_source.unwrap_or(false),
            request.confirm,
        )
        .await?;

    Ok(Json(report))
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct VerifyRequest {
    /// Also delete the orphans the scan finds. Requires `confirm`.
    pub remove_orphans: Option<bool>,
    pub confirm: Option<bool>,
}

#[utoipa::path(
    post,
    path = "/admin/storage/verify",
    tag = "admin",
    request_body = VerifyRequest,
    responses(
        (status = 200, description = "Verification report"),
        (status = 400, description = "Orphan removal without confirmation", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, request), fields(operation = "verify_storage"))]
pub async fn verify_storage(
    State(state): State<Arc<AppState>>,
    request: Option<Json<VerifyRequest>>,
) -> Result<impl IntoResponse, HttpAppError> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let router = state.storage().await;
    let report = state.verifier.verify_all(&router).await?;

    if request.remove_orphans.unwrap_or(false) {
        let removed = state
            .verifier
            .remove_orphans(
                &router,
                &report.orphaned_files,
                request.confirm.unwrap_or(false),
            )
            .await?;
        tracing::info!(removed, "Orphan cleanup ran with verification");
    }

    Ok(Json(report))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReloadResponse {
    pub storage_strategy: String,
    pub backends: Vec<String>,
}

#[utoipa::path(
    post,
    path = "/admin/storage/reload",
    tag = "admin",
    responses(
        (status = 200, description = "Storage configuration reloaded", body = ReloadResponse),
        (status = 500, description = "Reload failed; previous router still serving", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state), fields(operation = "reload_storage"))]
pub async fn reload_storage(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, HttpAppError> {
    // Build the replacement completely before swapping; a failed reload
    // leaves the current router untouched.
    let config = Config::reload()?;
    let router = datashare_storage::create_router(&config).await?;

    let strategy = router.strategy().to_string();
    let backends: Vec<String> = router
        .registered_kinds()
        .iter()
        .map(|k| k.to_string())
        .collect();

    state.swap_storage(router).await;
    tracing::info!(strategy = %strategy, "Storage router reloaded");

    Ok(Json(ReloadResponse {
        storage_strategy: strategy,
        backends,
    }))
}
