//! OpenAPI documentation.

use utoipa::OpenApi;

use crate::error;
use crate::handlers;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Datashare API",
        version = "0.1.0",
        description = "Dataset download and storage administration API. Downloads are token-gated and resumable; storage is routed across local and S3 backends with migration and integrity verification."
    ),
    paths(
        handlers::download::issue_download,
        handlers::download::stream_download,
        handlers::download::download_progress,
        handlers::download::retry_download,
        handlers::admin::storage_status,
        handlers::admin::migrate_storage,
        handlers::admin::verify_storage,
        handlers::admin::reload_storage,
    ),
    components(schemas(
        error::ErrorResponse,
        handlers::download::IssueDownloadResponse,
        handlers::download::ProgressResponse,
        handlers::download::RetryResponse,
        handlers::admin::StorageStatusResponse,
        handlers::admin::BackendInfo,
        handlers::admin::MigrateRequest,
        handlers::admin::VerifyRequest,
        handlers::admin::ReloadResponse,
    )),
    tags(
        (name = "downloads", description = "Token-gated dataset downloads"),
        (name = "admin", description = "Storage administration")
    )
)]
struct ApiDoc;

pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}
