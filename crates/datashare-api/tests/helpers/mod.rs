//! Test helpers: build AppState and router for integration tests.
//!
//! Run from workspace root: `cargo test -p datashare-api`.

use axum_test::TestServer;
use bytes::Bytes;
use chrono::Utc;
use datashare_api::setup::{build_state, routes};
use datashare_api::state::AppState;
use datashare_core::models::dataset::DatasetRecord;
use datashare_core::models::format::DatasetFormat;
use datashare_core::{BaseConfig, Config, StorageStrategy};
use datashare_services::{AllowAllAccess, InMemoryCatalog};
use datashare_storage::{BackendKind, MemoryStorage, Storage, StorageRouter};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

pub const CSV_BODY: &[u8] = b"id,name,city\n1,Ada,London\n2,Grace,NYC\n";

pub struct TestApp {
    pub server: TestServer,
    pub state: Arc<AppState>,
    pub catalog: Arc<InMemoryCatalog>,
    pub local: Arc<MemoryStorage>,
    pub s3: Arc<MemoryStorage>,
}

fn test_config(strategy: StorageStrategy) -> Config {
    Config {
        base: BaseConfig {
            server_port: 0,
            cors_origins: vec!["*".to_string()],
            environment: "test".to_string(),
        },
        storage_strategy: strategy,
        local_storage_path: None,
        s3_bucket: None,
        s3_region: None,
        s3_endpoint: None,
        token_ttl_secs: 3600,
        session_retention_secs: 180,
        session_idle_timeout_secs: 120,
        transform_ceiling_bytes: 1 << 20,
    }
}

/// Spin up the app on in-memory backends with a hybrid strategy.
pub fn setup_test_app() -> TestApp {
    let local = Arc::new(MemoryStorage::new(BackendKind::Local));
    let s3 = Arc::new(MemoryStorage::new(BackendKind::S3));

    let mut backends: HashMap<BackendKind, Arc<dyn Storage>> = HashMap::new();
    backends.insert(BackendKind::Local, local.clone());
    backends.insert(BackendKind::S3, s3.clone());
    let router = Arc::new(StorageRouter::new(StorageStrategy::Hybrid, backends));

    let catalog = Arc::new(InMemoryCatalog::new());
    let config = test_config(StorageStrategy::Hybrid);
    let state = build_state(
        config.clone(),
        router,
        catalog.clone(),
        Arc::new(AllowAllAccess),
    );

    let app = routes::setup_routes(&config, state.clone()).expect("router setup");
    let server = TestServer::new(app).expect("test server");

    TestApp {
        server,
        state,
        catalog,
        local,
        s3,
    }
}

/// Seed a CSV dataset onto the local backend and register it.
pub async fn seed_dataset(app: &TestApp) -> DatasetRecord {
    let id = Uuid::new_v4();
    let key = datashare_storage::dataset_key(id, "trips.csv");
    let location = app
        .local
        .write(&key, Bytes::from_static(CSV_BODY))
        .await
        .expect("seed write");

    let record = DatasetRecord {
        id,
        owner_id: Uuid::new_v4(),
        name: "trips".to_string(),
        stored_format: DatasetFormat::Csv,
        size_bytes: CSV_BODY.len() as u64,
        checksum: location.checksum.clone(),
        locations: vec![location],
        created_at: Utc::now(),
    };
    app.catalog.insert(record.clone());
    record
}

/// Issue a download token over HTTP and return it.
pub async fn issue_token(
    app: &TestApp,
    dataset: &DatasetRecord,
    format: &str,
    compression: &str,
) -> String {
    let response = app
        .server
        .get(&format!(
            "/datasets/{}/download?format={}&compression={}",
            dataset.id, format, compression
        ))
        .add_header("x-user-id", dataset.owner_id.to_string())
        .await;
    assert_eq!(response.status_code(), 202);
    response.json::<serde_json::Value>()["download_token"]
        .as_str()
        .expect("token in response")
        .to_string()
}
