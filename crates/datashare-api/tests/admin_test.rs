//! Storage administration API integration tests.
//!
//! Run with: `cargo test -p datashare-api --test admin_test`

mod helpers;

use bytes::Bytes;
use datashare_storage::Storage;
use helpers::{seed_dataset, setup_test_app};
use serde_json::json;

#[tokio::test]
async fn test_storage_status_reports_backends() {
    let app = setup_test_app();

    let response = app.server.get("/admin/storage/status").await;
    assert_eq!(response.status_code(), 200);

    let body = response.json::<serde_json::Value>();
    assert_eq!(body["storage_strategy"], "hybrid");
    assert_eq!(body["current_backend"], "local");
    assert_eq!(body["local_backend_available"], true);
    assert_eq!(body["s3_backend_available"], true);
    assert_eq!(body["backend_info"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_migrate_requires_confirmation() {
    let app = setup_test_app();
    seed_dataset(&app).await;

    let response = app
        .server
        .post("/admin/storage/migrate")
        .json(&json!({ "target_backend": "s3", "confirm": false }))
        .await;
    assert_eq!(response.status_code(), 400);
}

#[tokio::test]
async fn test_migrate_moves_dataset_to_s3() {
    let app = setup_test_app();
    let dataset = seed_dataset(&app).await;
    let key = dataset.locations[0].key.clone();

    let response = app
        .server
        .post("/admin/storage/migrate")
        .json(&json!({
            "target_backend": "s3",
            "confirm": true,
            "delete_source": true
        }))
        .await;
    assert_eq!(response.status_code(), 200);

    let report = response.json::<serde_json::Value>();
    assert_eq!(report["processed"], 1);
    assert_eq!(report["succeeded"], 1);
    assert_eq!(report["failed"].as_array().unwrap().len(), 0);
    assert_eq!(report["total_files"], 1);
    assert_eq!(report["bytes_moved"], dataset.size_bytes);

    assert!(app.s3.exists(&key).await.unwrap());
    assert!(!app.local.exists(&key).await.unwrap());

    // The catalog now points at S3, and downloads still work.
    let token = helpers::issue_token(&app, &dataset, "csv", "none").await;
    let download = app
        .server
        .get(&format!("/datasets/download/{}", token))
        .await;
    assert_eq!(download.status_code(), 200);
    assert_eq!(download.as_bytes().as_ref(), helpers::CSV_BODY);
}

#[tokio::test]
async fn test_unknown_target_backend_is_400() {
    let app = setup_test_app();

    let response = app
        .server
        .post("/admin/storage/migrate")
        .json(&json!({ "target_backend": "tape", "confirm": true }))
        .await;
    assert_eq!(response.status_code(), 400);
}

#[tokio::test]
async fn test_verify_clean_and_with_orphan() {
    let app = setup_test_app();
    seed_dataset(&app).await;

    let response = app.server.post("/admin/storage/verify").await;
    assert_eq!(response.status_code(), 200);
    let report = response.json::<serde_json::Value>();
    assert_eq!(report["missing_files"].as_array().unwrap().len(), 0);
    assert_eq!(report["orphaned_files"].as_array().unwrap().len(), 0);

    // Drop a stray object, then verify again.
    let stray = format!("datasets/{}/stray.csv", uuid::Uuid::new_v4());
    app.s3
        .write(&stray, Bytes::from_static(b"junk"))
        .await
        .unwrap();

    let response = app.server.post("/admin/storage/verify").await;
    let report = response.json::<serde_json::Value>();
    let orphans = report["orphaned_files"].as_array().unwrap();
    assert_eq!(orphans.len(), 1);
    assert_eq!(orphans[0]["key"], stray);

    // Cleanup pass with confirmation deletes it.
    let response = app
        .server
        .post("/admin/storage/verify")
        .json(&json!({ "remove_orphans": true, "confirm": true }))
        .await;
    assert_eq!(response.status_code(), 200);
    assert!(!app.s3.exists(&stray).await.unwrap());
}

#[tokio::test]
async fn test_verify_flags_missing_file() {
    let app = setup_test_app();
    let dataset = seed_dataset(&app).await;
    app.local.delete(&dataset.locations[0].key).await.unwrap();

    let response = app.server.post("/admin/storage/verify").await;
    let report = response.json::<serde_json::Value>();
    let missing = report["missing_files"].as_array().unwrap();
    assert_eq!(missing.len(), 1);
    assert_eq!(missing[0]["dataset_id"], dataset.id.to_string());
}
