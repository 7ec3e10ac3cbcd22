//! Download API integration tests.
//!
//! Run with: `cargo test -p datashare-api --test downloads_test`

mod helpers;

use helpers::{issue_token, seed_dataset, setup_test_app, CSV_BODY};

#[tokio::test]
async fn test_issue_requires_identity() {
    let app = setup_test_app();
    let dataset = seed_dataset(&app).await;

    let response = app
        .server
        .get(&format!("/datasets/{}/download", dataset.id))
        .await;
    assert_eq!(response.status_code(), 403);
}

#[tokio::test]
async fn test_full_download_roundtrip() {
    let app = setup_test_app();
    let dataset = seed_dataset(&app).await;
    let token = issue_token(&app, &dataset, "csv", "none").await;

    let response = app
        .server
        .get(&format!("/datasets/download/{}", token))
        .await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(
        response.header("content-disposition"),
        "attachment; filename=\"trips.csv\""
    );
    assert_eq!(response.header("content-type"), "text/csv");
    assert_eq!(response.header("accept-ranges"), "bytes");
    assert_eq!(response.as_bytes().as_ref(), CSV_BODY);

    // Session is complete and the token is spent.
    let progress = app
        .server
        .get(&format!("/datasets/download/{}/progress", token))
        .await;
    assert_eq!(progress.status_code(), 200);
    let body = progress.json::<serde_json::Value>();
    assert_eq!(body["status"], "completed");
    assert_eq!(body["bytes_transferred"], CSV_BODY.len() as u64);
    assert_eq!(body["progress_percentage"], 100.0);

    let again = app
        .server
        .get(&format!("/datasets/download/{}", token))
        .await;
    assert_eq!(again.status_code(), 409);
}

#[tokio::test]
async fn test_range_resume_serves_partial_content() {
    let app = setup_test_app();
    let dataset = seed_dataset(&app).await;
    let token = issue_token(&app, &dataset, "csv", "none").await;

    let response = app
        .server
        .get(&format!("/datasets/download/{}", token))
        .add_header("Range", "bytes=10-")
        .await;
    assert_eq!(response.status_code(), 206);
    assert_eq!(
        response.header("content-range"),
        format!("bytes 10-{}/{}", CSV_BODY.len() - 1, CSV_BODY.len())
    );
    assert_eq!(response.as_bytes().as_ref(), &CSV_BODY[10..]);
}

#[tokio::test]
async fn test_malformed_range_rejected() {
    let app = setup_test_app();
    let dataset = seed_dataset(&app).await;
    let token = issue_token(&app, &dataset, "csv", "none").await;

    let response = app
        .server
        .get(&format!("/datasets/download/{}", token))
        .add_header("Range", "bytes=0-99")
        .await;
    assert_eq!(response.status_code(), 400);
}

#[tokio::test]
async fn test_unknown_token_is_404() {
    let app = setup_test_app();

    let response = app.server.get("/datasets/download/deadbeef").await;
    assert_eq!(response.status_code(), 404);

    let progress = app
        .server
        .get("/datasets/download/deadbeef/progress")
        .await;
    assert_eq!(progress.status_code(), 404);
}

#[tokio::test]
async fn test_jsonl_transform_download() {
    let app = setup_test_app();
    let dataset = seed_dataset(&app).await;
    let token = issue_token(&app, &dataset, "jsonl", "none").await;

    let response = app
        .server
        .get(&format!("/datasets/download/{}", token))
        .await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.header("content-type"), "application/x-ndjson");
    assert_eq!(
        response.header("content-disposition"),
        "attachment; filename=\"trips.jsonl\""
    );

    let text = response.text();
    let rows: Vec<serde_json::Value> = text
        .lines()
        .map(|l| serde_json::from_str(l).expect("valid JSONL row"))
        .collect();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["name"], "Ada");
    assert_eq!(rows[1]["city"], "NYC");
}

#[tokio::test]
async fn test_gzip_download_decodes() {
    let app = setup_test_app();
    let dataset = seed_dataset(&app).await;
    let token = issue_token(&app, &dataset, "csv", "gzip").await;

    let response = app
        .server
        .get(&format!("/datasets/download/{}", token))
        .await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.header("content-type"), "application/gzip");

    use std::io::Read;
    let body = response.as_bytes();
    let mut decoder = flate2::read::GzDecoder::new(body.as_ref());
    let mut decoded = Vec::new();
    decoder.read_to_end(&mut decoded).expect("gzip decode");
    assert_eq!(decoded, CSV_BODY);
}

#[tokio::test]
async fn test_expired_token_is_410() {
    let app = setup_test_app();
    let dataset = seed_dataset(&app).await;

    let info = app
        .state
        .tokens
        .issue(
            dataset.id,
            dataset.owner_id,
            datashare_core::models::format::DatasetFormat::Csv,
            datashare_core::models::format::Compression::None,
            Some(chrono::Duration::seconds(-1)),
        )
        .await
        .expect("issue");

    let response = app
        .server
        .get(&format!("/datasets/download/{}", info.token))
        .await;
    assert_eq!(response.status_code(), 410);
}

#[tokio::test]
async fn test_retry_after_completion_is_denied() {
    let app = setup_test_app();
    let dataset = seed_dataset(&app).await;
    let token = issue_token(&app, &dataset, "csv", "none").await;

    let stream = app
        .server
        .get(&format!("/datasets/download/{}", token))
        .await;
    assert_eq!(stream.status_code(), 200);

    let retry = app
        .server
        .post(&format!("/datasets/download/{}/retry", token))
        .await;
    assert_eq!(retry.status_code(), 200);
    let body = retry.json::<serde_json::Value>();
    assert_eq!(body["can_retry"], false);
}

#[tokio::test]
async fn test_retry_after_interrupt_resumes() {
    let app = setup_test_app();
    let dataset = seed_dataset(&app).await;
    let token = issue_token(&app, &dataset, "csv", "none").await;

    // Mark the session interrupted part-way, as the drop guard would.
    app.state.tracker.start(&token, CSV_BODY.len() as u64, 0);
    app.state.tracker.advance(&token, 12).expect("advance");
    app.state.tracker.interrupt(&token).expect("interrupt");

    let retry = app
        .server
        .post(&format!("/datasets/download/{}/retry", token))
        .await;
    let body = retry.json::<serde_json::Value>();
    assert_eq!(body["can_retry"], true);
    assert_eq!(body["resume_offset"], 12);

    let response = app
        .server
        .get(&format!("/datasets/download/{}", token))
        .add_header("Range", "bytes=12-")
        .await;
    assert_eq!(response.status_code(), 206);
    assert_eq!(response.as_bytes().as_ref(), &CSV_BODY[12..]);
}

#[tokio::test]
async fn test_json_array_download() {
    let app = setup_test_app();
    let dataset = seed_dataset(&app).await;
    let token = issue_token(&app, &dataset, "json", "none").await;

    let response = app
        .server
        .get(&format!("/datasets/download/{}", token))
        .await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.header("content-type"), "application/json");

    let value: serde_json::Value =
        serde_json::from_slice(response.as_bytes().as_ref()).expect("json body");
    let rows = value.as_array().expect("array");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["id"], "1");
}

#[tokio::test]
async fn test_unknown_format_is_400() {
    let app = setup_test_app();
    let dataset = seed_dataset(&app).await;

    let response = app
        .server
        .get(&format!(
            "/datasets/{}/download?format=parquet",
            dataset.id
        ))
        .add_header("x-user-id", dataset.owner_id.to_string())
        .await;
    assert_eq!(response.status_code(), 400);
}
