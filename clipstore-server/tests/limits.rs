//! Blackbox tests for upload limits.

use anyhow::Result;
use bytesize::ByteSize;
use clipstore_server::config::Config;
use clipstore_server::extractors::TEXT_FIELD_LIMIT;
use clipstore_test::server::TestServer;
use reqwest::StatusCode;
use reqwest::multipart::{Form, Part};
use serde_json::Value;

fn upload_form(len: usize) -> Form {
    Form::new()
        .text("title", "Cats")
        .text("description", "Cats doing things")
        .text("uploaderName", "Uploader")
        .text("uploaderEmail", "uploader@example.com")
        .part("videoFile", Part::bytes(vec![7; len]).file_name("clip.mp4"))
}

#[tokio::test]
async fn test_max_upload_size() -> Result<()> {
    clipstore_test::tracing::init();
    let server = TestServer::with_config(Config {
        chunk_size: ByteSize::b(64),
        max_upload_size: Some(ByteSize::b(256)),
        ..Default::default()
    })
    .await;
    let client = reqwest::Client::new();

    let response = client
        .post(server.url("/videoDetails"))
        .multipart(upload_form(256))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = client
        .post(server.url("/videoDetails"))
        .multipart(upload_form(1000))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body: Value = response.json().await?;
    assert_eq!(body["error"], "upload too large");

    // Only the upload within the limit is visible.
    let response = client.get(server.url("/videoDetails")).send().await?;
    assert_eq!(response.json::<Vec<Value>>().await?.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_text_field_limit() -> Result<()> {
    clipstore_test::tracing::init();
    let server = TestServer::new().await;
    let client = reqwest::Client::new();

    // The file arrives first and is staged before the oversized title is read.
    let form = Form::new()
        .part("videoFile", Part::bytes(vec![7; 1000]).file_name("clip.mp4"))
        .text("title", "x".repeat(TEXT_FIELD_LIMIT as usize + 1024))
        .text("description", "Cats doing things")
        .text("uploaderName", "Uploader")
        .text("uploaderEmail", "uploader@example.com");
    let response = client
        .post(server.url("/videoDetails"))
        .multipart(form)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body: Value = response.json().await?;
    assert_eq!(body["error"], "field too large");

    // Long text below the limit is accepted.
    let form = Form::new()
        .text("title", "Cats")
        .text("description", "x".repeat(TEXT_FIELD_LIMIT as usize / 2))
        .text("uploaderName", "Uploader")
        .text("uploaderEmail", "uploader@example.com")
        .part("videoFile", Part::bytes(vec![7; 100]).file_name("clip.mp4"));
    let response = client
        .post(server.url("/videoDetails"))
        .multipart(form)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = client.get(server.url("/videoDetails")).send().await?;
    assert_eq!(response.json::<Vec<Value>>().await?.len(), 1);

    Ok(())
}
