//! Blackbox tests for uploading, listing, streaming and deleting videos.

use anyhow::Result;
use bytesize::ByteSize;
use clipstore_server::config::Config;
use clipstore_test::server::TestServer;
use reqwest::multipart::{Form, Part};
use reqwest::{StatusCode, header};
use serde_json::Value;

fn video_payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn upload_form(payload: Vec<u8>) -> Result<Form> {
    let file = Part::bytes(payload)
        .file_name("clip.mp4")
        .mime_str("video/mp4")?;

    Ok(Form::new()
        .text("title", "Cats")
        .text("description", "Cats doing things")
        .text("uploaderName", "Uploader")
        .text("uploaderEmail", "uploader@example.com")
        .part("videoFile", file))
}

async fn upload(client: &reqwest::Client, server: &TestServer, payload: Vec<u8>) -> Result<Value> {
    let response = client
        .post(server.url("/videoDetails"))
        .multipart(upload_form(payload)?)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(response.json().await?)
}

/// Starts a server that splits videos into small chunks.
async fn small_chunk_server() -> TestServer {
    clipstore_test::tracing::init();
    TestServer::with_config(Config {
        chunk_size: ByteSize::b(64),
        ..Default::default()
    })
    .await
}

#[tokio::test]
async fn test_index() -> Result<()> {
    let server = TestServer::new().await;

    let response = reqwest::get(server.url("/")).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::SERVER].to_str()?.starts_with("clipstore/"));
    assert_eq!(response.text().await?, "Hello World!");

    let response = reqwest::get(server.url("/health")).await?;
    assert_eq!(response.status(), StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn test_cors() -> Result<()> {
    let server = TestServer::new().await;
    let client = reqwest::Client::new();

    let response = client
        .request(reqwest::Method::OPTIONS, server.url("/videoDetails"))
        .header(header::ORIGIN, "http://frontend.example.com")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .send()
        .await?;
    assert!(response.status().is_success());
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");

    let response = client
        .get(server.url("/videoDetails"))
        .header(header::ORIGIN, "http://frontend.example.com")
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");

    Ok(())
}

#[tokio::test]
async fn test_upload_and_stream() -> Result<()> {
    let server = small_chunk_server().await;
    let client = reqwest::Client::new();
    let payload = video_payload(1000);

    let video = upload(&client, &server, payload.clone()).await?;
    assert_eq!(video["title"], "Cats");
    assert_eq!(video["uploaderEmail"], "uploader@example.com");
    assert_eq!(video["contentType"], "video/mp4");
    assert_eq!(video["likes"], Value::Array(vec![]));

    let object_id = video["objectId"].as_str().unwrap();
    let video_url = video["videoUrl"].as_str().unwrap();
    assert_eq!(video_url, server.url(&format!("/videos/{object_id}")));

    let response = client.get(video_url).send().await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "video/mp4");
    assert_eq!(response.headers()[header::ACCEPT_RANGES], "bytes");
    assert_eq!(response.headers()[header::CONTENT_LENGTH], "1000");
    assert_eq!(response.bytes().await?.as_ref(), payload.as_slice());

    Ok(())
}

#[tokio::test]
async fn test_list_and_get() -> Result<()> {
    let server = small_chunk_server().await;
    let client = reqwest::Client::new();

    let response = client.get(server.url("/videoDetails")).send().await?;
    assert_eq!(response.json::<Vec<Value>>().await?.len(), 0);

    let first = upload(&client, &server, video_payload(10)).await?;
    let second = upload(&client, &server, video_payload(20)).await?;

    let response = client.get(server.url("/videoDetails")).send().await?;
    assert_eq!(response.status(), StatusCode::OK);
    let videos: Vec<Value> = response.json().await?;
    assert_eq!(videos.len(), 2);
    assert_eq!(videos[0]["recordId"], first["recordId"]);
    assert_eq!(videos[1]["recordId"], second["recordId"]);

    let record_id = second["recordId"].as_str().unwrap();
    let response = client
        .get(server.url(&format!("/videoDetails/{record_id}")))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let video: Value = response.json().await?;
    assert_eq!(video["objectId"], second["objectId"]);
    assert!(video["videoUrl"].is_string());

    Ok(())
}

#[tokio::test]
async fn test_range_requests() -> Result<()> {
    let server = small_chunk_server().await;
    let client = reqwest::Client::new();
    let payload = video_payload(300);

    let video = upload(&client, &server, payload.clone()).await?;
    let video_url = video["videoUrl"].as_str().unwrap();

    // Spans the boundary between the first two chunks.
    let response = client
        .get(video_url)
        .header(header::RANGE, "bytes=60-69")
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 60-69/300");
    assert_eq!(response.headers()[header::CONTENT_LENGTH], "10");
    assert_eq!(response.bytes().await?.as_ref(), &payload[60..70]);

    let response = client
        .get(video_url)
        .header(header::RANGE, "bytes=-5")
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 295-299/300");
    assert_eq!(response.bytes().await?.as_ref(), &payload[295..]);

    let response = client
        .get(video_url)
        .header(header::RANGE, "bytes=300-")
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes */300");

    // Multiple ranges are not supported and fall back to the full object.
    let response = client
        .get(video_url)
        .header(header::RANGE, "bytes=0-1,5-6")
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.bytes().await?.len(), 300);

    Ok(())
}

#[tokio::test]
async fn test_upload_requires_file() -> Result<()> {
    let server = small_chunk_server().await;
    let client = reqwest::Client::new();

    let form = Form::new()
        .text("title", "Cats")
        .text("description", "Cats doing things")
        .text("uploaderName", "Uploader")
        .text("uploaderEmail", "uploader@example.com");
    let response = client
        .post(server.url("/videoDetails"))
        .multipart(form)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = client
        .post(server.url("/videoDetails"))
        .body("not a form")
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn test_incomplete_form_leaves_nothing_behind() -> Result<()> {
    let server = small_chunk_server().await;
    let client = reqwest::Client::new();

    let file = Part::bytes(video_payload(500)).file_name("clip.mp4");
    let form = Form::new().text("title", "Cats").part("videoFile", file);
    let response = client
        .post(server.url("/videoDetails"))
        .multipart(form)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await?;
    assert_eq!(body["error"], "bad request");

    let response = client.get(server.url("/videoDetails")).send().await?;
    assert_eq!(response.json::<Vec<Value>>().await?.len(), 0);

    Ok(())
}

#[tokio::test]
async fn test_empty_upload() -> Result<()> {
    let server = small_chunk_server().await;
    let client = reqwest::Client::new();

    let response = client
        .post(server.url("/videoDetails"))
        .multipart(upload_form(Vec::new())?)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn test_invalid_ids() -> Result<()> {
    let server = small_chunk_server().await;
    let client = reqwest::Client::new();

    let response = client
        .get(server.url("/videoDetails/not-an-id"))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = client.get(server.url("/videos/not-an-id")).send().await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = client
        .get(server.url("/videoDetails/0190a0d6-7a3e-7c4e-9a3b-1b2c3d4e5f60"))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = client
        .get(server.url("/videos/0190a0d6-7a3e-7c4e-9a3b-1b2c3d4e5f60"))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn test_delete() -> Result<()> {
    let server = small_chunk_server().await;
    let client = reqwest::Client::new();

    let video = upload(&client, &server, video_payload(200)).await?;
    let record_id = video["recordId"].as_str().unwrap();
    let video_url = video["videoUrl"].as_str().unwrap();

    let response = client
        .delete(server.url(&format!("/videoDetails/{record_id}")))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await?;
    assert_eq!(body["message"], "Item deleted successfully");
    assert_eq!(body["recordId"], record_id);

    let response = client
        .get(server.url(&format!("/videoDetails/{record_id}")))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // The stored video is removed along with its record.
    let response = client.get(video_url).send().await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = client
        .delete(server.url(&format!("/videoDetails/{record_id}")))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn test_delete_keeps_video_without_cascade() -> Result<()> {
    let server = TestServer::with_config(Config {
        chunk_size: ByteSize::b(64),
        cascade_delete: false,
        ..Default::default()
    })
    .await;
    let client = reqwest::Client::new();

    let video = upload(&client, &server, video_payload(200)).await?;
    let record_id = video["recordId"].as_str().unwrap();

    let response = client
        .delete(server.url(&format!("/videoDetails/{record_id}")))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = client
        .get(video["videoUrl"].as_str().unwrap())
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.bytes().await?.len(), 200);

    Ok(())
}
