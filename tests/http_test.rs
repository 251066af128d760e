//! HTTP surface exercised in-process with `tower::ServiceExt::oneshot`.

mod common;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use common::{BASE_URL, PDF_BYTES, TestEnv, setup};
use filevault::routes::routes::routes;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

const BOUNDARY: &str = "filevault-test-boundary";

fn app(env: &TestEnv) -> Router {
    routes(16 * 1024 * 1024).with_state(env.state.clone())
}

fn multipart_body(files: &[(&str, &str, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, mime, bytes) in files {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"file\"; filename=\"{name}\"\r\n")
                .as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {mime}\r\n\r\n").as_bytes());
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn upload_request(uri: &str, files: &[(&str, &str, &[u8])]) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(files)))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

async fn body_json(response: axum::response::Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Upload one text file and return the response JSON.
async fn upload_text(env: &TestEnv, name: &str, contents: &[u8]) -> Value {
    let response = app(env)
        .oneshot(upload_request("/files", &[(name, "text/plain", contents)]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await
}

#[tokio::test]
async fn healthz_is_ok() {
    let env = setup();
    let response = app(&env).oneshot(get("/healthz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({ "status": "ok" }));
}

#[tokio::test]
async fn readyz_reports_store_and_staging() {
    let env = setup();
    let response = app(&env).oneshot(get("/readyz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["checks"]["object_store"]["backend"], "memory");
    assert_eq!(body["checks"]["staging"]["ok"], true);
}

#[tokio::test]
async fn upload_then_fetch_metadata() {
    let env = setup();
    let uploaded = upload_text(&env, "notes.txt", b"0123456789").await;
    assert_eq!(uploaded["originalName"], "notes.txt");
    assert_eq!(uploaded["mimeType"], "text/plain");
    assert_eq!(uploaded["size"], 10);
    assert!(uploaded["url"].as_str().unwrap().starts_with(BASE_URL));

    let id = uploaded["fileId"].as_str().unwrap();
    let response = app(&env)
        .oneshot(get(&format!("/files/{id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let record = body_json(response).await;
    assert_eq!(record["storageKey"], uploaded["storageKey"]);
    assert_eq!(env.staged_files(), 0);
}

#[tokio::test]
async fn mismatched_upload_is_bad_request() {
    let env = setup();
    let response = app(&env)
        .oneshot(upload_request("/files", &[("photo.png", "image/png", PDF_BYTES)]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["status"], 400);
    assert!(env.state.index.is_empty());
}

#[tokio::test]
async fn batch_with_a_failure_is_multi_status() {
    let env = setup();
    let response = app(&env)
        .oneshot(upload_request(
            "/files/batch",
            &[
                ("a.txt", "text/plain", b"alpha".as_slice()),
                ("b.png", "image/png", PDF_BYTES),
                ("c.txt", "text/plain", b"gamma".as_slice()),
            ],
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::MULTI_STATUS);
    let body = body_json(response).await;
    assert_eq!(body["summary"], json!({ "total": 3, "successful": 2, "failed": 1 }));
    assert_eq!(body["failed"][0]["filename"], "b.png");
}

#[tokio::test]
async fn batch_without_files_is_rejected() {
    let env = setup();
    let response = app(&env)
        .oneshot(upload_request("/files/batch", &[]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn list_paginates_and_validates() {
    let env = setup();
    for i in 0..3 {
        upload_text(&env, &format!("doc-{i}.txt"), b"listing").await;
    }

    let response = app(&env)
        .oneshot(get("/files?page=2&limit=2"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let page = body_json(response).await;
    assert_eq!(page["total"], 3);
    assert_eq!(page["pages"], 2);
    assert_eq!(page["items"].as_array().unwrap().len(), 1);
    assert_eq!(page["hasNext"], false);
    assert_eq!(page["hasPrev"], true);

    let response = app(&env)
        .oneshot(get("/files?limit=500"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn invalid_and_unknown_ids() {
    let env = setup();
    let response = app(&env).oneshot(get("/files/not-a-uuid")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let unknown = uuid::Uuid::new_v4();
    let response = app(&env)
        .oneshot(get(&format!("/files/{unknown}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn stats_reflect_uploads() {
    let env = setup();
    upload_text(&env, "notes.txt", b"0123456789").await;

    let response = app(&env).oneshot(get("/stats")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let stats = body_json(response).await;
    assert_eq!(stats["overview"]["totalFiles"], 1);
    assert_eq!(stats["overview"]["totalSize"], 10);
    assert_eq!(stats["overview"]["recentUploads24h"], 1);
    assert_eq!(stats["distribution"]["byType"]["text"], 1);
}

#[tokio::test]
async fn signed_read_url_serves_bytes_and_rejects_tampering() {
    let env = setup();
    let uploaded = upload_text(&env, "notes.txt", b"0123456789").await;
    let url = uploaded["url"].as_str().unwrap();
    let path = url.strip_prefix(BASE_URL).unwrap();

    let response = app(&env).oneshot(get(path)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
    assert_eq!(body_bytes(response).await, b"0123456789");

    let tampered = path.replace("disposition=inline", "disposition=attachment");
    let response = app(&env).oneshot(get(&tampered)).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn download_redirects_and_counts_access() {
    let env = setup();
    let uploaded = upload_text(&env, "notes.txt", b"0123456789").await;
    let id = uploaded["fileId"].as_str().unwrap();

    let response = app(&env)
        .oneshot(get(&format!("/files/{id}/download")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    let location = response.headers()[header::LOCATION].to_str().unwrap();
    assert!(location.contains("disposition=attachment"));

    let record = env.state.index.get(id.parse().unwrap()).unwrap();
    assert_eq!(record.access_count, 1);
}

#[tokio::test]
async fn share_defaults_and_rejects_bad_ttl() {
    let env = setup();
    let uploaded = upload_text(&env, "notes.txt", b"0123456789").await;
    let id = uploaded["fileId"].as_str().unwrap();

    let response = app(&env)
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri(format!("/files/{id}/share"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let link = body_json(response).await;
    assert_eq!(link["expiresIn"], 3600);

    let response = app(&env)
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri(format!("/files/{id}/share"))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"expiresIn": 10}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn delete_removes_file() {
    let env = setup();
    let uploaded = upload_text(&env, "notes.txt", b"0123456789").await;
    let id = uploaded["fileId"].as_str().unwrap();
    let delete = || {
        Request::builder()
            .method(Method::DELETE)
            .uri(format!("/files/{id}"))
            .body(Body::empty())
            .unwrap()
    };

    let response = app(&env).oneshot(delete()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["deleted"], true);
    assert!(env.store.is_empty());

    let response = app(&env).oneshot(delete()).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn presigned_put_is_indexed_once() {
    let env = setup();
    let response = app(&env)
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/files/presign")
                .header(header::CONTENT_TYPE, "application/json")
                .header("x-owner-id", "erin")
                .body(Body::from(
                    r#"{"filename": "clip.txt", "contentType": "text/plain"}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let presigned = body_json(response).await;
    let key = presigned["storageKey"].as_str().unwrap().to_string();
    let path = presigned["url"]
        .as_str()
        .unwrap()
        .strip_prefix(BASE_URL)
        .unwrap()
        .to_string();

    let put = |content_type: &'static str| {
        Request::builder()
            .method(Method::PUT)
            .uri(path.as_str())
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from("direct upload"))
            .unwrap()
    };

    let response = app(&env).oneshot(put("image/png")).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app(&env).oneshot(put("text/plain")).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let uploaded = body_json(response).await;
    assert_eq!(uploaded["fileId"], presigned["fileId"]);
    let tags = env.store.tags(&key).unwrap();
    assert_eq!(tags.owner_id, "erin");

    let id = presigned["fileId"].as_str().unwrap();
    let response = app(&env)
        .oneshot(get(&format!("/files/{id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["storageKey"], key.as_str());

    // the same signed URL cannot be used twice
    let response = app(&env).oneshot(put("text/plain")).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(env.store.len(), 1);
    assert_eq!(env.state.index.len(), 1);
}
