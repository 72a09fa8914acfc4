#![allow(dead_code)]

use std::path::Path;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use lightbake_api::config::ServerConfig;
use lightbake_api::router::build_app_router;
use lightbake_api::state::AppState;
use lightbake_baker::BakerConfig;
use tower::ServiceExt;

/// Build a test `ServerConfig` whose baker writes everything under `dir`.
///
/// `blender_exec` points at `dir/blender`; tests that submit bakes write a
/// fake tool there with [`write_fake_blender`].
pub fn test_config(dir: &Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        max_upload_bytes: 1024 * 1024,
        baker: BakerConfig {
            blender_exec: dir.join("blender"),
            bake_script: "utils/blender/bake.py".into(),
            models_dir: dir.join("models"),
            hdri_dir: dir.join("hdr"),
            upload_dir: dir.join("upload"),
            dump_dir: dir.join("dump"),
        },
    }
}

/// Build the full application router plus a handle on its state.
pub fn build_test_app(dir: &Path) -> (Router, AppState) {
    let state = AppState::new(test_config(dir));
    (build_app_router(state.clone()), state)
}

/// Write an executable stand-in for Blender that ignores its arguments.
#[cfg(unix)]
pub fn write_fake_blender(dir: &Path, body: &str) {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("blender");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

pub async fn send(app: &Router, method: Method, uri: &str, body: Body) -> Response<Body> {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(body)
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

pub async fn get(app: &Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, Body::empty()).await
}

pub async fn delete(app: &Router, uri: &str) -> Response<Body> {
    send(app, Method::DELETE, uri, Body::empty()).await
}

pub async fn post_bytes(app: &Router, uri: &str, bytes: &'static [u8]) -> Response<Body> {
    send(app, Method::POST, uri, Body::from(bytes)).await
}

/// Collect a response body and parse it as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Poll `/api/job/{id}` until the job reaches a terminal status.
pub async fn wait_for_terminal(app: &Router, job_id: &str) -> serde_json::Value {
    for _ in 0..1000 {
        let json = body_json(get(app, &format!("/api/job/{job_id}")).await).await;
        if json["status"] == "done" || json["status"] == "error" {
            return json;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    panic!("job {job_id} did not finish");
}
