#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    body::{Body, Bytes},
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use qrshelf::{build_router, catalog::MemoryCatalog, config::Config, state::AppState};

pub const BASE_URL: &str = "http://labels.test";
const BOUNDARY: &str = "qrshelf-test-boundary";

/// Smallest byte string `image::guess_format` recognises as PNG.
pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

pub enum Part<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a str, &'a [u8]),
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub tmp: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_vars(&[]).await
    }

    pub async fn with_vars(extra: &[(&str, &str)]) -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let mut vars: HashMap<String, String> = HashMap::new();
        vars.insert("APP_ROOT".into(), tmp.path().display().to_string());
        vars.insert("PUBLIC_BASE_URL".into(), BASE_URL.into());
        for (k, v) in extra {
            vars.insert(k.to_string(), v.to_string());
        }
        let config = Config::from_lookup(|key| vars.get(key).cloned()).unwrap();

        let state = AppState::new(config, Arc::new(MemoryCatalog::new()))
            .await
            .unwrap();
        let router = build_router(state.clone());
        Self { router, state, tmp }
    }

    /// Rebuild the router over the same catalog and tree with a changed config.
    pub fn reconfigure(&mut self, change: impl FnOnce(&mut Config)) {
        change(&mut self.state.config);
        self.router = build_router(self.state.clone());
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Bytes, header::HeaderMap) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, body, headers)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Bytes, header::HeaderMap) {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    pub async fn get_json(&self, uri: &str) -> (StatusCode, Value) {
        let (status, body, _) = self.get(uri).await;
        (status, to_json(&body))
    }

    pub async fn delete(&self, uri: &str) -> (StatusCode, Value) {
        let (status, body, _) = self
            .send(Request::delete(uri).body(Body::empty()).unwrap())
            .await;
        (status, to_json(&body))
    }

    pub async fn post_empty(&self, uri: &str) -> (StatusCode, Value) {
        let (status, body, _) = self
            .send(Request::post(uri).body(Body::empty()).unwrap())
            .await;
        (status, to_json(&body))
    }

    pub async fn send_json(&self, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let (status, body, _) = self.send(request).await;
        (status, to_json(&body))
    }

    pub async fn send_multipart(&self, method: &str, uri: &str, parts: &[Part<'_>]) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(multipart_body(parts)))
            .unwrap();
        let (status, body, _) = self.send(request).await;
        (status, to_json(&body))
    }

    /// Absolute path of a DB-stored relative path.
    pub fn abs(&self, stored: &str) -> PathBuf {
        self.state.paths.to_absolute(stored).unwrap()
    }

    pub async fn create_project(&self, name: &str) -> Value {
        let (status, body) = self
            .send_multipart("POST", "/api/projects", &[Part::Text("projectName", name)])
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body
    }

    pub async fn add_sections(&self, project_id: i64, names: &[&str]) -> Vec<Value> {
        let (status, body) = self
            .send_json(
                "POST",
                "/api/sections/addsections",
                serde_json::json!({ "projectId": project_id, "sectionNames": names }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body.as_array().unwrap().clone()
    }

    pub async fn upload(&self, section_id: i64, filename: &str, data: &[u8], tags: &[&str]) -> Value {
        let section_id = section_id.to_string();
        let mut parts = vec![
            Part::Text("sectionId", &section_id),
            Part::File("file", filename, data),
        ];
        for tag in tags {
            parts.push(Part::Text("tags", tag));
        }
        let (status, body) = self
            .send_multipart("POST", "/api/uploadFile/upload", &parts)
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body
    }
}

pub fn to_json(body: &Bytes) -> Value {
    if body.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(body).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
}

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File(name, filename, data) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n",
                        name, filename
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn id_of(value: &Value) -> i64 {
    value["id"].as_i64().unwrap()
}

pub fn str_of<'a>(value: &'a Value, key: &str) -> &'a str {
    value[key].as_str().unwrap()
}
