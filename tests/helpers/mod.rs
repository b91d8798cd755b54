//! Router harness: the full HTTP surface over in-memory backends.

#![allow(dead_code)]

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

use echome::app_state::AppState;
use echome::auth::{issue_session_token, SessionClaims, SessionVerifier};
use echome::db::memory::MemoryStore;
use echome::routes::build_router;
use echome::services::queue::MemoryQueue;
use echome::services::speech::SpeechClient;
use echome::services::storage::ArtifactStore;

pub const SECRET: &str = "test-session-secret";
pub const MAX_UPLOAD_BYTES: usize = 1024 * 1024;
const BOUNDARY: &str = "echome-test-boundary";

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub queue: Arc<MemoryQueue>,
    pub data_dir: TempDir,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("response body is not JSON")
    }

    pub fn error(&self) -> String {
        self.json()["error"]
            .as_str()
            .expect("no error message")
            .to_string()
    }
}

impl TestApp {
    /// App whose speech client has no API key.
    pub fn new() -> Self {
        Self::with_speech("http://127.0.0.1:9", None)
    }

    pub fn with_speech(base_url: &str, api_key: Option<&str>) -> Self {
        let store = Arc::new(MemoryStore::new());
        let queue = Arc::new(MemoryQueue::new());
        let data_dir = tempfile::tempdir().expect("tempdir");

        let speech = SpeechClient::new(
            base_url,
            api_key.map(str::to_string),
            Duration::from_secs(2),
        )
        .expect("speech client");

        let state = AppState::new(
            store.clone(),
            queue.clone(),
            speech,
            ArtifactStore::new(data_dir.path()),
            SessionVerifier::new(SECRET),
        );

        Self {
            router: build_router(state, MAX_UPLOAD_BYTES, None),
            store,
            queue,
            data_dir,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("read body")
            .to_bytes();
        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> TestResponse {
        self.send(authorized(Request::get(path), token).body(Body::empty()).unwrap())
            .await
    }

    pub async fn post_json(&self, path: &str, token: Option<&str>, body: Value) -> TestResponse {
        self.send(
            authorized(Request::post(path), token)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn upload(
        &self,
        token: Option<&str>,
        file: Option<(&str, &[u8])>,
        fields: &[(&str, &str)],
    ) -> TestResponse {
        self.send(
            authorized(Request::post("/api/products/upload"), token)
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={BOUNDARY}"),
                )
                .body(Body::from(multipart_body(file, fields)))
                .unwrap(),
        )
        .await
    }

    /// Id of a user who has made at least one authenticated request.
    pub async fn user_id(&self, email: &str) -> Uuid {
        self.store
            .user_by_email(email)
            .await
            .expect("user was never resolved")
            .id
    }
}

/// Sign a valid session token for `email`.
pub fn token_for(email: &str) -> String {
    issue_session_token(
        SECRET,
        &SessionClaims {
            sub: email.to_string(),
            name: Some("Test User".into()),
            picture: None,
            exp: chrono::Utc::now().timestamp() + 3600,
        },
    )
    .expect("sign token")
}

fn authorized(builder: axum::http::request::Builder, token: Option<&str>) -> axum::http::request::Builder {
    match token {
        Some(token) => builder.header(header::AUTHORIZATION, format!("Bearer {token}")),
        None => builder,
    }
}

fn multipart_body(file: Option<(&str, &[u8])>, fields: &[(&str, &str)]) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some((filename, data)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: text/plain\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}
