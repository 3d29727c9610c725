#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{Request, Response};
use http_body_util::BodyExt;
use storybook::{app, AppConfig, AppState, GatewayError, Generator};
use tower::ServiceExt;

pub const FENCED_BOOK: &str = "Ето я приказката:\n```json\n{\"bookTitle\":\"Мария и морето\",\"shortDescription\":\"s\",\"motivationEnd\":\"m\",\"scenes\":[{\"text\":\"Имало едно време...\"},{\"text\":\"Край.\"}]}\n```";

/// Deterministic generator returning a canned reply and recording calls.
pub struct StubGenerator {
    reply: Result<String, GatewayError>,
    calls: AtomicUsize,
    last: Mutex<Option<(String, String, String)>>,
}

impl StubGenerator {
    pub fn replying(text: &str) -> Arc<Self> {
        Self::with_result(Ok(text.to_string()))
    }

    pub fn failing(err: GatewayError) -> Arc<Self> {
        Self::with_result(Err(err))
    }

    fn with_result(reply: Result<String, GatewayError>) -> Arc<Self> {
        Arc::new(Self {
            reply,
            calls: AtomicUsize::new(0),
            last: Mutex::new(None),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// (prompt, model, credential) of the most recent call.
    pub fn last_call(&self) -> Option<(String, String, String)> {
        self.last.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Generator for StubGenerator {
    async fn generate(
        &self,
        prompt: &str,
        model: &str,
        credential: &str,
    ) -> Result<String, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() =
            Some((prompt.to_string(), model.to_string(), credential.to_string()));
        self.reply.clone()
    }
}

/// Generator that panics, for the outer error boundary.
pub struct PanickingGenerator;

#[async_trait::async_trait]
impl Generator for PanickingGenerator {
    async fn generate(&self, _: &str, _: &str, _: &str) -> Result<String, GatewayError> {
        panic!("generator exploded")
    }
}

pub fn config_with_key() -> AppConfig {
    AppConfig {
        gemini_api_key: Some("test-key".to_string()),
        ..AppConfig::default()
    }
}

pub fn router(config: AppConfig, generator: Arc<dyn Generator>) -> axum::Router {
    app(AppState::new(config, generator))
}

pub fn valid_body() -> serde_json::Value {
    serde_json::json!({"name": "Мария", "age": 5, "gender": "girl", "topic": "море"})
}

pub fn post_json(body: &serde_json::Value, origin: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/")
        .header("content-type", "application/json");
    if let Some(origin) = origin {
        builder = builder.header("origin", origin);
    }
    builder
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

pub async fn send(router: &axum::Router, req: Request<Body>) -> Response<Body> {
    router.clone().oneshot(req).await.unwrap()
}

pub async fn body_json(resp: Response<Body>) -> serde_json::Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Sets environment variables for one test and restores them on drop.
pub struct EnvGuard {
    saved: Vec<(String, Option<String>)>,
}

impl EnvGuard {
    pub fn new() -> Self {
        Self { saved: Vec::new() }
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.save(key);
        std::env::set_var(key, value);
    }

    pub fn set_many(&mut self, vars: &[(&str, &str)]) {
        for (key, value) in vars {
            self.set(key, value);
        }
    }

    pub fn remove(&mut self, key: &str) {
        self.save(key);
        std::env::remove_var(key);
    }

    fn save(&mut self, key: &str) {
        if !self.saved.iter().any(|(k, _)| k == key) {
            self.saved.push((key.to_string(), std::env::var(key).ok()));
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in self.saved.drain(..).rev() {
            match value {
                Some(v) => std::env::set_var(&key, v),
                None => std::env::remove_var(&key),
            }
        }
    }
}
