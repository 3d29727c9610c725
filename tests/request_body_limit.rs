#[path = "common/mod.rs"]
mod common;

use axum::Router;
use bytes::Bytes;
use common::EnvGuard;
use http_body::Frame;
use http_body_util::StreamBody;
use once_cell::sync::Lazy;
use reqwest::{Client, StatusCode};
use std::convert::Infallible;
use std::net::SocketAddr;
use storybook::{app, build_state_from_env};
use tokio::net::TcpListener as TokioTcpListener;
use tokio::sync::Mutex;
use tokio_stream::iter;

type GuardedHandle = (String, tokio::task::JoinHandle<()>);

static ENV_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

async fn spawn_app() -> GuardedHandle {
    let listener = TokioTcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = build_state_from_env().await.unwrap();
    let app: Router = app(state);
    let handle = tokio::spawn(async move {
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .unwrap();
    });
    (format!("http://{}", addr), handle)
}

fn chunked(payload: String) -> reqwest::Body {
    let chunk_bytes: Vec<_> = payload
        .as_bytes()
        .chunks(128)
        .map(Bytes::copy_from_slice)
        .collect();
    let stream = iter(
        chunk_bytes
            .into_iter()
            .map(|chunk| Ok::<_, Infallible>(Frame::data(chunk))),
    );
    reqwest::Body::wrap(StreamBody::new(stream))
}

fn limited_env() -> EnvGuard {
    let mut env = EnvGuard::new();
    env.set_many(&[
        ("STORYBOOK_MAX_REQUEST_BYTES", "256"),
        ("GEMINI_API_KEY", "test"),
        ("GEMINI_API_BASE", "http://127.0.0.1:9/v1beta"),
        ("GEMINI_TIMEOUT_MS", "2000"),
    ]);
    env.remove("ALLOWED_ORIGINS");
    env.remove("STORYBOOK_RATE_LIMIT");
    env.remove("STORYBOOK_REQUIRE_API_KEY");
    env
}

#[tokio::test]
async fn chunked_payload_over_limit_returns_error_response() {
    let _lock = ENV_MUTEX.lock().await;
    let _env = limited_env();
    let (base, handle) = spawn_app().await;

    let payload = serde_json::json!({
        "name": "Мария",
        "age": 5,
        "gender": "girl",
        "topic": "X".repeat(2048)
    })
    .to_string();

    let resp = Client::new()
        .post(&base)
        .header("content-type", "application/json")
        .header("origin", "https://shop.example")
        .body(chunked(payload))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(
        resp.headers()["access-control-allow-origin"],
        "https://shop.example"
    );
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json, serde_json::json!({"error": "Request too large"}));
    handle.abort();
}

#[tokio::test]
async fn chunked_payload_under_limit_reaches_the_model() {
    let _lock = ENV_MUTEX.lock().await;
    let _env = limited_env();
    let (base, handle) = spawn_app().await;

    let payload = serde_json::json!({
        "name": "Иван",
        "age": 7,
        "gender": "boy",
        "topic": "космос"
    })
    .to_string();

    let resp = Client::new()
        .post(&base)
        .header("content-type", "application/json")
        .body(chunked(payload))
        .send()
        .await
        .unwrap();
    // nothing listens on the configured backend
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["error"], "AI model request failed");
    handle.abort();
}
