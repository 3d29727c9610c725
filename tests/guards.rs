#[path = "common/mod.rs"]
mod common;

use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use common::*;
use storybook::{AppConfig, RateLimitConfig};

fn post_from(client_ip: &str, api_key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/")
        .header("content-type", "application/json")
        .header("x-forwarded-for", client_ip)
        .header("origin", "https://shop.example");
    if let Some(key) = api_key {
        builder = builder.header("x-api-key", key);
    }
    builder
        .body(Body::from(serde_json::to_vec(&valid_body()).unwrap()))
        .unwrap()
}

fn limited(max_requests: u32) -> AppConfig {
    AppConfig {
        rate_limit: RateLimitConfig {
            enabled: true,
            max_requests,
            window: Duration::from_secs(1800),
        },
        ..config_with_key()
    }
}

#[tokio::test]
async fn api_key_not_enforced_by_default() {
    let config = AppConfig {
        api_key: Some("s3cret".into()),
        ..config_with_key()
    };
    let app = router(config, StubGenerator::replying(FENCED_BOOK));
    let resp = send(&app, post_from("1.1.1.1", None)).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn api_key_enforced_when_enabled() {
    let config = AppConfig {
        api_key: Some("s3cret".into()),
        require_api_key: true,
        ..config_with_key()
    };
    let stub = StubGenerator::replying(FENCED_BOOK);
    let app = router(config, stub.clone());

    let resp = send(&app, post_from("1.1.1.1", Some("wrong"))).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        resp.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "https://shop.example"
    );
    assert_eq!(
        body_json(resp).await,
        serde_json::json!({"error": "Invalid API key"})
    );
    assert_eq!(stub.calls(), 0);

    let resp = send(&app, post_from("1.1.1.1", Some("s3cret"))).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn rate_limit_rejects_after_quota() {
    let stub = StubGenerator::replying(FENCED_BOOK);
    let app = router(limited(2), stub.clone());

    let first = send(&app, post_from("7.7.7.7", None)).await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(first.headers()["x-ratelimit-limit"], "2");
    assert_eq!(first.headers()["x-ratelimit-window"], "1800s");
    assert_eq!(first.headers()["x-ratelimit-remaining"], "1");

    let second = send(&app, post_from("7.7.7.7", None)).await;
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(second.headers()["x-ratelimit-remaining"], "0");

    let third = send(&app, post_from("7.7.7.7", None)).await;
    assert_eq!(third.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(third.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_some());
    assert_eq!(third.headers()["x-ratelimit-remaining"], "0");
    assert_eq!(
        body_json(third).await,
        serde_json::json!({"error": "Rate limit exceeded. Please try again later."})
    );
    assert_eq!(stub.calls(), 2);

    // a different client is unaffected
    let other = send(&app, post_from("8.8.8.8", None)).await;
    assert_eq!(other.status(), StatusCode::OK);
}

#[tokio::test]
async fn rate_limit_headers_accompany_later_failures() {
    let app = router(
        AppConfig {
            gemini_api_key: None,
            ..limited(5)
        },
        StubGenerator::replying(FENCED_BOOK),
    );
    let resp = send(&app, post_from("6.6.6.6", None)).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(resp.headers()["x-ratelimit-remaining"], "4");
}

#[tokio::test]
async fn preflight_does_not_consume_quota() {
    let app = router(limited(1), StubGenerator::replying(FENCED_BOOK));
    for _ in 0..3 {
        let req = Request::builder()
            .method("OPTIONS")
            .uri("/")
            .header("x-forwarded-for", "5.5.5.5")
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(&app, req).await.status(), StatusCode::NO_CONTENT);
    }
    let resp = send(&app, post_from("5.5.5.5", None)).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn panic_response_keeps_rate_limit_headers() {
    let app = router(limited(3), std::sync::Arc::new(PanickingGenerator));
    let resp = send(&app, post_from("4.4.4.4", None)).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(resp.headers()["x-ratelimit-remaining"], "2");
    assert!(resp.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_some());
}
