//! Core library for Storybook.  This module wires the request pipeline
//! (origin check, optional guards, validation, prompt, model call,
//! extraction) into a single HTTP endpoint and exposes the shared state.
//!
//! Every path accepts the generation call; `/healthz` and `/metrics` are
//! the only other routes.
//!
//! A successful call answers with the model's book object exactly as it
//! was parsed, extra fields included.  [`Book`] and [`Scene`] are the typed
//! view of the fields the prompt asks for: clients deserialize the response
//! body into them, and the handler uses them to check a book before
//! relaying it.

mod config;
pub mod error;
pub mod extract;
pub mod gateway;
pub mod guards;
pub mod metrics;
pub mod origin;
pub mod prompt;
pub mod util;
pub mod validation;

pub use config::{AppConfig, RateLimitConfig, DEFAULT_MAX_REQUEST_BYTES, DEFAULT_MODEL};
pub use error::{ApiError, ErrorBody};
pub use gateway::{GatewayError, GeminiGateway, Generator};
pub use validation::{validate, Gender, GenerationRequest, ValidationError};

use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::body::{Body, Bytes};
use axum::extract::{
    rejection::{BytesRejection, FailedToBufferBody},
    ConnectInfo, DefaultBodyLimit, State,
};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::catch_panic::CatchPanicLayer;

use crate::extract::{extract, scene_count, ExtractionError};
use crate::guards::{GuardChain, GuardContext};
use crate::metrics::{Metrics, UpstreamFailure};
use crate::origin::{check_origin, cors_headers, request_origin};
use crate::prompt::{build_prompt, REQUESTED_SCENES};

/// One page of the generated story.
#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq, Eq)]
pub struct Scene {
    pub text: String,
}

/// Typed view of a generated book.  The endpoint relays the model's JSON
/// object as parsed, so this is for consumers that want the known fields.
#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub book_title: String,
    #[serde(default)]
    pub short_description: String,
    #[serde(default)]
    pub motivation_end: String,
    pub scenes: Vec<Scene>,
}

/// Shared application state.  Everything is read-only after startup apart
/// from the atomic metrics and the rate limiter inside `guards`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub generator: Arc<dyn Generator>,
    pub guards: GuardChain,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(config: AppConfig, generator: Arc<dyn Generator>) -> Self {
        let guards = GuardChain::from_config(&config);
        Self {
            config: Arc::new(config),
            generator,
            guards,
            metrics: Arc::new(Metrics::new()),
        }
    }
}

/// Build state from environment variables (see `AppConfig::from_env`) with
/// the Gemini gateway as generator.
pub async fn build_state_from_env() -> Result<AppState, Box<dyn std::error::Error>> {
    let config = AppConfig::from_env().map_err(|e| -> Box<dyn std::error::Error> { e.into() })?;
    let gateway = GeminiGateway::new(&config.gemini_api_base, config.gemini_timeout)?;

    if config.gemini_api_key.is_none() {
        tracing::warn!("GEMINI_API_KEY not set; generation requests will fail with a configuration error");
    }
    match config.allowed_origins.as_ref() {
        Some(list) => tracing::info!(origins = list.len(), "origin allow-list configured"),
        None => tracing::warn!("ALLOWED_ORIGINS not set; accepting every origin"),
    }

    let state = AppState::new(config, Arc::new(gateway));
    tracing::info!(
        guards = ?state.guards.names(),
        default_model = %state.config.default_model,
        "state initialised"
    );
    Ok(state)
}

/// Build the Axum router.  The generation handler is the fallback so it
/// answers on any path.
pub fn app(state: AppState) -> Router {
    let max_request_bytes = state.config.max_request_bytes;

    Router::new()
        .route(
            "/healthz",
            get(healthz_handler).fallback(method_not_allowed),
        )
        .route(
            "/metrics",
            get(metrics_handler).fallback(method_not_allowed),
        )
        .fallback(generate_handler)
        .layer(DefaultBodyLimit::max(max_request_bytes))
        .layer(CatchPanicLayer::custom(panic_response))
        .with_state(state)
}

async fn method_not_allowed() -> Response {
    ApiError::MethodNotAllowed.into_response()
}

fn panic_message(payload: Box<dyn Any + Send + 'static>) -> String {
    if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "Unknown error".to_string()
    }
}

/// Last-resort boundary for panics outside the generation task.  No origin
/// decision is available here, so the body goes out without CORS headers.
fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response<Body> {
    let message = panic_message(payload);
    tracing::error!(error = %message, "handler panicked");
    ApiError::Internal(message).into_response()
}

fn with_headers(mut response: Response, headers: HeaderMap) -> Response {
    response.headers_mut().extend(headers);
    response
}

/// Handler for the generation endpoint.  Records metrics around the
/// dispatch and optionally emits a per-call telemetry event.
async fn generate_handler(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let start = Instant::now();
    state.metrics.record_request();
    let peer = connect_info.map(|ConnectInfo(addr)| addr);

    let response = dispatch(&state, &method, &headers, peer, body).await;

    let status = response.status();
    state.metrics.record_response(status);
    if state.config.log_requests {
        tracing::info!(
            target: "telemetry",
            ts = %chrono::Utc::now().to_rfc3339(),
            method = %method,
            status = status.as_u16(),
            latency_ms = start.elapsed().as_millis() as u64,
            "generation call"
        );
    }
    response
}

async fn dispatch(
    state: &AppState,
    method: &Method,
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let decision = check_origin(request_origin(headers), state.config.allowed_origins.as_ref());

    if *method == Method::OPTIONS {
        return match decision.origin {
            Some(origin) if decision.allowed => {
                (StatusCode::NO_CONTENT, cors_headers(&origin)).into_response()
            }
            _ => origin_denied(headers),
        };
    }
    if *method != Method::POST {
        return ApiError::MethodNotAllowed.into_response();
    }

    let origin = match decision.origin {
        Some(origin) if decision.allowed => origin,
        _ => return origin_denied(headers),
    };
    let mut extra = cors_headers(&origin);

    let client = util::client_key(headers, peer);
    let ctx = GuardContext {
        headers,
        client_key: &client,
    };
    match state.guards.run(&ctx) {
        Ok(guard_headers) => extra.extend(guard_headers),
        Err(rejected) => {
            tracing::info!(guard = %rejected.guard, status = rejected.error.status().as_u16(), "request rejected by guard");
            extra.extend(rejected.headers);
            return with_headers(rejected.error.into_response(), extra);
        }
    }

    // Run on its own task so a panic still leaves us holding this call's headers.
    let task_state = state.clone();
    let outcome = tokio::spawn(async move { generate(&task_state, body).await }).await;
    let response = match outcome {
        Ok(Ok(book)) => (StatusCode::OK, Json(book)).into_response(),
        Ok(Err(err)) => err.into_response(),
        Err(join_err) if join_err.is_panic() => {
            let message = panic_message(join_err.into_panic());
            tracing::error!(error = %message, "generation panicked");
            ApiError::Internal(message).into_response()
        }
        Err(join_err) => ApiError::Internal(join_err.to_string()).into_response(),
    };
    with_headers(response, extra)
}

fn origin_denied(headers: &HeaderMap) -> Response {
    tracing::warn!(origin = ?request_origin(headers), "origin not allowed");
    ApiError::OriginDenied.into_response()
}

/// Body → validated request → prompt → model → book.
async fn generate(state: &AppState, body: Result<Bytes, BytesRejection>) -> Result<Value, ApiError> {
    let bytes = body.map_err(body_rejection)?;
    let raw: Value =
        serde_json::from_slice(&bytes).map_err(|_| ApiError::from(ValidationError::InvalidBody))?;
    let request = validate(&raw, &state.config.default_model)?;

    let credential = state.config.gemini_api_key.as_deref().ok_or_else(|| {
        tracing::error!("generation requested but GEMINI_API_KEY is not configured");
        ApiError::Configuration
    })?;

    let prompt = build_prompt(&request);
    let started = Instant::now();
    let outcome = state
        .generator
        .generate(&prompt, request.model(), credential)
        .await;
    let elapsed_ms = started.elapsed().as_millis() as u64;
    state.metrics.observe_gateway_ms(elapsed_ms);
    tracing::debug!(model = %request.model(), elapsed_ms, ok = outcome.is_ok(), "model call finished");

    let text = outcome.map_err(|err| {
        let kind = match err {
            GatewayError::Empty => UpstreamFailure::Empty,
            GatewayError::Transport(_) => UpstreamFailure::Transport,
        };
        state.metrics.record_upstream_failure(kind);
        tracing::warn!(model = %request.model(), error = %err, "model call failed");
        ApiError::from(err)
    })?;

    let book = extract(&text).map_err(|err| {
        let kind = match err {
            ExtractionError::Malformed => UpstreamFailure::Malformed,
            ExtractionError::InvalidShape => UpstreamFailure::Shape,
        };
        state.metrics.record_upstream_failure(kind);
        tracing::warn!(model = %request.model(), response_len = text.len(), error = %err, "unusable model output");
        ApiError::from(err)
    })?;

    let scenes = match Book::deserialize(&book) {
        Ok(typed) => typed.scenes.len(),
        Err(err) => {
            tracing::warn!(error = %err, "book does not match the typed view; relaying as parsed");
            scene_count(&book)
        }
    };
    if scenes != REQUESTED_SCENES {
        tracing::warn!(scenes, expected = REQUESTED_SCENES, "book scene count differs from request");
    }
    state.metrics.record_book();
    Ok(book)
}

fn body_rejection(rejection: BytesRejection) -> ApiError {
    match rejection {
        BytesRejection::FailedToBufferBody(FailedToBufferBody::LengthLimitError(_)) => {
            tracing::warn!("request body exceeded configured limit");
            ApiError::PayloadTooLarge
        }
        other => ApiError::Internal(other.body_text()),
    }
}

/// Readiness / liveness probe.
async fn healthz_handler(State(state): State<AppState>) -> Response {
    let json = serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "defaultModel": state.config.default_model,
        "credentialConfigured": state.config.gemini_api_key.is_some(),
        "guards": state.guards.names(),
        "startedAt": state.metrics.started_at().to_rfc3339(),
    });
    (StatusCode::OK, Json(json)).into_response()
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
        .into_response()
}
