//! Error taxonomy for the generation endpoint.
//!
//! Every failure the handler can produce is an [`ApiError`].  Its
//! `into_response` is the only place that decides the status code and the
//! JSON body; callers attach CORS and rate-limit headers afterwards.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::extract::ExtractionError;
use crate::gateway::GatewayError;
use crate::validation::ValidationError;

/// JSON body returned for every failed call.  `error` is always present.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
            message: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(#[from] ValidationError),
    #[error("origin not allowed")]
    OriginDenied,
    #[error("method not allowed")]
    MethodNotAllowed,
    #[error("invalid api key")]
    Unauthorized,
    #[error("rate limit exceeded")]
    RateLimited,
    #[error("request body too large")]
    PayloadTooLarge,
    #[error("backend credential is not configured")]
    Configuration,
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::OriginDenied => StatusCode::FORBIDDEN,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Configuration | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Gateway(_) | ApiError::Extraction(_) => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn body(&self) -> ErrorBody {
        match self {
            ApiError::Validation(err) => ErrorBody::new(err.to_string()),
            ApiError::OriginDenied => ErrorBody::new("Origin not allowed"),
            ApiError::MethodNotAllowed => ErrorBody::new("Method not allowed"),
            ApiError::Unauthorized => ErrorBody::new("Invalid API key"),
            ApiError::RateLimited => {
                ErrorBody::new("Rate limit exceeded. Please try again later.")
            }
            ApiError::PayloadTooLarge => ErrorBody::new("Request too large"),
            ApiError::Configuration => ErrorBody::new("Service configuration error"),
            ApiError::Gateway(GatewayError::Empty) => {
                ErrorBody::new("Empty response from AI model")
            }
            ApiError::Gateway(GatewayError::Transport(detail)) => {
                ErrorBody::new("AI model request failed").with_details(detail.clone())
            }
            ApiError::Extraction(ExtractionError::Malformed) => {
                ErrorBody::new("Failed to parse AI response").with_details("Invalid JSON format")
            }
            ApiError::Extraction(ExtractionError::InvalidShape) => {
                ErrorBody::new("Invalid book structure")
            }
            ApiError::Internal(message) => {
                ErrorBody::new("Internal server error").with_message(message.clone())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}
