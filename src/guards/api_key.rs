use super::{Guard, GuardContext, GuardOutcome};
use crate::error::ApiError;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Requires `X-API-Key` to equal the configured static key.
pub struct ApiKeyGuard {
    key: String,
}

impl ApiKeyGuard {
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
        }
    }
}

impl Guard for ApiKeyGuard {
    fn name(&self) -> &str {
        "api_key"
    }

    fn check(&self, ctx: &GuardContext<'_>) -> GuardOutcome {
        let presented = ctx
            .headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok());
        if presented == Some(self.key.as_str()) {
            GuardOutcome::pass()
        } else {
            tracing::warn!(client = %ctx.client_key, "rejected request with missing or invalid api key");
            GuardOutcome::reject(ApiError::Unauthorized)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, HeaderValue};

    fn run(headers: &HeaderMap) -> GuardOutcome {
        let guard = ApiKeyGuard::new("s3cret");
        guard.check(&GuardContext {
            headers,
            client_key: "test",
        })
    }

    #[test]
    fn accepts_matching_key() {
        let mut h = HeaderMap::new();
        h.insert(API_KEY_HEADER, HeaderValue::from_static("s3cret"));
        assert!(run(&h).rejection.is_none());
    }

    #[test]
    fn rejects_missing_or_wrong_key() {
        assert!(matches!(
            run(&HeaderMap::new()).rejection,
            Some(ApiError::Unauthorized)
        ));
        let mut h = HeaderMap::new();
        h.insert(API_KEY_HEADER, HeaderValue::from_static("S3CRET"));
        assert!(run(&h).rejection.is_some());
    }
}
