//! Optional request guards.
//!
//! Each guard is one independently togglable check that runs after the
//! origin check and before the body is read.  The `GuardChain` runs the
//! enabled guards in order and stops at the first rejection.  Headers a
//! guard contributes (rate-limit counters) are attached to every later
//! response of the same call, including the rejection itself.

use std::sync::Arc;

use axum::http::HeaderMap;

use crate::config::AppConfig;
use crate::error::ApiError;

pub mod api_key;
pub mod rate_limit;

use self::api_key::ApiKeyGuard;
use self::rate_limit::RateLimitGuard;

/// Per-call inputs available to guards.
pub struct GuardContext<'a> {
    pub headers: &'a HeaderMap,
    /// Caller identity as resolved by `util::client_key`.
    pub client_key: &'a str,
}

#[derive(Debug, Default)]
pub struct GuardOutcome {
    pub rejection: Option<ApiError>,
    pub headers: HeaderMap,
}

impl GuardOutcome {
    pub fn pass() -> Self {
        Self::default()
    }

    pub fn reject(err: ApiError) -> Self {
        Self {
            rejection: Some(err),
            headers: HeaderMap::new(),
        }
    }
}

pub trait Guard: Send + Sync {
    fn name(&self) -> &str;
    fn check(&self, ctx: &GuardContext<'_>) -> GuardOutcome;
}

/// A rejected call: the error plus the headers accumulated so far.
#[derive(Debug)]
pub struct Rejected {
    pub error: ApiError,
    pub headers: HeaderMap,
    pub guard: String,
}

#[derive(Clone, Default)]
pub struct GuardChain {
    guards: Vec<Arc<dyn Guard>>,
}

impl GuardChain {
    /// API key first, then rate limiting, so unauthenticated calls do not
    /// consume a client's quota.
    pub fn from_config(cfg: &AppConfig) -> Self {
        let mut guards: Vec<Arc<dyn Guard>> = Vec::new();
        if cfg.require_api_key {
            match cfg.api_key.as_deref() {
                Some(key) => guards.push(Arc::new(ApiKeyGuard::new(key))),
                None => tracing::warn!("api key guard enabled without API_KEY; guard skipped"),
            }
        }
        if cfg.rate_limit.enabled {
            guards.push(Arc::new(RateLimitGuard::new(
                cfg.rate_limit.max_requests,
                cfg.rate_limit.window,
            )));
        }
        Self { guards }
    }

    pub fn with_guards(guards: Vec<Arc<dyn Guard>>) -> Self {
        Self { guards }
    }

    pub fn len(&self) -> usize {
        self.guards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.guards.iter().map(|g| g.name().to_string()).collect()
    }

    /// Run every guard.  On success returns the headers to attach to the
    /// eventual response.
    pub fn run(&self, ctx: &GuardContext<'_>) -> Result<HeaderMap, Rejected> {
        let mut headers = HeaderMap::new();
        for guard in &self.guards {
            let outcome = guard.check(ctx);
            headers.extend(outcome.headers);
            if let Some(error) = outcome.rejection {
                return Err(Rejected {
                    error,
                    headers,
                    guard: guard.name().to_string(),
                });
            }
        }
        Ok(headers)
    }
}
