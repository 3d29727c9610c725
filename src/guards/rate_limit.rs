//! Per-client sliding-window rate limiting.
//!
//! Each client key keeps the instants of its accepted calls inside the
//! current window.  Rejected calls are not recorded, so a client that keeps
//! retrying regains access once its oldest accepted call ages out.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use axum::http::{HeaderMap, HeaderValue};
use dashmap::DashMap;

use super::{Guard, GuardContext, GuardOutcome};
use crate::error::ApiError;

/// Idle keys are swept once every this many checks.
const SWEEP_EVERY: u64 = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub remaining: u32,
}

pub struct SlidingWindow {
    max_requests: u32,
    window: Duration,
    hits: DashMap<String, VecDeque<Instant>>,
    checks: AtomicU64,
}

impl SlidingWindow {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window,
            hits: DashMap::new(),
            checks: AtomicU64::new(0),
        }
    }

    pub fn check(&self, key: &str) -> RateDecision {
        self.check_at(key, Instant::now())
    }

    pub fn check_at(&self, key: &str, now: Instant) -> RateDecision {
        if self.checks.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            self.sweep(now);
        }

        let mut entry = self.hits.entry(key.to_string()).or_default();
        let hits = entry.value_mut();
        while hits
            .front()
            .is_some_and(|t| now.saturating_duration_since(*t) >= self.window)
        {
            hits.pop_front();
        }

        let used = hits.len() as u32;
        if used >= self.max_requests {
            return RateDecision {
                allowed: false,
                remaining: 0,
            };
        }
        hits.push_back(now);
        RateDecision {
            allowed: true,
            remaining: self.max_requests - used - 1,
        }
    }

    /// Drop keys whose every recorded call is outside the window.
    pub fn sweep(&self, now: Instant) {
        self.hits.retain(|_, hits| {
            hits.back()
                .is_some_and(|t| now.saturating_duration_since(*t) < self.window)
        });
    }

    pub fn tracked_clients(&self) -> usize {
        self.hits.len()
    }
}

pub struct RateLimitGuard {
    limiter: SlidingWindow,
    limit_header: HeaderValue,
    window_header: HeaderValue,
}

impl RateLimitGuard {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        let limiter = SlidingWindow::new(max_requests, window);
        let limit_header = HeaderValue::from(limiter.max_requests);
        let window_header = HeaderValue::from_str(&format!("{}s", window.as_secs()))
            .unwrap_or_else(|_| HeaderValue::from_static("0s"));
        Self {
            limiter,
            limit_header,
            window_header,
        }
    }
}

impl Guard for RateLimitGuard {
    fn name(&self) -> &str {
        "rate_limit"
    }

    fn check(&self, ctx: &GuardContext<'_>) -> GuardOutcome {
        let decision = self.limiter.check(ctx.client_key);
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-limit", self.limit_header.clone());
        headers.insert("x-ratelimit-window", self.window_header.clone());
        headers.insert("x-ratelimit-remaining", HeaderValue::from(decision.remaining));

        let rejection = if decision.allowed {
            None
        } else {
            tracing::warn!(client = %ctx.client_key, "rate limit exceeded");
            Some(ApiError::RateLimited)
        };
        GuardOutcome { rejection, headers }
    }
}
