//! Process-wide counters exposed on `/metrics` in Prometheus text format.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use axum::http::StatusCode;

/// Statuses the handler can produce; anything else lands in `other`.
const TRACKED_STATUSES: [u16; 10] = [200, 204, 400, 401, 403, 405, 413, 429, 500, 502];

/// Gateway latency bucket upper bounds in milliseconds.
const LATENCY_BUCKETS_MS: [u64; 10] = [250, 500, 1000, 2000, 5000, 10000, 20000, 30000, 45000, 60000];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamFailure {
    Empty,
    Transport,
    Malformed,
    Shape,
}

impl UpstreamFailure {
    const ALL: [UpstreamFailure; 4] = [
        UpstreamFailure::Empty,
        UpstreamFailure::Transport,
        UpstreamFailure::Malformed,
        UpstreamFailure::Shape,
    ];

    fn label(&self) -> &'static str {
        match self {
            UpstreamFailure::Empty => "empty",
            UpstreamFailure::Transport => "transport",
            UpstreamFailure::Malformed => "malformed",
            UpstreamFailure::Shape => "shape",
        }
    }
}

pub struct Metrics {
    requests_total: AtomicU64,
    responses: [AtomicU64; TRACKED_STATUSES.len()],
    responses_other: AtomicU64,
    books_total: AtomicU64,
    upstream_failures: [AtomicU64; 4],
    gateway_buckets: [AtomicU64; LATENCY_BUCKETS_MS.len()],
    gateway_sum_ms: AtomicU64,
    gateway_count: AtomicU64,
    started_at: chrono::DateTime<chrono::Utc>,
    started_instant: Instant,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            requests_total: AtomicU64::new(0),
            responses: std::array::from_fn(|_| AtomicU64::new(0)),
            responses_other: AtomicU64::new(0),
            books_total: AtomicU64::new(0),
            upstream_failures: std::array::from_fn(|_| AtomicU64::new(0)),
            gateway_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            gateway_sum_ms: AtomicU64::new(0),
            gateway_count: AtomicU64::new(0),
            started_at: chrono::Utc::now(),
            started_instant: Instant::now(),
        }
    }

    pub fn started_at(&self) -> chrono::DateTime<chrono::Utc> {
        self.started_at
    }

    pub fn record_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_response(&self, status: StatusCode) {
        match TRACKED_STATUSES.iter().position(|s| *s == status.as_u16()) {
            Some(idx) => self.responses[idx].fetch_add(1, Ordering::Relaxed),
            None => self.responses_other.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn record_book(&self) {
        self.books_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_upstream_failure(&self, kind: UpstreamFailure) {
        let idx = UpstreamFailure::ALL
            .iter()
            .position(|k| *k == kind)
            .unwrap_or(0);
        self.upstream_failures[idx].fetch_add(1, Ordering::Relaxed);
    }

    pub fn observe_gateway_ms(&self, ms: u64) {
        self.gateway_sum_ms.fetch_add(ms, Ordering::Relaxed);
        self.gateway_count.fetch_add(1, Ordering::Relaxed);
        if let Some(idx) = LATENCY_BUCKETS_MS.iter().position(|ub| ms <= *ub) {
            self.gateway_buckets[idx].fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn books_total(&self) -> u64 {
        self.books_total.load(Ordering::Relaxed)
    }

    pub fn render(&self) -> String {
        let mut buf = String::new();
        writeln!(
            &mut buf,
            "# HELP storybook_requests_total Generation endpoint calls received\n# TYPE storybook_requests_total counter"
        )
        .ok();
        writeln!(&mut buf, "storybook_requests_total {}", self.requests_total()).ok();

        writeln!(
            &mut buf,
            "# HELP storybook_responses_total Generation endpoint responses by status code\n# TYPE storybook_responses_total counter"
        )
        .ok();
        for (status, counter) in TRACKED_STATUSES.iter().zip(self.responses.iter()) {
            writeln!(
                &mut buf,
                "storybook_responses_total{{status=\"{}\"}} {}",
                status,
                counter.load(Ordering::Relaxed)
            )
            .ok();
        }
        writeln!(
            &mut buf,
            "storybook_responses_total{{status=\"other\"}} {}",
            self.responses_other.load(Ordering::Relaxed)
        )
        .ok();

        writeln!(
            &mut buf,
            "# HELP storybook_books_total Books generated and relayed\n# TYPE storybook_books_total counter"
        )
        .ok();
        writeln!(&mut buf, "storybook_books_total {}", self.books_total()).ok();

        writeln!(
            &mut buf,
            "# HELP storybook_upstream_failures_total Unusable model responses by kind\n# TYPE storybook_upstream_failures_total counter"
        )
        .ok();
        for (kind, counter) in UpstreamFailure::ALL.iter().zip(self.upstream_failures.iter()) {
            writeln!(
                &mut buf,
                "storybook_upstream_failures_total{{kind=\"{}\"}} {}",
                kind.label(),
                counter.load(Ordering::Relaxed)
            )
            .ok();
        }

        writeln!(
            &mut buf,
            "# HELP storybook_gateway_latency_ms Model round-trip latency histogram milliseconds\n# TYPE storybook_gateway_latency_ms histogram"
        )
        .ok();
        let count = self.gateway_count.load(Ordering::Relaxed);
        let mut cumulative = 0u64;
        for (ub, counter) in LATENCY_BUCKETS_MS.iter().zip(self.gateway_buckets.iter()) {
            cumulative += counter.load(Ordering::Relaxed);
            writeln!(
                &mut buf,
                "storybook_gateway_latency_ms_bucket{{le=\"{}\"}} {}",
                ub, cumulative
            )
            .ok();
        }
        writeln!(
            &mut buf,
            "storybook_gateway_latency_ms_bucket{{le=\"+Inf\"}} {}",
            count
        )
        .ok();
        writeln!(
            &mut buf,
            "storybook_gateway_latency_ms_sum {}",
            self.gateway_sum_ms.load(Ordering::Relaxed)
        )
        .ok();
        writeln!(&mut buf, "storybook_gateway_latency_ms_count {}", count).ok();

        writeln!(
            &mut buf,
            "# HELP storybook_build_info Build information\n# TYPE storybook_build_info gauge"
        )
        .ok();
        writeln!(
            &mut buf,
            "storybook_build_info{{version=\"{}\"}} 1",
            env!("CARGO_PKG_VERSION")
        )
        .ok();
        writeln!(
            &mut buf,
            "# HELP storybook_process_start_time_seconds Process start time (Unix epoch seconds)\n# TYPE storybook_process_start_time_seconds gauge"
        )
        .ok();
        writeln!(
            &mut buf,
            "storybook_process_start_time_seconds {}",
            self.started_at.timestamp()
        )
        .ok();
        writeln!(
            &mut buf,
            "# HELP storybook_process_uptime_seconds Process uptime seconds\n# TYPE storybook_process_uptime_seconds gauge"
        )
        .ok();
        writeln!(
            &mut buf,
            "storybook_process_uptime_seconds {}",
            self.started_instant.elapsed().as_secs_f64()
        )
        .ok();
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_statuses_and_failures() {
        let m = Metrics::new();
        m.record_request();
        m.record_response(StatusCode::OK);
        m.record_response(StatusCode::BAD_GATEWAY);
        m.record_response(StatusCode::IM_A_TEAPOT);
        m.record_upstream_failure(UpstreamFailure::Shape);
        let text = m.render();
        assert!(text.contains("storybook_requests_total 1"));
        assert!(text.contains("storybook_responses_total{status=\"200\"} 1"));
        assert!(text.contains("storybook_responses_total{status=\"502\"} 1"));
        assert!(text.contains("storybook_responses_total{status=\"other\"} 1"));
        assert!(text.contains("storybook_upstream_failures_total{kind=\"shape\"} 1"));
        assert!(text.contains("storybook_upstream_failures_total{kind=\"empty\"} 0"));
    }

    #[test]
    fn latency_histogram_is_cumulative() {
        let m = Metrics::new();
        m.observe_gateway_ms(100);
        m.observe_gateway_ms(700);
        m.observe_gateway_ms(90_000);
        let text = m.render();
        assert!(text.contains("storybook_gateway_latency_ms_bucket{le=\"250\"} 1"));
        assert!(text.contains("storybook_gateway_latency_ms_bucket{le=\"1000\"} 2"));
        assert!(text.contains("storybook_gateway_latency_ms_bucket{le=\"60000\"} 2"));
        assert!(text.contains("storybook_gateway_latency_ms_bucket{le=\"+Inf\"} 3"));
        assert!(text.contains("storybook_gateway_latency_ms_sum 90800"));
        assert_eq!(text.matches("# HELP storybook_gateway_latency_ms ").count(), 1);
    }
}
