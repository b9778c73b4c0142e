// Metrics module - Prometheus-compatible counters for the transform proxy

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::constants::MAX_LATENCY_SAMPLES;

/// Percentile statistics for latency measurements, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Histogram {
    pub p50: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
}

impl Histogram {
    const EMPTY: Histogram = Histogram {
        p50: 0.0,
        p90: 0.0,
        p95: 0.0,
        p99: 0.0,
    };
}

/// Thread-safe via atomics and mutexes; share behind an `Arc`
pub struct Metrics {
    request_count: AtomicU64,

    // Responses by status code (200, 403, 415, ...)
    status_counts: Mutex<HashMap<u16, u64>>,

    // Failures by error kind (fetch_failure, host_not_allowed, ...)
    error_counts: Mutex<HashMap<&'static str, u64>>,

    bytes_sent: AtomicU64,
    active_streams: AtomicU64,

    // Time from request start to response headers, microseconds.
    // Oldest samples are evicted once MAX_LATENCY_SAMPLES is reached.
    ttfb_durations: Mutex<VecDeque<u64>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            request_count: AtomicU64::new(0),
            status_counts: Mutex::new(HashMap::new()),
            error_counts: Mutex::new(HashMap::new()),
            bytes_sent: AtomicU64::new(0),
            active_streams: AtomicU64::new(0),
            ttfb_durations: Mutex::new(VecDeque::new()),
        }
    }

    pub fn increment_request_count(&self) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_status_count(&self, status_code: u16) {
        if let Ok(mut counts) = self.status_counts.lock() {
            *counts.entry(status_code).or_insert(0) += 1;
        }
    }

    pub fn increment_error_count(&self, kind: &'static str) {
        if let Ok(mut counts) = self.error_counts.lock() {
            *counts.entry(kind).or_insert(0) += 1;
        }
    }

    pub fn add_bytes_sent(&self, bytes: u64) {
        self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn stream_started(&self) {
        self.active_streams.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stream_finished(&self) {
        // Saturate at zero so an unmatched finish cannot wrap
        let _ = self
            .active_streams
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                Some(n.saturating_sub(1))
            });
    }

    /// Record time-to-headers in milliseconds
    pub fn record_ttfb(&self, duration_ms: f64) {
        let duration_us = (duration_ms * 1000.0) as u64;
        if let Ok(mut durations) = self.ttfb_durations.lock() {
            if durations.len() >= MAX_LATENCY_SAMPLES {
                durations.pop_front();
            }
            durations.push_back(duration_us);
        }
    }

    pub fn get_request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    pub fn get_status_count(&self, status_code: u16) -> u64 {
        self.status_counts
            .lock()
            .ok()
            .and_then(|counts| counts.get(&status_code).copied())
            .unwrap_or(0)
    }

    pub fn get_error_count(&self, kind: &str) -> u64 {
        self.error_counts
            .lock()
            .ok()
            .and_then(|counts| counts.get(kind).copied())
            .unwrap_or(0)
    }

    pub fn get_bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    pub fn get_active_streams(&self) -> u64 {
        self.active_streams.load(Ordering::Relaxed)
    }

    pub fn get_ttfb_histogram(&self) -> Histogram {
        match self.ttfb_durations.lock() {
            Ok(durations) => {
                let samples: Vec<u64> = durations.iter().copied().collect();
                calculate_histogram(&samples)
            }
            Err(_) => Histogram::EMPTY,
        }
    }

    /// Render all metrics in Prometheus text exposition format
    pub fn export_prometheus(&self) -> String {
        let mut output = String::new();

        output.push_str("# HELP imagist_requests_total Total number of transform requests received\n");
        output.push_str("# TYPE imagist_requests_total counter\n");
        output.push_str(&format!(
            "imagist_requests_total {}\n",
            self.get_request_count()
        ));

        output.push_str("\n# HELP imagist_responses_by_status_total Responses by HTTP status code\n");
        output.push_str("# TYPE imagist_responses_by_status_total counter\n");
        if let Ok(counts) = self.status_counts.lock() {
            let mut sorted: Vec<_> = counts.iter().collect();
            sorted.sort();
            for (status, count) in sorted {
                output.push_str(&format!(
                    "imagist_responses_by_status_total{{status=\"{}\"}} {}\n",
                    status, count
                ));
            }
        }

        output.push_str("\n# HELP imagist_failures_total Failed requests by error kind\n");
        output.push_str("# TYPE imagist_failures_total counter\n");
        if let Ok(counts) = self.error_counts.lock() {
            let mut sorted: Vec<_> = counts.iter().collect();
            sorted.sort();
            for (kind, count) in sorted {
                output.push_str(&format!(
                    "imagist_failures_total{{kind=\"{}\"}} {}\n",
                    kind, count
                ));
            }
        }

        output.push_str("\n# HELP imagist_bytes_sent_total Image bytes written to clients\n");
        output.push_str("# TYPE imagist_bytes_sent_total counter\n");
        output.push_str(&format!("imagist_bytes_sent_total {}\n", self.get_bytes_sent()));

        output.push_str("\n# HELP imagist_active_streams Responses currently streaming\n");
        output.push_str("# TYPE imagist_active_streams gauge\n");
        output.push_str(&format!(
            "imagist_active_streams {}\n",
            self.get_active_streams()
        ));

        let histogram = self.get_ttfb_histogram();
        output.push_str(
            "\n# HELP imagist_time_to_headers_milliseconds Time from request start to response headers\n",
        );
        output.push_str("# TYPE imagist_time_to_headers_milliseconds summary\n");
        for (quantile, value) in [
            ("0.5", histogram.p50),
            ("0.9", histogram.p90),
            ("0.95", histogram.p95),
            ("0.99", histogram.p99),
        ] {
            output.push_str(&format!(
                "imagist_time_to_headers_milliseconds{{quantile=\"{}\"}} {}\n",
                quantile, value
            ));
        }

        output
    }
}

fn calculate_histogram(samples: &[u64]) -> Histogram {
    if samples.is_empty() {
        return Histogram::EMPTY;
    }

    let mut sorted: Vec<u64> = samples.to_vec();
    sorted.sort_unstable();

    let percentile = |p: f64| {
        let idx = (sorted.len() as f64 * p) as usize;
        // Convert from microseconds to milliseconds
        sorted.get(idx.saturating_sub(1)).copied().unwrap_or(0) as f64 / 1000.0
    };

    Histogram {
        p50: percentile(0.50),
        p90: percentile(0.90),
        p95: percentile(0.95),
        p99: percentile(0.99),
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
