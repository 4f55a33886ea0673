// SPDX-FileCopyrightText: 2026 Aipipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.

use metrics::{describe_counter, describe_histogram, Unit};

/// Register all aipipe metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_counter!(
        "aipipe_requests_total",
        "Proxied requests by provider and upstream status"
    );
    describe_counter!(
        "aipipe_rejections_total",
        "Requests refused before reaching an upstream"
    );
    describe_counter!(
        "aipipe_cost_usd_total",
        Unit::Count,
        "Cost charged to callers in micro-USD"
    );
    describe_counter!(
        "aipipe_ledger_failures_total",
        "Charges that could not be written to the ledger"
    );
    describe_histogram!(
        "aipipe_upstream_latency_seconds",
        Unit::Seconds,
        "Time until upstream response headers arrived"
    );
}

/// Record a forwarded request and the status the upstream answered with.
pub fn record_request(provider: &str, status: u16) {
    metrics::counter!(
        "aipipe_requests_total",
        "provider" => provider.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a request refused by the gateway itself.
pub fn record_rejection(reason: &'static str) {
    metrics::counter!("aipipe_rejections_total", "reason" => reason).increment(1);
}

/// Record a charge. Counters are integral, so cost is kept in micro-USD.
pub fn record_cost(provider: &str, cost_usd: f64) {
    if !(cost_usd.is_finite() && cost_usd > 0.0) {
        return;
    }
    let micros = (cost_usd * 1e6).round() as u64;
    metrics::counter!("aipipe_cost_usd_total", "provider" => provider.to_string())
        .increment(micros);
}

pub fn record_ledger_failure() {
    metrics::counter!("aipipe_ledger_failures_total").increment(1);
}

/// Record upstream latency.
pub fn record_upstream_latency(provider: &str, seconds: f64) {
    metrics::histogram!("aipipe_upstream_latency_seconds", "provider" => provider.to_string())
        .record(seconds);
}
