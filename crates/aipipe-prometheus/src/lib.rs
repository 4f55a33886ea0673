// SPDX-FileCopyrightText: 2026 Aipipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prometheus metrics for the aipipe gateway.
//!
//! Uses the metrics-rs facade with the Prometheus exporter. Metrics are
//! rendered as Prometheus text through the gateway's `admin/metrics` action.

pub mod recording;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use aipipe_core::AipipeError;

pub use recording::{
    record_cost, record_ledger_failure, record_rejection, record_request, record_upstream_latency,
};

/// Owns the Prometheus handle used to render metrics.
#[derive(Clone)]
pub struct PrometheusAdapter {
    handle: PrometheusHandle,
}

impl std::fmt::Debug for PrometheusAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrometheusAdapter").finish_non_exhaustive()
    }
}

impl PrometheusAdapter {
    /// Install the Prometheus recorder globally.
    ///
    /// Only one recorder can be installed per process. Returns an error if a
    /// recorder is already installed.
    pub fn install() -> Result<Self, AipipeError> {
        let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
            AipipeError::Internal(format!("failed to install Prometheus recorder: {e}"))
        })?;

        recording::register_metrics();

        tracing::info!("prometheus metrics recorder installed");

        Ok(Self { handle })
    }

    /// Wrap a handle from a recorder that was not installed globally.
    pub fn from_handle(handle: PrometheusHandle) -> Self {
        Self { handle }
    }

    /// Render all collected metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_recorder_renders_recorded_metrics() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let adapter = PrometheusAdapter::from_handle(recorder.handle());

        metrics::with_local_recorder(&recorder, || {
            record_request("openai", 200);
            record_rejection("budget_exceeded");
            record_cost("openai", 0.25);
        });

        let text = adapter.render();
        assert!(text.contains("aipipe_requests_total"));
        assert!(text.contains(r#"provider="openai""#));
        assert!(text.contains(r#"reason="budget_exceeded""#));
        assert!(text.contains("aipipe_cost_usd_total"));
    }
}
