// SPDX-FileCopyrightText: 2026 Aipipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Upstream forwarding and response metering.

use std::sync::Arc;
use std::time::Instant;

use aipipe_core::{AipipeError, Identity, UsageCounters};
use aipipe_providers::headers::downstream_response_headers;
use aipipe_providers::{Provider, UpstreamRequest};
use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::response::Response;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::server::GatewayState;
use crate::sse::{Capture, CostTap};

/// How a response body is metered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Metering {
    /// Buffered, charged before responding.
    Json,
    /// Tapped, charged when the stream ends.
    EventStream,
    /// Passed through uncharged.
    None,
}

fn metering_for(content_type: &str) -> Metering {
    if content_type.contains("application/json") {
        Metering::Json
    } else if content_type.contains("text/event-stream") {
        Metering::EventStream
    } else {
        Metering::None
    }
}

fn upstream_error(provider: &str, what: &str, e: reqwest::Error) -> AipipeError {
    AipipeError::Upstream {
        message: format!("{provider} {what}: {e}"),
        source: Some(Box::new(e)),
    }
}

/// Send `upstream` and meter the response for `identity`.
///
/// Upstream statuses are passed through unchanged; only an unreachable
/// upstream or an unreadable JSON body is an error.
pub async fn forward(
    state: &GatewayState,
    provider: Arc<Provider>,
    identity: Identity,
    upstream: UpstreamRequest,
) -> Result<Response, AipipeError> {
    let name = provider.name();
    let mut request = state
        .http
        .request(upstream.method, &upstream.url)
        .headers(upstream.headers);
    if let Some(body) = upstream.body {
        request = request.body(body);
    }

    let started = Instant::now();
    let response = request
        .send()
        .await
        .map_err(|e| upstream_error(name, "unreachable", e))?;
    aipipe_prometheus::record_upstream_latency(name, started.elapsed().as_secs_f64());

    let status = response.status();
    aipipe_prometheus::record_request(name, status.as_u16());
    debug!(provider = name, status = status.as_u16(), "upstream responded");

    let headers = downstream_response_headers(response.headers());
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let body = match metering_for(content_type) {
        Metering::Json => {
            let bytes = response
                .bytes()
                .await
                .map_err(|e| upstream_error(name, "response unreadable", e))?;
            let capture = json_capture(&bytes);
            charge(state, &provider, &identity, capture).await;
            Body::from(bytes)
        }
        Metering::EventStream => {
            let (tap, done) = CostTap::new(response.bytes_stream());
            let state = state.clone();
            let charges = state.charges.clone();
            charges.spawn(async move {
                match done.await {
                    Ok(capture) => charge(&state, &provider, &identity, capture).await,
                    Err(_) => warn!(provider = provider.name(), "event stream ended without a capture"),
                }
            });
            Body::from_stream(tap)
        }
        Metering::None => Body::from_stream(response.bytes_stream()),
    };

    let mut out = Response::new(body);
    *out.status_mut() = status;
    *out.headers_mut() = headers;
    Ok(out)
}

/// `{model, usage}` from a JSON response body, if it has them.
fn json_capture(body: &[u8]) -> Capture {
    let Ok(json) = serde_json::from_slice::<Value>(body) else {
        return Capture::default();
    };
    Capture {
        model: json
            .get("model")
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
            .map(str::to_string),
        usage: json.get("usage").and_then(UsageCounters::from_json),
    }
}

/// Price `capture` and add it to the ledger.
///
/// The response has already been committed to the caller, so a ledger
/// failure is logged and counted rather than returned.
pub(crate) async fn charge(
    state: &GatewayState,
    provider: &Provider,
    identity: &Identity,
    capture: Capture,
) {
    let cost = provider
        .cost(capture.model.as_deref(), capture.usage)
        .await;
    if cost <= 0.0 {
        return;
    }
    match state.ledger.add(identity, cost).await {
        Ok(()) => {
            aipipe_prometheus::record_cost(provider.name(), cost);
            info!(
                email = %identity,
                provider = provider.name(),
                model = capture.model.as_deref().unwrap_or_default(),
                cost_usd = cost,
                "charged"
            );
        }
        Err(e) => {
            aipipe_prometheus::record_ledger_failure();
            error!(
                email = %identity,
                provider = provider.name(),
                cost_usd = cost,
                error = %e,
                "failed to record charge"
            );
        }
    }
}
