// SPDX-FileCopyrightText: 2026 Aipipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! OpenAI adapter with a fixed per-model price table.

use std::fmt;

use aipipe_core::{AipipeError, UsageCounters};
use bytes::Bytes;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, warn};

use crate::headers::upstream_request_headers;
use crate::request::{carries_body, request_stream_usage, InboundRequest, UpstreamRequest};

pub const NAME: &str = "openai";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";

const TOKENS_PER_PRICE_UNIT: f64 = 1e6;

/// `(model, input, output)` in USD per million tokens.
///
/// Only models whose responses report usage are listed; requests for any
/// other model are rejected before forwarding.
const PRICES: &[(&str, f64, f64)] = &[
    ("chatgpt-4o-latest", 5.0, 15.0),
    ("computer-use-preview-2025-03-11", 3.0, 12.0),
    ("computer-use-preview", 3.0, 12.0),
    ("gpt-3.5-turbo-0125", 0.5, 1.5),
    ("gpt-3.5-turbo-0301", 1.5, 2.0),
    ("gpt-3.5-turbo-0613", 1.5, 2.0),
    ("gpt-3.5-turbo-1106", 1.0, 2.0),
    ("gpt-3.5-turbo-16k-0613", 3.0, 4.0),
    ("gpt-3.5-turbo-16k", 3.0, 4.0),
    ("gpt-3.5-turbo-instruct", 1.5, 2.0),
    ("gpt-3.5-turbo", 0.5, 1.5),
    ("gpt-4-0125-preview", 10.0, 30.0),
    ("gpt-4-0613", 30.0, 60.0),
    ("gpt-4-1106-preview", 10.0, 30.0),
    ("gpt-4-1106-vision-preview", 10.0, 30.0),
    ("gpt-4-32k-0314", 60.0, 120.0),
    ("gpt-4-32k-0613", 60.0, 120.0),
    ("gpt-4-32k", 60.0, 120.0),
    ("gpt-4-turbo-2024-04-09", 10.0, 20.0),
    ("gpt-4-turbo-preview", 10.0, 30.0),
    ("gpt-4-turbo", 10.0, 30.0),
    ("gpt-4-vision-preview", 10.0, 30.0),
    ("gpt-4.1-2025-04-14", 2.0, 8.0),
    ("gpt-4.1-mini-2025-04-14", 0.4, 1.6),
    ("gpt-4.1-mini", 0.4, 1.6),
    ("gpt-4.1-nano-2025-04-14", 0.1, 0.4),
    ("gpt-4.1-nano", 0.1, 0.4),
    ("gpt-4.1", 2.0, 8.0),
    ("gpt-4.5-preview-2025-02-27", 75.0, 150.0),
    ("gpt-4.5-preview", 75.0, 150.0),
    ("gpt-4", 10.0, 20.0),
    ("gpt-4o-2024-05-13", 5.0, 15.0),
    ("gpt-4o-2024-08-06", 2.5, 10.0),
    ("gpt-4o-2024-11-20", 2.5, 10.0),
    ("gpt-4o-audio-preview-2024-10-01", 2.5, 10.0),
    ("gpt-4o-audio-preview-2024-12-17", 2.5, 10.0),
    ("gpt-4o-audio-preview", 2.5, 10.0),
    ("gpt-4o-mini-2024-07-18", 0.15, 0.6),
    ("gpt-4o-mini-audio-preview-2024-12-17", 0.15, 0.6),
    ("gpt-4o-mini-audio-preview", 0.15, 0.6),
    ("gpt-4o-mini-realtime-preview-2024-12-17", 0.6, 2.4),
    ("gpt-4o-mini-realtime-preview", 0.6, 2.4),
    ("gpt-4o-mini-search-preview-2025-03-11", 0.15, 0.6),
    ("gpt-4o-mini-search-preview", 0.15, 0.6),
    ("gpt-4o-mini", 0.15, 0.6),
    ("gpt-4o-realtime-preview-2024-10-01", 5.0, 20.0),
    ("gpt-4o-realtime-preview-2024-12-17", 5.0, 20.0),
    ("gpt-4o-realtime-preview", 5.0, 20.0),
    ("gpt-4o-search-preview-2025-03-11", 2.5, 10.0),
    ("gpt-4o-search-preview", 2.5, 10.0),
    ("gpt-4o", 2.5, 10.0),
    ("o1-2024-12-17", 15.0, 60.0),
    ("o1-mini-2024-09-12", 1.1, 4.4),
    ("o1-mini", 1.1, 4.4),
    ("o1-preview-2024-09-12", 15.0, 60.0),
    ("o1-preview", 15.0, 60.0),
    ("o1-pro-2025-03-19", 150.0, 600.0),
    ("o1-pro", 150.0, 600.0),
    ("o3-2025-04-16", 10.0, 40.0),
    ("o3-mini-2025-01-31", 1.1, 4.4),
    ("o3-mini", 1.1, 4.4),
    ("o4-mini-2025-04-16", 1.1, 4.4),
    ("o4-mini", 1.1, 4.4),
    ("tts-1-hd", 0.0, 30.0),
    ("tts-1", 0.0, 15.0),
    ("o1", 15.0, 60.0),
    ("o3", 10.0, 40.0),
];

/// `(input, output)` USD per million tokens for `model`.
pub fn price(model: &str) -> Option<(f64, f64)> {
    PRICES
        .iter()
        .find(|(name, _, _)| *name == model)
        .map(|(_, input, output)| (*input, *output))
}

const JSON_BODY_REQUIRED: &str = "Pass a JSON body with {model} so we can calculate cost";

/// The OpenAI API.
pub struct OpenAi {
    api_key: String,
    base_url: String,
}

impl fmt::Debug for OpenAi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAi")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl OpenAi {
    pub fn new(api_key: String, base_url: String) -> Self {
        Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Validate and shape the request.
    ///
    /// `POST` bodies must be JSON naming a priced model, so every forwarded
    /// call can be charged. Streamed chat completions are asked to report usage.
    pub fn transform(&self, inbound: InboundRequest) -> Result<UpstreamRequest, AipipeError> {
        let headers = upstream_request_headers(&inbound.headers, &self.api_key)?;
        let body = if inbound.method == Method::POST {
            Some(self.shape_body(&inbound.headers, &inbound.path, &inbound.body)?)
        } else if carries_body(&inbound.method) {
            Some(inbound.body)
        } else {
            None
        };

        Ok(UpstreamRequest {
            url: format!("{}{}", self.base_url, inbound.path),
            method: inbound.method,
            headers,
            body,
        })
    }

    fn shape_body(&self, headers: &HeaderMap, path: &str, body: &[u8]) -> Result<Bytes, AipipeError> {
        let is_json = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("application/json"));
        if !is_json {
            return Err(AipipeError::Validation(JSON_BODY_REQUIRED.into()));
        }

        let mut json: Value = serde_json::from_slice(body)
            .map_err(|_| AipipeError::Validation(JSON_BODY_REQUIRED.into()))?;

        let model = json.get("model").and_then(Value::as_str);
        if model.and_then(price).is_none() {
            let shown = match json.get("model") {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => "undefined".to_string(),
            };
            return Err(AipipeError::Validation(format!("Model {shown} pricing unknown")));
        }

        if request_stream_usage(&mut json, path) {
            debug!(path, "requested usage in event stream");
        }
        serde_json::to_vec(&json)
            .map(Bytes::from)
            .map_err(|e| AipipeError::Internal(format!("failed to re-encode request body: {e}")))
    }

    /// Per-million-token pricing for both usage shapes.
    pub fn cost(&self, model: &str, usage: UsageCounters) -> f64 {
        let Some((input, output)) = price(model) else {
            warn!(provider = NAME, model, "pricing gap: model has no price");
            return 0.0;
        };
        (usage.prompt_units as f64 * input + usage.completion_units as f64 * output)
            / TOKENS_PER_PRICE_UNIT
    }
}
