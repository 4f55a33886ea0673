// SPDX-FileCopyrightText: 2026 Aipipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! OpenRouter adapter priced from the public model listing.

use std::fmt;

use aipipe_core::{AipipeError, UsageCounters};
use bytes::Bytes;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use serde_json::Value;
use tracing::{debug, warn};

use crate::headers::upstream_request_headers;
use crate::pricing::PriceCache;
use crate::request::{carries_body, request_stream_usage, InboundRequest, UpstreamRequest};

pub const NAME: &str = "openrouter";
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api";
pub const DEFAULT_MODELS_URL: &str = "https://openrouter.ai/api/v1/models";

/// The OpenRouter API.
pub struct OpenRouter {
    api_key: String,
    base_url: String,
    prices: PriceCache,
}

impl fmt::Debug for OpenRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenRouter")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("prices", &self.prices)
            .finish()
    }
}

impl OpenRouter {
    pub fn new(api_key: String, base_url: String, prices: PriceCache) -> Self {
        Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            prices,
        }
    }

    pub fn prices(&self) -> &PriceCache {
        &self.prices
    }

    /// Forward the body untouched, except that streamed chat completions
    /// are asked to report usage when the body is readable JSON.
    pub fn transform(&self, inbound: InboundRequest) -> Result<UpstreamRequest, AipipeError> {
        let headers = upstream_request_headers(&inbound.headers, &self.api_key)?;
        let body = carries_body(&inbound.method)
            .then(|| shape_body(&inbound.headers, &inbound.path, inbound.body.clone()));

        Ok(UpstreamRequest {
            url: format!("{}{}", self.base_url, inbound.path),
            method: inbound.method,
            headers,
            body,
        })
    }

    /// Per-token prices plus the flat request fee.
    pub async fn cost(&self, model: &str, usage: UsageCounters) -> f64 {
        let price = match self.prices.get_or_refresh(model).await {
            Ok(Some(price)) => price,
            Ok(None) => {
                warn!(provider = NAME, model, "pricing gap: model not in listing");
                return 0.0;
            }
            Err(e) => {
                warn!(provider = NAME, model, error = %e, "pricing gap: listing unavailable");
                return 0.0;
            }
        };
        usage.prompt_units as f64 * price.prompt
            + usage.completion_units as f64 * price.completion
            + price.request
    }
}

fn shape_body(headers: &HeaderMap, path: &str, body: Bytes) -> Bytes {
    let is_json = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("application/json"));
    if !is_json {
        return body;
    }
    let Ok(mut json) = serde_json::from_slice::<Value>(&body) else {
        return body;
    };
    if !request_stream_usage(&mut json, path) {
        return body;
    }
    debug!(path, "requested usage in event stream");
    serde_json::to_vec(&json).map(Bytes::from).unwrap_or(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::{HttpPriceSource, ModelPrice};
    use reqwest::header::{HeaderValue, AUTHORIZATION};
    use reqwest::Method;
    use serde_json::json;
    use std::sync::Arc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fixed(prices: &[(&str, ModelPrice)]) -> OpenRouter {
        OpenRouter::new(
            "sk-or".into(),
            DEFAULT_BASE_URL.into(),
            PriceCache::with_prices(prices.iter().map(|(m, p)| (m.to_string(), *p))),
        )
    }

    fn inbound(method: Method, path: &str, body: &'static [u8]) -> InboundRequest {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer caller-token"));
        InboundRequest {
            method,
            path: path.into(),
            headers,
            body: Bytes::from_static(body),
        }
    }

    #[test]
    fn rewrites_url_and_credential() {
        let req = fixed(&[])
            .transform(inbound(Method::GET, "/v1/models?x=1", b""))
            .unwrap();
        assert_eq!(req.url, "https://openrouter.ai/api/v1/models?x=1");
        assert_eq!(req.headers[AUTHORIZATION], "Bearer sk-or");
        assert!(req.body.is_none());
    }

    #[test]
    fn plain_body_passes_verbatim() {
        let raw = br#"{"model":"a/b","messages":[]}"#;
        let req = fixed(&[])
            .transform(inbound(Method::POST, "/v1/chat/completions", raw))
            .unwrap();
        assert_eq!(req.body.unwrap().as_ref(), raw);
    }

    #[test]
    fn unparseable_body_passes_verbatim() {
        let req = fixed(&[])
            .transform(inbound(Method::POST, "/v1/chat/completions", b"{not json"))
            .unwrap();
        assert_eq!(req.body.unwrap().as_ref(), b"{not json");
    }

    #[test]
    fn streamed_chat_requests_usage() {
        let req = fixed(&[])
            .transform(inbound(
                Method::POST,
                "/v1/chat/completions",
                br#"{"model":"a/b","stream":true}"#,
            ))
            .unwrap();
        let body: Value = serde_json::from_slice(&req.body.unwrap()).unwrap();
        assert_eq!(body["stream_options"]["include_usage"], json!(true));
    }

    #[tokio::test]
    async fn cost_adds_request_fee() {
        let provider = fixed(&[(
            "a/b",
            ModelPrice {
                prompt: 0.000001,
                completion: 0.000002,
                request: 0.01,
            },
        )]);
        let usage = UsageCounters {
            prompt_units: 1000,
            completion_units: 500,
        };
        let cost = provider.cost("a/b", usage).await;
        assert!((cost - 0.012).abs() < 1e-12);
    }

    #[tokio::test]
    async fn unknown_model_costs_nothing() {
        let usage = UsageCounters {
            prompt_units: 10,
            completion_units: 10,
        };
        assert_eq!(fixed(&[]).cost("nope/model", usage).await, 0.0);
    }

    #[tokio::test]
    async fn cost_fetches_listing_on_first_use() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"id": "meta/llama", "pricing": {"prompt": "0.0000002", "completion": "0.0000002", "request": "0"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let source = HttpPriceSource::new(reqwest::Client::new(), format!("{}/api/v1/models", server.uri()));
        let provider = OpenRouter::new(
            "sk-or".into(),
            format!("{}/api", server.uri()),
            PriceCache::new(Arc::new(source)),
        );
        let usage = UsageCounters {
            prompt_units: 5_000,
            completion_units: 5_000,
        };
        let first = provider.cost("meta/llama", usage).await;
        let second = provider.cost("meta/llama", usage).await;
        assert!((first - 0.002).abs() < 1e-12);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn listing_outage_costs_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let source = HttpPriceSource::new(reqwest::Client::new(), server.uri());
        let provider = OpenRouter::new("k".into(), server.uri(), PriceCache::new(Arc::new(source)));
        let usage = UsageCounters {
            prompt_units: 1,
            completion_units: 1,
        };
        assert_eq!(provider.cost("x/y", usage).await, 0.0);
    }
}
