// SPDX-FileCopyrightText: 2026 Aipipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Remotely listed model prices with an in-memory cache.
//!
//! The cache is refreshed only when a requested model is missing. Refreshes
//! merge into the existing snapshot, so entries are never evicted. Concurrent
//! refreshes may race; the last writer wins.

use std::collections::HashMap;
use std::sync::Arc;

use aipipe_core::AipipeError;
use arc_swap::ArcSwap;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

/// Per-token prices in USD.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ModelPrice {
    pub prompt: f64,
    pub completion: f64,
    /// Flat surcharge per request.
    pub request: f64,
}

/// Where model prices come from.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<(String, ModelPrice)>, AipipeError>;
}

/// Cached model price lookup.
pub struct PriceCache {
    snapshot: ArcSwap<HashMap<String, ModelPrice>>,
    source: Option<Arc<dyn PriceSource>>,
}

impl std::fmt::Debug for PriceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriceCache")
            .field("models", &self.snapshot.load().len())
            .field("refreshable", &self.source.is_some())
            .finish()
    }
}

impl PriceCache {
    /// An empty cache filled from `source` on first miss.
    pub fn new(source: Arc<dyn PriceSource>) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(HashMap::new()),
            source: Some(source),
        }
    }

    /// A fixed cache that never refreshes.
    pub fn with_prices(prices: impl IntoIterator<Item = (String, ModelPrice)>) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(prices.into_iter().collect()),
            source: None,
        }
    }

    /// Cached price for `model`, without refreshing.
    pub fn get(&self, model: &str) -> Option<ModelPrice> {
        self.snapshot.load().get(model).copied()
    }

    pub fn len(&self) -> usize {
        self.snapshot.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Price for `model`, refreshing the listing once if it is not cached.
    pub async fn get_or_refresh(&self, model: &str) -> Result<Option<ModelPrice>, AipipeError> {
        if let Some(price) = self.get(model) {
            return Ok(Some(price));
        }
        let Some(source) = &self.source else {
            return Ok(None);
        };

        debug!(model, "price cache miss, refreshing listing");
        let fetched = source.fetch().await?;
        let mut merged = HashMap::clone(&self.snapshot.load());
        merged.extend(fetched);
        let found = merged.get(model).copied();
        info!(models = merged.len(), "model price listing refreshed");
        self.snapshot.store(Arc::new(merged));
        Ok(found)
    }
}

#[derive(Deserialize)]
struct Listing {
    #[serde(default)]
    data: Vec<ListedModel>,
}

#[derive(Deserialize)]
struct ListedModel {
    id: String,
    #[serde(default)]
    pricing: HashMap<String, Value>,
}

/// Prices are decimal strings per token; tolerate bare numbers and garbage.
fn price_field(pricing: &HashMap<String, Value>, key: &str) -> f64 {
    let parsed = match pricing.get(key) {
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(Value::Number(n)) => n.as_f64(),
        _ => None,
    };
    parsed.filter(|p| p.is_finite() && *p >= 0.0).unwrap_or(0.0)
}

/// Parse a `{data: [{id, pricing: {prompt, completion, request}}]}` listing.
pub fn parse_listing(body: &[u8]) -> Result<Vec<(String, ModelPrice)>, AipipeError> {
    let listing: Listing = serde_json::from_slice(body).map_err(|e| AipipeError::Upstream {
        message: format!("unreadable model listing: {e}"),
        source: Some(Box::new(e)),
    })?;
    Ok(listing
        .data
        .into_iter()
        .map(|m| {
            let price = ModelPrice {
                prompt: price_field(&m.pricing, "prompt"),
                completion: price_field(&m.pricing, "completion"),
                request: price_field(&m.pricing, "request"),
            };
            (m.id, price)
        })
        .collect())
}

/// Fetches the listing over HTTP.
#[derive(Debug, Clone)]
pub struct HttpPriceSource {
    client: reqwest::Client,
    url: String,
}

impl HttpPriceSource {
    pub fn new(client: reqwest::Client, url: String) -> Self {
        Self { client, url }
    }
}

#[async_trait]
impl PriceSource for HttpPriceSource {
    async fn fetch(&self) -> Result<Vec<(String, ModelPrice)>, AipipeError> {
        let upstream = |message: String, e: reqwest::Error| AipipeError::Upstream {
            message,
            source: Some(Box::new(e)),
        };
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| upstream(format!("model listing request failed: {e}"), e))?
            .error_for_status()
            .map_err(|e| upstream(format!("model listing returned an error: {e}"), e))?;
        let body = response
            .bytes()
            .await
            .map_err(|e| upstream(format!("failed to read model listing: {e}"), e))?;
        parse_listing(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Counting {
        calls: AtomicUsize,
        prices: Vec<(String, ModelPrice)>,
    }

    #[async_trait]
    impl PriceSource for Counting {
        async fn fetch(&self) -> Result<Vec<(String, ModelPrice)>, AipipeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.prices.clone())
        }
    }

    fn price(prompt: f64) -> ModelPrice {
        ModelPrice {
            prompt,
            completion: prompt * 2.0,
            request: 0.0,
        }
    }

    #[tokio::test]
    async fn refreshes_only_on_miss() {
        let source = Arc::new(Counting {
            calls: AtomicUsize::new(0),
            prices: vec![("a/model".into(), price(1e-6))],
        });
        let cache = PriceCache::new(source.clone());

        assert_eq!(cache.get_or_refresh("a/model").await.unwrap(), Some(price(1e-6)));
        assert_eq!(cache.get_or_refresh("a/model").await.unwrap(), Some(price(1e-6)));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        // A miss refetches, and still misses.
        assert_eq!(cache.get_or_refresh("b/model").await.unwrap(), None);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn refresh_never_evicts() {
        let cache = PriceCache::new(Arc::new(Counting {
            calls: AtomicUsize::new(0),
            prices: vec![("listed".into(), price(1.0))],
        }));
        cache.snapshot.store(Arc::new(HashMap::from([("delisted".to_string(), price(2.0))])));
        cache.get_or_refresh("listed").await.unwrap();
        assert_eq!(cache.get("delisted"), Some(price(2.0)));
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn fixed_cache_never_fetches() {
        let cache = PriceCache::with_prices([("m".to_string(), price(1.0))]);
        assert_eq!(cache.get_or_refresh("unknown").await.unwrap(), None);
        assert_eq!(cache.get_or_refresh("m").await.unwrap(), Some(price(1.0)));
    }

    #[test]
    fn listing_parses_string_prices() {
        let body = br#"{"data": [
            {"id": "openai/gpt-4o-mini", "pricing": {"prompt": "0.00000015", "completion": "0.0000006", "request": "0"}},
            {"id": "free/model", "pricing": {"prompt": "0", "completion": "0"}},
            {"id": "odd/model", "pricing": {"prompt": 0.5, "completion": "n/a"}}
        ]}"#;
        let prices: HashMap<_, _> = parse_listing(body).unwrap().into_iter().collect();
        assert_eq!(prices["openai/gpt-4o-mini"].prompt, 0.00000015);
        assert_eq!(prices["free/model"], ModelPrice::default());
        assert_eq!(prices["odd/model"].prompt, 0.5);
        assert_eq!(prices["odd/model"].completion, 0.0);
    }

    #[tokio::test]
    async fn http_source_reads_listing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"id": "x/y", "pricing": {"prompt": "0.000001", "completion": "0.000002", "request": "0.01"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let source = HttpPriceSource::new(reqwest::Client::new(), format!("{}/api/v1/models", server.uri()));
        let prices = source.fetch().await.unwrap();
        assert_eq!(prices.len(), 1);
        assert_eq!(prices[0].1.request, 0.01);
    }

    #[tokio::test]
    async fn http_source_surfaces_status_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let source = HttpPriceSource::new(reqwest::Client::new(), server.uri());
        let err = source.fetch().await.unwrap_err();
        assert_eq!(err.status_code(), 502);
    }
}
