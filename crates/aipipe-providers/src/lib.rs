// SPDX-FileCopyrightText: 2026 Aipipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Upstream provider adapters for the aipipe gateway.
//!
//! Each [`Provider`] knows how to turn an inbound request into an upstream
//! request (URL, credential injection, body shaping) and how to price a
//! completed call from its `{model, usage}`. Providers are looked up by the
//! first path segment through a [`ProviderRegistry`].

pub mod headers;
pub mod openai;
pub mod openrouter;
pub mod pricing;
pub mod request;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use aipipe_config::model::ProvidersConfig;
use aipipe_core::{AipipeError, UsageCounters};
use tracing::{info, warn};

pub use openai::OpenAi;
pub use openrouter::OpenRouter;
pub use pricing::{HttpPriceSource, ModelPrice, PriceCache, PriceSource};
pub use request::{InboundRequest, UpstreamRequest};

/// A supported upstream.
#[derive(Debug)]
pub enum Provider {
    OpenRouter(OpenRouter),
    OpenAi(OpenAi),
}

impl Provider {
    /// Path segment the provider is served under.
    pub fn name(&self) -> &'static str {
        match self {
            Self::OpenRouter(_) => openrouter::NAME,
            Self::OpenAi(_) => openai::NAME,
        }
    }

    /// Build the upstream request, or reject the inbound one.
    pub fn transform(&self, inbound: InboundRequest) -> Result<UpstreamRequest, AipipeError> {
        match self {
            Self::OpenRouter(p) => p.transform(inbound),
            Self::OpenAi(p) => p.transform(inbound),
        }
    }

    /// Cost in USD of a completed call. Unknown models and absent usage cost 0.
    pub async fn cost(&self, model: Option<&str>, usage: Option<UsageCounters>) -> f64 {
        let (Some(model), Some(usage)) = (model.filter(|m| !m.is_empty()), usage) else {
            if model.is_some() || usage.is_some() {
                warn!(
                    provider = self.name(),
                    model = model.unwrap_or_default(),
                    has_usage = usage.is_some(),
                    "pricing gap: response lacked model or usage"
                );
            }
            return 0.0;
        };
        match self {
            Self::OpenRouter(p) => p.cost(model, usage).await,
            Self::OpenAi(p) => p.cost(model, usage),
        }
    }
}

/// Bound on establishing an upstream connection.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client for upstream calls.
///
/// `idle_timeout` bounds each read, not the whole exchange: a stream that
/// keeps producing chunks may run longer than it, and is only cut once the
/// upstream goes quiet for that long.
pub fn upstream_client(idle_timeout: Duration) -> Result<reqwest::Client, AipipeError> {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .read_timeout(idle_timeout)
        .build()
        .map_err(|e| AipipeError::Upstream {
            message: format!("failed to build HTTP client: {e}"),
            source: Some(Box::new(e)),
        })
}

/// Name-keyed set of configured providers.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<&'static str, Arc<Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every provider that has an API key configured.
    pub fn from_config(config: &ProvidersConfig, idle_timeout: Duration) -> Result<Self, AipipeError> {
        let client = upstream_client(idle_timeout)?;

        let mut registry = Self::new();

        match &config.openrouter.api_key {
            Some(key) => {
                let source = HttpPriceSource::new(
                    client.clone(),
                    config
                        .openrouter
                        .models_url
                        .clone()
                        .unwrap_or_else(|| openrouter::DEFAULT_MODELS_URL.to_string()),
                );
                let base_url = config
                    .openrouter
                    .base_url
                    .clone()
                    .unwrap_or_else(|| openrouter::DEFAULT_BASE_URL.to_string());
                registry.register(Provider::OpenRouter(OpenRouter::new(
                    key.clone(),
                    base_url,
                    PriceCache::new(Arc::new(source)),
                )));
            }
            None => warn!(provider = openrouter::NAME, "no API key configured, provider disabled"),
        }

        match &config.openai.api_key {
            Some(key) => {
                let base_url = config
                    .openai
                    .base_url
                    .clone()
                    .unwrap_or_else(|| openai::DEFAULT_BASE_URL.to_string());
                registry.register(Provider::OpenAi(OpenAi::new(key.clone(), base_url)));
            }
            None => warn!(provider = openai::NAME, "no API key configured, provider disabled"),
        }

        info!(providers = ?registry.names(), "providers registered");
        Ok(registry)
    }

    pub fn register(&mut self, provider: Provider) {
        self.providers.insert(provider.name(), Arc::new(provider));
    }

    pub fn get(&self, name: &str) -> Option<Arc<Provider>> {
        self.providers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.providers.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aipipe_config::model::ProviderConfig;

    #[test]
    fn providers_without_keys_are_skipped() {
        let config = ProvidersConfig {
            openai: ProviderConfig {
                api_key: Some("sk-test".into()),
                ..Default::default()
            },
            openrouter: ProviderConfig::default(),
        };
        let registry = ProviderRegistry::from_config(&config, Duration::from_secs(5)).unwrap();
        assert_eq!(registry.names(), vec!["openai"]);
        assert!(registry.get("openrouter").is_none());
    }

    #[test]
    fn both_providers_register() {
        let config = ProvidersConfig {
            openai: ProviderConfig {
                api_key: Some("sk-a".into()),
                ..Default::default()
            },
            openrouter: ProviderConfig {
                api_key: Some("sk-b".into()),
                ..Default::default()
            },
        };
        let registry = ProviderRegistry::from_config(&config, Duration::from_secs(5)).unwrap();
        assert_eq!(registry.names(), vec!["openai", "openrouter"]);
        assert_eq!(registry.get("openai").unwrap().name(), "openai");
    }

    #[tokio::test]
    async fn absent_usage_costs_nothing() {
        let provider = Provider::OpenAi(OpenAi::new("k".into(), openai::DEFAULT_BASE_URL.into()));
        assert_eq!(provider.cost(Some("gpt-4o-mini"), None).await, 0.0);
        let usage = UsageCounters {
            prompt_units: 10,
            completion_units: 10,
        };
        assert_eq!(provider.cost(None, Some(usage)).await, 0.0);
    }

    #[tokio::test]
    async fn per_request_fee_needs_usage() {
        let prices = PriceCache::with_prices(vec![(
            "m".to_string(),
            ModelPrice {
                prompt: 0.0,
                completion: 0.0,
                request: 0.1,
            },
        )]);
        let provider = Provider::OpenRouter(OpenRouter::new(
            "k".into(),
            openrouter::DEFAULT_BASE_URL.into(),
            prices,
        ));
        assert_eq!(provider.cost(Some("m"), None).await, 0.0);
        let usage = UsageCounters {
            prompt_units: 1,
            completion_units: 1,
        };
        assert!((provider.cost(Some("m"), Some(usage)).await - 0.1).abs() < 1e-12);
    }
}
