// SPDX-FileCopyrightText: 2026 Aipipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the aipipe gateway.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::collections::BTreeMap;
use std::fmt;

use aipipe_core::BudgetPolicy;
use serde::{Deserialize, Serialize};

/// Top-level aipipe configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values, except that a
/// signing secret must be present before the server can start.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AipipeConfig {
    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Ledger database settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Credential signing, invalidation tags, and administrators.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Budget table keyed by identity, `@domain`, or `*`.
    #[serde(default)]
    pub budget: BTreeMap<String, BudgetPolicy>,

    /// Upstream provider credentials and endpoints.
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Prometheus metrics settings.
    #[serde(default)]
    pub prometheus: PrometheusConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to bind the server to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Logging level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Upstream idle timeout in seconds: the longest wait for any single read.
    /// Long streams that keep producing chunks are never cut by it.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8787
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_request_timeout_secs() -> u64 {
    300
}

/// Ledger storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("aipipe").join("aipipe.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("aipipe.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// Credential configuration.
#[derive(Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// HS256 signing secret for access credentials.
    #[serde(default)]
    pub secret: Option<String>,

    /// Identities allowed to use `admin/*` endpoints.
    #[serde(default)]
    pub admins: Vec<String>,

    /// Invalidation tags per identity. Changing a tag revokes earlier credentials.
    #[serde(default)]
    pub salt: BTreeMap<String, String>,

    /// Google sign-in for the `/token` exchange. `None` disables the exchange.
    #[serde(default)]
    pub google: Option<GoogleConfig>,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .field("admins", &self.admins)
            .field("salt", &format_args!("{} entries", self.salt.len()))
            .field("google", &self.google)
            .finish()
    }
}

/// Google ID token verification settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GoogleConfig {
    /// OAuth client ID the ID token must be issued for (`aud`).
    pub client_id: String,

    /// Accepted `iss` values.
    #[serde(default = "default_google_issuers")]
    pub issuers: Vec<String>,

    /// RSA signing keys, as published in Google's JWKS document.
    #[serde(default)]
    pub keys: Vec<JwkConfig>,
}

fn default_google_issuers() -> Vec<String> {
    vec![
        "accounts.google.com".to_string(),
        "https://accounts.google.com".to_string(),
    ]
}

/// One RSA public key in JWK form.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct JwkConfig {
    /// Key ID matched against the token header's `kid`.
    pub kid: String,
    /// Base64url modulus.
    pub n: String,
    /// Base64url public exponent.
    pub e: String,
}

/// Upstream provider configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub openai: ProviderConfig,

    #[serde(default)]
    pub openrouter: ProviderConfig,
}

/// A single upstream. Providers without an API key are not served.
#[derive(Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Key injected as `Authorization: Bearer` on forwarded requests.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Override for the upstream base URL.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Override for the price listing URL (OpenRouter only).
    #[serde(default)]
    pub models_url: Option<String>,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .field("models_url", &self.models_url)
            .finish()
    }
}

/// Prometheus metrics configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PrometheusConfig {
    /// Install the recorder and serve `admin/metrics`.
    #[serde(default = "default_prometheus_enabled")]
    pub enabled: bool,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            enabled: default_prometheus_enabled(),
        }
    }
}

fn default_prometheus_enabled() -> bool {
    true
}
