// SPDX-FileCopyrightText: 2026 Aipipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Every path is served by a single fallback handler, because the first path
//! segment selects the provider (or a reserved action) at request time.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;

use aipipe_auth::{CredentialVerifier, IdentityProof};
use aipipe_core::{AipipeError, Identity};
use aipipe_cost::{BudgetResolver, CostLedger};
use aipipe_prometheus::PrometheusAdapter;
use aipipe_providers::ProviderRegistry;
use axum::{middleware, Router};
use tokio_util::task::TaskTracker;
use tower_http::trace::TraceLayer;

use crate::cors::cors_middleware;
use crate::handlers;

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    /// Verifies and issues access credentials.
    pub credentials: Arc<CredentialVerifier>,
    /// Exchanges external identity proofs at `/token`. `None` disables the endpoint.
    pub identity_proof: Option<Arc<dyn IdentityProof>>,
    /// Identities allowed to use `admin/*`.
    pub admins: Arc<BTreeSet<Identity>>,
    pub budgets: Arc<BudgetResolver>,
    pub ledger: CostLedger,
    pub providers: ProviderRegistry,
    /// HTTP client used to reach upstreams.
    pub http: reqwest::Client,
    /// Renders `admin/metrics` when set.
    pub prometheus: Option<PrometheusAdapter>,
    /// Charges for event streams, run after the stream ends.
    pub charges: TaskTracker,
}

impl std::fmt::Debug for GatewayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayState")
            .field("credentials", &self.credentials)
            .field("identity_proof", &self.identity_proof.is_some())
            .field("admins", &self.admins.len())
            .field("providers", &self.providers.names())
            .field("prometheus", &self.prometheus.is_some())
            .field("pending_charges", &self.charges.len())
            .finish_non_exhaustive()
    }
}

impl GatewayState {
    pub fn is_admin(&self, identity: &Identity) -> bool {
        self.admins.contains(identity)
    }
}

/// Address the server binds to.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Build the gateway router.
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .fallback(handlers::dispatch)
        .with_state(state)
        .layer(middleware::from_fn(cors_middleware))
        .layer(TraceLayer::new_for_http())
}

/// Serve the gateway until `shutdown` resolves.
pub async fn start_server(
    config: &ServerConfig,
    state: GatewayState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), AipipeError> {
    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AipipeError::Config(format!("failed to bind gateway to {addr}: {e}")))?;

    tracing::info!("Gateway server listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| AipipeError::Internal(format!("gateway server error: {e}")))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_config_debug() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8787,
        };
        let debug = format!("{config:?}");
        assert!(debug.contains("127.0.0.1"));
    }
}
