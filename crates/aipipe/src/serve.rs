// SPDX-FileCopyrightText: 2026 Aipipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `aipipe serve` command implementation.
//!
//! Opens the ledger, builds the credential verifier, budget resolver and
//! provider registry from configuration, and serves the gateway until a
//! shutdown signal arrives. Charges for streams that ended before shutdown
//! are drained before the ledger closes.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use aipipe_auth::{CredentialVerifier, GoogleIdTokenVerifier, IdentityProof};
use aipipe_config::AipipeConfig;
use aipipe_core::{AipipeError, Identity};
use aipipe_cost::{BudgetResolver, CostLedger};
use aipipe_gateway::{start_server, GatewayState, ServerConfig};
use aipipe_prometheus::PrometheusAdapter;
use aipipe_providers::{upstream_client, ProviderRegistry};
use aipipe_storage::Database;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use crate::shutdown;

/// Runs the `aipipe serve` command.
pub async fn run_serve(config: AipipeConfig) -> Result<(), AipipeError> {
    init_tracing(&config.server.log_level);

    info!("starting aipipe serve");

    let db = open_database(&config).await?;
    let state = build_state(&config, CostLedger::new(db.clone()))?;

    let server = ServerConfig {
        host: config.server.host.clone(),
        port: config.server.port,
    };
    let charges = state.charges.clone();
    let cancel = shutdown::install_signal_handler();
    start_server(&server, state, async move { cancel.cancelled().await }).await?;

    shutdown::drain_charges(&charges, shutdown::CHARGE_DRAIN_GRACE).await;
    db.close().await?;
    info!("aipipe serve shutdown complete");
    Ok(())
}

/// Open (and migrate) the ledger database named in the configuration.
pub async fn open_database(config: &AipipeConfig) -> Result<Database, AipipeError> {
    Database::open(&config.storage.database_path, config.storage.wal_mode).await
}

/// Credential verifier from `auth.secret` and `auth.salt`.
pub fn credential_verifier(config: &AipipeConfig) -> Result<CredentialVerifier, AipipeError> {
    let secret = config.auth.secret.as_deref().ok_or_else(|| {
        AipipeError::Config("auth.secret (or AIPIPE_SECRET) must be set to sign credentials".into())
    })?;
    CredentialVerifier::new(secret, config.auth.salt.clone())
}

/// Assemble the gateway state.
pub fn build_state(config: &AipipeConfig, ledger: CostLedger) -> Result<GatewayState, AipipeError> {
    let idle_timeout = Duration::from_secs(config.server.request_timeout_secs);

    let credentials = Arc::new(credential_verifier(config)?);

    let identity_proof = match &config.auth.google {
        Some(google) => {
            let verifier: Arc<dyn IdentityProof> = Arc::new(GoogleIdTokenVerifier::new(google)?);
            Some(verifier)
        }
        None => {
            info!("no identity-proof verifier configured, /token disabled");
            None
        }
    };

    let providers = ProviderRegistry::from_config(&config.providers, idle_timeout)?;
    if providers.names().is_empty() {
        warn!("no provider has an API key; only usage and admin routes will answer");
    }

    let prometheus = if config.prometheus.enabled {
        Some(PrometheusAdapter::install()?)
    } else {
        None
    };

    let http = upstream_client(idle_timeout)?;

    let admins: BTreeSet<Identity> = config.auth.admins.iter().map(Identity::new).collect();
    info!(
        admins = admins.len(),
        budgets = config.budget.len(),
        "gateway state assembled"
    );

    Ok(GatewayState {
        credentials,
        identity_proof,
        admins: Arc::new(admins),
        budgets: Arc::new(BudgetResolver::new(config.budget.clone())),
        ledger,
        providers,
        http,
        prometheus,
        charges: TaskTracker::new(),
    })
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("aipipe={log_level},tower_http={log_level},warn"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
