// SPDX-FileCopyrightText: 2026 Aipipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Graceful shutdown: stop on SIGTERM or SIGINT, then let charges for
//! streams that already finished reach the ledger before it closes.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// How long shutdown waits for outstanding stream charges.
pub const CHARGE_DRAIN_GRACE: Duration = Duration::from_secs(10);

/// Installs signal handlers for SIGTERM and SIGINT.
///
/// Returns a [`CancellationToken`] that is cancelled when either signal is received.
pub fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();

    tokio::spawn(async move {
        let signal = wait_for_signal().await;
        info!(signal, "initiating shutdown");
        trigger.cancel();
    });

    token
}

/// Resolves with the name of the first shutdown signal received.
async fn wait_for_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => tokio::select! {
                _ = tokio::signal::ctrl_c() => "SIGINT",
                _ = sigterm.recv() => "SIGTERM",
            },
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler, waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
                "SIGINT"
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        "Ctrl+C"
    }
}

/// Wait up to `grace` for the charges tracked by `charges`.
///
/// Returns `false` if some were still running when the grace period ran
/// out; those charges are lost.
pub async fn drain_charges(charges: &TaskTracker, grace: Duration) -> bool {
    charges.close();
    if charges.is_empty() {
        return true;
    }
    info!(pending = charges.len(), "waiting for stream charges");
    match tokio::time::timeout(grace, charges.wait()).await {
        Ok(()) => {
            debug!("stream charges drained");
            true
        }
        Err(_) => {
            warn!(
                pending = charges.len(),
                grace_secs = grace.as_secs(),
                "shutdown grace elapsed with charges still pending"
            );
            false
        }
    }
}
