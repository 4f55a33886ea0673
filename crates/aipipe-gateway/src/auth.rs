// SPDX-FileCopyrightText: 2026 Aipipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Caller authentication from the `Authorization` header.

use aipipe_core::{AuthFailure, Identity};
use axum::http::{header::AUTHORIZATION, HeaderMap};
use tracing::debug;

use crate::server::GatewayState;

/// The credential from `Authorization: Bearer <credential>`.
///
/// The `Bearer` prefix is optional; surrounding whitespace is ignored.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthFailure> {
    let value = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .trim_start();
    let token = value.strip_prefix("Bearer").unwrap_or(value).trim();
    if token.is_empty() {
        return Err(AuthFailure::Missing);
    }
    Ok(token)
}

/// Verify the caller's credential and return their identity.
pub fn authenticate(state: &GatewayState, headers: &HeaderMap) -> Result<Identity, AuthFailure> {
    let token = bearer_token(headers)?;
    let identity = state.credentials.verify(token).inspect_err(|failure| {
        debug!(reason = %failure, "credential rejected");
    })?;
    Ok(identity)
}
