// SPDX-FileCopyrightText: 2026 Aipipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request dispatch for `/{provider}/{upstream path}`.
//!
//! Order of evaluation: `token` exchange, provider lookup, authentication,
//! `admin/*`, budget resolution, `usage`, budget check, provider transform,
//! forward and meter. Everything before the forward is answered locally, so a
//! rejected request never reaches an upstream.

use aipipe_core::{AipipeError, AuthFailure};
use aipipe_providers::InboundRequest;
use axum::{
    body::to_bytes,
    extract::{Query, Request, State},
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::admin;
use crate::auth::authenticate;
use crate::error::{envelope, ApiError};
use crate::proxy;
use crate::server::GatewayState;

/// Largest request body read into memory.
pub const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

const USAGE: &str = "usage";
const TOKEN: &str = "token";
const ADMIN: &str = "admin";

/// Split a path into its first segment and the remainder (with leading `/`).
fn split_route(path: &str) -> (&str, &str) {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    match trimmed.find('/') {
        Some(idx) => (&trimmed[..idx], &trimmed[idx..]),
        None => (trimmed, ""),
    }
}

/// Fallback handler serving every route.
pub async fn dispatch(State(state): State<GatewayState>, request: Request) -> Response {
    match route(&state, request).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn route(state: &GatewayState, request: Request) -> Result<Response, ApiError> {
    let (parts, body) = request.into_parts();
    let (segment, rest) = split_route(parts.uri.path());

    if segment == TOKEN {
        return exchange_token(state, &parts.uri).await;
    }

    let provider = match segment {
        USAGE | ADMIN => None,
        name => Some(
            state
                .providers
                .get(name)
                .ok_or_else(|| AipipeError::UnknownProvider(name.to_string()))?,
        ),
    };

    let identity = authenticate(state, &parts.headers).map_err(AipipeError::from)?;

    let body = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| AipipeError::Validation(format!("unreadable request body: {e}")))?;

    if segment == ADMIN {
        if !state.is_admin(&identity) {
            return Err(AipipeError::AdminForbidden {
                identity: identity.to_string(),
            }
            .into());
        }
        let action = rest.trim_start_matches('/');
        return Ok(admin::handle(state, &identity, action, &parts.method, &parts.uri, body).await?);
    }

    let policy = state.budgets.resolve(&identity);

    let Some(provider) = provider else {
        // Only `usage` is left.
        let report = state.ledger.usage(&identity, policy.days).await?;
        let mut fields = serde_json::to_value(&report)
            .map_err(|e| AipipeError::Internal(format!("failed to encode usage: {e}")))?;
        if let Value::Object(map) = &mut fields {
            map.insert("limit".into(), Value::from(policy.limit));
        }
        return Ok(envelope(StatusCode::OK, fields));
    };

    let consumed = state.ledger.cost_since(&identity, policy.days).await?;
    state.budgets.check(&identity, policy, consumed)?;

    let path = match parts.uri.query() {
        Some(query) => format!("{rest}?{query}"),
        None => rest.to_string(),
    };
    debug!(email = %identity, provider = provider.name(), %path, "forwarding");
    let upstream = provider.transform(InboundRequest {
        method: parts.method,
        path,
        headers: parts.headers,
        body,
    })?;

    Ok(proxy::forward(state, provider, identity, upstream).await?)
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    credential: Option<String>,
}

/// `GET /token?credential=<identity proof>`: exchange a proof for an access credential.
async fn exchange_token(state: &GatewayState, uri: &Uri) -> Result<Response, ApiError> {
    let Some(verifier) = &state.identity_proof else {
        return Err(ApiError::not_found("token exchange not configured"));
    };
    let Query(query) = Query::<TokenQuery>::try_from_uri(uri)
        .map_err(|e| AipipeError::Validation(format!("bad token query: {e}")))?;
    let credential = query
        .credential
        .filter(|c| !c.is_empty())
        .ok_or(AipipeError::Auth(AuthFailure::Missing))?;

    let verified = verifier.verify(&credential).await?;
    let token = state.credentials.issue(&verified.email)?;
    info!(email = %verified.email, "issued credential from identity proof");

    let mut fields = verified.claims;
    fields.insert("token".into(), Value::String(token));
    Ok(envelope(StatusCode::OK, Value::Object(fields)))
}
