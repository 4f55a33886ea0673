// SPDX-FileCopyrightText: 2026 Aipipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Administrative actions under `admin/*`.
//!
//! - `admin/usage`: every ledger row
//! - `admin/cost`: `POST {email, date?, cost}` overwrites one day's cost
//! - `admin/token?email=`: issue a credential for another identity
//! - `admin/metrics`: Prometheus text

use aipipe_core::{AipipeError, Identity};
use axum::body::Bytes;
use axum::extract::Query;
use axum::http::{header::CONTENT_TYPE, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::error::envelope;
use crate::server::GatewayState;

/// Body of `POST admin/cost`.
#[derive(Debug, Deserialize)]
pub struct SetCostRequest {
    pub email: String,
    /// `YYYY-MM-DD`; today (UTC) when absent.
    #[serde(default)]
    pub date: Option<NaiveDate>,
    pub cost: f64,
}

/// Query of `admin/token`.
#[derive(Debug, Deserialize)]
pub struct IssueTokenQuery {
    pub email: Option<String>,
}

/// Run `action` for `admin`, who has already been checked against the admin set.
pub async fn handle(
    state: &GatewayState,
    admin: &Identity,
    action: &str,
    method: &Method,
    uri: &Uri,
    body: Bytes,
) -> Result<Response, AipipeError> {
    match action {
        "usage" => {
            let records = state.ledger.all_usage().await?;
            Ok(envelope(StatusCode::OK, json!({ "data": records })))
        }
        "cost" => {
            if method != Method::POST {
                return Err(AipipeError::Validation(
                    "POST {email, date?, cost} to admin/cost".into(),
                ));
            }
            let request: SetCostRequest = serde_json::from_slice(&body).map_err(|e| {
                AipipeError::Validation(format!("admin/cost expects {{email, date?, cost}}: {e}"))
            })?;
            if request.email.is_empty() || !request.cost.is_finite() {
                return Err(AipipeError::Validation(
                    "admin/cost needs a non-empty email and a finite cost".into(),
                ));
            }
            let date = request.date.unwrap_or_else(|| Utc::now().date_naive());
            let identity = Identity::new(request.email);
            state.ledger.set_cost(&identity, date, request.cost).await?;
            info!(admin = %admin, email = %identity, %date, cost_usd = request.cost, "admin set cost");
            Ok(envelope(
                StatusCode::OK,
                json!({ "email": identity, "date": date, "cost": request.cost }),
            ))
        }
        "token" => {
            let Query(query) = Query::<IssueTokenQuery>::try_from_uri(uri)
                .map_err(|e| AipipeError::Validation(format!("bad admin/token query: {e}")))?;
            let email = query
                .email
                .filter(|e| !e.is_empty())
                .ok_or_else(|| AipipeError::Validation("admin/token needs ?email=".into()))?;
            let identity = Identity::new(email);
            let token = state.credentials.issue(&identity)?;
            info!(admin = %admin, email = %identity, "admin issued credential");
            Ok(envelope(
                StatusCode::OK,
                json!({ "email": identity, "token": token }),
            ))
        }
        "metrics" => match &state.prometheus {
            Some(prometheus) => Ok((
                StatusCode::OK,
                [(CONTENT_TYPE, "text/plain; version=0.0.4")],
                prometheus.render(),
            )
                .into_response()),
            None => Err(AipipeError::UnknownAdminAction(action.to_string())),
        },
        other => Err(AipipeError::UnknownAdminAction(other.to_string())),
    }
}
