// SPDX-FileCopyrightText: 2026 Aipipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! JSON envelopes for gateway-generated responses.
//!
//! Every response the gateway produces itself is a JSON object carrying a
//! `code` field that mirrors the HTTP status. Errors are `{code, message}`.

use aipipe_core::AipipeError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{Map, Value};

/// Error body: `{code, message}`.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: u16,
    pub message: String,
}

/// An error rendered as an [`ErrorResponse`].
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    /// Metrics label for the rejection.
    pub reason: &'static str,
}

impl ApiError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
            reason: "not_found",
        }
    }
}

impl From<AipipeError> for ApiError {
    fn from(err: AipipeError) -> Self {
        Self {
            status: StatusCode::from_u16(err.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            message: err.to_string(),
            reason: err.kind(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        aipipe_prometheus::record_rejection(self.reason);
        let body = ErrorResponse {
            code: self.status.as_u16(),
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

/// Wrap a serializable object in a `{code, ...fields}` envelope.
///
/// Non-object values are placed under `data`.
pub fn envelope<T: Serialize>(status: StatusCode, fields: T) -> Response {
    let mut body = match serde_json::to_value(fields) {
        Ok(Value::Object(map)) => map,
        Ok(other) => Map::from_iter([("data".to_string(), other)]),
        Err(e) => {
            return ApiError::from(AipipeError::Internal(format!(
                "failed to encode response: {e}"
            )))
            .into_response();
        }
    };
    body.insert("code".into(), Value::from(status.as_u16()));
    (status, Json(Value::Object(body))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use aipipe_core::AuthFailure;
    use axum::body::to_bytes;
    use serde_json::json;

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn errors_render_code_and_message() {
        let response = ApiError::from(AipipeError::Auth(AuthFailure::Missing)).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            body_json(response).await,
            json!({"code": 401, "message": "Missing Authorization: Bearer token"})
        );
    }

    #[tokio::test]
    async fn envelope_mirrors_status() {
        let response = envelope(StatusCode::OK, json!({"email": "a@b.c", "cost": 0.5}));
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["code"], 200);
        assert_eq!(body["email"], "a@b.c");
    }

    #[tokio::test]
    async fn envelope_wraps_arrays() {
        let body = body_json(envelope(StatusCode::OK, vec![1, 2])).await;
        assert_eq!(body, json!({"code": 200, "data": [1, 2]}));
    }
}
