// SPDX-FileCopyrightText: 2026 Aipipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the aipipe gateway.

use strum::IntoStaticStr;
use thiserror::Error;

/// Why a credential was not accepted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthFailure {
    /// No `Authorization: Bearer` header (or an empty one) on the request.
    #[error("Missing Authorization: Bearer token")]
    Missing,

    /// Bad signature, malformed payload, or expired credential.
    #[error("Bearer token is invalid: {0}")]
    Invalid(String),

    /// The credential's invalidation tag no longer matches the configured one.
    #[error("Bearer token is no longer valid")]
    Revoked,
}

/// The primary error type used across the gateway pipeline.
///
/// Every variant maps to exactly one HTTP status via [`AipipeError::status_code`].
#[derive(Debug, Error, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum AipipeError {
    /// Configuration errors (invalid TOML, missing secret, bad provider setup).
    #[error("configuration error: {0}")]
    Config(String),

    /// Ledger storage errors (database unavailable, query failure).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Credential verification failed.
    #[error("{0}")]
    Auth(AuthFailure),

    /// The first path segment does not name a registered provider.
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    /// An administrative route was requested by a non-administrator.
    #[error("{identity} is not allowed to use admin endpoints")]
    AdminForbidden { identity: String },

    /// An administrative route that does not exist.
    #[error("Unknown admin action: {0}")]
    UnknownAdminAction(String),

    /// The caller's rolling-window spend has reached the resolved limit.
    #[error("Use ${consumed} / ${limit} in {days} days")]
    BudgetExceeded { consumed: f64, limit: f64, days: u32 },

    /// Provider-specific request validation failed before forwarding.
    #[error("{0}")]
    Validation(String),

    /// The upstream could not be reached or its response could not be read.
    #[error("upstream error: {message}")]
    Upstream {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AipipeError {
    /// HTTP status code the gateway answers with for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::Auth(_) => 401,
            Self::AdminForbidden { .. } => 403,
            Self::UnknownProvider(_) | Self::UnknownAdminAction(_) => 404,
            Self::BudgetExceeded { .. } => 429,
            Self::Upstream { .. } => 502,
            Self::Storage { .. } => 503,
            Self::Config(_) | Self::Internal(_) => 500,
        }
    }

    /// Whether the caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage { .. } | Self::Upstream { .. })
    }

    /// Short snake_case label, used as a metrics dimension.
    pub fn kind(&self) -> &'static str {
        self.into()
    }
}

impl From<AuthFailure> for AipipeError {
    fn from(failure: AuthFailure) -> Self {
        Self::Auth(failure)
    }
}
