// SPDX-FileCopyrightText: 2026 Aipipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the aipipe metered gateway.
//!
//! This crate provides the error taxonomy and the small set of value types
//! shared by every other crate in the workspace: caller identities, budget
//! policies, and normalized usage counters.

pub mod error;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::{AipipeError, AuthFailure};
pub use types::{BudgetPolicy, Identity, UsageCounters};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aipipe_error_has_all_variants() {
        let _config = AipipeError::Config("test".into());
        let _storage = AipipeError::Storage {
            source: Box::new(std::io::Error::other("test")),
        };
        let _auth = AipipeError::Auth(AuthFailure::Missing);
        let _provider = AipipeError::UnknownProvider("nope".into());
        let _forbidden = AipipeError::AdminForbidden {
            identity: "a@b.c".into(),
        };
        let _action = AipipeError::UnknownAdminAction("wat".into());
        let _budget = AipipeError::BudgetExceeded {
            consumed: 0.0,
            limit: 0.0,
            days: 1,
        };
        let _validation = AipipeError::Validation("bad".into());
        let _upstream = AipipeError::Upstream {
            message: "down".into(),
            source: None,
        };
        let _internal = AipipeError::Internal("test".into());
    }

    #[test]
    fn identity_round_trips_through_json() {
        let id = Identity::new("user@example.com");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"user@example.com\"");
        let parsed: Identity = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }
}
