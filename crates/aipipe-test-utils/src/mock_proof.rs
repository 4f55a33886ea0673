// SPDX-FileCopyrightText: 2026 Aipipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Identity-proof verifier answering from a fixed table.

use std::collections::HashMap;

use aipipe_auth::{IdentityProof, VerifiedClaims};
use aipipe_core::{AipipeError, AuthFailure, Identity};
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Accepts exactly the proofs it was given.
#[derive(Debug, Default)]
pub struct StaticIdentityProof {
    proofs: HashMap<String, VerifiedClaims>,
}

impl StaticIdentityProof {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `proof` as a verified login for `email`, with `name` as an extra claim.
    pub fn with_proof(mut self, proof: &str, email: &str, name: &str) -> Self {
        let claims = Map::from_iter([
            ("email".to_string(), Value::from(email)),
            ("email_verified".to_string(), Value::Bool(true)),
            ("name".to_string(), Value::from(name)),
        ]);
        self.proofs.insert(
            proof.to_string(),
            VerifiedClaims {
                email: Identity::new(email),
                claims,
            },
        );
        self
    }
}

#[async_trait]
impl IdentityProof for StaticIdentityProof {
    async fn verify(&self, proof: &str) -> Result<VerifiedClaims, AipipeError> {
        self.proofs.get(proof).cloned().ok_or_else(|| {
            AipipeError::Auth(AuthFailure::Invalid("Invalid Google credentials".into()))
        })
    }
}
