// SPDX-FileCopyrightText: 2026 Aipipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Identity-proof exchange.
//!
//! A caller proves who they are with a third-party identity token and receives
//! an access credential in return. [`GoogleIdTokenVerifier`] checks Google
//! sign-in ID tokens (RS256) against a configured key set.

use std::collections::HashMap;

use aipipe_config::model::GoogleConfig;
use aipipe_core::{AipipeError, AuthFailure, Identity};
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use ring::signature::{RsaPublicKeyComponents, RSA_PKCS1_2048_8192_SHA256};
use serde_json::{Map, Value};
use tracing::debug;

use crate::jwt::Compact;

/// Claims from a successfully verified identity proof.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedClaims {
    pub email: Identity,
    /// Every claim in the proof, for echoing back to the caller.
    pub claims: Map<String, Value>,
}

/// Verifies an externally issued identity token.
#[async_trait]
pub trait IdentityProof: Send + Sync {
    async fn verify(&self, proof: &str) -> Result<VerifiedClaims, AipipeError>;
}

struct RsaKey {
    n: Vec<u8>,
    e: Vec<u8>,
}

/// Verifies Google ID tokens against a static JWKS key set.
pub struct GoogleIdTokenVerifier {
    client_id: String,
    issuers: Vec<String>,
    keys: HashMap<String, RsaKey>,
}

fn invalid(reason: impl Into<String>) -> AipipeError {
    AipipeError::Auth(AuthFailure::Invalid(reason.into()))
}

impl GoogleIdTokenVerifier {
    pub fn new(config: &GoogleConfig) -> Result<Self, AipipeError> {
        let decode = |kid: &str, field: &str, value: &str| {
            URL_SAFE_NO_PAD.decode(value).map_err(|e| {
                AipipeError::Config(format!("auth.google key {kid}: `{field}` is not base64url: {e}"))
            })
        };

        let mut keys = HashMap::with_capacity(config.keys.len());
        for jwk in &config.keys {
            keys.insert(
                jwk.kid.clone(),
                RsaKey {
                    n: decode(&jwk.kid, "n", &jwk.n)?,
                    e: decode(&jwk.kid, "e", &jwk.e)?,
                },
            );
        }

        Ok(Self {
            client_id: config.client_id.clone(),
            issuers: config.issuers.clone(),
            keys,
        })
    }

    fn verify_sync(&self, proof: &str) -> Result<VerifiedClaims, AipipeError> {
        let compact = Compact::parse(proof).map_err(invalid)?;
        if compact.header.alg != "RS256" {
            return Err(invalid(format!("unsupported algorithm {}", compact.header.alg)));
        }
        let kid = compact
            .header
            .kid
            .as_deref()
            .ok_or_else(|| invalid("ID token has no key id"))?;
        let key = self
            .keys
            .get(kid)
            .ok_or_else(|| invalid(format!("unknown signing key {kid}")))?;

        RsaPublicKeyComponents {
            n: key.n.as_slice(),
            e: key.e.as_slice(),
        }
        .verify(
            &RSA_PKCS1_2048_8192_SHA256,
            compact.signing_input.as_bytes(),
            &compact.signature,
        )
        .map_err(|_| invalid("ID token signature verification failed"))?;

        let claims: Map<String, Value> = compact.claims().map_err(invalid)?;

        let issuer = claims.get("iss").and_then(Value::as_str).unwrap_or_default();
        if !self.issuers.iter().any(|i| i == issuer) {
            return Err(invalid(format!("unexpected issuer {issuer:?}")));
        }

        let audience_ok = match claims.get("aud") {
            Some(Value::String(aud)) => *aud == self.client_id,
            Some(Value::Array(auds)) => auds.iter().any(|a| a.as_str() == Some(&self.client_id)),
            _ => false,
        };
        if !audience_ok {
            return Err(invalid("ID token was issued for another client"));
        }

        match claims.get("exp").and_then(Value::as_i64) {
            Some(exp) if exp > Utc::now().timestamp() => {}
            Some(_) => return Err(invalid("ID token has expired")),
            None => return Err(invalid("ID token has no expiry")),
        }

        let verified = match claims.get("email_verified") {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s == "true",
            _ => false,
        };
        if !verified {
            return Err(invalid("Invalid Google credentials"));
        }

        let email = claims
            .get("email")
            .and_then(Value::as_str)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| invalid("ID token has no email"))?;

        debug!(email, kid, "identity proof verified");
        Ok(VerifiedClaims {
            email: Identity::new(email),
            claims,
        })
    }
}

#[async_trait]
impl IdentityProof for GoogleIdTokenVerifier {
    async fn verify(&self, proof: &str) -> Result<VerifiedClaims, AipipeError> {
        self.verify_sync(proof)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aipipe_config::model::JwkConfig;
    use ring::rand::SystemRandom;
    use ring::signature::{RsaKeyPair, RSA_PKCS1_SHA256};
    use serde_json::json;

    use crate::jwt::{encode_bytes, encode_json};

    const CLIENT_ID: &str = "test-client.apps.googleusercontent.com";

    fn key_pair() -> RsaKeyPair {
        RsaKeyPair::from_pkcs8(include_bytes!("../testdata/rsa-2048.pk8")).unwrap()
    }

    fn verifier(pair: &RsaKeyPair) -> GoogleIdTokenVerifier {
        let public = RsaPublicKeyComponents::<Vec<u8>>::from(pair.public());
        let trim = |bytes: &[u8]| -> Vec<u8> { bytes.iter().copied().skip_while(|b| *b == 0).collect() };
        GoogleIdTokenVerifier::new(&GoogleConfig {
            client_id: CLIENT_ID.into(),
            issuers: vec!["https://accounts.google.com".into()],
            keys: vec![JwkConfig {
                kid: "test-kid".into(),
                n: encode_bytes(&trim(&public.n)),
                e: encode_bytes(&trim(&public.e)),
            }],
        })
        .unwrap()
    }

    fn sign(pair: &RsaKeyPair, kid: &str, claims: Value) -> String {
        let header = encode_json(&json!({"alg": "RS256", "kid": kid, "typ": "JWT"})).unwrap();
        let payload = encode_json(&claims).unwrap();
        let input = format!("{header}.{payload}");
        let mut signature = vec![0u8; pair.public().modulus_len()];
        pair.sign(&RSA_PKCS1_SHA256, &SystemRandom::new(), input.as_bytes(), &mut signature)
            .unwrap();
        format!("{input}.{}", encode_bytes(&signature))
    }

    fn claims(overrides: Value) -> Value {
        let mut base = json!({
            "iss": "https://accounts.google.com",
            "aud": CLIENT_ID,
            "exp": Utc::now().timestamp() + 600,
            "email": "user@example.com",
            "email_verified": true,
            "name": "Test User"
        });
        if let (Some(base), Some(extra)) = (base.as_object_mut(), overrides.as_object()) {
            for (k, v) in extra {
                base.insert(k.clone(), v.clone());
            }
        }
        base
    }

    #[tokio::test]
    async fn valid_token_yields_email_and_claims() {
        let pair = key_pair();
        let token = sign(&pair, "test-kid", claims(json!({})));
        let verified = verifier(&pair).verify(&token).await.unwrap();
        assert_eq!(verified.email.as_str(), "user@example.com");
        assert_eq!(verified.claims["name"], "Test User");
    }

    #[tokio::test]
    async fn unverified_email_rejected() {
        let pair = key_pair();
        let token = sign(&pair, "test-kid", claims(json!({"email_verified": false})));
        let err = verifier(&pair).verify(&token).await.unwrap_err();
        assert!(err.to_string().contains("Invalid Google credentials"));
        assert_eq!(err.status_code(), 401);
    }

    #[tokio::test]
    async fn wrong_audience_rejected() {
        let pair = key_pair();
        let token = sign(&pair, "test-kid", claims(json!({"aud": "someone-else"})));
        assert!(verifier(&pair).verify(&token).await.is_err());
    }

    #[tokio::test]
    async fn wrong_issuer_rejected() {
        let pair = key_pair();
        let token = sign(&pair, "test-kid", claims(json!({"iss": "https://evil.example"})));
        assert!(verifier(&pair).verify(&token).await.is_err());
    }

    #[tokio::test]
    async fn expired_token_rejected() {
        let pair = key_pair();
        let token = sign(&pair, "test-kid", claims(json!({"exp": 1})));
        let err = verifier(&pair).verify(&token).await.unwrap_err();
        assert!(err.to_string().contains("expired"));
    }

    #[tokio::test]
    async fn unknown_kid_rejected() {
        let pair = key_pair();
        let token = sign(&pair, "rotated-away", claims(json!({})));
        let err = verifier(&pair).verify(&token).await.unwrap_err();
        assert!(err.to_string().contains("unknown signing key"));
    }

    #[tokio::test]
    async fn tampered_claims_rejected() {
        let pair = key_pair();
        let token = sign(&pair, "test-kid", claims(json!({})));
        let mut parts: Vec<&str> = token.split('.').collect();
        let forged = encode_json(&claims(json!({"email": "admin@example.com"}))).unwrap();
        parts[1] = &forged;
        let err = verifier(&pair).verify(&parts.join(".")).await.unwrap_err();
        assert!(err.to_string().contains("signature"));
    }

    #[test]
    fn malformed_key_is_a_config_error() {
        let result = GoogleIdTokenVerifier::new(&GoogleConfig {
            client_id: CLIENT_ID.into(),
            issuers: vec![],
            keys: vec![JwkConfig {
                kid: "bad".into(),
                n: "***".into(),
                e: "AQAB".into(),
            }],
        });
        assert!(matches!(result, Err(AipipeError::Config(_))));
    }
}
