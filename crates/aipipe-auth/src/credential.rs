// SPDX-FileCopyrightText: 2026 Aipipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HS256 access credentials.
//!
//! A credential is a compact JWS over `{email, salt?, iat?, exp?}` signed with
//! the server secret. When the configuration holds an invalidation tag (salt)
//! for an identity, only credentials embedding that exact tag are accepted;
//! changing the tag revokes every credential issued before the change.

use std::collections::BTreeMap;
use std::fmt;

use aipipe_core::{AipipeError, AuthFailure, Identity};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::debug;

use crate::jwt::{encode_bytes, encode_json, Compact, Header};

type HmacSha256 = Hmac<Sha256>;

/// Payload of an access credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialClaims {
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

/// Verifies and issues access credentials.
#[derive(Clone)]
pub struct CredentialVerifier {
    mac: HmacSha256,
    salts: BTreeMap<String, String>,
}

impl fmt::Debug for CredentialVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialVerifier")
            .field("secret", &"[REDACTED]")
            .field("salts", &self.salts.len())
            .finish()
    }
}

impl CredentialVerifier {
    /// Build a verifier. An empty secret is a configuration error.
    pub fn new(secret: &str, salts: BTreeMap<String, String>) -> Result<Self, AipipeError> {
        if secret.is_empty() {
            return Err(AipipeError::Config(
                "auth.secret (or AIPIPE_SECRET) must be set to sign credentials".into(),
            ));
        }
        let mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| AipipeError::Config(format!("auth.secret is unusable: {e}")))?;
        Ok(Self { mac, salts })
    }

    /// Verify `token` and return the identity it names.
    pub fn verify(&self, token: &str) -> Result<Identity, AuthFailure> {
        self.verify_claims(token).map(|claims| Identity::new(claims.email))
    }

    /// Verify `token` and return its full payload.
    pub fn verify_claims(&self, token: &str) -> Result<CredentialClaims, AuthFailure> {
        let compact = Compact::parse(token).map_err(AuthFailure::Invalid)?;
        if compact.header.alg != "HS256" {
            return Err(AuthFailure::Invalid(format!(
                "unsupported algorithm {}",
                compact.header.alg
            )));
        }

        let mut mac = self.mac.clone();
        mac.update(compact.signing_input.as_bytes());
        mac.verify_slice(&compact.signature)
            .map_err(|_| AuthFailure::Invalid("signature verification failed".into()))?;

        let claims: CredentialClaims = compact.claims().map_err(AuthFailure::Invalid)?;
        if claims.email.is_empty() {
            return Err(AuthFailure::Invalid("missing email claim".into()));
        }
        if let Some(exp) = claims.exp
            && exp <= Utc::now().timestamp()
        {
            return Err(AuthFailure::Invalid("credential has expired".into()));
        }

        if let Some(expected) = self.salts.get(&claims.email)
            && claims.salt.as_deref() != Some(expected.as_str())
        {
            debug!(email = %claims.email, "credential carries a stale invalidation tag");
            return Err(AuthFailure::Revoked);
        }

        Ok(claims)
    }

    /// Issue a credential for `identity`, embedding its current invalidation tag.
    pub fn issue(&self, identity: &Identity) -> Result<String, AipipeError> {
        self.sign(&CredentialClaims {
            email: identity.as_str().to_string(),
            salt: self.salts.get(identity.as_str()).cloned(),
            iat: Some(Utc::now().timestamp()),
            exp: None,
        })
    }

    /// Sign arbitrary claims. Used by `issue` and by tests that need
    /// expired or stale credentials.
    pub fn sign(&self, claims: &CredentialClaims) -> Result<String, AipipeError> {
        let header = Header {
            alg: "HS256".into(),
            typ: Some("JWT".into()),
            kid: None,
        };
        let to_internal = |e: serde_json::Error| AipipeError::Internal(e.to_string());
        let signing_input = format!(
            "{}.{}",
            encode_json(&header).map_err(to_internal)?,
            encode_json(claims).map_err(to_internal)?
        );

        let mut mac = self.mac.clone();
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();
        Ok(format!("{signing_input}.{}", encode_bytes(&signature)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn verifier(salts: &[(&str, &str)]) -> CredentialVerifier {
        CredentialVerifier::new(
            "test-secret",
            salts
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn issued_credential_verifies() {
        let v = verifier(&[]);
        let token = v.issue(&Identity::new("test@example.com")).unwrap();
        assert_eq!(v.verify(&token).unwrap().as_str(), "test@example.com");
    }

    #[test]
    fn garbage_is_invalid() {
        let v = verifier(&[]);
        assert!(matches!(v.verify("invalid-token"), Err(AuthFailure::Invalid(_))));
    }

    #[test]
    fn other_secret_is_invalid() {
        let token = CredentialVerifier::new("another-secret", BTreeMap::new())
            .unwrap()
            .issue(&Identity::new("a@example.com"))
            .unwrap();
        assert!(matches!(verifier(&[]).verify(&token), Err(AuthFailure::Invalid(_))));
    }

    #[test]
    fn expired_credential_is_invalid() {
        let v = verifier(&[]);
        let token = v
            .sign(&CredentialClaims {
                email: "a@example.com".into(),
                salt: None,
                iat: None,
                exp: Some(Utc::now().timestamp() - 60),
            })
            .unwrap();
        let err = v.verify(&token).unwrap_err();
        assert_eq!(err, AuthFailure::Invalid("credential has expired".into()));
    }

    #[test]
    fn tag_change_revokes_old_credentials() {
        let before = verifier(&[("alice@example.com", "v1")]);
        let old = before.issue(&Identity::new("alice@example.com")).unwrap();

        let after = verifier(&[("alice@example.com", "v2")]);
        assert_eq!(after.verify(&old).unwrap_err(), AuthFailure::Revoked);

        let fresh = after.issue(&Identity::new("alice@example.com")).unwrap();
        assert!(after.verify(&fresh).is_ok());
    }

    #[test]
    fn missing_tag_is_revoked_when_one_is_configured() {
        let untagged = verifier(&[]).issue(&Identity::new("alice@example.com")).unwrap();
        let tagged = verifier(&[("alice@example.com", "v1")]);
        assert_eq!(tagged.verify(&untagged).unwrap_err(), AuthFailure::Revoked);
    }

    #[test]
    fn any_tag_accepted_when_none_configured() {
        let v = verifier(&[]);
        let token = v
            .sign(&CredentialClaims {
                email: "bob@example.com".into(),
                salt: Some("whatever".into()),
                iat: None,
                exp: None,
            })
            .unwrap();
        assert!(v.verify(&token).is_ok());
    }

    #[test]
    fn alg_none_is_rejected() {
        let v = verifier(&[]);
        let header = encode_json(&serde_json::json!({"alg": "none"})).unwrap();
        let payload = encode_json(&serde_json::json!({"email": "a@example.com"})).unwrap();
        let token = format!("{header}.{payload}.");
        assert!(matches!(v.verify(&token), Err(AuthFailure::Invalid(_))));
    }

    #[test]
    fn empty_secret_rejected() {
        assert!(matches!(
            CredentialVerifier::new("", BTreeMap::new()),
            Err(AipipeError::Config(_))
        ));
    }

    #[test]
    fn debug_hides_secret() {
        let rendered = format!("{:?}", verifier(&[]));
        assert!(!rendered.contains("test-secret"));
    }

    proptest! {
        #[test]
        fn tampered_payload_never_verifies(email in "[a-z]{1,12}@[a-z]{1,8}\\.com") {
            let v = verifier(&[]);
            let token = v.issue(&Identity::new(email)).unwrap();
            let (head, rest) = token.split_once('.').unwrap();
            let (_, sig) = rest.split_once('.').unwrap();
            let forged = encode_json(&serde_json::json!({"email": "admin@example.com"})).unwrap();
            let tampered = format!("{head}.{forged}.{sig}");
            prop_assert!(v.verify(&tampered).is_err());
        }
    }
}
