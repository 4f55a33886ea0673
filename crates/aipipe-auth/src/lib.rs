// SPDX-FileCopyrightText: 2026 Aipipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Authentication for the aipipe gateway.
//!
//! - [`credential`]: HS256 access credentials signed with the server secret,
//!   with per-identity invalidation tags.
//! - [`google`]: the identity-proof exchange that turns a verified Google ID
//!   token into an access credential.

pub mod credential;
pub mod google;
mod jwt;

pub use credential::{CredentialClaims, CredentialVerifier};
pub use google::{GoogleIdTokenVerifier, IdentityProof, VerifiedClaims};
