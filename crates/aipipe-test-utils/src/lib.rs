// SPDX-FileCopyrightText: 2026 Aipipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for aipipe integration tests.
//!
//! Provides a gateway wired to a temp SQLite ledger and a wiremock upstream,
//! so the full request pipeline runs without external services.
//!
//! # Components
//!
//! - [`TestHarness`] - gateway, ledger and mock upstream
//! - [`StaticIdentityProof`] - identity-proof verifier with canned answers
//! - [`TricklingUpstream`] - event stream that pauses between chunks

pub mod harness;
pub mod mock_proof;
pub mod trickle;

pub use harness::{TestHarness, TestHarnessBuilder, TestResponse, TEST_SECRET};
pub use mock_proof::StaticIdentityProof;
pub use trickle::TricklingUpstream;

pub use axum::http::{Method, StatusCode};
