// SPDX-FileCopyrightText: 2026 Aipipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metered HTTP gateway in front of LLM providers.
//!
//! Requests to `/{provider}/{path}` are authenticated, checked against the
//! caller's rolling budget, forwarded to the provider with the gateway's own
//! credential, and charged from the `{model, usage}` in the response. JSON
//! responses are charged before they are returned; event streams are charged
//! when they end.

pub mod admin;
pub mod auth;
pub mod cors;
pub mod error;
pub mod handlers;
pub mod proxy;
pub mod server;
pub mod sse;

pub use error::{ApiError, ErrorResponse};
pub use server::{router, start_server, GatewayState, ServerConfig};
pub use sse::{Capture, CostTap};
