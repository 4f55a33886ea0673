// SPDX-FileCopyrightText: 2026 Aipipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the aipipe cost ledger.
//!
//! Provides WAL-mode SQLite storage with embedded migrations and a
//! single-writer concurrency model via `tokio-rusqlite`. Query code lives with
//! its owner (the ledger in `aipipe-cost`) and goes through
//! [`Database::connection`].

pub mod database;
pub mod migrations;

pub use database::{map_tr_err, Database};
