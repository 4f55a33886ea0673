// SPDX-FileCopyrightText: 2026 Aipipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cost accounting for the aipipe gateway.
//!
//! This crate provides:
//! - **Cost ledger**: durable per-identity, per-day spend with atomic increments
//! - **Budget resolver**: identity → `{limit, days}` lookup with exact, domain,
//!   and wildcard precedence, plus the over-budget check

pub mod budget;
pub mod ledger;

pub use budget::BudgetResolver;
pub use ledger::{CostLedger, CostRecord, DailyCost, UsageReport};
