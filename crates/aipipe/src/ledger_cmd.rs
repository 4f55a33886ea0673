// SPDX-FileCopyrightText: 2026 Aipipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Offline ledger and credential commands: `issue-token`, `usage`, `set-cost`.

use aipipe_config::AipipeConfig;
use aipipe_core::{AipipeError, Identity};
use aipipe_cost::{BudgetResolver, CostLedger};
use chrono::{NaiveDate, Utc};
use serde_json::json;

use crate::serve::{credential_verifier, open_database};

fn print_json(value: &serde_json::Value) -> Result<(), AipipeError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| AipipeError::Internal(format!("failed to encode output: {e}")))?;
    println!("{text}");
    Ok(())
}

/// Print a credential for `email`.
pub fn issue_token(config: &AipipeConfig, email: &str) -> Result<(), AipipeError> {
    let token = credential_verifier(config)?.issue(&Identity::new(email))?;
    println!("{token}");
    Ok(())
}

/// Print `email`'s usage over `days` (or its budget window), or every ledger row.
pub async fn usage(
    config: &AipipeConfig,
    email: Option<&str>,
    days: Option<u32>,
) -> Result<(), AipipeError> {
    let db = open_database(config).await?;
    let ledger = CostLedger::new(db.clone());

    let output = match email {
        Some(email) => {
            let identity = Identity::new(email);
            let policy = BudgetResolver::new(config.budget.clone()).resolve(&identity);
            let report = ledger.usage(&identity, days.unwrap_or(policy.days)).await?;
            json!({
                "email": report.email,
                "days": report.days,
                "cost": report.cost,
                "usage": report.usage,
                "limit": policy.limit,
            })
        }
        None => {
            let records = ledger.all_usage().await?;
            json!(records)
        }
    };

    db.close().await?;
    print_json(&output)
}

/// Overwrite `email`'s cost on `date` (default today, UTC).
pub async fn set_cost(
    config: &AipipeConfig,
    email: &str,
    cost: f64,
    date: Option<NaiveDate>,
) -> Result<(), AipipeError> {
    if !cost.is_finite() {
        return Err(AipipeError::Validation(format!("cost must be a finite number, got {cost}")));
    }
    let db = open_database(config).await?;
    let date = date.unwrap_or_else(|| Utc::now().date_naive());
    CostLedger::new(db.clone())
        .set_cost(&Identity::new(email), date, cost)
        .await?;
    db.close().await?;
    print_json(&json!({ "email": email, "date": date, "cost": cost }))
}
