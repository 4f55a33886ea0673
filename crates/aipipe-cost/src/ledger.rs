// SPDX-FileCopyrightText: 2026 Aipipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cost ledger persisting per-identity daily spend to SQLite.
//!
//! One row per `(email, date)` in the `cost` table. Increments are a single
//! upsert statement on the tokio-rusqlite writer thread, so concurrent charges
//! for the same identity and day never lose updates, and other processes
//! sharing the file are serialized by SQLite itself.

use aipipe_core::{AipipeError, Identity};
use aipipe_storage::{map_tr_err, Database};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

const DAY_FORMAT: &str = "%Y-%m-%d";

/// One ledger row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostRecord {
    pub email: String,
    pub date: NaiveDate,
    pub cost: f64,
}

/// Spend on one day within a usage report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyCost {
    pub date: NaiveDate,
    pub cost: f64,
}

/// Spend over a rolling window, with a per-day breakdown in ascending date order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageReport {
    pub email: String,
    pub days: u32,
    pub cost: f64,
    pub usage: Vec<DailyCost>,
}

/// The inclusive `[start, end]` day range covered by a window of `days` ending at `now`.
pub fn window(days: u32, now: DateTime<Utc>) -> (NaiveDate, NaiveDate) {
    let start = now - Duration::days(i64::from(days));
    (start.date_naive(), now.date_naive())
}

fn day_key(date: NaiveDate) -> String {
    date.format(DAY_FORMAT).to_string()
}

fn parse_day(idx: usize, raw: String) -> Result<NaiveDate, rusqlite::Error> {
    NaiveDate::parse_from_str(&raw, DAY_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Persistent cost ledger backed by SQLite.
#[derive(Clone)]
pub struct CostLedger {
    db: Database,
}

impl CostLedger {
    /// Create a ledger over an opened (and migrated) database.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Add `cost` to today's (UTC) record for `identity`.
    pub async fn add(&self, identity: &Identity, cost: f64) -> Result<(), AipipeError> {
        self.add_on(identity, Utc::now().date_naive(), cost).await
    }

    /// Add `cost` to the record for `identity` on `date`, creating it if absent.
    pub async fn add_on(
        &self,
        identity: &Identity,
        date: NaiveDate,
        cost: f64,
    ) -> Result<(), AipipeError> {
        let email = identity.as_str().to_string();
        let day = day_key(date);

        self.db
            .connection()
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute(
                    "INSERT INTO cost (email, date, cost) VALUES (?1, ?2, ?3) \
                     ON CONFLICT(email, date) DO UPDATE SET cost = cost + excluded.cost",
                    rusqlite::params![email, day, cost],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;

        info!(email = %identity, %date, cost_usd = cost, "cost recorded");
        Ok(())
    }

    /// Total spend for `identity` over the last `days` days.
    pub async fn cost_since(&self, identity: &Identity, days: u32) -> Result<f64, AipipeError> {
        self.cost_since_at(identity, days, Utc::now()).await
    }

    /// [`cost_since`](Self::cost_since) evaluated at an explicit instant.
    pub async fn cost_since_at(
        &self,
        identity: &Identity,
        days: u32,
        now: DateTime<Utc>,
    ) -> Result<f64, AipipeError> {
        let breakdown = self.daily(identity, window(days, now)).await?;
        Ok(breakdown.iter().map(|d| d.cost).sum())
    }

    /// Usage report for `identity` over the last `days` days.
    pub async fn usage(&self, identity: &Identity, days: u32) -> Result<UsageReport, AipipeError> {
        self.usage_at(identity, days, Utc::now()).await
    }

    /// [`usage`](Self::usage) evaluated at an explicit instant.
    pub async fn usage_at(
        &self,
        identity: &Identity,
        days: u32,
        now: DateTime<Utc>,
    ) -> Result<UsageReport, AipipeError> {
        let usage = self.daily(identity, window(days, now)).await?;
        Ok(UsageReport {
            email: identity.as_str().to_string(),
            days,
            cost: usage.iter().map(|d| d.cost).sum(),
            usage,
        })
    }

    async fn daily(
        &self,
        identity: &Identity,
        (start, end): (NaiveDate, NaiveDate),
    ) -> Result<Vec<DailyCost>, AipipeError> {
        let email = identity.as_str().to_string();
        let (start, end) = (day_key(start), day_key(end));

        self.db
            .connection()
            .call(move |conn| -> Result<Vec<DailyCost>, rusqlite::Error> {
                let mut stmt = conn.prepare(
                    "SELECT date, cost FROM cost \
                     WHERE email = ?1 AND date BETWEEN ?2 AND ?3 ORDER BY date ASC",
                )?;
                let rows = stmt.query_map(rusqlite::params![email, start, end], |row| {
                    Ok(DailyCost {
                        date: parse_day(0, row.get(0)?)?,
                        cost: row.get(1)?,
                    })
                })?;
                rows.collect::<Result<Vec<_>, _>>()
            })
            .await
            .map_err(map_tr_err)
    }

    /// Overwrite the record for `identity` on `date` with `cost`.
    pub async fn set_cost(
        &self,
        identity: &Identity,
        date: NaiveDate,
        cost: f64,
    ) -> Result<(), AipipeError> {
        let email = identity.as_str().to_string();
        let day = day_key(date);

        self.db
            .connection()
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute(
                    "INSERT INTO cost (email, date, cost) VALUES (?1, ?2, ?3) \
                     ON CONFLICT(email, date) DO UPDATE SET cost = excluded.cost",
                    rusqlite::params![email, day, cost],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;

        info!(email = %identity, %date, cost_usd = cost, "cost overwritten");
        Ok(())
    }

    /// Every ledger row, newest day first, then by email.
    pub async fn all_usage(&self) -> Result<Vec<CostRecord>, AipipeError> {
        self.db
            .connection()
            .call(|conn| -> Result<Vec<CostRecord>, rusqlite::Error> {
                let mut stmt =
                    conn.prepare("SELECT email, date, cost FROM cost ORDER BY date DESC, email ASC")?;
                let rows = stmt.query_map([], |row| {
                    Ok(CostRecord {
                        email: row.get(0)?,
                        date: parse_day(1, row.get(1)?)?,
                        cost: row.get(2)?,
                    })
                })?;
                rows.collect::<Result<Vec<_>, _>>()
            })
            .await
            .map_err(map_tr_err)
    }
}
