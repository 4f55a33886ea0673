// SPDX-FileCopyrightText: 2026 Aipipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Value types shared across the gateway pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An authenticated caller, usually an email address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(pub String);

impl Identity {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The part after the last `@`, if any.
    pub fn domain(&self) -> Option<&str> {
        self.0.rsplit_once('@').map(|(_, domain)| domain)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Spending quota over a rolling window of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BudgetPolicy {
    /// Maximum spend in USD within the window.
    pub limit: f64,

    /// Window length in days.
    #[serde(default = "default_days")]
    pub days: u32,
}

impl BudgetPolicy {
    /// Applied when no budget key matches an identity: nothing is allowed.
    pub const ZERO: Self = Self {
        limit: 0.0,
        days: 1,
    };
}

fn default_days() -> u32 {
    1
}

/// Token counters normalized from either upstream usage shape.
///
/// Chat-completion style responses report `prompt_tokens` / `completion_tokens`,
/// responses-API style ones report `input_tokens` / `output_tokens`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageCounters {
    pub prompt_units: u64,
    pub completion_units: u64,
}

impl UsageCounters {
    /// Normalize an upstream `usage` value.
    ///
    /// Returns `None` for `null`, non-objects, and objects carrying neither
    /// counter, so callers can treat those as "usage not seen yet".
    pub fn from_json(value: &Value) -> Option<Self> {
        let usage = value.as_object()?;
        let prompt = counter(usage, "prompt_tokens").or_else(|| counter(usage, "input_tokens"));
        let completion =
            counter(usage, "completion_tokens").or_else(|| counter(usage, "output_tokens"));
        if prompt.is_none() && completion.is_none() {
            return None;
        }
        Some(Self {
            prompt_units: prompt.unwrap_or(0),
            completion_units: completion.unwrap_or(0),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.prompt_units == 0 && self.completion_units == 0
    }
}

fn counter(usage: &Map<String, Value>, key: &str) -> Option<u64> {
    let value = usage.get(key)?;
    value
        .as_u64()
        .or_else(|| value.as_f64().filter(|v| *v >= 0.0).map(|v| v as u64))
}
