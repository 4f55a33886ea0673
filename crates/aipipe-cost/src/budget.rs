// SPDX-FileCopyrightText: 2026 Aipipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Budget policy resolution.
//!
//! Each identity resolves to exactly one `{limit, days}` policy from the static
//! budget table: the exact identity, then `@domain`, then `*`, and finally a
//! zero budget. The first match wins; policies are never merged.

use std::collections::BTreeMap;

use aipipe_core::{AipipeError, BudgetPolicy, Identity};
use tracing::warn;

/// Key matching every identity.
pub const WILDCARD: &str = "*";

/// Read-only lookup from identity to budget policy.
#[derive(Debug, Clone, Default)]
pub struct BudgetResolver {
    table: BTreeMap<String, BudgetPolicy>,
}

impl BudgetResolver {
    pub fn new(table: BTreeMap<String, BudgetPolicy>) -> Self {
        Self { table }
    }

    /// Resolve the policy that applies to `identity`.
    pub fn resolve(&self, identity: &Identity) -> BudgetPolicy {
        let by_domain = || {
            identity
                .domain()
                .and_then(|domain| self.table.get(&format!("@{domain}")))
        };
        self.table
            .get(identity.as_str())
            .or_else(by_domain)
            .or_else(|| self.table.get(WILDCARD))
            .copied()
            .unwrap_or(BudgetPolicy::ZERO)
    }

    /// Reject when `consumed` has reached the policy limit.
    ///
    /// Emits `tracing::warn` at 80% of a non-zero limit.
    pub fn check(
        &self,
        identity: &Identity,
        policy: BudgetPolicy,
        consumed: f64,
    ) -> Result<(), AipipeError> {
        if consumed >= policy.limit {
            return Err(AipipeError::BudgetExceeded {
                consumed,
                limit: policy.limit,
                days: policy.days,
            });
        }
        if policy.limit > 0.0 && consumed >= policy.limit * 0.8 {
            warn!(
                email = %identity,
                consumed,
                limit = policy.limit,
                days = policy.days,
                "approaching budget limit (80%+)"
            );
        }
        Ok(())
    }
}
