// SPDX-FileCopyrightText: 2026 Aipipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as valid bind addresses, well-formed budget keys, and non-negative limits.

use crate::diagnostic::ConfigError;
use crate::model::AipipeConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &AipipeConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    let host = config.server.host.trim();
    if host.is_empty() {
        fail("server.host must not be empty".to_string());
    } else {
        let is_valid_ip = host.parse::<std::net::IpAddr>().is_ok();
        let is_valid_hostname = host
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == ':');
        if !is_valid_ip && !is_valid_hostname {
            fail(format!(
                "server.host `{host}` is not a valid IP address or hostname"
            ));
        }
    }

    if !LOG_LEVELS.contains(&config.server.log_level.as_str()) {
        fail(format!(
            "server.log_level must be one of {}, got `{}`",
            LOG_LEVELS.join(", "),
            config.server.log_level
        ));
    }

    if config.server.request_timeout_secs == 0 {
        fail("server.request_timeout_secs must be at least 1".to_string());
    }

    if config.storage.database_path.trim().is_empty() {
        fail("storage.database_path must not be empty".to_string());
    }

    if let Some(secret) = &config.auth.secret
        && secret.is_empty()
    {
        fail("auth.secret must not be empty when set".to_string());
    }

    for (i, admin) in config.auth.admins.iter().enumerate() {
        if admin.trim().is_empty() {
            fail(format!("auth.admins[{i}] must not be empty"));
        }
    }

    if let Some(google) = &config.auth.google {
        if google.client_id.trim().is_empty() {
            fail("auth.google.client_id must not be empty".to_string());
        }
        if google.keys.is_empty() {
            fail("auth.google.keys must list at least one signing key".to_string());
        }
    }

    let mut budget_errors = Vec::new();
    for (key, policy) in &config.budget {
        let mut budget_error = |message: String| {
            budget_errors.push(ConfigError::InvalidBudget {
                key: key.clone(),
                message,
            })
        };
        if !is_budget_key(key) {
            budget_error("must be an identity, `@domain`, or `*`".to_string());
        }
        if !policy.limit.is_finite() || policy.limit < 0.0 {
            budget_error(format!("limit must be non-negative, got {}", policy.limit));
        }
        if policy.days < 1 {
            budget_error("days must be at least 1".to_string());
        }
    }

    for (name, provider) in [
        ("openai", &config.providers.openai),
        ("openrouter", &config.providers.openrouter),
    ] {
        for (field, url) in [
            ("base_url", &provider.base_url),
            ("models_url", &provider.models_url),
        ] {
            if let Some(url) = url
                && !(url.starts_with("http://") || url.starts_with("https://"))
            {
                fail(format!(
                    "providers.{name}.{field} `{url}` must be an http(s) URL"
                ));
            }
        }
    }

    errors.extend(budget_errors);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn is_budget_key(key: &str) -> bool {
    if key == "*" {
        return true;
    }
    if key.is_empty() || key.chars().any(char::is_whitespace) {
        return false;
    }
    match key.strip_prefix('@') {
        Some(domain) => !domain.is_empty() && !domain.contains('@'),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aipipe_core::BudgetPolicy;

    fn has_error(errors: &[ConfigError], needle: &str) -> bool {
        errors.iter().any(|e| e.to_string().contains(needle))
    }

    #[test]
    fn default_config_validates() {
        let config = AipipeConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn empty_database_path_fails_validation() {
        let mut config = AipipeConfig::default();
        config.storage.database_path = "".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "database_path"));
    }

    #[test]
    fn negative_limit_and_zero_days_are_both_reported() {
        let mut config = AipipeConfig::default();
        config.budget.insert(
            "*".into(),
            BudgetPolicy {
                limit: -1.0,
                days: 0,
            },
        );
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(
            errors
                .iter()
                .all(|e| matches!(e, ConfigError::InvalidBudget { key, .. } if key == "*"))
        );
        assert!(has_error(&errors, "non-negative"));
        assert!(has_error(&errors, "at least 1"));
    }

    #[test]
    fn malformed_budget_keys_rejected() {
        for key in ["@", "", "two words", "@a@b"] {
            assert!(!is_budget_key(key), "{key:?} should be rejected");
        }
        for key in ["*", "@example.com", "user@example.com", "service-account"] {
            assert!(is_budget_key(key), "{key:?} should be accepted");
        }
    }

    #[test]
    fn unknown_log_level_fails_validation() {
        let mut config = AipipeConfig::default();
        config.server.log_level = "verbose".into();
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "log_level"));
    }

    #[test]
    fn non_http_base_url_fails_validation() {
        let mut config = AipipeConfig::default();
        config.providers.openai.base_url = Some("ftp://example.com".into());
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "providers.openai.base_url"));
    }

    #[test]
    fn empty_secret_fails_validation() {
        let mut config = AipipeConfig::default();
        config.auth.secret = Some(String::new());
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "auth.secret"));
    }
}
