// SPDX-FileCopyrightText: 2026 Aipipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./aipipe.toml` > `~/.config/aipipe/aipipe.toml` > `/etc/aipipe/aipipe.toml`
//! with environment variable overrides via the `AIPIPE_` prefix and the
//! conventional provider key variables.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use tracing::debug;

use crate::model::AipipeConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/aipipe/aipipe.toml` (system-wide)
/// 3. `~/.config/aipipe/aipipe.toml` (user XDG config)
/// 4. `./aipipe.toml` (local directory)
/// 5. `OPENAI_API_KEY` / `OPENROUTER_API_KEY`
/// 6. `AIPIPE_*` environment variables
pub fn load_config() -> Result<AipipeConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no files, no env).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<AipipeConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(AipipeConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<AipipeConfig, figment::Error> {
    debug!(path = %path.display(), present = path.is_file(), "explicit config file");
    Figment::new()
        .merge(Serialized::defaults(AipipeConfig::default()))
        .merge(Toml::file(path))
        .merge(provider_key_env())
        .merge(env_provider())
        .extract()
}

/// Build the Figment used for config loading, before extraction.
pub fn build_figment() -> Figment {
    let mut figment = Figment::new().merge(Serialized::defaults(AipipeConfig::default()));
    for path in config_files() {
        debug!(path = %path.display(), present = path.is_file(), "config file layer");
        figment = figment.merge(Toml::file(path));
    }
    figment.merge(provider_key_env()).merge(env_provider())
}

/// Config file layers, lowest precedence first.
fn config_files() -> Vec<PathBuf> {
    let mut files = vec![PathBuf::from("/etc/aipipe/aipipe.toml")];
    if let Some(dir) = dirs::config_dir() {
        files.push(dir.join("aipipe/aipipe.toml"));
    }
    files.push(PathBuf::from("aipipe.toml"));
    files
}

/// `AIPIPE_*` variables, mapped section by section.
///
/// Uses `Env::map()` rather than `Env::split("_")` because key names contain
/// underscores: `AIPIPE_STORAGE_DATABASE_PATH` must become
/// `storage.database_path`, not `storage.database.path`. `AIPIPE_SECRET` is the
/// conventional spelling of `auth.secret`.
fn env_provider() -> Env {
    Env::prefixed("AIPIPE_").map(|key| {
        let key_str = key.as_str().to_ascii_lowercase();
        if key_str == "secret" {
            return "auth.secret".into();
        }
        key_str
            .replacen("server_", "server.", 1)
            .replacen("storage_", "storage.", 1)
            .replacen("auth_", "auth.", 1)
            .replacen("providers_openai_", "providers.openai.", 1)
            .replacen("providers_openrouter_", "providers.openrouter.", 1)
            .replacen("prometheus_", "prometheus.", 1)
            .into()
    })
}

/// The unprefixed API key variables most deployments already export.
fn provider_key_env() -> Env {
    Env::raw()
        .only(&["OPENAI_API_KEY", "OPENROUTER_API_KEY"])
        .map(|key| {
            if key.as_str().eq_ignore_ascii_case("OPENAI_API_KEY") {
                "providers.openai.api_key".into()
            } else {
                "providers.openrouter.api_key".into()
            }
        })
}
