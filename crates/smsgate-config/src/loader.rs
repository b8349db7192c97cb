// SPDX-FileCopyrightText: 2026 SmsGate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports the XDG hierarchy: `./smsgate.toml` > `~/.config/smsgate/smsgate.toml`
//! > `/etc/smsgate/smsgate.toml`, with environment variable overrides via the
//! `SMSGATE_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::SmsGateConfig;

/// Config sections addressable from the environment. Longer names that share
/// a suffix with a shorter one (`mock_provider` / `provider`) come first.
const ENV_SECTIONS: &[&str] = &[
    "mock_provider",
    "prometheus",
    "provider",
    "gateway",
    "storage",
    "billing",
    "broker",
    "app",
];

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/smsgate/smsgate.toml` (system-wide)
/// 3. `~/.config/smsgate/smsgate.toml` (user XDG config)
/// 4. `./smsgate.toml` (local directory)
/// 5. `SMSGATE_*` environment variables
pub fn load_config() -> Result<SmsGateConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<SmsGateConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(SmsGateConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<SmsGateConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(SmsGateConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Candidate config files, lowest precedence first.
pub fn config_file_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("/etc/smsgate/smsgate.toml")];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("smsgate/smsgate.toml"));
    }
    paths.push(PathBuf::from("smsgate.toml"));
    paths
}

/// Build the Figment used internally for config loading.
///
/// Returns the Figment before extraction so callers can inspect metadata.
pub fn build_figment() -> Figment {
    config_file_paths()
        .into_iter()
        .fold(
            Figment::new().merge(Serialized::defaults(SmsGateConfig::default())),
            |figment, path| figment.merge(Toml::file(path)),
        )
        .merge(env_provider())
}

/// Map a lowercased, prefix-stripped env key to its dotted config path.
///
/// `broker_prefetch_count` becomes `broker.prefetch_count`; keys that name no
/// known section pass through unchanged.
pub fn map_env_key(key: &str) -> String {
    for section in ENV_SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|r| r.strip_prefix('_'))
        {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}

/// Environment provider with explicit section mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` because field names contain
/// underscores: `SMSGATE_BROKER_MAIN_QUEUE` must map to `broker.main_queue`.
fn env_provider() -> Env {
    Env::prefixed("SMSGATE_").map(|key| map_env_key(key.as_str()).into())
}
