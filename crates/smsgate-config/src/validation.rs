// SPDX-FileCopyrightText: 2026 SmsGate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes, such as weight ranges, distinct queue names, and URL shape.

use std::collections::HashSet;

use crate::diagnostic::ConfigError;
use crate::model::SmsGateConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// every collected validation error (does not fail fast).
pub fn validate_config(config: &SmsGateConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut invalid = |message: String| errors.push(ConfigError::Validation { message });

    if !LOG_LEVELS.contains(&config.app.log_level.as_str()) {
        invalid(format!(
            "app.log_level `{}` must be one of {}",
            config.app.log_level,
            LOG_LEVELS.join(", ")
        ));
    }

    if config.storage.database_path.trim().is_empty() {
        invalid("storage.database_path must not be empty".to_string());
    }

    let broker = &config.broker;

    if broker.overflow_a_weight > 100 {
        invalid(format!(
            "broker.overflow_a_weight must be between 0 and 100, got {}",
            broker.overflow_a_weight
        ));
    }

    if broker.prefetch_count == 0 {
        invalid("broker.prefetch_count must be at least 1".to_string());
    }

    if broker.worker_pool_size == Some(0) {
        invalid("broker.worker_pool_size must be at least 1".to_string());
    }

    if broker.exchange.trim().is_empty() {
        invalid("broker.exchange must not be empty".to_string());
    }

    let mut seen = HashSet::new();
    for (key, name) in [
        ("main_queue", &broker.main_queue),
        ("overflow_a_queue", &broker.overflow_a_queue),
        ("overflow_b_queue", &broker.overflow_b_queue),
    ] {
        if name.trim().is_empty() {
            invalid(format!("broker.{key} must not be empty"));
        } else if !seen.insert(name.as_str()) {
            invalid(format!("broker.{key} `{name}` duplicates another queue name"));
        }
    }

    for (key, value) in [
        ("dial_timeout_ms", broker.dial_timeout_ms),
        ("publish_timeout_ms", broker.publish_timeout_ms),
    ] {
        if value == 0 {
            invalid(format!("broker.{key} must be greater than zero"));
        }
    }

    let base_url = config.provider.base_url.trim();
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        invalid(format!(
            "provider.base_url `{base_url}` must start with http:// or https://"
        ));
    }

    if config.provider.timeout_secs == 0 {
        invalid("provider.timeout_secs must be greater than zero".to_string());
    }

    if config.billing.sms_cost <= 0 {
        invalid(format!(
            "billing.sms_cost must be positive, got {}",
            config.billing.sms_cost
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages(errors: &[ConfigError]) -> Vec<String> {
        errors
            .iter()
            .map(|e| match e {
                ConfigError::Validation { message } => message.clone(),
                other => other.to_string(),
            })
            .collect()
    }

    #[test]
    fn default_config_validates() {
        let config = SmsGateConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn weight_over_100_fails() {
        let mut config = SmsGateConfig::default();
        config.broker.overflow_a_weight = 101;
        let errors = validate_config(&config).unwrap_err();
        assert!(messages(&errors).iter().any(|m| m.contains("overflow_a_weight")));
    }

    #[test]
    fn duplicate_queue_names_fail() {
        let mut config = SmsGateConfig::default();
        config.broker.overflow_b_queue = config.broker.main_queue.clone();
        let errors = validate_config(&config).unwrap_err();
        assert!(messages(&errors).iter().any(|m| m.contains("overflow_b_queue")));
    }

    #[test]
    fn collects_every_error() {
        let mut config = SmsGateConfig::default();
        config.broker.prefetch_count = 0;
        config.billing.sms_cost = 0;
        config.provider.base_url = "localhost:8081".into();
        config.storage.database_path = " ".into();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4, "got {:?}", messages(&errors));
    }

    #[test]
    fn zero_pool_size_fails() {
        let mut config = SmsGateConfig::default();
        config.broker.worker_pool_size = Some(0);
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn unknown_log_level_fails() {
        let mut config = SmsGateConfig::default();
        config.app.log_level = "verbose".into();
        let errors = validate_config(&config).unwrap_err();
        assert!(messages(&errors)[0].contains("app.log_level"));
    }
}
