// SPDX-FileCopyrightText: 2026 SmsGate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the SmsGate configuration system.

use serial_test::serial;
use smsgate_config::diagnostic::ConfigError;
use smsgate_config::model::{DeclinePolicy, LogFormat, TransportKind};
use smsgate_config::{load_and_validate_str, load_config, load_config_from_str};

/// Valid TOML with all known sections deserializes successfully.
#[test]
fn valid_toml_deserializes_into_config() {
    let toml = r#"
[app]
name = "edge-1"
log_level = "debug"
log_format = "json"

[gateway]
host = "0.0.0.0"
port = 9090

[storage]
database_path = "/tmp/sms.db"
wal_mode = false

[broker]
transport = "memory"
host = "rabbit"
prefetch_count = 25
overflow_a_weight = 70
worker_pool_size = 4
rng_seed = 7

[provider]
base_url = "https://sms.example.com"
timeout_secs = 3
decline_policy = "requeue"

[billing]
sms_cost = 250

[mock_provider]
requests_per_minute = 60

[prometheus]
enabled = false
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.app.name, "edge-1");
    assert_eq!(config.app.log_format, LogFormat::Json);
    assert_eq!(config.gateway.port, 9090);
    assert!(!config.storage.wal_mode);
    assert_eq!(config.broker.transport, TransportKind::Memory);
    assert_eq!(config.broker.host, "rabbit");
    assert_eq!(config.broker.prefetch_count, 25);
    assert_eq!(config.broker.overflow_a_weight, 70);
    assert_eq!(config.broker.pool_size(), 4);
    assert_eq!(config.broker.rng_seed, Some(7));
    assert_eq!(config.provider.decline_policy, DeclinePolicy::Requeue);
    assert_eq!(config.billing.sms_cost, 250);
    assert_eq!(config.mock_provider.requests_per_minute, 60);
    assert!(!config.prometheus.enabled);
}

/// Omitted sections fall back to the documented defaults.
#[test]
fn empty_toml_uses_defaults() {
    let config = load_config_from_str("").expect("empty TOML is valid");
    assert_eq!(config.broker.main_queue, "sms-gateway");
    assert_eq!(config.broker.overflow_a_queue, "sms-gateway-primary");
    assert_eq!(config.broker.overflow_b_queue, "sms-gateway-secondary");
    assert_eq!(config.broker.overflow_a_weight, 90);
    assert_eq!(config.broker.prefetch_count, 10);
    assert_eq!(config.broker.dial_timeout_ms, 20_000);
    assert_eq!(config.broker.publish_timeout_ms, 500);
    assert_eq!(config.broker.reconnect_backoff_ms, 5_000);
    assert_eq!(config.provider.timeout_secs, 5);
    assert_eq!(config.provider.decline_policy, DeclinePolicy::Acknowledge);
    assert_eq!(config.billing.sms_cost, 1000);
    assert_eq!(config.gateway.port, 8080);
    assert_eq!(config.mock_provider.port, 8081);
}

/// Unknown field in [broker] produces an UnknownKey diagnostic with a suggestion.
#[test]
fn unknown_broker_key_suggests_correction() {
    let toml = r#"
[broker]
prefech_count = 4
"#;

    let errors = load_and_validate_str(toml).expect_err("should reject unknown field");
    assert_eq!(errors.len(), 1);
    match &errors[0] {
        ConfigError::UnknownKey {
            key, suggestion, ..
        } => {
            assert_eq!(key, "prefech_count");
            assert_eq!(suggestion.as_deref(), Some("prefetch_count"));
        }
        other => panic!("expected UnknownKey, got {other:?}"),
    }
}

/// Wrong value type produces an InvalidType diagnostic.
#[test]
fn wrong_type_produces_invalid_type() {
    let toml = r#"
[billing]
sms_cost = "cheap"
"#;

    let errors = load_and_validate_str(toml).expect_err("should reject wrong type");
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::InvalidType { .. })),
        "got {errors:?}"
    );
}

/// Semantically invalid values are reported after deserialization.
#[test]
fn validation_errors_surface_through_load() {
    let toml = r#"
[broker]
overflow_a_weight = 150
"#;

    let errors = load_and_validate_str(toml).expect_err("weight > 100 must fail");
    assert!(matches!(
        &errors[0],
        ConfigError::Validation { message } if message.contains("overflow_a_weight")
    ));
}

/// Unknown decline policy is rejected.
#[test]
fn unknown_decline_policy_is_rejected() {
    let toml = r#"
[provider]
decline_policy = "ignore"
"#;
    assert!(load_config_from_str(toml).is_err());
}

/// Env vars override the local TOML file, which overrides defaults.
#[test]
#[serial]
fn env_overrides_local_file() {
    figment::Jail::expect_with(|jail| {
        jail.create_file(
            "smsgate.toml",
            r#"
[broker]
prefetch_count = 20
main_queue = "from-file"
"#,
        )?;
        jail.set_env("SMSGATE_BROKER_PREFETCH_COUNT", "30");
        jail.set_env("SMSGATE_PROVIDER_DECLINE_POLICY", "requeue");
        jail.set_env("SMSGATE_MOCK_PROVIDER_PORT", "9999");

        let config = load_config()?;
        assert_eq!(config.broker.prefetch_count, 30);
        assert_eq!(config.broker.main_queue, "from-file");
        assert_eq!(config.provider.decline_policy, DeclinePolicy::Requeue);
        assert_eq!(config.mock_provider.port, 9999);
        Ok(())
    });
}
