// SPDX-FileCopyrightText: 2026 SmsGate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the SmsGate pipeline.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level SmsGate configuration.
///
/// Loaded from TOML files following the XDG hierarchy, with environment
/// variable overrides. All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SmsGateConfig {
    /// Process identity and logging.
    #[serde(default)]
    pub app: AppConfig,

    /// HTTP API settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Message broker settings.
    #[serde(default)]
    pub broker: BrokerConfig,

    /// Delivery provider settings.
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Tariff settings.
    #[serde(default)]
    pub billing: BillingConfig,

    /// Local mock provider server settings.
    #[serde(default)]
    pub mock_provider: MockProviderConfig,

    /// Prometheus metrics settings.
    #[serde(default)]
    pub prometheus: PrometheusConfig,
}

/// Process identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Display name used in logs and the health endpoint.
    #[serde(default = "default_app_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log output format.
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

fn default_app_name() -> String {
    "smsgate".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// HTTP API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Host address to bind.
    #[serde(default = "default_gateway_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_gateway_port")]
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_gateway_host(),
            port: default_gateway_port(),
        }
    }
}

fn default_gateway_host() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    8080
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL journal mode.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_local_dir()
        .map(|d| d.join("smsgate").join("smsgate.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("smsgate.db"))
        .to_string_lossy()
        .to_string()
}

fn default_wal_mode() -> bool {
    true
}

/// Which broker transport to run against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// AMQP 0-9-1 broker (RabbitMQ).
    #[default]
    Amqp,
    /// In-process broker; state is lost on exit.
    Memory,
}

/// Message broker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BrokerConfig {
    #[serde(default)]
    pub transport: TransportKind,

    #[serde(default = "default_broker_host")]
    pub host: String,

    #[serde(default = "default_broker_port")]
    pub port: u16,

    #[serde(default = "default_broker_username")]
    pub username: String,

    #[serde(default = "default_broker_password")]
    pub password: String,

    #[serde(default = "default_vhost")]
    pub vhost: String,

    /// Topic exchange the queues are bound to.
    #[serde(default = "default_exchange")]
    pub exchange: String,

    /// Primary queue, the default publish target.
    #[serde(default = "default_main_queue")]
    pub main_queue: String,

    /// Overflow queue receiving the weighted majority share.
    #[serde(default = "default_overflow_a_queue")]
    pub overflow_a_queue: String,

    /// Overflow queue receiving the remaining share.
    #[serde(default = "default_overflow_b_queue")]
    pub overflow_b_queue: String,

    /// Percentage (0-100) of overflow traffic routed to `overflow_a_queue`.
    #[serde(default = "default_overflow_a_weight")]
    pub overflow_a_weight: u8,

    /// Consumer QoS and the backlog threshold that triggers overflow routing.
    #[serde(default = "default_prefetch_count")]
    pub prefetch_count: u16,

    /// Concurrent handlers per consumed queue. Defaults to the CPU count.
    #[serde(default)]
    pub worker_pool_size: Option<usize>,

    #[serde(default = "default_dial_timeout_ms")]
    pub dial_timeout_ms: u64,

    #[serde(default = "default_publish_timeout_ms")]
    pub publish_timeout_ms: u64,

    #[serde(default = "default_reconnect_backoff_ms")]
    pub reconnect_backoff_ms: u64,

    /// Fixed seed for overflow selection. Random when unset.
    #[serde(default)]
    pub rng_seed: Option<u64>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::default(),
            host: default_broker_host(),
            port: default_broker_port(),
            username: default_broker_username(),
            password: default_broker_password(),
            vhost: default_vhost(),
            exchange: default_exchange(),
            main_queue: default_main_queue(),
            overflow_a_queue: default_overflow_a_queue(),
            overflow_b_queue: default_overflow_b_queue(),
            overflow_a_weight: default_overflow_a_weight(),
            prefetch_count: default_prefetch_count(),
            worker_pool_size: None,
            dial_timeout_ms: default_dial_timeout_ms(),
            publish_timeout_ms: default_publish_timeout_ms(),
            reconnect_backoff_ms: default_reconnect_backoff_ms(),
            rng_seed: None,
        }
    }
}

impl BrokerConfig {
    /// AMQP URI assembled from the connection fields.
    pub fn amqp_uri(&self) -> String {
        let vhost = if self.vhost == "/" {
            "%2f".to_string()
        } else {
            self.vhost.trim_start_matches('/').to_string()
        };
        format!(
            "amqp://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, vhost
        )
    }

    /// All three queue names, main first.
    pub fn queue_names(&self) -> Vec<String> {
        vec![
            self.main_queue.clone(),
            self.overflow_a_queue.clone(),
            self.overflow_b_queue.clone(),
        ]
    }

    /// Effective worker pool size.
    pub fn pool_size(&self) -> usize {
        self.worker_pool_size.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }
}

fn default_broker_host() -> String {
    "localhost".to_string()
}

fn default_broker_port() -> u16 {
    5672
}

fn default_broker_username() -> String {
    "guest".to_string()
}

fn default_broker_password() -> String {
    "guest".to_string()
}

fn default_vhost() -> String {
    "/".to_string()
}

fn default_exchange() -> String {
    "sms-gateway".to_string()
}

fn default_main_queue() -> String {
    "sms-gateway".to_string()
}

fn default_overflow_a_queue() -> String {
    "sms-gateway-primary".to_string()
}

fn default_overflow_b_queue() -> String {
    "sms-gateway-secondary".to_string()
}

fn default_overflow_a_weight() -> u8 {
    90
}

fn default_prefetch_count() -> u16 {
    10
}

fn default_dial_timeout_ms() -> u64 {
    20_000
}

fn default_publish_timeout_ms() -> u64 {
    500
}

fn default_reconnect_backoff_ms() -> u64 {
    5_000
}

/// What the consumer does with a well-formed provider decline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclinePolicy {
    /// Mark the message and ledger entry Failed and acknowledge.
    #[default]
    Acknowledge,
    /// Leave state untouched and reject with requeue.
    Requeue,
}

/// Delivery provider configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Base URL of the provider's HTTP API.
    #[serde(default = "default_provider_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub decline_policy: DeclinePolicy,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_provider_base_url(),
            timeout_secs: default_provider_timeout_secs(),
            decline_policy: DeclinePolicy::default(),
        }
    }
}

fn default_provider_base_url() -> String {
    "http://127.0.0.1:8081".to_string()
}

fn default_provider_timeout_secs() -> u64 {
    5
}

/// Tariff configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BillingConfig {
    /// Credit charged per message.
    #[serde(default = "default_sms_cost")]
    pub sms_cost: i64,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            sms_cost: default_sms_cost(),
        }
    }
}

fn default_sms_cost() -> i64 {
    1000
}

/// Mock provider server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MockProviderConfig {
    #[serde(default = "default_mock_host")]
    pub host: String,

    #[serde(default = "default_mock_port")]
    pub port: u16,

    /// Accepted sends per one-minute window.
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
}

impl Default for MockProviderConfig {
    fn default() -> Self {
        Self {
            host: default_mock_host(),
            port: default_mock_port(),
            requests_per_minute: default_requests_per_minute(),
        }
    }
}

fn default_mock_host() -> String {
    "127.0.0.1".to_string()
}

fn default_mock_port() -> u16 {
    8081
}

fn default_requests_per_minute() -> u32 {
    5
}

/// Prometheus metrics configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PrometheusConfig {
    /// Install the Prometheus recorder and serve `/metrics`.
    #[serde(default = "default_prometheus_enabled")]
    pub enabled: bool,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            enabled: default_prometheus_enabled(),
        }
    }
}

fn default_prometheus_enabled() -> bool {
    true
}
