// SPDX-FileCopyrightText: 2026 SmsGate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prometheus metrics adapter for SmsGate.
//!
//! Uses the metrics-rs facade with the Prometheus exporter.
//! Metrics are rendered as Prometheus text format via [`PrometheusAdapter::render`],
//! which the gateway exposes on `/metrics`.

pub mod recording;

use async_trait::async_trait;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use smsgate_core::traits::adapter::PluginAdapter;
use smsgate_core::types::{AdapterType, HealthStatus};
use smsgate_core::SmsGateError;

pub use recording::{
    record_credit_debited, record_delivery, record_enqueued, record_provider_latency,
    record_reconnect, set_in_flight,
};

/// Prometheus metrics adapter.
///
/// Installs the Prometheus recorder and exposes a handle for rendering.
pub struct PrometheusAdapter {
    handle: PrometheusHandle,
}

impl PrometheusAdapter {
    /// Installs the Prometheus recorder globally.
    ///
    /// Only one recorder can be installed per process; a second call fails.
    pub fn new() -> Result<Self, SmsGateError> {
        let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
            SmsGateError::Internal(format!("failed to install Prometheus recorder: {e}"))
        })?;

        recording::register_metrics();

        tracing::info!("prometheus metrics recorder installed");

        Ok(Self { handle })
    }

    pub fn handle(&self) -> &PrometheusHandle {
        &self.handle
    }

    /// Render all collected metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

#[async_trait]
impl PluginAdapter for PrometheusAdapter {
    fn name(&self) -> &str {
        "prometheus"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Observability
    }

    async fn health_check(&self) -> Result<HealthStatus, SmsGateError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), SmsGateError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The global recorder can only be installed once, so these tests use a
    // thread-local recorder instead of `PrometheusAdapter::new`.
    fn render_with(f: impl FnOnce()) -> String {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, f);
        handle.render()
    }

    #[test]
    fn enqueued_counter_is_labelled_by_queue() {
        let out = render_with(|| {
            record_enqueued("sms-gateway");
            record_enqueued("sms-gateway");
            record_enqueued("sms-gateway-primary");
        });
        assert!(out.contains(r#"smsgate_messages_enqueued_total{queue="sms-gateway"} 2"#));
        assert!(out.contains(r#"smsgate_messages_enqueued_total{queue="sms-gateway-primary"} 1"#));
    }

    #[test]
    fn delivery_outcomes_are_separate_series() {
        let out = render_with(|| {
            record_delivery("q", "sent");
            record_delivery("q", "requeued");
        });
        assert!(out.contains("smsgate_deliveries_total"));
        assert!(out.contains(r#"outcome="sent""#));
        assert!(out.contains(r#"outcome="requeued""#));
    }

    #[test]
    fn non_positive_debits_are_ignored() {
        let out = render_with(|| {
            record_credit_debited(1000);
            record_credit_debited(0);
            record_credit_debited(-5);
        });
        assert!(out.contains("smsgate_credit_debited_total 1000"));
    }

    #[test]
    fn gauge_reports_latest_value() {
        let out = render_with(|| {
            set_in_flight("q", 3);
            set_in_flight("q", 1);
        });
        assert!(out.contains(r#"smsgate_dispatcher_in_flight{queue="q"} 1"#));
    }
}
