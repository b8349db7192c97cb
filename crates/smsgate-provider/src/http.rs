// SPDX-FileCopyrightText: 2026 SmsGate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the carrier's send and report endpoints.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use smsgate_config::model::ProviderConfig;
use smsgate_core::types::{DeliveryReport, ProviderResponse};
use smsgate_core::{
    AdapterType, DeliveryProvider, HealthStatus, Message, MessageId, PluginAdapter, SmsGateError,
};
use tracing::{debug, warn};

/// Send endpoint, relative to the base URL.
const SEND_PATH: &str = "/mock/sms";

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    id: MessageId,
    receiver: &'a str,
    body: &'a str,
}

fn transport(message: String, e: reqwest::Error) -> SmsGateError {
    SmsGateError::ProviderTransport {
        message,
        source: Some(Box::new(e)),
    }
}

/// Whether a status means "no usable answer, try again later".
fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Delivery provider reached over HTTP.
///
/// Any well-formed `{status, message}` body is returned as a
/// [`ProviderResponse`], declines included. Rate limiting, server errors,
/// timeouts and unreadable bodies are [`SmsGateError::ProviderTransport`].
#[derive(Debug, Clone)]
pub struct HttpDeliveryProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDeliveryProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, SmsGateError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| transport(format!("failed to build HTTP client: {e}"), e))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl PluginAdapter for HttpDeliveryProvider {
    fn name(&self) -> &str {
        "http"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, SmsGateError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), SmsGateError> {
        Ok(())
    }
}

#[async_trait]
impl DeliveryProvider for HttpDeliveryProvider {
    async fn send(&self, message: &Message) -> Result<ProviderResponse, SmsGateError> {
        let url = format!("{}{SEND_PATH}", self.base_url);
        let request = SendRequest {
            id: message.id,
            receiver: &message.receiver,
            body: &message.body,
        };

        let started = Instant::now();
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| transport(format!("send request failed: {e}"), e))?;
        smsgate_prometheus::record_provider_latency(started.elapsed().as_secs_f64());

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| transport(format!("reading provider response failed: {e}"), e))?;
        debug!(message_id = message.id, status = %status, "provider answered");

        if is_transient_status(status) {
            warn!(message_id = message.id, status = %status, body = %body, "provider unavailable");
            return Err(SmsGateError::ProviderTransport {
                message: format!("provider returned {status}: {body}"),
                source: None,
            });
        }

        serde_json::from_str::<ProviderResponse>(&body).map_err(|e| {
            SmsGateError::ProviderTransport {
                message: format!("unreadable provider response ({status}): {e}"),
                source: Some(Box::new(e)),
            }
        })
    }

    async fn delivery_report(&self, message: &Message) -> Result<DeliveryReport, SmsGateError> {
        let url = format!("{}{SEND_PATH}/{}/report", self.base_url, message.id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| transport(format!("report request failed: {e}"), e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SmsGateError::ProviderTransport {
                message: format!("report endpoint returned {status}: {body}"),
                source: None,
            });
        }

        response
            .json::<DeliveryReport>()
            .await
            .map_err(|e| transport(format!("unreadable delivery report: {e}"), e))
    }
}
