// SPDX-FileCopyrightText: 2026 SmsGate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted delivery provider for deterministic tests.
//!
//! Outcomes are popped from a FIFO queue. When the queue is empty the
//! provider accepts the message.

use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::sync::Mutex;

use smsgate_core::traits::adapter::PluginAdapter;
use smsgate_core::types::{
    AdapterType, DeliveryReport, HealthStatus, Message, MessageId, ProviderResponse,
};
use smsgate_core::{DeliveryProvider, SmsGateError};

/// One scripted answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOutcome {
    Accept,
    /// Well-formed decline carrying this message.
    Decline(String),
    /// Transport failure carrying this message.
    Unavailable(String),
}

#[derive(Default)]
pub struct MockDeliveryProvider {
    outcomes: Mutex<VecDeque<MockOutcome>>,
    calls: Mutex<Vec<MessageId>>,
}

impl MockDeliveryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_outcomes(outcomes: Vec<MockOutcome>) -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::from(outcomes)),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub async fn push_outcome(&self, outcome: MockOutcome) {
        self.outcomes.lock().await.push_back(outcome);
    }

    /// Ids of every message passed to `send`, in call order.
    pub async fn calls(&self) -> Vec<MessageId> {
        self.calls.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }
}

#[async_trait]
impl PluginAdapter for MockDeliveryProvider {
    fn name(&self) -> &str {
        "mock-delivery-provider"
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
impl DeliveryProvider for MockDeliveryProvider {
    async fn send(&self, message: &Message) -> Result<ProviderResponse, SmsGateError> {
        self.calls.lock().await.push(message.id);
        let outcome = self
            .outcomes
            .lock()
            .await
            .pop_front()
            .unwrap_or(MockOutcome::Accept);
        match outcome {
            MockOutcome::Accept => Ok(ProviderResponse::accepted()),
            MockOutcome::Decline(reason) => Ok(ProviderResponse::declined(reason)),
            MockOutcome::Unavailable(reason) => Err(SmsGateError::ProviderTransport {
                message: reason,
                source: None,
            }),
        }
    }

    async fn delivery_report(&self, message: &Message) -> Result<DeliveryReport, SmsGateError> {
        Ok(DeliveryReport {
            message_id: message.id,
            status: "DELIVERED".to_string(),
            detail: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smsgate_core::MessageStatus;

    fn message(id: MessageId) -> Message {
        Message {
            id,
            user_id: 1,
            receiver: "09350000000".into(),
            body: "hi".into(),
            cost: 1000,
            status: MessageStatus::Pending,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[tokio::test]
    async fn script_then_default_accept() {
        let provider = MockDeliveryProvider::with_outcomes(vec![
            MockOutcome::Unavailable("down".into()),
            MockOutcome::Decline("nope".into()),
        ]);

        assert!(provider.send(&message(1)).await.is_err());
        let declined = provider.send(&message(2)).await.unwrap();
        assert!(!declined.is_success());
        assert!(provider.send(&message(3)).await.unwrap().is_success());
        assert_eq!(provider.calls().await, vec![1, 2, 3]);
    }
}
