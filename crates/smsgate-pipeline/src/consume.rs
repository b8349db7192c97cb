// SPDX-FileCopyrightText: 2026 SmsGate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Consumer side: deliver a queued message and settle its state.

use std::sync::Arc;

use async_trait::async_trait;
use smsgate_broker::DeliveryHandler;
use smsgate_config::model::DeclinePolicy;
use smsgate_core::traits::Delivery;
use smsgate_core::types::parse_message_id;
use smsgate_core::{
    DeliveryProvider, Disposition, LedgerStatus, Message, MessageStatus, SmsGateError,
    StorageAdapter,
};
use tracing::{debug, info, warn};

/// What happened to one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// Provider accepted; message Sent, ledger Success.
    Sent,
    /// Provider declined; message Failed, ledger Failed.
    Declined,
    /// Provider declined and the policy asks for a retry.
    DeclineRequeued,
    /// Body is not a message id.
    Malformed,
    /// Well-formed id with no message behind it.
    Missing,
    /// Message already left `Pending`; the provider is not called again.
    AlreadySettled,
    /// Loading or settling state failed.
    StorageUnavailable,
    /// Provider gave no usable answer.
    ProviderUnavailable,
}

impl ConsumeOutcome {
    pub fn disposition(self) -> Disposition {
        match self {
            Self::Sent | Self::Declined | Self::AlreadySettled => Disposition::Ack,
            Self::Malformed | Self::Missing => Disposition::Reject { requeue: false },
            Self::DeclineRequeued | Self::StorageUnavailable | Self::ProviderUnavailable => {
                Disposition::Reject { requeue: true }
            }
        }
    }

    /// Label for the deliveries metric.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Declined => "declined",
            Self::DeclineRequeued => "decline_requeued",
            Self::Malformed => "malformed",
            Self::Missing => "missing",
            Self::AlreadySettled => "already_settled",
            Self::StorageUnavailable => "storage_unavailable",
            Self::ProviderUnavailable => "provider_unavailable",
        }
    }
}

fn ledger_status_for(status: MessageStatus) -> Option<LedgerStatus> {
    match status {
        MessageStatus::Pending => None,
        MessageStatus::Sent => Some(LedgerStatus::Success),
        MessageStatus::Failed => Some(LedgerStatus::Failed),
    }
}

pub struct ConsumeWorkflow {
    storage: Arc<dyn StorageAdapter>,
    provider: Arc<dyn DeliveryProvider>,
    decline_policy: DeclinePolicy,
}

impl ConsumeWorkflow {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        provider: Arc<dyn DeliveryProvider>,
        decline_policy: DeclinePolicy,
    ) -> Self {
        Self {
            storage,
            provider,
            decline_policy,
        }
    }

    /// Runs the workflow for one delivery body.
    pub async fn process(&self, body: &[u8]) -> ConsumeOutcome {
        let message_id = match parse_message_id(body) {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "dropping malformed delivery");
                return ConsumeOutcome::Malformed;
            }
        };

        let message = match self.storage.get_message_by_id(message_id).await {
            Ok(Some(message)) => message,
            Ok(None) => {
                warn!(message_id, "queued message does not exist");
                return ConsumeOutcome::Missing;
            }
            Err(e) => {
                warn!(message_id, error = %e, "loading message failed");
                return ConsumeOutcome::StorageUnavailable;
            }
        };

        if message.status != MessageStatus::Pending {
            return self.reconcile(&message).await;
        }

        let response = match self.provider.send(&message).await {
            Ok(response) => response,
            Err(e) => {
                warn!(message_id, error = %e, "provider unavailable, requeueing");
                return ConsumeOutcome::ProviderUnavailable;
            }
        };

        if response.is_success() {
            return match self.settle(&message, MessageStatus::Sent).await {
                Ok(true) => {
                    info!(message_id, "message sent");
                    ConsumeOutcome::Sent
                }
                Ok(false) => ConsumeOutcome::AlreadySettled,
                Err(_) => ConsumeOutcome::StorageUnavailable,
            };
        }

        match self.decline_policy {
            DeclinePolicy::Acknowledge => match self.settle(&message, MessageStatus::Failed).await {
                Ok(true) => {
                    info!(
                        message_id,
                        status = %response.status,
                        reason = %response.message,
                        "provider declined message"
                    );
                    ConsumeOutcome::Declined
                }
                Ok(false) => ConsumeOutcome::AlreadySettled,
                Err(_) => ConsumeOutcome::StorageUnavailable,
            },
            DeclinePolicy::Requeue => {
                info!(message_id, reason = %response.message, "provider declined message, requeueing");
                ConsumeOutcome::DeclineRequeued
            }
        }
    }

    /// Moves the message to `status`, then its ledger entry to the matching status.
    ///
    /// `Ok(false)` means a concurrent delivery of the same message settled it
    /// first; its result stands and the ledger is left alone.
    async fn settle(&self, message: &Message, status: MessageStatus) -> Result<bool, SmsGateError> {
        let result = async {
            if !self.storage.update_message_status(message.id, status).await? {
                return Ok(false);
            }
            if let Some(ledger) = ledger_status_for(status) {
                self.storage
                    .update_ledger_status_by_message_id(message.id, ledger)
                    .await?;
            }
            Ok(true)
        }
        .await;
        match &result {
            Ok(false) => {
                debug!(message_id = message.id, %status, "message settled by a concurrent delivery")
            }
            Err(e) => {
                warn!(message_id = message.id, %status, error = %e, "settling message failed")
            }
            Ok(true) => {}
        }
        result
    }

    /// Completes a settlement interrupted between the message and ledger updates.
    async fn reconcile(&self, message: &Message) -> ConsumeOutcome {
        let Some(target) = ledger_status_for(message.status) else {
            return ConsumeOutcome::AlreadySettled;
        };
        match self.storage.get_ledger_entry_by_message_id(message.id).await {
            Ok(Some(entry)) if entry.status == LedgerStatus::Pending => {
                match self
                    .storage
                    .update_ledger_status_by_message_id(message.id, target)
                    .await
                {
                    Ok(_) => {
                        debug!(message_id = message.id, %target, "ledger entry reconciled");
                        ConsumeOutcome::AlreadySettled
                    }
                    Err(e) => {
                        warn!(message_id = message.id, error = %e, "ledger reconcile failed");
                        ConsumeOutcome::StorageUnavailable
                    }
                }
            }
            Ok(_) => {
                debug!(message_id = message.id, status = %message.status, "redelivery of settled message");
                ConsumeOutcome::AlreadySettled
            }
            Err(e) => {
                warn!(message_id = message.id, error = %e, "loading ledger entry failed");
                ConsumeOutcome::StorageUnavailable
            }
        }
    }
}

#[async_trait]
impl DeliveryHandler for ConsumeWorkflow {
    async fn handle(&self, delivery: &Delivery) -> Disposition {
        let outcome = self.process(&delivery.body).await;
        smsgate_prometheus::record_delivery(&delivery.queue, outcome.as_str());
        debug!(
            queue = %delivery.queue,
            delivery_tag = delivery.delivery_tag,
            outcome = outcome.as_str(),
            "delivery handled"
        );
        outcome.disposition()
    }
}
