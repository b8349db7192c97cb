// SPDX-FileCopyrightText: 2026 SmsGate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Producer side: charge the sender, persist the message, enqueue its id.
//!
//! The steps are not wrapped in a transaction. A failure after the message is
//! persisted leaves a `Pending` message and ledger entry without a matching
//! debit or enqueue. The debit itself is a conditional decrement, so
//! concurrent sends can never take a balance below zero.

use std::sync::Arc;

use async_trait::async_trait;
use smsgate_billing::Tariff;
use smsgate_broker::QueueDistributionStrategy;
use smsgate_core::types::{NewLedgerEntry, NewMessage};
use smsgate_core::{Message, MessageId, QueueEnvelope, SmsGateError, StorageAdapter, UserId};
use tracing::{debug, info, warn};

/// Puts a message id on a queue and reports which queue took it.
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    async fn publish(&self, message_id: MessageId) -> Result<String, SmsGateError>;
}

#[async_trait]
impl MessagePublisher for QueueDistributionStrategy {
    async fn publish(&self, message_id: MessageId) -> Result<String, SmsGateError> {
        self.publish_to_queue(&QueueEnvelope::for_message(message_id))
            .await
    }
}

/// Result of a successful send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub message_id: MessageId,
    pub queue: String,
    pub cost: i64,
}

/// Pagination for message history. Pages start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryPage {
    pub page: u32,
    pub page_size: u32,
}

impl HistoryPage {
    pub const DEFAULT_PAGE_SIZE: u32 = 20;
    pub const MAX_PAGE_SIZE: u32 = 100;

    /// Missing or zero values fall back to page 1 and the default size.
    pub fn new(page: Option<u32>, page_size: Option<u32>) -> Self {
        let page = page.filter(|p| *p > 0).unwrap_or(1);
        let page_size = page_size
            .filter(|s| *s > 0)
            .unwrap_or(Self::DEFAULT_PAGE_SIZE)
            .min(Self::MAX_PAGE_SIZE);
        Self { page, page_size }
    }

    pub fn offset(&self) -> u32 {
        (self.page - 1).saturating_mul(self.page_size)
    }
}

impl Default for HistoryPage {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[derive(Clone)]
pub struct SendWorkflow {
    storage: Arc<dyn StorageAdapter>,
    publisher: Arc<dyn MessagePublisher>,
    tariff: Arc<dyn Tariff>,
}

impl SendWorkflow {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        publisher: Arc<dyn MessagePublisher>,
        tariff: Arc<dyn Tariff>,
    ) -> Self {
        Self {
            storage,
            publisher,
            tariff,
        }
    }

    /// Charges `user_id` for one message to `receiver` and enqueues it.
    ///
    /// Returns only after the message id is on a queue. An insufficient
    /// balance fails before anything is written.
    pub async fn send(
        &self,
        user_id: UserId,
        receiver: &str,
        body: &str,
    ) -> Result<SendReceipt, SmsGateError> {
        if receiver.trim().is_empty() {
            return Err(SmsGateError::InvalidInput("receiver must not be empty".into()));
        }
        if body.is_empty() {
            return Err(SmsGateError::InvalidInput("message must not be empty".into()));
        }

        let cost = self.tariff.cost(receiver, body);
        if !self.storage.has_sufficient_credit(user_id, cost).await? {
            debug!(user_id, cost, "send refused, balance too low");
            return Err(SmsGateError::InsufficientCredit {
                user_id,
                required: cost,
            });
        }

        let message = self
            .storage
            .create_message(&NewMessage {
                user_id,
                receiver: receiver.to_string(),
                body: body.to_string(),
                cost,
            })
            .await?;
        self.storage
            .create_ledger_entry(&NewLedgerEntry::debit(user_id, message.id, cost))
            .await?;

        if self.storage.get_user_by_id(user_id).await?.is_none() {
            return Err(SmsGateError::not_found("user", user_id));
        }
        if let Err(e) = self.storage.decrement_credit(user_id, cost).await {
            warn!(user_id, message_id = message.id, error = %e, "debit failed after message was persisted");
            return Err(e);
        }
        smsgate_prometheus::record_credit_debited(cost);

        let queue = match self.publisher.publish(message.id).await {
            Ok(queue) => queue,
            Err(e) => {
                warn!(user_id, message_id = message.id, error = %e, "enqueue failed after debit");
                return Err(e);
            }
        };

        info!(user_id, message_id = message.id, queue = %queue, cost, "message queued");
        Ok(SendReceipt {
            message_id: message.id,
            queue,
            cost,
        })
    }

    /// The user's messages, newest first.
    pub async fn history(
        &self,
        user_id: UserId,
        page: HistoryPage,
    ) -> Result<Vec<Message>, SmsGateError> {
        self.storage
            .list_messages_by_user(user_id, page.page_size, page.offset())
            .await
    }
}
