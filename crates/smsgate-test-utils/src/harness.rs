// SPDX-FileCopyrightText: 2026 SmsGate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end pipeline tests.
//!
//! `TestHarness` assembles the full pipeline over a temp SQLite database and
//! an in-memory broker: accounts, the send workflow publishing through the
//! distribution strategy, and the consume workflow behind a consumer group.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use smsgate_billing::{AccountService, FixedTariff};
use smsgate_broker::{
    BrokerConnection, ConnectionSettings, ConsumerGroup, MemoryBroker, QueueDistributionStrategy,
};
use smsgate_config::SmsGateConfig;
use smsgate_config::model::{DeclinePolicy, StorageConfig, TransportKind};
use smsgate_core::traits::Topology;
use smsgate_core::{SmsGateError, StorageAdapter, User};
use smsgate_pipeline::{ConsumeWorkflow, SendWorkflow};
use smsgate_storage::SqliteStorage;
use tokio_util::sync::CancellationToken;

use crate::mock_provider::{MockDeliveryProvider, MockOutcome};

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    outcomes: Vec<MockOutcome>,
    config: SmsGateConfig,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        let mut config = SmsGateConfig::default();
        config.broker.transport = TransportKind::Memory;
        config.broker.worker_pool_size = Some(4);
        config.broker.reconnect_backoff_ms = 20;
        config.broker.rng_seed = Some(7);
        Self {
            outcomes: Vec::new(),
            config,
        }
    }

    /// Scripted provider answers, consumed in order.
    pub fn with_provider_outcomes(mut self, outcomes: Vec<MockOutcome>) -> Self {
        self.outcomes = outcomes;
        self
    }

    pub fn with_sms_cost(mut self, cost: i64) -> Self {
        self.config.billing.sms_cost = cost;
        self
    }

    pub fn with_decline_policy(mut self, policy: DeclinePolicy) -> Self {
        self.config.provider.decline_policy = policy;
        self
    }

    /// Main-queue backlog at which sends spill to the overflow queues.
    pub fn with_overflow_threshold(mut self, prefetch_count: u16) -> Self {
        self.config.broker.prefetch_count = prefetch_count;
        self
    }

    pub async fn build(mut self) -> Result<TestHarness, SmsGateError> {
        let temp_dir =
            tempfile::TempDir::new().map_err(|e| SmsGateError::Storage { source: e.into() })?;
        self.config.storage = StorageConfig {
            database_path: temp_dir.path().join("test.db").to_string_lossy().into_owned(),
            wal_mode: true,
        };

        let storage = Arc::new(SqliteStorage::new(self.config.storage.clone()));
        storage.initialize().await?;
        let storage: Arc<dyn StorageAdapter> = storage;

        let broker = MemoryBroker::new();
        let publisher = BrokerConnection::new(
            "publisher",
            Arc::new(broker.clone()),
            Topology {
                exchange: self.config.broker.exchange.clone(),
                queues: self.config.broker.queue_names(),
            },
            ConnectionSettings::from_config(&self.config.broker),
        );
        publisher.connect().await?;

        let strategy = Arc::new(QueueDistributionStrategy::from_config(
            publisher.clone(),
            &self.config.broker,
        ));
        let tariff = Arc::new(FixedTariff::from_config(&self.config.billing));
        let send = SendWorkflow::new(storage.clone(), strategy.clone(), tariff);

        let provider = Arc::new(MockDeliveryProvider::with_outcomes(self.outcomes));
        let consume = Arc::new(ConsumeWorkflow::new(
            storage.clone(),
            provider.clone(),
            self.config.provider.decline_policy,
        ));

        Ok(TestHarness {
            accounts: AccountService::new(storage.clone()),
            storage,
            broker,
            publisher,
            strategy,
            send,
            consume,
            provider,
            config: self.config,
            phone_counter: AtomicU64::new(0),
            _temp_dir: temp_dir,
        })
    }
}

/// A complete pipeline with a scripted provider and temp storage.
pub struct TestHarness {
    pub storage: Arc<dyn StorageAdapter>,
    /// In-memory broker shared by the publisher and every consumer.
    pub broker: MemoryBroker,
    /// Connection the send workflow publishes through.
    pub publisher: Arc<BrokerConnection>,
    pub strategy: Arc<QueueDistributionStrategy>,
    pub accounts: AccountService,
    pub send: SendWorkflow,
    pub consume: Arc<ConsumeWorkflow>,
    pub provider: Arc<MockDeliveryProvider>,
    pub config: SmsGateConfig,
    phone_counter: AtomicU64,
    /// Temp directory kept alive for cleanup on drop.
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    pub async fn new() -> Result<Self, SmsGateError> {
        Self::builder().build().await
    }

    /// Creates a user with a fresh phone number and tops it up to `credit`.
    pub async fn funded_user(&self, credit: i64) -> Result<User, SmsGateError> {
        let n = self.phone_counter.fetch_add(1, Ordering::Relaxed);
        let user = self
            .accounts
            .create_user("Test User", &format!("0912{n:07}"))
            .await?;
        if credit > 0 {
            return self.accounts.top_up(user.id, credit).await;
        }
        Ok(user)
    }

    /// One consumer per configured queue, all handled by the consume workflow.
    pub fn consumer_group(&self) -> ConsumerGroup {
        ConsumerGroup::from_config(
            &self.config.broker,
            Arc::new(self.broker.clone()),
            self.consume.clone(),
        )
    }

    /// Runs the consumer group until every queue is empty and nothing is
    /// unacknowledged, then shuts it down.
    pub async fn drain(&self, timeout: Duration) -> Result<(), SmsGateError> {
        let cancel = CancellationToken::new();
        let group = tokio::spawn(self.consumer_group().run(cancel.clone()));

        let queues = self.config.broker.queue_names();
        let idle = tokio::time::timeout(timeout, async {
            loop {
                let waiting: usize = queues.iter().map(|q| self.broker.ready(q)).sum();
                if waiting == 0 && self.broker.unacked() == 0 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;

        cancel.cancel();
        group
            .await
            .map_err(|e| SmsGateError::Internal(format!("consumer group task failed: {e}")))??;
        idle.map_err(|_| SmsGateError::Timeout { duration: timeout })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smsgate_core::{LedgerStatus, MessageStatus};

    #[tokio::test]
    async fn send_then_drain_settles_message() {
        let harness = TestHarness::new().await.unwrap();
        let user = harness.funded_user(5000).await.unwrap();

        let receipt = harness
            .send
            .send(user.id, "09350000000", "hello")
            .await
            .unwrap();
        assert_eq!(receipt.queue, harness.config.broker.main_queue);

        harness.drain(Duration::from_secs(5)).await.unwrap();

        let message = harness
            .storage
            .get_message_by_id(receipt.message_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(message.status, MessageStatus::Sent);
        let entry = harness
            .storage
            .get_ledger_entry_by_message_id(receipt.message_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.status, LedgerStatus::Success);
        assert_eq!(harness.provider.calls().await, vec![receipt.message_id]);
    }

    #[tokio::test]
    async fn funded_users_get_distinct_phones() {
        let harness = TestHarness::new().await.unwrap();
        let a = harness.funded_user(0).await.unwrap();
        let b = harness.funded_user(100).await.unwrap();
        assert_ne!(a.phone_number, b.phone_number);
        assert_eq!(a.credit, 0);
        assert_eq!(b.credit, 100);
    }
}
