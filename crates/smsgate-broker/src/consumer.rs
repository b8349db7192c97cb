// SPDX-FileCopyrightText: 2026 SmsGate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-queue consumers and the group that runs them side by side.

use std::sync::Arc;
use std::time::Duration;

use smsgate_config::model::BrokerConfig;
use smsgate_core::traits::{BrokerTransport, Topology};
use smsgate_core::{ConnectionState, SmsGateError};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::connection::{BrokerConnection, ConnectionSettings};
use crate::dispatcher::{DeliveryDispatcher, DeliveryHandler};

/// One queue's connection plus its dispatcher.
pub struct QueueConsumer {
    connection: Arc<BrokerConnection>,
    dispatcher: DeliveryDispatcher,
    prefetch: u16,
}

impl QueueConsumer {
    pub fn new(connection: Arc<BrokerConnection>, dispatcher: DeliveryDispatcher, prefetch: u16) -> Self {
        Self {
            connection,
            dispatcher,
            prefetch,
        }
    }

    pub fn connection(&self) -> &Arc<BrokerConnection> {
        &self.connection
    }

    /// Consumes until `cancel` fires, resuming after every reconnect.
    ///
    /// On return all handlers have finished and the connection is closed.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), SmsGateError> {
        let queue = self.dispatcher.queue().to_string();
        let backoff = self.connection.settings().reconnect_backoff;
        let supervisor = tokio::spawn(self.connection.clone().run_supervisor(cancel.clone()));
        let mut states = self.connection.subscribe_state();

        while wait_until_connected(&mut states, &cancel).await {
            match self.connection.consume(&queue, self.prefetch).await {
                Ok(stream) => {
                    info!(queue = %queue, prefetch = self.prefetch, "consuming");
                    if let Err(e) = self.dispatcher.run(stream, &cancel).await {
                        warn!(queue = %queue, error = %e, "delivery stream failed");
                    }
                }
                Err(e) => {
                    warn!(queue = %queue, error = %e, "cannot start consuming");
                }
            }
            if cancel.is_cancelled() {
                break;
            }
            wait_for_change(&mut states, &cancel, backoff).await;
        }

        if let Err(e) = supervisor.await {
            error!(queue = %queue, error = %e, "reconnect supervisor task failed");
        }
        self.connection.close().await
    }
}

async fn wait_until_connected(
    states: &mut watch::Receiver<ConnectionState>,
    cancel: &CancellationToken,
) -> bool {
    loop {
        let state = *states.borrow_and_update();
        if state == ConnectionState::Connected {
            return !cancel.is_cancelled();
        }
        tokio::select! {
            _ = cancel.cancelled() => return false,
            changed = states.changed() => if changed.is_err() {
                return false;
            },
        }
    }
}

async fn wait_for_change(
    states: &mut watch::Receiver<ConnectionState>,
    cancel: &CancellationToken,
    backoff: Duration,
) {
    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = states.changed() => {}
        _ = tokio::time::sleep(backoff) => {}
    }
}

/// Runs one [`QueueConsumer`] per queue and joins them.
#[derive(Default)]
pub struct ConsumerGroup {
    consumers: Vec<QueueConsumer>,
}

impl ConsumerGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// One connection and dispatcher for each of the main and overflow queues,
    /// all sharing `handler`.
    pub fn from_config(
        config: &BrokerConfig,
        transport: Arc<dyn BrokerTransport>,
        handler: Arc<dyn DeliveryHandler>,
    ) -> Self {
        let topology = Topology {
            exchange: config.exchange.clone(),
            queues: config.queue_names(),
        };
        let settings = ConnectionSettings::from_config(config);
        let mut group = Self::new();
        for queue in config.queue_names() {
            let connection = BrokerConnection::new(
                format!("consumer-{queue}"),
                transport.clone(),
                topology.clone(),
                settings,
            );
            let dispatcher = DeliveryDispatcher::new(queue, config.pool_size(), handler.clone());
            group.add(QueueConsumer::new(connection, dispatcher, config.prefetch_count));
        }
        group
    }

    pub fn add(&mut self, consumer: QueueConsumer) {
        self.consumers.push(consumer);
    }

    pub fn connections(&self) -> Vec<Arc<BrokerConnection>> {
        self.consumers.iter().map(|c| c.connection.clone()).collect()
    }

    /// Runs every consumer until `cancel` fires and all of them have drained.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), SmsGateError> {
        let mut tasks = JoinSet::new();
        for consumer in self.consumers {
            tasks.spawn(consumer.run(cancel.clone()));
        }

        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            let result = joined.map_err(|e| SmsGateError::Internal(format!("consumer task failed: {e}")));
            if let Err(e) = result.and_then(|r| r) {
                error!(error = %e, "consumer exited with error");
                first_error.get_or_insert(e);
            }
        }
        info!("consumer group stopped");
        first_error.map_or(Ok(()), Err)
    }
}
