// SPDX-FileCopyrightText: 2026 SmsGate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Broker plumbing for the SmsGate delivery pipeline.
//!
//! - [`BrokerConnection`]: one self-healing broker session with a reconnect supervisor.
//! - [`DeliveryDispatcher`]: bounded, panic-isolated worker pool over a delivery stream.
//! - [`QueueDistributionStrategy`]: backlog-aware routing to main or overflow queues.
//! - [`ConsumerGroup`]: one connection and dispatcher per consumed queue.
//!
//! Two transports implement the wire side: [`AmqpTransport`] (lapin) and the
//! in-process [`MemoryBroker`].

pub mod amqp;
pub mod connection;
pub mod consumer;
pub mod dispatcher;
pub mod distribution;
pub mod machine;
pub mod memory;

use std::sync::Arc;

use smsgate_config::model::{BrokerConfig, TransportKind};
use smsgate_core::traits::BrokerTransport;

pub use amqp::AmqpTransport;
pub use connection::{BrokerConnection, ConnectionSettings};
pub use consumer::{ConsumerGroup, QueueConsumer};
pub use dispatcher::{DeliveryDispatcher, DeliveryHandler};
pub use distribution::{PercentileSource, QueueDistributionStrategy, QueueSet, SeededPercentile};
pub use machine::{ConnectionEvent, ConnectionMachine};
pub use memory::MemoryBroker;

/// Builds the transport selected by `broker.transport`.
///
/// Every call to this function with `memory` creates a fresh, independent broker,
/// so publisher and consumers in one process must share the returned value.
pub fn transport_from_config(config: &BrokerConfig) -> Arc<dyn BrokerTransport> {
    match config.transport {
        TransportKind::Amqp => Arc::new(AmqpTransport::from_config(config)),
        TransportKind::Memory => Arc::new(MemoryBroker::new()),
    }
}
