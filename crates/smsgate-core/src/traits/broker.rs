// SPDX-FileCopyrightText: 2026 SmsGate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message broker transport traits.
//!
//! A [`BrokerTransport`] opens sessions; a [`BrokerSession`] publishes,
//! consumes, and reports queue backlog. Sessions surface out-of-band closure
//! through the `close_events` receiver handed back by [`BrokerTransport::open`].

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use tokio::sync::mpsc;

use crate::error::SmsGateError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{Disposition, QueueEnvelope};

/// Exchange and queues a session declares when it opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    /// Topic exchange name.
    pub exchange: String,
    /// Durable queues, each bound to the exchange under its own name.
    pub queues: Vec<String>,
}

/// Stream of deliveries from a consumed queue.
pub type DeliveryStream = Pin<Box<dyn Stream<Item = Result<Delivery, SmsGateError>> + Send>>;

/// A freshly opened session plus its close notification channel.
pub struct SessionHandle {
    pub session: Arc<dyn BrokerSession>,
    /// Receives one error when the broker closes the session unexpectedly.
    pub close_events: mpsc::UnboundedReceiver<SmsGateError>,
}

/// Opens sessions to a broker.
#[async_trait]
pub trait BrokerTransport: PluginAdapter {
    /// Dials the broker and declares `topology`.
    ///
    /// Fails with [`SmsGateError::Connectivity`] if the session cannot be
    /// established within `dial_timeout`.
    async fn open(
        &self,
        topology: &Topology,
        dial_timeout: Duration,
    ) -> Result<SessionHandle, SmsGateError>;
}

/// One live session to the broker.
#[async_trait]
pub trait BrokerSession: Send + Sync {
    /// Whether the session is still usable.
    fn is_open(&self) -> bool;

    /// Publishes `envelope` routed to `queue`, waiting for broker confirmation.
    async fn publish(&self, queue: &str, envelope: &QueueEnvelope) -> Result<(), SmsGateError>;

    /// Applies QoS `prefetch` and starts consuming `queue`.
    async fn consume(&self, queue: &str, prefetch: u16) -> Result<DeliveryStream, SmsGateError>;

    /// Number of ready messages waiting in `queue`.
    async fn backlog(&self, queue: &str) -> Result<u32, SmsGateError>;

    /// Releases the session. Calling it on a closed session is not an error.
    async fn close(&self) -> Result<(), SmsGateError>;
}

/// Settles a single delivery with the broker.
#[async_trait]
pub trait DeliveryAcker: Send + Sync {
    async fn ack(&self) -> Result<(), SmsGateError>;

    async fn reject(&self, requeue: bool) -> Result<(), SmsGateError>;
}

/// One unit of work handed from the broker to a consumer.
pub struct Delivery {
    pub delivery_tag: u64,
    pub queue: String,
    pub body: Vec<u8>,
    /// The envelope's type tag, if the publisher set one.
    pub message_type: Option<String>,
    pub redelivered: bool,
    acker: Box<dyn DeliveryAcker>,
}

impl Delivery {
    pub fn new(
        delivery_tag: u64,
        queue: impl Into<String>,
        body: Vec<u8>,
        message_type: Option<String>,
        redelivered: bool,
        acker: Box<dyn DeliveryAcker>,
    ) -> Self {
        Self {
            delivery_tag,
            queue: queue.into(),
            body,
            message_type,
            redelivered,
            acker,
        }
    }

    pub async fn ack(&self) -> Result<(), SmsGateError> {
        self.acker.ack().await
    }

    pub async fn reject(&self, requeue: bool) -> Result<(), SmsGateError> {
        self.acker.reject(requeue).await
    }

    /// Applies a handler's decision.
    pub async fn settle(&self, disposition: Disposition) -> Result<(), SmsGateError> {
        match disposition {
            Disposition::Ack => self.ack().await,
            Disposition::Reject { requeue } => self.reject(requeue).await,
        }
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("delivery_tag", &self.delivery_tag)
            .field("queue", &self.queue)
            .field("body", &String::from_utf8_lossy(&self.body))
            .field("message_type", &self.message_type)
            .field("redelivered", &self.redelivered)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingAcker {
        calls: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl DeliveryAcker for RecordingAcker {
        async fn ack(&self) -> Result<(), SmsGateError> {
            self.calls.lock().unwrap().push("ack".into());
            Ok(())
        }

        async fn reject(&self, requeue: bool) -> Result<(), SmsGateError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("reject:{requeue}"));
            Ok(())
        }
    }

    #[tokio::test]
    async fn settle_routes_to_acker() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let delivery = Delivery::new(
            1,
            "sms-gateway",
            b"5".to_vec(),
            Some("sms".into()),
            false,
            Box::new(RecordingAcker {
                calls: calls.clone(),
            }),
        );

        delivery.settle(Disposition::Ack).await.unwrap();
        delivery
            .settle(Disposition::Reject { requeue: false })
            .await
            .unwrap();

        assert_eq!(*calls.lock().unwrap(), vec!["ack", "reject:false"]);
    }

    #[test]
    fn debug_shows_body_as_text() {
        let delivery = Delivery::new(
            9,
            "q",
            b"42".to_vec(),
            None,
            true,
            Box::new(RecordingAcker::default()),
        );
        let out = format!("{delivery:?}");
        assert!(out.contains("\"42\""));
        assert!(out.contains("redelivered: true"));
    }
}
