// SPDX-FileCopyrightText: 2026 SmsGate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process broker transport.
//!
//! Simulates durable queues, per-consumer prefetch, ack/reject with requeue,
//! and forced disconnects that return unacknowledged deliveries to their
//! queue. Used by `transport = "memory"` deployments and by tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use smsgate_core::traits::{
    BrokerSession, BrokerTransport, Delivery, DeliveryAcker, DeliveryStream, SessionHandle,
    Topology,
};
use smsgate_core::{AdapterType, Disposition, HealthStatus, PluginAdapter, QueueEnvelope, SmsGateError};
use tokio::sync::{mpsc, watch};
use tracing::debug;

/// A settled delivery, recorded for inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub queue: String,
    pub body: Vec<u8>,
    pub disposition: Disposition,
}

#[derive(Debug, Clone)]
struct StoredMessage {
    envelope: QueueEnvelope,
    redelivered: bool,
}

struct Unacked {
    session: u64,
    consumer: u64,
    queue: String,
    message: StoredMessage,
}

struct SessionEntry {
    open: Arc<AtomicBool>,
    close_tx: mpsc::UnboundedSender<SmsGateError>,
}

#[derive(Default)]
struct BrokerState {
    exchanges: HashSet<String>,
    queues: HashMap<String, VecDeque<StoredMessage>>,
    unacked: HashMap<u64, Unacked>,
    sessions: HashMap<u64, SessionEntry>,
    published: Vec<(String, QueueEnvelope)>,
    settlements: Vec<Settlement>,
    publish_delay: Option<Duration>,
    fail_backlog: bool,
}

impl BrokerState {
    /// Moves every unacked delivery owned by `session` back to the head of its queue.
    fn requeue_session(&mut self, session: u64) -> usize {
        let mut tags: Vec<u64> = self
            .unacked
            .iter()
            .filter(|(_, u)| u.session == session)
            .map(|(tag, _)| *tag)
            .collect();
        // Highest tag first so the oldest delivery ends up at the front.
        tags.sort_unstable_by(|a, b| b.cmp(a));
        for tag in &tags {
            self.return_to_queue(*tag);
        }
        tags.len()
    }

    fn return_to_queue(&mut self, tag: u64) -> bool {
        let Some(mut unacked) = self.unacked.remove(&tag) else {
            return false;
        };
        unacked.message.redelivered = true;
        self.queues
            .entry(unacked.queue)
            .or_default()
            .push_front(unacked.message);
        true
    }
}

struct Inner {
    state: Mutex<BrokerState>,
    version: watch::Sender<u64>,
    fail_connects: AtomicU32,
    next_session: AtomicU64,
    next_consumer: AtomicU64,
    next_tag: AtomicU64,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wakes every consumer pump.
    fn bump(&self) {
        self.version.send_modify(|v| *v = v.wrapping_add(1));
    }

    fn take_next(
        self: &Arc<Self>,
        session: u64,
        consumer: u64,
        queue: &str,
        prefetch: u16,
        open: &Arc<AtomicBool>,
    ) -> Option<Delivery> {
        let mut state = self.lock();
        if prefetch > 0 {
            let outstanding = state
                .unacked
                .values()
                .filter(|u| u.consumer == consumer)
                .count();
            if outstanding >= usize::from(prefetch) {
                return None;
            }
        }
        let message = state.queues.get_mut(queue)?.pop_front()?;
        let tag = self.next_tag.fetch_add(1, Ordering::SeqCst) + 1;
        let delivery = Delivery::new(
            tag,
            queue,
            message.envelope.body.clone(),
            Some(message.envelope.message_type.clone()),
            message.redelivered,
            Box::new(MemoryAcker {
                inner: self.clone(),
                tag,
                open: open.clone(),
            }),
        );
        state.unacked.insert(
            tag,
            Unacked {
                session,
                consumer,
                queue: queue.to_string(),
                message,
            },
        );
        Some(delivery)
    }
}

/// In-memory [`BrokerTransport`]. Cloning shares the same broker.
#[derive(Clone)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(BrokerState::default()),
                version,
                fail_connects: AtomicU32::new(0),
                next_session: AtomicU64::new(0),
                next_consumer: AtomicU64::new(0),
                next_tag: AtomicU64::new(0),
            }),
        }
    }

    /// Makes the next `n` session opens fail with a connectivity error.
    pub fn fail_next_connects(&self, n: u32) {
        self.inner.fail_connects.store(n, Ordering::SeqCst);
    }

    /// Delays every publish by `delay`, or removes the delay.
    pub fn set_publish_delay(&self, delay: Option<Duration>) {
        self.inner.lock().publish_delay = delay;
    }

    /// Makes backlog inspection fail.
    pub fn set_backlog_failure(&self, fail: bool) {
        self.inner.lock().fail_backlog = fail;
    }

    /// Drops every open session as if the broker went away.
    ///
    /// Each session receives a close event and its unacknowledged deliveries
    /// are requeued as redelivered.
    pub fn force_disconnect(&self) {
        let mut state = self.inner.lock();
        let sessions: Vec<(u64, SessionEntry)> = state.sessions.drain().collect();
        for (id, entry) in sessions {
            entry.open.store(false, Ordering::SeqCst);
            let requeued = state.requeue_session(id);
            let _ = entry.close_tx.send(SmsGateError::Connectivity {
                message: "connection reset by broker".into(),
                source: None,
            });
            debug!(session = id, requeued, "memory broker dropped session");
        }
        drop(state);
        self.inner.bump();
    }

    /// Places a raw body on `queue` without going through a session.
    pub fn inject(&self, queue: &str, body: &[u8]) {
        let envelope = QueueEnvelope {
            body: body.to_vec(),
            message_type: smsgate_core::types::ENVELOPE_TYPE.to_string(),
            content_type: smsgate_core::types::ENVELOPE_CONTENT_TYPE.to_string(),
        };
        self.inner
            .lock()
            .queues
            .entry(queue.to_string())
            .or_default()
            .push_back(StoredMessage {
                envelope,
                redelivered: false,
            });
        self.inner.bump();
    }

    /// Every envelope ever published to `queue`, in order.
    pub fn published(&self, queue: &str) -> Vec<QueueEnvelope> {
        self.inner
            .lock()
            .published
            .iter()
            .filter(|(q, _)| q == queue)
            .map(|(_, env)| env.clone())
            .collect()
    }

    /// Messages waiting in `queue`.
    pub fn ready(&self, queue: &str) -> usize {
        self.inner.lock().queues.get(queue).map_or(0, VecDeque::len)
    }

    pub fn unacked(&self) -> usize {
        self.inner.lock().unacked.len()
    }

    pub fn settlements(&self) -> Vec<Settlement> {
        self.inner.lock().settlements.clone()
    }

    pub fn open_sessions(&self) -> usize {
        self.inner.lock().sessions.len()
    }

    pub fn has_exchange(&self, name: &str) -> bool {
        self.inner.lock().exchanges.contains(name)
    }
}

#[async_trait]
impl PluginAdapter for MemoryBroker {
    fn name(&self) -> &str {
        "memory"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Broker
    }

    async fn health_check(&self) -> Result<HealthStatus, SmsGateError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), SmsGateError> {
        Ok(())
    }
}

#[async_trait]
impl BrokerTransport for MemoryBroker {
    async fn open(
        &self,
        topology: &Topology,
        _dial_timeout: Duration,
    ) -> Result<SessionHandle, SmsGateError> {
        let pending_failures = self.inner.fail_connects.load(Ordering::SeqCst);
        if pending_failures > 0 {
            self.inner
                .fail_connects
                .store(pending_failures - 1, Ordering::SeqCst);
            return Err(SmsGateError::Connectivity {
                message: "memory broker refused connection".into(),
                source: None,
            });
        }

        let id = self.inner.next_session.fetch_add(1, Ordering::SeqCst) + 1;
        let open = Arc::new(AtomicBool::new(true));
        let (close_tx, close_events) = mpsc::unbounded_channel();
        {
            let mut state = self.inner.lock();
            state.exchanges.insert(topology.exchange.clone());
            for queue in &topology.queues {
                state.queues.entry(queue.clone()).or_default();
            }
            state.sessions.insert(
                id,
                SessionEntry {
                    open: open.clone(),
                    close_tx,
                },
            );
        }
        debug!(session = id, "memory broker session opened");

        Ok(SessionHandle {
            session: Arc::new(MemorySession {
                id,
                inner: self.inner.clone(),
                open,
            }),
            close_events,
        })
    }
}

struct MemorySession {
    id: u64,
    inner: Arc<Inner>,
    open: Arc<AtomicBool>,
}

#[async_trait]
impl BrokerSession for MemorySession {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn publish(&self, queue: &str, envelope: &QueueEnvelope) -> Result<(), SmsGateError> {
        if !self.is_open() {
            return Err(SmsGateError::Closed);
        }
        let delay = self.inner.lock().publish_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        {
            let mut state = self.inner.lock();
            let Some(ready) = state.queues.get_mut(queue) else {
                return Err(SmsGateError::Publish {
                    queue: queue.to_string(),
                    message: "no queue bound for routing key".into(),
                    source: None,
                });
            };
            ready.push_back(StoredMessage {
                envelope: envelope.clone(),
                redelivered: false,
            });
            state.published.push((queue.to_string(), envelope.clone()));
        }
        self.inner.bump();
        Ok(())
    }

    async fn consume(&self, queue: &str, prefetch: u16) -> Result<DeliveryStream, SmsGateError> {
        if !self.is_open() {
            return Err(SmsGateError::Closed);
        }
        if !self.inner.lock().queues.contains_key(queue) {
            return Err(SmsGateError::not_found("queue", queue));
        }

        let consumer = self.inner.next_consumer.fetch_add(1, Ordering::SeqCst) + 1;
        let capacity = usize::from(prefetch.max(1));
        let (tx, rx) = mpsc::channel::<Result<Delivery, SmsGateError>>(capacity);
        let inner = self.inner.clone();
        let open = self.open.clone();
        let session = self.id;
        let queue = queue.to_string();

        tokio::spawn(async move {
            let mut version = inner.version.subscribe();
            loop {
                version.borrow_and_update();
                if !open.load(Ordering::SeqCst) {
                    break;
                }
                match inner.take_next(session, consumer, &queue, prefetch, &open) {
                    Some(delivery) => {
                        if let Err(mpsc::error::SendError(Ok(delivery))) = tx.send(Ok(delivery)).await {
                            inner.lock().return_to_queue(delivery.delivery_tag);
                            inner.bump();
                            break;
                        }
                    }
                    None => {
                        tokio::select! {
                            changed = version.changed() => {
                                if changed.is_err() {
                                    break;
                                }
                            }
                            _ = tx.closed() => break,
                        }
                    }
                }
            }
            debug!(session, consumer, queue = %queue, "memory consumer stopped");
        });

        Ok(Box::pin(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })))
    }

    async fn backlog(&self, queue: &str) -> Result<u32, SmsGateError> {
        if !self.is_open() {
            return Err(SmsGateError::Closed);
        }
        let state = self.inner.lock();
        if state.fail_backlog {
            return Err(SmsGateError::Connectivity {
                message: "queue inspection unavailable".into(),
                source: None,
            });
        }
        state
            .queues
            .get(queue)
            .map(|q| q.len() as u32)
            .ok_or_else(|| SmsGateError::not_found("queue", queue))
    }

    async fn close(&self) -> Result<(), SmsGateError> {
        if !self.open.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        {
            let mut state = self.inner.lock();
            state.sessions.remove(&self.id);
            state.requeue_session(self.id);
        }
        self.inner.bump();
        debug!(session = self.id, "memory broker session closed");
        Ok(())
    }
}

struct MemoryAcker {
    inner: Arc<Inner>,
    tag: u64,
    open: Arc<AtomicBool>,
}

impl MemoryAcker {
    fn settle(&self, disposition: Disposition) -> Result<(), SmsGateError> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(SmsGateError::Closed);
        }
        let mut state = self.inner.lock();
        let Some(unacked) = state.unacked.remove(&self.tag) else {
            return Err(SmsGateError::Internal(format!(
                "unknown delivery tag {}",
                self.tag
            )));
        };
        state.settlements.push(Settlement {
            queue: unacked.queue.clone(),
            body: unacked.message.envelope.body.clone(),
            disposition,
        });
        if disposition == (Disposition::Reject { requeue: true }) {
            let mut message = unacked.message;
            message.redelivered = true;
            state
                .queues
                .entry(unacked.queue)
                .or_default()
                .push_front(message);
        }
        drop(state);
        self.inner.bump();
        Ok(())
    }
}

#[async_trait]
impl DeliveryAcker for MemoryAcker {
    async fn ack(&self) -> Result<(), SmsGateError> {
        self.settle(Disposition::Ack)
    }

    async fn reject(&self, requeue: bool) -> Result<(), SmsGateError> {
        self.settle(Disposition::Reject { requeue })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn topology() -> Topology {
        Topology {
            exchange: "ex".into(),
            queues: vec!["q".into()],
        }
    }

    async fn open(broker: &MemoryBroker) -> SessionHandle {
        broker
            .open(&topology(), Duration::from_secs(1))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn open_declares_topology() {
        let broker = MemoryBroker::new();
        let _handle = open(&broker).await;
        assert!(broker.has_exchange("ex"));
        assert_eq!(broker.ready("q"), 0);
        assert_eq!(broker.open_sessions(), 1);
    }

    #[tokio::test]
    async fn publish_to_unbound_queue_fails() {
        let broker = MemoryBroker::new();
        let handle = open(&broker).await;
        let err = handle
            .session
            .publish("nope", &QueueEnvelope::for_message(1))
            .await
            .unwrap_err();
        assert!(matches!(err, SmsGateError::Publish { .. }));
    }

    #[tokio::test]
    async fn prefetch_limits_outstanding_deliveries() {
        let broker = MemoryBroker::new();
        let handle = open(&broker).await;
        for id in 1..=5 {
            handle
                .session
                .publish("q", &QueueEnvelope::for_message(id))
                .await
                .unwrap();
        }

        let mut stream = handle.session.consume("q", 2).await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        let _second = stream.next().await.unwrap().unwrap();
        tokio::task::yield_now().await;
        assert_eq!(broker.unacked(), 2);
        assert_eq!(broker.ready("q"), 3);

        first.ack().await.unwrap();
        let third = tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(third.body, b"3");
    }

    #[tokio::test]
    async fn requeued_delivery_comes_back_redelivered() {
        let broker = MemoryBroker::new();
        let handle = open(&broker).await;
        broker.inject("q", b"9");

        let mut stream = handle.session.consume("q", 1).await.unwrap();
        let delivery = stream.next().await.unwrap().unwrap();
        assert!(!delivery.redelivered);
        delivery.reject(true).await.unwrap();

        let again = stream.next().await.unwrap().unwrap();
        assert_eq!(again.body, b"9");
        assert!(again.redelivered);
        again.reject(false).await.unwrap();

        assert_eq!(broker.ready("q"), 0);
        assert_eq!(broker.unacked(), 0);
        let dispositions: Vec<_> = broker
            .settlements()
            .into_iter()
            .map(|s| s.disposition)
            .collect();
        assert_eq!(
            dispositions,
            vec![
                Disposition::Reject { requeue: true },
                Disposition::Reject { requeue: false }
            ]
        );
    }

    #[tokio::test]
    async fn force_disconnect_requeues_and_notifies() {
        let broker = MemoryBroker::new();
        let mut handle = open(&broker).await;
        broker.inject("q", b"1");
        broker.inject("q", b"2");

        let mut stream = handle.session.consume("q", 10).await.unwrap();
        let acked = stream.next().await.unwrap().unwrap();
        acked.ack().await.unwrap();
        let pending = stream.next().await.unwrap().unwrap();

        broker.force_disconnect();

        assert!(handle.close_events.recv().await.is_some());
        assert!(!handle.session.is_open());
        assert!(matches!(pending.ack().await, Err(SmsGateError::Closed)));
        assert!(stream.next().await.is_none());
        assert_eq!(broker.ready("q"), 1);
        assert_eq!(broker.unacked(), 0);
    }

    #[tokio::test]
    async fn explicit_close_sends_no_event() {
        let broker = MemoryBroker::new();
        let mut handle = open(&broker).await;
        handle.session.close().await.unwrap();
        handle.session.close().await.unwrap();
        assert!(handle.close_events.recv().await.is_none());
        assert_eq!(broker.open_sessions(), 0);
    }

    #[tokio::test]
    async fn refused_connects_are_counted_down() {
        let broker = MemoryBroker::new();
        broker.fail_next_connects(1);
        assert!(broker.open(&topology(), Duration::from_secs(1)).await.is_err());
        assert!(broker.open(&topology(), Duration::from_secs(1)).await.is_ok());
    }
}
