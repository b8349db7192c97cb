// SPDX-FileCopyrightText: 2026 SmsGate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded worker pool that turns a delivery stream into concurrent handler runs.
//!
//! Each delivery must acquire one of `pool_size` semaphore slots before its
//! handler is spawned, so at most `pool_size` handlers ever run at once and a
//! saturated pool stops pulling from the stream. Handler panics are caught per
//! task and converted into a permanent rejection.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::{FutureExt, StreamExt};
use smsgate_core::traits::{Delivery, DeliveryStream};
use smsgate_core::{Disposition, SmsGateError};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Per-delivery business logic run by a [`DeliveryDispatcher`].
#[async_trait]
pub trait DeliveryHandler: Send + Sync + 'static {
    /// Decides how `delivery` is settled. The dispatcher performs the settlement.
    async fn handle(&self, delivery: &Delivery) -> Disposition;
}

pub struct DeliveryDispatcher {
    queue: String,
    pool_size: usize,
    slots: Arc<Semaphore>,
    handler: Arc<dyn DeliveryHandler>,
}

impl DeliveryDispatcher {
    /// A pool size of zero is treated as one.
    pub fn new(queue: impl Into<String>, pool_size: usize, handler: Arc<dyn DeliveryHandler>) -> Self {
        let pool_size = pool_size.max(1);
        Self {
            queue: queue.into(),
            pool_size,
            slots: Arc::new(Semaphore::new(pool_size)),
            handler,
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Handlers currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.pool_size - self.slots.available_permits()
    }

    /// Pulls deliveries until the stream ends, yields an error, or `cancel` fires,
    /// then waits for every in-flight handler to finish.
    ///
    /// A delivery pulled while cancellation arrives before it gets a slot is
    /// rejected with requeue.
    pub async fn run(
        &self,
        mut deliveries: DeliveryStream,
        cancel: &CancellationToken,
    ) -> Result<(), SmsGateError> {
        let mut tasks = JoinSet::new();
        debug!(queue = %self.queue, pool_size = self.pool_size, "dispatcher started");

        let outcome = loop {
            while let Some(joined) = tasks.try_join_next() {
                log_join(&self.queue, joined);
            }

            let delivery = tokio::select! {
                biased;
                _ = cancel.cancelled() => break Ok(()),
                next = deliveries.next() => match next {
                    Some(Ok(delivery)) => delivery,
                    Some(Err(e)) => break Err(e),
                    None => {
                        info!(queue = %self.queue, "delivery stream ended");
                        break Ok(());
                    }
                },
            };

            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    if let Err(e) = delivery.reject(true).await {
                        warn!(queue = %self.queue, error = %e, "requeue on shutdown failed");
                    }
                    break Ok(());
                }
                permit = self.slots.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => {
                        let _ = delivery.reject(true).await;
                        break Err(SmsGateError::Internal("dispatcher pool closed".into()));
                    }
                },
            };
            smsgate_prometheus::set_in_flight(&self.queue, self.in_flight());

            let handler = self.handler.clone();
            let slots = self.slots.clone();
            let queue = self.queue.clone();
            let pool_size = self.pool_size;
            tasks.spawn(async move {
                let disposition = match AssertUnwindSafe(handler.handle(&delivery))
                    .catch_unwind()
                    .await
                {
                    Ok(disposition) => disposition,
                    Err(panic) => {
                        error!(
                            queue = %queue,
                            delivery_tag = delivery.delivery_tag,
                            panic = %panic_message(&*panic),
                            "delivery handler panicked, rejecting without requeue"
                        );
                        smsgate_prometheus::record_delivery(&queue, "panicked");
                        Disposition::Reject { requeue: false }
                    }
                };

                if let Err(e) = delivery.settle(disposition).await {
                    warn!(
                        queue = %queue,
                        delivery_tag = delivery.delivery_tag,
                        %disposition,
                        error = %e,
                        "failed to settle delivery"
                    );
                }

                drop(permit);
                smsgate_prometheus::set_in_flight(&queue, pool_size - slots.available_permits());
            });
        };

        drop(deliveries);
        while let Some(joined) = tasks.join_next().await {
            log_join(&self.queue, joined);
        }
        debug!(queue = %self.queue, "dispatcher drained");
        outcome
    }
}

fn log_join(queue: &str, joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        error!(queue, error = %e, "dispatcher task failed");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBroker;
    use smsgate_core::traits::{BrokerTransport, Topology};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tracing_test::traced_test;

    fn topology() -> Topology {
        Topology {
            exchange: "ex".into(),
            queues: vec!["q".into()],
        }
    }

    /// Acks everything; panics on body "boom".
    struct Scripted {
        running: AtomicUsize,
        peak: AtomicUsize,
        hold: Duration,
    }

    impl Scripted {
        fn new(hold: Duration) -> Arc<Self> {
            Arc::new(Self {
                running: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                hold,
            })
        }
    }

    #[async_trait]
    impl DeliveryHandler for Scripted {
        async fn handle(&self, delivery: &Delivery) -> Disposition {
            if delivery.body == b"boom" {
                panic!("handler exploded");
            }
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.hold).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            Disposition::Ack
        }
    }

    async fn wait_until(mut f: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !f() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition reached");
    }

    #[tokio::test]
    #[traced_test]
    async fn panic_becomes_single_permanent_reject() {
        let broker = MemoryBroker::new();
        let handle = broker.open(&topology(), Duration::from_secs(1)).await.unwrap();
        broker.inject("q", b"1");
        broker.inject("q", b"boom");
        broker.inject("q", b"2");

        let handler = Scripted::new(Duration::from_millis(1));
        let dispatcher = Arc::new(DeliveryDispatcher::new("q", 2, handler));
        assert_eq!(dispatcher.in_flight(), 0);

        let stream = handle.session.consume("q", 10).await.unwrap();
        let cancel = CancellationToken::new();
        let run = {
            let dispatcher = dispatcher.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { dispatcher.run(stream, &cancel).await })
        };

        wait_until(|| broker.settlements().len() == 3).await;
        cancel.cancel();
        run.await.unwrap().unwrap();

        let settlements = broker.settlements();
        let rejects: Vec<_> = settlements
            .iter()
            .filter(|s| s.disposition == Disposition::Reject { requeue: false })
            .collect();
        assert_eq!(rejects.len(), 1);
        assert_eq!(rejects[0].body, b"boom");
        assert_eq!(
            settlements
                .iter()
                .filter(|s| s.disposition == Disposition::Ack)
                .count(),
            2
        );
        assert_eq!(dispatcher.in_flight(), 0);
        assert!(logs_contain("delivery handler panicked"));
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_pool_size() {
        let broker = MemoryBroker::new();
        let handle = broker.open(&topology(), Duration::from_secs(1)).await.unwrap();
        for i in 0..20 {
            broker.inject("q", i.to_string().as_bytes());
        }

        let handler = Scripted::new(Duration::from_millis(10));
        let dispatcher = DeliveryDispatcher::new("q", 3, handler.clone());
        let stream = handle.session.consume("q", 50).await.unwrap();
        let cancel = CancellationToken::new();

        let watcher = {
            let broker = broker.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                while broker.settlements().len() < 20 {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
                cancel.cancel();
            })
        };

        dispatcher.run(stream, &cancel).await.unwrap();
        watcher.await.unwrap();

        assert_eq!(broker.settlements().len(), 20);
        assert!(handler.peak.load(Ordering::SeqCst) <= 3);
        assert!(handler.peak.load(Ordering::SeqCst) >= 2);
        assert_eq!(dispatcher.in_flight(), 0);
    }

    #[tokio::test]
    async fn cancellation_lets_in_flight_handlers_finish() {
        let broker = MemoryBroker::new();
        let handle = broker.open(&topology(), Duration::from_secs(1)).await.unwrap();
        broker.inject("q", b"1");

        let handler = Scripted::new(Duration::from_millis(200));
        let dispatcher = DeliveryDispatcher::new("q", 1, handler.clone());
        let stream = handle.session.consume("q", 1).await.unwrap();
        let cancel = CancellationToken::new();

        let canceller = {
            let handler = handler.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                while handler.running.load(Ordering::SeqCst) == 0 {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
                cancel.cancel();
            })
        };

        dispatcher.run(stream, &cancel).await.unwrap();
        canceller.await.unwrap();

        let settlements = broker.settlements();
        assert_eq!(settlements.len(), 1);
        assert_eq!(settlements[0].disposition, Disposition::Ack);
    }

    #[tokio::test]
    async fn stream_end_returns_ok() {
        let broker = MemoryBroker::new();
        let handle = broker.open(&topology(), Duration::from_secs(1)).await.unwrap();
        let dispatcher = DeliveryDispatcher::new("q", 0, Scripted::new(Duration::ZERO));
        assert_eq!(dispatcher.pool_size(), 1);

        let stream = handle.session.consume("q", 1).await.unwrap();
        broker.force_disconnect();
        let cancel = CancellationToken::new();
        dispatcher.run(stream, &cancel).await.unwrap();
    }
}
