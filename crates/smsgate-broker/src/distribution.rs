// SPDX-FileCopyrightText: 2026 SmsGate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Backlog-aware routing across the main queue and two overflow queues.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use smsgate_config::model::BrokerConfig;
use smsgate_core::{QueueEnvelope, SmsGateError};
use tracing::{debug, warn};

use crate::connection::BrokerConnection;

/// Source of uniform draws in `1..=100`, one per routing decision.
pub trait PercentileSource: Send + Sync {
    /// The draw for the `call`-th overflow decision.
    fn percentile(&self, call: u64) -> u8;
}

/// Seeded generator decorrelated per call by mixing in the call counter.
#[derive(Debug, Clone, Copy)]
pub struct SeededPercentile {
    seed: u64,
}

impl SeededPercentile {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    pub fn from_entropy() -> Self {
        Self::new(rand::random())
    }
}

impl PercentileSource for SeededPercentile {
    fn percentile(&self, call: u64) -> u8 {
        let mixed = self.seed ^ call.wrapping_mul(0x9E37_79B9_7F4A_7C15);
        StdRng::seed_from_u64(mixed).gen_range(1..=100)
    }
}

/// The three queues a message may be routed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSet {
    pub main: String,
    pub overflow_a: String,
    pub overflow_b: String,
}

impl QueueSet {
    pub fn from_config(config: &BrokerConfig) -> Self {
        Self {
            main: config.main_queue.clone(),
            overflow_a: config.overflow_a_queue.clone(),
            overflow_b: config.overflow_b_queue.clone(),
        }
    }

    pub fn all(&self) -> [&str; 3] {
        [&self.main, &self.overflow_a, &self.overflow_b]
    }
}

pub struct QueueDistributionStrategy {
    connection: Arc<BrokerConnection>,
    queues: QueueSet,
    /// Main-queue backlog at which overflow routing starts.
    threshold: u32,
    /// Percentage of overflow traffic sent to `overflow_a`.
    overflow_a_weight: u8,
    source: Box<dyn PercentileSource>,
    calls: AtomicU64,
}

impl QueueDistributionStrategy {
    pub fn new(
        connection: Arc<BrokerConnection>,
        queues: QueueSet,
        threshold: u32,
        overflow_a_weight: u8,
        source: Box<dyn PercentileSource>,
    ) -> Self {
        Self {
            connection,
            queues,
            threshold,
            overflow_a_weight: overflow_a_weight.min(100),
            source,
            calls: AtomicU64::new(0),
        }
    }

    /// Threshold is `prefetch_count`; the seed comes from `rng_seed` or entropy.
    pub fn from_config(connection: Arc<BrokerConnection>, config: &BrokerConfig) -> Self {
        let source = config
            .rng_seed
            .map_or_else(SeededPercentile::from_entropy, SeededPercentile::new);
        Self::new(
            connection,
            QueueSet::from_config(config),
            u32::from(config.prefetch_count),
            config.overflow_a_weight,
            Box::new(source),
        )
    }

    pub fn queues(&self) -> &QueueSet {
        &self.queues
    }

    pub fn connection(&self) -> &Arc<BrokerConnection> {
        &self.connection
    }

    /// Picks an overflow queue by weighted draw.
    pub fn pick_overflow(&self) -> &str {
        let call = self.calls.fetch_add(1, Ordering::Relaxed);
        if self.source.percentile(call) <= self.overflow_a_weight {
            &self.queues.overflow_a
        } else {
            &self.queues.overflow_b
        }
    }

    /// Chooses the target queue for the next message.
    ///
    /// Backlog below the threshold routes to main. A failed backlog inspection
    /// also routes to main.
    pub async fn determine_queue(&self) -> &str {
        match self.connection.backlog(&self.queues.main).await {
            Ok(depth) if depth < self.threshold => &self.queues.main,
            Ok(depth) => {
                let queue = self.pick_overflow();
                debug!(depth, threshold = self.threshold, queue, "main queue backlogged");
                queue
            }
            Err(e) => {
                warn!(queue = %self.queues.main, error = %e, "backlog inspection failed, routing to main");
                &self.queues.main
            }
        }
    }

    /// Routes and publishes `envelope`, returning the chosen queue.
    ///
    /// Failures are wrapped with the chosen queue's name.
    pub async fn publish_to_queue(&self, envelope: &QueueEnvelope) -> Result<String, SmsGateError> {
        let queue = self.determine_queue().await;
        self.connection
            .publish(queue, envelope)
            .await
            .map_err(|e| e.on_queue(queue))?;
        smsgate_prometheus::record_enqueued(queue);
        Ok(queue.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionSettings;
    use crate::memory::MemoryBroker;
    use smsgate_core::traits::Topology;

    fn queue_set() -> QueueSet {
        QueueSet {
            main: "main".into(),
            overflow_a: "a".into(),
            overflow_b: "b".into(),
        }
    }

    async fn connected(broker: &MemoryBroker) -> Arc<BrokerConnection> {
        let set = queue_set();
        let conn = BrokerConnection::new(
            "publisher",
            Arc::new(broker.clone()),
            Topology {
                exchange: "ex".into(),
                queues: set.all().iter().map(|q| q.to_string()).collect(),
            },
            ConnectionSettings::default(),
        );
        conn.connect().await.unwrap();
        conn
    }

    struct Fixed(u8);

    impl PercentileSource for Fixed {
        fn percentile(&self, _call: u64) -> u8 {
            self.0
        }
    }

    #[tokio::test]
    async fn below_threshold_always_routes_to_main() {
        let broker = MemoryBroker::new();
        let conn = connected(&broker).await;
        let strategy = QueueDistributionStrategy::new(conn, queue_set(), 10, 90, Box::new(Fixed(1)));

        for depth in 0..10 {
            assert_eq!(broker.ready("main"), depth);
            assert_eq!(strategy.determine_queue().await, "main");
            assert_eq!(strategy.determine_queue().await, "main");
            broker.inject("main", b"1");
        }
    }

    #[tokio::test]
    async fn at_threshold_uses_weighted_draw() {
        let broker = MemoryBroker::new();
        let conn = connected(&broker).await;
        for _ in 0..10 {
            broker.inject("main", b"1");
        }

        let to_a = QueueDistributionStrategy::new(conn.clone(), queue_set(), 10, 90, Box::new(Fixed(90)));
        assert_eq!(to_a.determine_queue().await, "a");
        let to_b = QueueDistributionStrategy::new(conn, queue_set(), 10, 90, Box::new(Fixed(91)));
        assert_eq!(to_b.determine_queue().await, "b");
    }

    #[tokio::test]
    async fn inspection_failure_fails_open_to_main() {
        let broker = MemoryBroker::new();
        let conn = connected(&broker).await;
        for _ in 0..20 {
            broker.inject("main", b"1");
        }
        broker.set_backlog_failure(true);
        let strategy = QueueDistributionStrategy::new(conn, queue_set(), 10, 90, Box::new(Fixed(1)));
        assert_eq!(strategy.determine_queue().await, "main");
    }

    #[tokio::test]
    async fn disconnected_inspection_fails_open_to_main() {
        let broker = MemoryBroker::new();
        let conn = BrokerConnection::new(
            "p",
            Arc::new(broker),
            Topology {
                exchange: "ex".into(),
                queues: vec![],
            },
            ConnectionSettings::default(),
        );
        let strategy = QueueDistributionStrategy::new(conn, queue_set(), 0, 90, Box::new(Fixed(1)));
        assert_eq!(strategy.determine_queue().await, "main");
    }

    #[tokio::test]
    async fn overflow_ratio_converges_to_weight() {
        let broker = MemoryBroker::new();
        let conn = connected(&broker).await;
        let strategy = QueueDistributionStrategy::new(
            conn,
            queue_set(),
            0,
            90,
            Box::new(SeededPercentile::new(42)),
        );

        let trials = 10_000;
        let to_a = (0..trials).filter(|_| strategy.pick_overflow() == "a").count();
        let share = to_a as f64 / trials as f64;
        assert!((share - 0.90).abs() < 0.03, "overflow-A share was {share}");
    }

    #[test]
    fn seeded_draws_are_in_range_and_decorrelated() {
        let source = SeededPercentile::new(7);
        let draws: Vec<u8> = (0..1000).map(|call| source.percentile(call)).collect();
        assert!(draws.iter().all(|d| (1..=100).contains(d)));
        assert_eq!(source.percentile(5), SeededPercentile::new(7).percentile(5));
        let distinct: std::collections::HashSet<_> = draws.iter().collect();
        assert!(distinct.len() > 50);
    }

    #[tokio::test]
    async fn publish_failure_names_the_queue() {
        let broker = MemoryBroker::new();
        let conn = connected(&broker).await;
        let strategy = QueueDistributionStrategy::new(conn.clone(), queue_set(), 10, 90, Box::new(Fixed(1)));

        let queue = strategy
            .publish_to_queue(&QueueEnvelope::for_message(11))
            .await
            .unwrap();
        assert_eq!(queue, "main");
        assert_eq!(broker.published("main")[0].body, b"11");

        conn.close().await.unwrap();
        let err = strategy
            .publish_to_queue(&QueueEnvelope::for_message(12))
            .await
            .unwrap_err();
        assert!(matches!(err, SmsGateError::Queue { ref queue, .. } if queue == "main"));
        assert!(matches!(err.innermost(), SmsGateError::Closed));
    }
}
