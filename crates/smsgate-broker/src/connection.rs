// SPDX-FileCopyrightText: 2026 SmsGate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A self-healing logical session to the broker.
//!
//! [`BrokerConnection`] owns at most one live [`BrokerSession`]. Out-of-band
//! close notifications from the session are forwarded to the reconnect
//! supervisor ([`BrokerConnection::run_supervisor`]), which reopens the
//! session immediately and then every `reconnect_backoff` until it succeeds
//! or the cancellation token fires. State changes are published on a
//! `watch` channel so consumers can wait for `Connected`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use smsgate_config::model::BrokerConfig;
use smsgate_core::traits::{BrokerSession, BrokerTransport, DeliveryStream, Topology};
use smsgate_core::{ConnectionState, QueueEnvelope, SmsGateError};
use tokio::sync::{Mutex, RwLock, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::machine::{ConnectionEvent, ConnectionMachine};

/// Timing knobs for a [`BrokerConnection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub dial_timeout: Duration,
    pub publish_timeout: Duration,
    pub reconnect_backoff: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            dial_timeout: Duration::from_secs(20),
            publish_timeout: Duration::from_millis(500),
            reconnect_backoff: Duration::from_secs(5),
        }
    }
}

impl ConnectionSettings {
    pub fn from_config(config: &BrokerConfig) -> Self {
        Self {
            dial_timeout: config.dial_timeout(),
            publish_timeout: config.publish_timeout(),
            reconnect_backoff: config.reconnect_backoff(),
        }
    }
}

/// Close notification tagged with the session generation it belongs to.
type LostSignal = (u64, SmsGateError);

pub struct BrokerConnection {
    name: String,
    transport: Arc<dyn BrokerTransport>,
    topology: Topology,
    settings: ConnectionSettings,
    machine: Mutex<ConnectionMachine>,
    session: RwLock<Option<Arc<dyn BrokerSession>>>,
    generation: AtomicU64,
    state_tx: watch::Sender<ConnectionState>,
    lost_tx: mpsc::UnboundedSender<LostSignal>,
    lost_rx: Mutex<Option<mpsc::UnboundedReceiver<LostSignal>>>,
}

impl BrokerConnection {
    /// Creates a disconnected connection. Nothing is dialed until
    /// [`connect`](Self::connect) or the supervisor runs.
    pub fn new(
        name: impl Into<String>,
        transport: Arc<dyn BrokerTransport>,
        topology: Topology,
        settings: ConnectionSettings,
    ) -> Arc<Self> {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (lost_tx, lost_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            name: name.into(),
            transport,
            topology,
            settings,
            machine: Mutex::new(ConnectionMachine::new()),
            session: RwLock::new(None),
            generation: AtomicU64::new(0),
            state_tx,
            lost_tx,
            lost_rx: Mutex::new(Some(lost_rx)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> ConnectionSettings {
        self.settings
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Receiver that observes every state transition.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    async fn transition(&self, event: ConnectionEvent) -> Result<ConnectionState, SmsGateError> {
        let mut machine = self.machine.lock().await;
        let next = machine.apply(event)?;
        self.state_tx.send_replace(next);
        Ok(next)
    }

    /// Opens a session and declares the topology.
    ///
    /// Fails with [`SmsGateError::Connectivity`] if the transport does not come
    /// up within the dial timeout, and with [`SmsGateError::Closed`] once the
    /// connection has been closed explicitly.
    pub async fn connect(&self) -> Result<(), SmsGateError> {
        self.transition(ConnectionEvent::ConnectRequested).await?;
        debug!(connection = %self.name, "connecting to broker");

        let dial_timeout = self.settings.dial_timeout;
        let opened = match tokio::time::timeout(
            dial_timeout,
            self.transport.open(&self.topology, dial_timeout),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(SmsGateError::Connectivity {
                message: format!("dial timed out after {dial_timeout:?}"),
                source: None,
            }),
        };

        let handle = match opened {
            Ok(handle) => handle,
            Err(e) => {
                self.transition(ConnectionEvent::ConnectFailed).await?;
                return Err(e);
            }
        };

        let generation = match self.install(&handle.session).await {
            Ok(generation) => generation,
            Err(e) => {
                // Closed while dialing.
                if let Err(close_err) = handle.session.close().await {
                    debug!(connection = %self.name, error = %close_err, "discarding late session");
                }
                return Err(e);
            }
        };

        let lost_tx = self.lost_tx.clone();
        let mut close_events = handle.close_events;
        tokio::spawn(async move {
            if let Some(err) = close_events.recv().await {
                let _ = lost_tx.send((generation, err));
            }
        });

        info!(connection = %self.name, generation, "broker connection established");
        Ok(())
    }

    /// Records `Established` and stores `session` under the machine lock, so a
    /// concurrent [`close`](Self::close) either sees the session or rejects it.
    async fn install(&self, session: &Arc<dyn BrokerSession>) -> Result<u64, SmsGateError> {
        let mut machine = self.machine.lock().await;
        let mut slot = self.session.write().await;
        match machine.apply(ConnectionEvent::Established)? {
            ConnectionState::Connected => {
                *slot = Some(session.clone());
                self.state_tx.send_replace(ConnectionState::Connected);
                Ok(self.generation.fetch_add(1, Ordering::SeqCst) + 1)
            }
            other => {
                self.state_tx.send_replace(other);
                Err(SmsGateError::Closed)
            }
        }
    }

    /// Returns a dial abandoned mid-flight to `Disconnected`.
    async fn abandon_dial(&self) {
        let mut machine = self.machine.lock().await;
        if machine.state() == ConnectionState::Connecting
            && let Ok(next) = machine.apply(ConnectionEvent::ConnectFailed)
        {
            self.state_tx.send_replace(next);
        }
    }

    /// Tears down the current session after an out-of-band close.
    async fn handle_lost(&self, reason: &SmsGateError) {
        warn!(connection = %self.name, error = %reason, "broker connection lost");
        let stale = self.session.write().await.take();
        if let Err(e) = self.transition(ConnectionEvent::Lost).await {
            debug!(connection = %self.name, error = %e, "ignoring lost signal");
        }
        if let Some(session) = stale
            && let Err(e) = session.close().await
        {
            debug!(connection = %self.name, error = %e, "stale session close failed");
        }
    }

    /// Reconnect supervisor. Runs until `cancel` fires or the connection is closed.
    ///
    /// Only one supervisor may run per connection; a second call returns at once.
    /// The session is left open on cancellation so in-flight deliveries can
    /// still be settled; call [`close`](Self::close) afterwards.
    pub async fn run_supervisor(self: Arc<Self>, cancel: CancellationToken) {
        let Some(mut lost_rx) = self.lost_rx.lock().await.take() else {
            warn!(connection = %self.name, "reconnect supervisor already running");
            return;
        };

        let mut established_once = self.state() == ConnectionState::Connected;

        'supervise: loop {
            while self.state() != ConnectionState::Connected {
                if cancel.is_cancelled() {
                    break 'supervise;
                }
                let attempt = tokio::select! {
                    _ = cancel.cancelled() => None,
                    result = self.connect() => Some(result),
                };
                let Some(attempt) = attempt else {
                    self.abandon_dial().await;
                    break 'supervise;
                };
                match attempt {
                    Ok(()) => {
                        if established_once {
                            smsgate_prometheus::record_reconnect(&self.name);
                            info!(connection = %self.name, "broker reconnected");
                        }
                        established_once = true;
                    }
                    Err(SmsGateError::Closed) => break 'supervise,
                    Err(e) => {
                        warn!(
                            connection = %self.name,
                            error = %e,
                            backoff_ms = self.settings.reconnect_backoff.as_millis() as u64,
                            "broker connect failed, retrying after backoff"
                        );
                        tokio::select! {
                            _ = cancel.cancelled() => break 'supervise,
                            _ = tokio::time::sleep(self.settings.reconnect_backoff) => {}
                        }
                    }
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break 'supervise,
                signal = lost_rx.recv() => match signal {
                    Some((generation, reason)) => {
                        if generation == self.generation.load(Ordering::SeqCst) {
                            self.handle_lost(&reason).await;
                        } else {
                            debug!(connection = %self.name, generation, "ignoring close of a replaced session");
                        }
                    }
                    None => break 'supervise,
                },
            }
        }

        *self.lost_rx.lock().await = Some(lost_rx);
        debug!(connection = %self.name, "reconnect supervisor stopped");
    }

    async fn live_session(&self) -> Result<Arc<dyn BrokerSession>, SmsGateError> {
        if self.machine.lock().await.is_terminated() {
            return Err(SmsGateError::Closed);
        }
        let session = self
            .session
            .read()
            .await
            .clone()
            .ok_or(SmsGateError::NotConnected)?;
        if !session.is_open() {
            return Err(SmsGateError::Closed);
        }
        Ok(session)
    }

    /// Publishes `envelope` to `queue` under the per-call publish timeout.
    ///
    /// Never retried here; the caller decides what to do with a failure.
    pub async fn publish(&self, queue: &str, envelope: &QueueEnvelope) -> Result<(), SmsGateError> {
        let session = self.live_session().await?;
        let timeout = self.settings.publish_timeout;
        match tokio::time::timeout(timeout, session.publish(queue, envelope)).await {
            Ok(result) => result,
            Err(_) => Err(SmsGateError::PublishTimeout {
                queue: queue.to_string(),
                timeout,
            }),
        }
    }

    /// Sets QoS and opens a delivery stream on `queue`.
    pub async fn consume(&self, queue: &str, prefetch: u16) -> Result<DeliveryStream, SmsGateError> {
        let session = self.live_session().await?;
        session.consume(queue, prefetch).await.map_err(|e| match e {
            e @ SmsGateError::Connectivity { .. } => e,
            other => SmsGateError::Connectivity {
                message: format!("cannot consume `{queue}`: {other}"),
                source: Some(Box::new(other)),
            },
        })
    }

    /// Ready message count of `queue`.
    pub async fn backlog(&self, queue: &str) -> Result<u32, SmsGateError> {
        self.live_session().await?.backlog(queue).await
    }

    /// Releases the session. Idempotent: closing twice only logs.
    pub async fn close(&self) -> Result<(), SmsGateError> {
        {
            let mut machine = self.machine.lock().await;
            if machine.is_terminated() {
                debug!(connection = %self.name, "broker connection already closed");
                return Ok(());
            }
            let next = machine.apply(ConnectionEvent::CloseRequested)?;
            self.state_tx.send_replace(next);
        }

        if let Some(session) = self.session.write().await.take()
            && let Err(e) = session.close().await
        {
            warn!(connection = %self.name, error = %e, "error while closing broker session");
        }

        self.transition(ConnectionEvent::Released).await?;
        info!(connection = %self.name, "broker connection closed");
        Ok(())
    }
}
