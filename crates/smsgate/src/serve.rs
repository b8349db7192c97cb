// SPDX-FileCopyrightText: 2026 SmsGate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process wiring for the `serve`, `consume` and `mock-provider` commands.

use std::sync::Arc;

use smsgate_billing::{AccountService, FixedTariff};
use smsgate_broker::{
    BrokerConnection, ConnectionSettings, ConsumerGroup, QueueDistributionStrategy,
    transport_from_config,
};
use smsgate_config::SmsGateConfig;
use smsgate_config::model::{AppConfig, LogFormat, TransportKind};
use smsgate_core::traits::{BrokerTransport, Topology};
use smsgate_core::{SmsGateError, StorageAdapter};
use smsgate_gateway::{GatewayState, HealthState};
use smsgate_pipeline::{ConsumeWorkflow, SendWorkflow};
use smsgate_prometheus::PrometheusAdapter;
use smsgate_provider::HttpDeliveryProvider;
use smsgate_storage::SqliteStorage;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::shutdown;

/// Initialize the tracing subscriber with the configured level and format.
///
/// `RUST_LOG` overrides the configured level when set.
fn init_tracing(app: &AppConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("smsgate={level},warn", level = app.log_level))
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false);
    match app.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

async fn open_storage(config: &SmsGateConfig) -> Result<Arc<dyn StorageAdapter>, SmsGateError> {
    let storage = Arc::new(SqliteStorage::new(config.storage.clone()));
    storage.initialize().await?;
    info!(path = %config.storage.database_path, "storage initialized");
    Ok(storage)
}

/// Installs the Prometheus recorder when enabled. Failure only disables `/metrics`.
fn prometheus_render(config: &SmsGateConfig) -> Option<Arc<dyn Fn() -> String + Send + Sync>> {
    if !config.prometheus.enabled {
        return None;
    }
    match PrometheusAdapter::new() {
        Ok(adapter) => {
            let handle = adapter.handle().clone();
            Some(Arc::new(move || handle.render()))
        }
        Err(e) => {
            warn!(error = %e, "prometheus disabled");
            None
        }
    }
}

fn consumer_group(
    config: &SmsGateConfig,
    storage: Arc<dyn StorageAdapter>,
    transport: Arc<dyn BrokerTransport>,
) -> Result<ConsumerGroup, SmsGateError> {
    let provider = Arc::new(HttpDeliveryProvider::new(&config.provider)?);
    info!(base_url = provider.base_url(), "delivery provider configured");
    let consume = Arc::new(ConsumeWorkflow::new(
        storage,
        provider,
        config.provider.decline_policy,
    ));
    Ok(ConsumerGroup::from_config(&config.broker, transport, consume))
}

async fn close_storage(storage: &Arc<dyn StorageAdapter>) {
    if let Err(e) = storage.close().await {
        warn!(error = %e, "storage close failed");
    }
}

/// Runs the gateway and consumers until a shutdown signal arrives.
pub async fn run_serve(config: SmsGateConfig) -> Result<(), SmsGateError> {
    init_tracing(&config.app);
    info!(name = %config.app.name, version = env!("CARGO_PKG_VERSION"), "starting smsgate");

    let storage = open_storage(&config).await?;
    let render = prometheus_render(&config);
    let transport = transport_from_config(&config.broker);
    let cancel = shutdown::install_signal_handler();

    let publisher = BrokerConnection::new(
        "publisher",
        transport.clone(),
        Topology {
            exchange: config.broker.exchange.clone(),
            queues: config.broker.queue_names(),
        },
        ConnectionSettings::from_config(&config.broker),
    );
    let supervisor = tokio::spawn(publisher.clone().run_supervisor(cancel.clone()));

    let strategy = Arc::new(QueueDistributionStrategy::from_config(
        publisher.clone(),
        &config.broker,
    ));
    let tariff = Arc::new(FixedTariff::from_config(&config.billing));
    let state = GatewayState {
        accounts: AccountService::new(storage.clone()),
        send: SendWorkflow::new(storage.clone(), strategy, tariff),
        health: HealthState {
            start_time: std::time::Instant::now(),
            broker: Some(publisher.clone()),
            prometheus_render: render,
        },
    };

    let consumers = tokio::spawn(
        consumer_group(&config, storage.clone(), transport)?.run(cancel.clone()),
    );

    let served = smsgate_gateway::start_server(&config.gateway, state, cancel.clone()).await;
    if let Err(e) = &served {
        error!(error = %e, "gateway stopped with error");
    }
    cancel.cancel();

    match consumers.await {
        Ok(Err(e)) => warn!(error = %e, "consumers stopped with error"),
        Err(e) => error!(error = %e, "consumer task failed"),
        Ok(Ok(())) => {}
    }
    if let Err(e) = supervisor.await {
        error!(error = %e, "publisher supervisor task failed");
    }
    publisher.close().await?;
    close_storage(&storage).await;

    info!("smsgate stopped");
    served
}

/// A standalone consumer needs a broker other processes can publish to.
///
/// The in-memory transport lives inside one process, so it only works under
/// `serve`, where the publisher and consumers share it.
fn require_shared_transport(config: &SmsGateConfig) -> Result<(), SmsGateError> {
    match config.broker.transport {
        TransportKind::Amqp => Ok(()),
        TransportKind::Memory => Err(SmsGateError::Config(
            "`consume` requires broker.transport = \"amqp\"; the memory transport is only reachable from `serve`".into(),
        )),
    }
}

/// Runs only the queue consumers.
pub async fn run_consume(config: SmsGateConfig) -> Result<(), SmsGateError> {
    require_shared_transport(&config)?;
    init_tracing(&config.app);
    info!(name = %config.app.name, "starting consumers");

    let storage = open_storage(&config).await?;
    let _render = prometheus_render(&config);
    let transport = transport_from_config(&config.broker);
    let cancel = shutdown::install_signal_handler();

    let result = consumer_group(&config, storage.clone(), transport)?
        .run(cancel)
        .await;
    close_storage(&storage).await;

    info!("consumers stopped");
    result
}

/// Runs the mock provider until a shutdown signal arrives.
pub async fn run_mock_provider(config: SmsGateConfig) -> Result<(), SmsGateError> {
    init_tracing(&config.app);
    let cancel = shutdown::install_signal_handler();
    smsgate_provider::mock_server::serve(&config.mock_provider, cancel).await
}
