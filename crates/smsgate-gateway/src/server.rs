// SPDX-FileCopyrightText: 2026 SmsGate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state for the gateway.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use smsgate_billing::AccountService;
use smsgate_broker::BrokerConnection;
use smsgate_config::model::GatewayConfig;
use smsgate_core::SmsGateError;
use smsgate_pipeline::SendWorkflow;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;

/// Health state for unauthenticated health/metrics endpoints.
#[derive(Clone)]
pub struct HealthState {
    /// Process start time for uptime calculation.
    pub start_time: std::time::Instant,
    /// Publisher connection whose state is reported on `/health`.
    pub broker: Option<Arc<BrokerConnection>>,
    /// Optional Prometheus metrics render function.
    pub prometheus_render: Option<Arc<dyn Fn() -> String + Send + Sync>>,
}

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub accounts: AccountService,
    pub send: SendWorkflow,
    pub health: HealthState,
}

/// All gateway routes over `state`.
pub fn build_router(state: GatewayState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::get_health))
        .route("/metrics", get(handlers::get_metrics));

    let api_routes = Router::new()
        .route("/api/user/create", post(handlers::create_user))
        .route("/api/user/update-credit", post(handlers::update_credit))
        .route("/api/sms/send", post(handlers::send_sms))
        .route("/api/sms/history", get(handlers::get_history));

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serves the gateway until `cancel` fires.
pub async fn start_server(
    config: &GatewayConfig,
    state: GatewayState,
    cancel: CancellationToken,
) -> Result<(), SmsGateError> {
    let app = build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| SmsGateError::Internal(format!("failed to bind gateway to {addr}: {e}")))?;

    tracing::info!("gateway listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .map_err(|e| SmsGateError::Internal(format!("gateway server error: {e}")))?;

    Ok(())
}
