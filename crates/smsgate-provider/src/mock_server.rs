// SPDX-FileCopyrightText: 2026 SmsGate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rate-limited stand-in for the carrier API.
//!
//! Accepts `requests_per_minute` sends per fixed one-minute window and answers
//! 429 for the rest of the window.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use smsgate_config::model::MockProviderConfig;
use smsgate_core::types::{DeliveryReport, ProviderResponse};
use smsgate_core::{MessageId, SmsGateError};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const WINDOW: Duration = Duration::from_secs(60);

/// Counts requests per fixed window and refuses those over the limit.
#[derive(Debug)]
pub struct FixedWindowLimiter {
    limit: u32,
    window: Duration,
    state: Mutex<WindowState>,
}

#[derive(Debug)]
struct WindowState {
    count: u32,
    reset_at: Instant,
}

impl FixedWindowLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            state: Mutex::new(WindowState {
                count: 0,
                reset_at: Instant::now() + window,
            }),
        }
    }

    /// Takes one slot from the current window, if any remain.
    pub fn try_acquire(&self) -> bool {
        let now = Instant::now();
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if now >= state.reset_at {
            state.count = 0;
            state.reset_at = now + self.window;
        }
        if state.count >= self.limit {
            return false;
        }
        state.count += 1;
        true
    }
}

#[derive(Debug, Deserialize)]
struct MockSendRequest {
    id: MessageId,
    receiver: String,
}

async fn send_sms(
    State(limiter): State<Arc<FixedWindowLimiter>>,
    Json(request): Json<MockSendRequest>,
) -> (StatusCode, Json<ProviderResponse>) {
    if !limiter.try_acquire() {
        debug!(message_id = request.id, "mock provider rate limit hit");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(ProviderResponse::declined("Too many requests")),
        );
    }
    debug!(message_id = request.id, receiver = %request.receiver, "mock provider accepted message");
    (StatusCode::OK, Json(ProviderResponse::accepted()))
}

async fn delivery_report(Path(id): Path<MessageId>) -> Json<DeliveryReport> {
    Json(DeliveryReport {
        message_id: id,
        status: "DELIVERED".to_string(),
        detail: None,
    })
}

/// Router allowing `requests_per_minute` sends per minute.
pub fn mock_router(requests_per_minute: u32) -> Router {
    router_with_limiter(Arc::new(FixedWindowLimiter::new(requests_per_minute, WINDOW)))
}

pub fn router_with_limiter(limiter: Arc<FixedWindowLimiter>) -> Router {
    Router::new()
        .route("/mock/sms", post(send_sms))
        .route("/mock/sms/{id}/report", get(delivery_report))
        .with_state(limiter)
}

/// Serves the mock provider until `cancel` fires.
pub async fn serve(config: &MockProviderConfig, cancel: CancellationToken) -> Result<(), SmsGateError> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| SmsGateError::Internal(format!("failed to bind mock provider to {addr}: {e}")))?;

    info!(%addr, limit = config.requests_per_minute, "mock provider listening");

    axum::serve(listener, mock_router(config.requests_per_minute))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .map_err(|e| SmsGateError::Internal(format!("mock provider server error: {e}")))
}
