// SPDX-FileCopyrightText: 2026 SmsGate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the gateway REST API.

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use smsgate_core::{ConnectionState, Message, MessageId, User, UserId};
use smsgate_pipeline::HistoryPage;

use crate::error::ApiError;
use crate::server::GatewayState;

/// Request body for POST /api/user/create.
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    pub phone_number: String,
}

/// Request body for POST /api/user/update-credit.
#[derive(Debug, Deserialize)]
pub struct UpdateCreditRequest {
    pub user_id: UserId,
    pub amount: i64,
}

/// Request body for POST /api/sms/send.
#[derive(Debug, Deserialize)]
pub struct SendSmsRequest {
    pub user_id: UserId,
    /// Receiver's phone number.
    pub phone_number: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct SendSmsResponse {
    pub message: &'static str,
    pub id: MessageId,
}

/// Query string for GET /api/sms/history.
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub user_id: UserId,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub page_size: Option<u32>,
}

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok" when the broker is connected (or not tracked), else "degraded".
    pub status: &'static str,
    pub version: String,
    pub uptime_secs: u64,
    pub broker: Option<ConnectionState>,
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| ApiError::invalid_input(rejection.body_text()))
}

/// POST /api/user/create
pub async fn create_user(
    State(state): State<GatewayState>,
    body: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let request = json_body(body)?;
    let user = state
        .accounts
        .create_user(&request.name, &request.phone_number)
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// POST /api/user/update-credit
pub async fn update_credit(
    State(state): State<GatewayState>,
    body: Result<Json<UpdateCreditRequest>, JsonRejection>,
) -> Result<Json<User>, ApiError> {
    let request = json_body(body)?;
    let user = state.accounts.top_up(request.user_id, request.amount).await?;
    Ok(Json(user))
}

/// POST /api/sms/send
///
/// Answers once the message id is on a queue; delivery happens later.
pub async fn send_sms(
    State(state): State<GatewayState>,
    body: Result<Json<SendSmsRequest>, JsonRejection>,
) -> Result<Json<SendSmsResponse>, ApiError> {
    let request = json_body(body)?;
    let receipt = state
        .send
        .send(request.user_id, &request.phone_number, &request.message)
        .await?;
    Ok(Json(SendSmsResponse {
        message: "message in queue",
        id: receipt.message_id,
    }))
}

/// GET /api/sms/history
pub async fn get_history(
    State(state): State<GatewayState>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let Query(query) = query.map_err(|rejection| ApiError::invalid_input(rejection.body_text()))?;
    let page = HistoryPage::new(query.page, query.page_size);
    let messages = state.send.history(query.user_id, page).await?;
    Ok(Json(messages))
}

/// GET /health
pub async fn get_health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    let broker = state.health.broker.as_ref().map(|conn| conn.state());
    let status = match broker {
        None | Some(ConnectionState::Connected) => "ok",
        Some(_) => "degraded",
    };
    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.health.start_time.elapsed().as_secs(),
        broker,
    })
}

/// GET /metrics
pub async fn get_metrics(State(state): State<GatewayState>) -> Response {
    match &state.health.prometheus_render {
        Some(render) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics disabled").into_response(),
    }
}
