// SPDX-FileCopyrightText: 2026 SmsGate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mapping from [`SmsGateError`] to HTTP responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use smsgate_core::SmsGateError;
use tracing::error;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error description.
    pub error: String,
    /// Stable machine-readable code.
    pub code: &'static str,
}

/// Handler error carrying the status, code and message sent to the client.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "INVALID_INPUT",
            message: message.into(),
        }
    }
}

impl From<SmsGateError> for ApiError {
    fn from(err: SmsGateError) -> Self {
        let (status, code) = match err.innermost() {
            SmsGateError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
            SmsGateError::InsufficientCredit { .. } => {
                (StatusCode::PAYMENT_REQUIRED, "INSUFFICIENT_CREDIT")
            }
            SmsGateError::NotFound { entity: "user", .. } => {
                (StatusCode::NOT_FOUND, "USER_NOT_FOUND")
            }
            SmsGateError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            SmsGateError::Conflict(_) => (StatusCode::CONFLICT, "USER_ALREADY_EXISTS"),
            e if e.is_transient() => (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %err, "request failed");
            "Internal server error".to_string()
        } else {
            err.to_string()
        };

        Self {
            status,
            code,
            message,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
                code: self.code,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn business_errors_map_to_client_statuses() {
        let cases = [
            (SmsGateError::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (
                SmsGateError::InsufficientCredit {
                    user_id: 1,
                    required: 1000,
                },
                StatusCode::PAYMENT_REQUIRED,
            ),
            (SmsGateError::not_found("user", 1), StatusCode::NOT_FOUND),
            (SmsGateError::Conflict("dup".into()), StatusCode::CONFLICT),
            (
                SmsGateError::NotConnected.on_queue("main"),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                SmsGateError::Internal("boom".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }

    #[test]
    fn internal_details_are_not_leaked() {
        let api = ApiError::from(SmsGateError::Internal("secret path".into()));
        assert_eq!(api.message, "Internal server error");
        assert_eq!(api.code, "INTERNAL_ERROR");
    }

    #[test]
    fn error_response_serializes() {
        let json = serde_json::to_string(&ErrorResponse {
            error: "user 1 not found".into(),
            code: "USER_NOT_FOUND",
        })
        .unwrap();
        assert_eq!(json, r#"{"error":"user 1 not found","code":"USER_NOT_FOUND"}"#);
    }
}
