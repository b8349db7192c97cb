// SPDX-FileCopyrightText: 2026 SmsGate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP gateway for SmsGate.
//!
//! Exposes account management, message sending and history over a JSON
//! API, plus unauthenticated `/health` and `/metrics` endpoints.

pub mod error;
pub mod handlers;
pub mod server;

pub use error::{ApiError, ErrorResponse};
pub use server::{GatewayState, HealthState, build_router, start_server};
