// SPDX-FileCopyrightText: 2026 SmsGate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivery provider integration for SmsGate.
//!
//! [`HttpDeliveryProvider`] talks to the carrier's HTTP API. The
//! [`mock_server`] module serves a rate-limited stand-in for that API, used
//! by the `smsgate mock-provider` subcommand and by tests.

pub mod http;
pub mod mock_server;

pub use http::HttpDeliveryProvider;
pub use mock_server::{FixedWindowLimiter, mock_router};
