// SPDX-FileCopyrightText: 2026 SmsGate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivery provider trait for the external SMS carrier.

use async_trait::async_trait;

use crate::error::SmsGateError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{DeliveryReport, Message, ProviderResponse};

/// Adapter for the external service that actually delivers messages.
///
/// `send` returns `Ok` for any well-formed answer, including declines; only
/// transport-level failures surface as [`SmsGateError::ProviderTransport`].
#[async_trait]
pub trait DeliveryProvider: PluginAdapter {
    async fn send(&self, message: &Message) -> Result<ProviderResponse, SmsGateError>;

    async fn delivery_report(&self, message: &Message) -> Result<DeliveryReport, SmsGateError>;
}
