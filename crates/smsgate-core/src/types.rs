// SPDX-FileCopyrightText: 2026 SmsGate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared across adapter traits and workflows.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::SmsGateError;

/// Identifier of a persisted [`Message`].
pub type MessageId = i64;

/// Identifier of a persisted [`User`].
pub type UserId = i64;

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter behind a [`PluginAdapter`](crate::PluginAdapter).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Storage,
    Provider,
    Broker,
    Observability,
}

// --- Persistence entities ---

/// Delivery status of a [`Message`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    Pending,
    Sent,
    Failed,
}

/// A text message owned by a user, created at `Pending` by the send workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub user_id: UserId,
    /// Destination address.
    pub receiver: String,
    pub body: String,
    /// Credit charged for this message.
    pub cost: i64,
    pub status: MessageStatus,
    /// ISO 8601 timestamp.
    pub created_at: String,
    /// ISO 8601 timestamp.
    pub updated_at: String,
}

/// Fields required to persist a new [`Message`]; status starts at `Pending`.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub user_id: UserId,
    pub receiver: String,
    pub body: String,
    pub cost: i64,
}

/// Direction of a credit balance change.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerOperation {
    Increase,
    Decrease,
}

/// Settlement status of a [`LedgerEntry`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerStatus {
    Pending,
    Success,
    Failed,
}

/// Auditable record of a credit balance change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub user_id: UserId,
    pub message_id: Option<MessageId>,
    /// Signed amount: negative for `Decrease`, positive for `Increase`.
    pub amount: i64,
    pub operation: LedgerOperation,
    pub status: LedgerStatus,
    pub created_at: String,
    pub updated_at: String,
}

/// Fields required to persist a new [`LedgerEntry`].
#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub user_id: UserId,
    pub message_id: Option<MessageId>,
    pub amount: i64,
    pub operation: LedgerOperation,
    pub status: LedgerStatus,
}

impl NewLedgerEntry {
    /// A pending debit of `cost` tied to a message.
    pub fn debit(user_id: UserId, message_id: MessageId, cost: i64) -> Self {
        Self {
            user_id,
            message_id: Some(message_id),
            amount: -cost,
            operation: LedgerOperation::Decrease,
            status: LedgerStatus::Pending,
        }
    }

    /// A settled top-up of `amount`.
    pub fn top_up(user_id: UserId, amount: i64) -> Self {
        Self {
            user_id,
            message_id: None,
            amount,
            operation: LedgerOperation::Increase,
            status: LedgerStatus::Success,
        }
    }
}

/// A credit-holding account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub phone_number: String,
    /// Non-negative balance.
    pub credit: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// Fields required to create a [`User`]; credit starts at zero.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub phone_number: String,
}

// --- Broker wire unit ---

/// Type tag carried by every envelope.
pub const ENVELOPE_TYPE: &str = "sms";

/// Content type carried by every envelope.
pub const ENVELOPE_CONTENT_TYPE: &str = "text/plain";

/// The wire unit placed on a queue: the decimal message id plus metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEnvelope {
    pub body: Vec<u8>,
    pub message_type: String,
    pub content_type: String,
}

impl QueueEnvelope {
    /// Builds the envelope for a persisted message.
    pub fn for_message(id: MessageId) -> Self {
        Self {
            body: id.to_string().into_bytes(),
            message_type: ENVELOPE_TYPE.to_string(),
            content_type: ENVELOPE_CONTENT_TYPE.to_string(),
        }
    }

    /// Decodes the message identifier carried in the body.
    pub fn message_id(&self) -> Result<MessageId, SmsGateError> {
        parse_message_id(&self.body)
    }
}

/// Parses a delivery body as a decimal message identifier.
pub fn parse_message_id(body: &[u8]) -> Result<MessageId, SmsGateError> {
    let text = std::str::from_utf8(body).map_err(|e| SmsGateError::MalformedDelivery {
        reason: format!("body is not UTF-8: {e}"),
    })?;

    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(SmsGateError::MalformedDelivery {
            reason: format!("body `{text}` is not a decimal message id"),
        });
    }

    text.parse::<MessageId>()
        .map_err(|e| SmsGateError::MalformedDelivery {
            reason: format!("body `{text}` is out of range: {e}"),
        })
}

/// How a delivery should be settled with the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Remove the delivery permanently.
    Ack,
    /// Negatively acknowledge; `requeue` returns it for redelivery.
    Reject { requeue: bool },
}

impl std::fmt::Display for Disposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ack => write!(f, "ack"),
            Self::Reject { requeue } => write!(f, "reject(requeue={requeue})"),
        }
    }
}

/// Lifecycle state of a broker connection.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

// --- Provider types ---

/// Status value the provider returns on success.
pub const PROVIDER_OK_STATUS: &str = "ok";

/// Message value the provider returns on success.
pub const PROVIDER_OK_MESSAGE: &str = "sended";

/// The provider's answer to a send request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub status: String,
    pub message: String,
}

impl ProviderResponse {
    /// A response carrying the success indicator.
    pub fn accepted() -> Self {
        Self {
            status: PROVIDER_OK_STATUS.to_string(),
            message: PROVIDER_OK_MESSAGE.to_string(),
        }
    }

    /// A well-formed decline.
    pub fn declined(message: impl Into<String>) -> Self {
        Self {
            status: "fail".to_string(),
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == PROVIDER_OK_STATUS && self.message == PROVIDER_OK_MESSAGE
    }
}

/// Delivery report for a previously sent message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReport {
    pub message_id: MessageId,
    pub status: String,
    #[serde(default)]
    pub detail: Option<String>,
}
