// SPDX-FileCopyrightText: 2026 SmsGate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the SmsGate delivery pipeline.

use std::time::Duration;

use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The primary error type used across all SmsGate adapter traits and workflows.
#[derive(Debug, Error)]
pub enum SmsGateError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Persistence failures (connection, query, constraint, serialization).
    #[error("storage error: {source}")]
    Storage { source: BoxError },

    /// The broker could not be reached or the session could not be set up.
    #[error("broker connectivity error: {message}")]
    Connectivity {
        message: String,
        source: Option<BoxError>,
    },

    /// No live broker session exists.
    #[error("broker session is not connected")]
    NotConnected,

    /// The broker session reports itself closed.
    #[error("broker session is closed")]
    Closed,

    /// A publish did not complete within its per-call deadline.
    #[error("publish to `{queue}` timed out after {timeout:?}")]
    PublishTimeout { queue: String, timeout: Duration },

    /// The broker refused or failed a publish.
    #[error("publish to `{queue}` failed: {message}")]
    Publish {
        queue: String,
        message: String,
        source: Option<BoxError>,
    },

    /// A failure raised while operating on a specific queue.
    #[error("queue `{queue}`: {source}")]
    Queue {
        queue: String,
        source: Box<SmsGateError>,
    },

    /// A delivery body could not be decoded into a message identifier.
    #[error("malformed delivery: {reason}")]
    MalformedDelivery { reason: String },

    /// The delivery provider could not be reached or returned no usable answer.
    #[error("provider transport error: {message}")]
    ProviderTransport {
        message: String,
        source: Option<BoxError>,
    },

    /// The delivery provider answered with an explicit decline.
    #[error("provider declined message: status={status} message={message}")]
    ProviderDeclined { status: String, message: String },

    /// The user's balance does not cover the cost of the operation.
    #[error("insufficient credit for user {user_id}: {required} required")]
    InsufficientCredit { user_id: i64, required: i64 },

    /// A referenced entity does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// A uniqueness constraint was violated.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Caller supplied invalid input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SmsGateError {
    /// Shorthand for a [`SmsGateError::NotFound`].
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Wraps this error with the name of the queue it occurred on.
    pub fn on_queue(self, queue: &str) -> Self {
        Self::Queue {
            queue: queue.to_string(),
            source: Box::new(self),
        }
    }

    /// Strips any [`SmsGateError::Queue`] wrappers.
    pub fn innermost(&self) -> &SmsGateError {
        match self {
            Self::Queue { source, .. } => source.innermost(),
            other => other,
        }
    }

    /// Whether the failure is infrastructure-transient and may succeed on retry.
    ///
    /// Business and validation errors are never transient.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Storage { .. }
            | Self::Connectivity { .. }
            | Self::NotConnected
            | Self::Closed
            | Self::PublishTimeout { .. }
            | Self::Publish { .. }
            | Self::ProviderTransport { .. }
            | Self::Timeout { .. } => true,
            Self::Queue { source, .. } => source.is_transient(),
            Self::Config(_)
            | Self::MalformedDelivery { .. }
            | Self::ProviderDeclined { .. }
            | Self::InsufficientCredit { .. }
            | Self::NotFound { .. }
            | Self::Conflict(_)
            | Self::InvalidInput(_)
            | Self::Internal(_) => false,
        }
    }
}
