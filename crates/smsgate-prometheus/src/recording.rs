// SPDX-FileCopyrightText: 2026 SmsGate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade so any installed recorder collects these.
//! Without a recorder every call is a no-op.

use metrics::{describe_counter, describe_gauge, describe_histogram};

pub const MESSAGES_ENQUEUED: &str = "smsgate_messages_enqueued_total";
pub const DELIVERIES: &str = "smsgate_deliveries_total";
pub const DISPATCHER_IN_FLIGHT: &str = "smsgate_dispatcher_in_flight";
pub const PROVIDER_LATENCY: &str = "smsgate_provider_latency_seconds";
pub const BROKER_RECONNECTS: &str = "smsgate_broker_reconnects_total";
pub const CREDIT_DEBITED: &str = "smsgate_credit_debited_total";

/// Register all SmsGate metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_counter!(MESSAGES_ENQUEUED, "Messages published to a delivery queue");
    describe_counter!(DELIVERIES, "Deliveries settled, by queue and outcome");
    describe_gauge!(DISPATCHER_IN_FLIGHT, "Handlers currently running per queue");
    describe_histogram!(PROVIDER_LATENCY, "Delivery provider round-trip time in seconds");
    describe_counter!(BROKER_RECONNECTS, "Successful broker reconnections");
    describe_counter!(CREDIT_DEBITED, "Total credit debited by the send workflow");
}

/// Record a message published to `queue`.
pub fn record_enqueued(queue: &str) {
    metrics::counter!(MESSAGES_ENQUEUED, "queue" => queue.to_string()).increment(1);
}

/// Record a settled delivery. `outcome` is a short label such as `sent` or `requeued`.
pub fn record_delivery(queue: &str, outcome: &'static str) {
    metrics::counter!(DELIVERIES, "queue" => queue.to_string(), "outcome" => outcome)
        .increment(1);
}

/// Set the number of running handlers for `queue`.
pub fn set_in_flight(queue: &str, count: usize) {
    metrics::gauge!(DISPATCHER_IN_FLIGHT, "queue" => queue.to_string()).set(count as f64);
}

pub fn record_provider_latency(seconds: f64) {
    metrics::histogram!(PROVIDER_LATENCY).record(seconds);
}

pub fn record_reconnect(connection: &str) {
    metrics::counter!(BROKER_RECONNECTS, "connection" => connection.to_string()).increment(1);
}

/// Record credit taken from a user's balance.
pub fn record_credit_debited(amount: i64) {
    if amount > 0 {
        metrics::counter!(CREDIT_DEBITED).increment(amount as u64);
    }
}
