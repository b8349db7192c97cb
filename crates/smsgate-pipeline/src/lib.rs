// SPDX-FileCopyrightText: 2026 SmsGate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Business workflows on both sides of the queue.
//!
//! [`SendWorkflow`] charges the user and enqueues a message id.
//! [`ConsumeWorkflow`] is the [`DeliveryHandler`](smsgate_broker::DeliveryHandler)
//! that hands each queued message to the delivery provider and settles the
//! message and its ledger entry.

pub mod consume;
pub mod send;

pub use consume::{ConsumeOutcome, ConsumeWorkflow};
pub use send::{HistoryPage, MessagePublisher, SendReceipt, SendWorkflow};
