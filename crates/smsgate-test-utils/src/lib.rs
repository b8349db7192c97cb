// SPDX-FileCopyrightText: 2026 SmsGate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for SmsGate integration tests.
//!
//! Provides a scripted delivery provider and a harness that wires temp
//! SQLite storage, the in-memory broker, and both workflows together so the
//! whole pipeline runs without external services.
//!
//! # Components
//!
//! - [`MockDeliveryProvider`] - Delivery provider answering from a script
//! - [`TestHarness`] - Fully wired pipeline over temp storage and an in-memory broker

pub mod harness;
pub mod mock_provider;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_provider::{MockDeliveryProvider, MockOutcome};
