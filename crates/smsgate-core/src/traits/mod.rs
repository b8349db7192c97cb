// SPDX-FileCopyrightText: 2026 SmsGate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions.
//!
//! All adapters extend the [`PluginAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod broker;
pub mod provider;
pub mod storage;

pub use adapter::PluginAdapter;
pub use broker::{
    BrokerSession, BrokerTransport, Delivery, DeliveryAcker, DeliveryStream, SessionHandle,
    Topology,
};
pub use provider::DeliveryProvider;
pub use storage::StorageAdapter;
