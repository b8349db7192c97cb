// SPDX-FileCopyrightText: 2026 SmsGate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the SmsGate delivery pipeline.
//!
//! This crate provides the trait definitions, error type, and domain types
//! shared by every other crate in the workspace. Storage backends, delivery
//! providers, and broker transports all implement traits defined here.

pub mod error;
pub mod traits;
pub mod types;

pub use error::SmsGateError;
pub use types::{
    AdapterType, ConnectionState, Disposition, HealthStatus, LedgerEntry, LedgerOperation,
    LedgerStatus, Message, MessageId, MessageStatus, QueueEnvelope, User, UserId,
};

pub use traits::{
    BrokerSession, BrokerTransport, Delivery, DeliveryProvider, PluginAdapter, StorageAdapter,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_type_round_trips_through_strings() {
        use std::str::FromStr;

        let variants = [
            AdapterType::Storage,
            AdapterType::Provider,
            AdapterType::Broker,
            AdapterType::Observability,
        ];

        for variant in &variants {
            let s = variant.to_string();
            let parsed = AdapterType::from_str(&s).expect("should parse back");
            assert_eq!(*variant, parsed);
        }
    }

    #[test]
    fn connection_state_display() {
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
        assert_eq!(ConnectionState::Closing.to_string(), "closing");
    }

    #[test]
    fn all_trait_modules_are_exported() {
        fn _assert_plugin_adapter<T: PluginAdapter>() {}
        fn _assert_storage_adapter<T: StorageAdapter>() {}
        fn _assert_delivery_provider<T: DeliveryProvider>() {}
        fn _assert_broker_transport<T: BrokerTransport>() {}
        fn _assert_broker_session<T: BrokerSession>() {}
    }
}
