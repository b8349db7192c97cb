// SPDX-FileCopyrightText: 2026 SmsGate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain model types for storage entities.
//!
//! The canonical types live in `smsgate-core::types` so adapters and
//! workflows share them. Re-exported here for convenience.

pub use smsgate_core::types::{
    LedgerEntry, LedgerOperation, LedgerStatus, Message, MessageStatus, NewLedgerEntry,
    NewMessage, NewUser, User,
};
