// SPDX-FileCopyrightText: 2026 SmsGate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage adapter trait for persistence backends.

use async_trait::async_trait;

use crate::error::SmsGateError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    LedgerEntry, LedgerStatus, Message, MessageId, MessageStatus, NewLedgerEntry, NewMessage,
    NewUser, User, UserId,
};

/// Adapter for the relational store behind users, messages, and the ledger.
///
/// Credit mutations are atomic increments/decrements evaluated by the
/// backend; implementations must never read-modify-write a balance.
#[async_trait]
pub trait StorageAdapter: PluginAdapter {
    /// Initializes the storage backend (migrations, connection, etc.).
    async fn initialize(&self) -> Result<(), SmsGateError>;

    /// Closes the storage backend, flushing pending writes.
    async fn close(&self) -> Result<(), SmsGateError>;

    // --- Users ---

    /// Creates a user with zero credit. Fails with `Conflict` on a duplicate phone number.
    async fn create_user(&self, user: &NewUser) -> Result<User, SmsGateError>;

    async fn get_user_by_id(&self, id: UserId) -> Result<Option<User>, SmsGateError>;

    /// Atomically adds `amount` to the user's credit.
    async fn increment_credit(&self, user_id: UserId, amount: i64) -> Result<(), SmsGateError>;

    /// Atomically subtracts `amount`, refusing to take the balance below zero.
    async fn decrement_credit(&self, user_id: UserId, amount: i64) -> Result<(), SmsGateError>;

    async fn has_sufficient_credit(
        &self,
        user_id: UserId,
        amount: i64,
    ) -> Result<bool, SmsGateError>;

    // --- Messages ---

    /// Persists a message at `Pending`.
    async fn create_message(&self, message: &NewMessage) -> Result<Message, SmsGateError>;

    async fn get_message_by_id(&self, id: MessageId) -> Result<Option<Message>, SmsGateError>;

    /// Moves a `Pending` message to `status`. `Ok(false)` means it was
    /// already settled and nothing changed; a missing message is `NotFound`.
    async fn update_message_status(
        &self,
        id: MessageId,
        status: MessageStatus,
    ) -> Result<bool, SmsGateError>;

    /// Lists a user's messages, newest first.
    async fn list_messages_by_user(
        &self,
        user_id: UserId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Message>, SmsGateError>;

    // --- Ledger ---

    async fn create_ledger_entry(
        &self,
        entry: &NewLedgerEntry,
    ) -> Result<LedgerEntry, SmsGateError>;

    /// Settles the `Pending` entry for `message_id`, with the same
    /// once-only contract as [`update_message_status`](Self::update_message_status).
    async fn update_ledger_status_by_message_id(
        &self,
        message_id: MessageId,
        status: LedgerStatus,
    ) -> Result<bool, SmsGateError>;

    async fn get_ledger_entry_by_message_id(
        &self,
        message_id: MessageId,
    ) -> Result<Option<LedgerEntry>, SmsGateError>;
}
