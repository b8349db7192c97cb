// SPDX-FileCopyrightText: 2026 SmsGate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the StorageAdapter trait.

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use smsgate_config::model::StorageConfig;
use smsgate_core::types::{
    LedgerEntry, LedgerStatus, Message, MessageId, MessageStatus, NewLedgerEntry, NewMessage,
    NewUser, User, UserId,
};
use smsgate_core::{AdapterType, HealthStatus, PluginAdapter, SmsGateError, StorageAdapter};

use crate::database::Database;
use crate::queries;

/// SQLite-backed storage adapter.
///
/// Wraps a [`Database`] handle and delegates to the typed query modules.
/// The database is opened on the first call to [`StorageAdapter::initialize`].
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    /// The connection is not opened until [`StorageAdapter::initialize`] is called.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    fn db(&self) -> Result<&Database, SmsGateError> {
        self.db.get().ok_or_else(|| SmsGateError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, SmsGateError> {
        let db = self.db()?;
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(crate::database::map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), SmsGateError> {
        if let Some(db) = self.db.get() {
            db.close().await?;
            debug!("storage shut down");
        }
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn initialize(&self) -> Result<(), SmsGateError> {
        let path = self.config.database_path.clone();
        let db = Database::open_with(&path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| SmsGateError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), SmsGateError> {
        self.db()?.close().await
    }

    // --- Users ---

    async fn create_user(&self, user: &NewUser) -> Result<User, SmsGateError> {
        queries::users::create_user(self.db()?, user).await
    }

    async fn get_user_by_id(&self, id: UserId) -> Result<Option<User>, SmsGateError> {
        queries::users::get_user(self.db()?, id).await
    }

    async fn increment_credit(&self, user_id: UserId, amount: i64) -> Result<(), SmsGateError> {
        queries::users::increment_credit(self.db()?, user_id, amount).await
    }

    async fn decrement_credit(&self, user_id: UserId, amount: i64) -> Result<(), SmsGateError> {
        queries::users::decrement_credit(self.db()?, user_id, amount).await
    }

    async fn has_sufficient_credit(
        &self,
        user_id: UserId,
        amount: i64,
    ) -> Result<bool, SmsGateError> {
        queries::users::has_sufficient_credit(self.db()?, user_id, amount).await
    }

    // --- Messages ---

    async fn create_message(&self, message: &NewMessage) -> Result<Message, SmsGateError> {
        queries::messages::create_message(self.db()?, message).await
    }

    async fn get_message_by_id(&self, id: MessageId) -> Result<Option<Message>, SmsGateError> {
        queries::messages::get_message(self.db()?, id).await
    }

    async fn update_message_status(
        &self,
        id: MessageId,
        status: MessageStatus,
    ) -> Result<bool, SmsGateError> {
        queries::messages::update_status(self.db()?, id, status).await
    }

    async fn list_messages_by_user(
        &self,
        user_id: UserId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Message>, SmsGateError> {
        queries::messages::list_by_user(self.db()?, user_id, limit, offset).await
    }

    // --- Ledger ---

    async fn create_ledger_entry(
        &self,
        entry: &NewLedgerEntry,
    ) -> Result<LedgerEntry, SmsGateError> {
        queries::ledger::create_entry(self.db()?, entry).await
    }

    async fn update_ledger_status_by_message_id(
        &self,
        message_id: MessageId,
        status: LedgerStatus,
    ) -> Result<bool, SmsGateError> {
        queries::ledger::update_status_by_message_id(self.db()?, message_id, status).await
    }

    async fn get_ledger_entry_by_message_id(
        &self,
        message_id: MessageId,
    ) -> Result<Option<LedgerEntry>, SmsGateError> {
        queries::ledger::get_by_message_id(self.db()?, message_id).await
    }
}
