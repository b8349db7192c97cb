// SPDX-FileCopyrightText: 2026 SmsGate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! User registration and credit top-ups.

use std::sync::Arc;

use smsgate_core::types::{NewLedgerEntry, NewUser};
use smsgate_core::{SmsGateError, StorageAdapter, User, UserId};
use tracing::info;

/// Phone numbers are exactly this many ASCII digits.
pub const PHONE_NUMBER_LEN: usize = 11;

const MAX_NAME_LEN: usize = 255;

fn validate_name(name: &str) -> Result<&str, SmsGateError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(SmsGateError::InvalidInput("name must not be empty".into()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(SmsGateError::InvalidInput(format!(
            "name must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(name)
}

fn validate_phone_number(phone_number: &str) -> Result<(), SmsGateError> {
    if phone_number.len() != PHONE_NUMBER_LEN || !phone_number.bytes().all(|b| b.is_ascii_digit()) {
        return Err(SmsGateError::InvalidInput(format!(
            "phone number must be {PHONE_NUMBER_LEN} digits"
        )));
    }
    Ok(())
}

/// Account operations over the storage adapter.
#[derive(Clone)]
pub struct AccountService {
    storage: Arc<dyn StorageAdapter>,
}

impl AccountService {
    pub fn new(storage: Arc<dyn StorageAdapter>) -> Self {
        Self { storage }
    }

    /// Registers a user with zero credit.
    ///
    /// A phone number that is already registered yields `Conflict`.
    pub async fn create_user(&self, name: &str, phone_number: &str) -> Result<User, SmsGateError> {
        let name = validate_name(name)?;
        validate_phone_number(phone_number)?;

        let user = self
            .storage
            .create_user(&NewUser {
                name: name.to_string(),
                phone_number: phone_number.to_string(),
            })
            .await?;
        info!(user_id = user.id, "user created");
        Ok(user)
    }

    pub async fn get_user(&self, user_id: UserId) -> Result<User, SmsGateError> {
        self.storage
            .get_user_by_id(user_id)
            .await?
            .ok_or_else(|| SmsGateError::not_found("user", user_id))
    }

    /// Adds `amount` to the balance and records a settled `Increase` entry.
    pub async fn top_up(&self, user_id: UserId, amount: i64) -> Result<User, SmsGateError> {
        if amount <= 0 {
            return Err(SmsGateError::InvalidInput(
                "top-up amount must be positive".into(),
            ));
        }

        self.storage.increment_credit(user_id, amount).await?;
        self.storage
            .create_ledger_entry(&NewLedgerEntry::top_up(user_id, amount))
            .await?;

        let user = self.get_user(user_id).await?;
        info!(user_id, amount, balance = user.credit, "credit topped up");
        Ok(user)
    }
}
