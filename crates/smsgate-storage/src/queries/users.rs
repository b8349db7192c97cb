// SPDX-FileCopyrightText: 2026 SmsGate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! User and credit balance operations.
//!
//! Balances only change through single `UPDATE ... SET credit = credit ± ?`
//! statements so concurrent debits never lose updates.

use rusqlite::{params, OptionalExtension};
use smsgate_core::types::{NewUser, User, UserId};
use smsgate_core::SmsGateError;

use crate::database::{map_tr_err, Database, NOW};

const USER_COLUMNS: &str = "id, name, phone_number, credit, created_at, updated_at";

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        phone_number: row.get(2)?,
        credit: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

/// Insert a user with zero credit. Returns `Conflict` if the phone number is taken.
pub async fn create_user(db: &Database, user: &NewUser) -> Result<User, SmsGateError> {
    let name = user.name.clone();
    let phone_number = user.phone_number.clone();
    let inserted = db
        .connection()
        .call(move |conn| {
            match conn.execute(
                "INSERT INTO users (name, phone_number) VALUES (?1, ?2)",
                params![name, phone_number],
            ) {
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    return Ok(None);
                }
                other => {
                    other?;
                }
            }
            let id = conn.last_insert_rowid();
            let user = conn.query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id],
                row_to_user,
            )?;
            Ok(Some(user))
        })
        .await
        .map_err(map_tr_err)?;

    inserted.ok_or_else(|| {
        SmsGateError::Conflict(format!(
            "a user with phone number {} already exists",
            user.phone_number
        ))
    })
}

/// Get a user by ID.
pub async fn get_user(db: &Database, id: UserId) -> Result<Option<User>, SmsGateError> {
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id],
                row_to_user,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Atomically add `amount` to a user's credit.
pub async fn increment_credit(
    db: &Database,
    user_id: UserId,
    amount: i64,
) -> Result<(), SmsGateError> {
    let updated = db
        .connection()
        .call(move |conn| {
            conn.execute(
                &format!(
                    "UPDATE users SET credit = credit + ?1, updated_at = {NOW} WHERE id = ?2"
                ),
                params![amount, user_id],
            )
        })
        .await
        .map_err(map_tr_err)?;

    if updated == 0 {
        return Err(SmsGateError::not_found("user", user_id));
    }
    Ok(())
}

/// Atomically subtract `amount` from a user's credit.
///
/// The balance guard lives in the same statement, so a debit that would take
/// the balance below zero changes nothing and fails with `InsufficientCredit`.
pub async fn decrement_credit(
    db: &Database,
    user_id: UserId,
    amount: i64,
) -> Result<(), SmsGateError> {
    let (updated, exists) = db
        .connection()
        .call(move |conn| {
            let updated = conn.execute(
                &format!(
                    "UPDATE users SET credit = credit - ?1, updated_at = {NOW} \
                     WHERE id = ?2 AND credit >= ?1"
                ),
                params![amount, user_id],
            )?;
            if updated > 0 {
                return Ok((updated, true));
            }
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)",
                params![user_id],
                |row| row.get(0),
            )?;
            Ok((updated, exists))
        })
        .await
        .map_err(map_tr_err)?;

    match (updated, exists) {
        (0, false) => Err(SmsGateError::not_found("user", user_id)),
        (0, true) => Err(SmsGateError::InsufficientCredit {
            user_id,
            required: amount,
        }),
        _ => Ok(()),
    }
}

/// Whether the user's balance covers `amount`. Unknown users yield `NotFound`.
pub async fn has_sufficient_credit(
    db: &Database,
    user_id: UserId,
    amount: i64,
) -> Result<bool, SmsGateError> {
    let credit: Option<i64> = db
        .connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT credit FROM users WHERE id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)?;

    credit
        .map(|c| c >= amount)
        .ok_or_else(|| SmsGateError::not_found("user", user_id))
}
