// SPDX-FileCopyrightText: 2026 SmsGate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Credit ledger operations.

use rusqlite::{params, OptionalExtension};
use smsgate_core::types::{LedgerEntry, LedgerStatus, MessageId, NewLedgerEntry};
use smsgate_core::SmsGateError;

use crate::database::{map_tr_err, parse_column, Database, NOW};

const LEDGER_COLUMNS: &str =
    "id, user_id, message_id, amount, operation, status, created_at, updated_at";

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<LedgerEntry> {
    Ok(LedgerEntry {
        id: row.get(0)?,
        user_id: row.get(1)?,
        message_id: row.get(2)?,
        amount: row.get(3)?,
        operation: parse_column(4, row.get(4)?)?,
        status: parse_column(5, row.get(5)?)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

/// Append a ledger entry.
pub async fn create_entry(
    db: &Database,
    entry: &NewLedgerEntry,
) -> Result<LedgerEntry, SmsGateError> {
    let entry = entry.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO ledger_entries (user_id, message_id, amount, operation, status)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    entry.user_id,
                    entry.message_id,
                    entry.amount,
                    entry.operation.to_string(),
                    entry.status.to_string(),
                ],
            )?;
            let id = conn.last_insert_rowid();
            conn.query_row(
                &format!("SELECT {LEDGER_COLUMNS} FROM ledger_entries WHERE id = ?1"),
                params![id],
                row_to_entry,
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Settle the `Pending` entry tied to `message_id`.
///
/// Returns `false` when the entry exists but is already settled; an entry
/// moves to `Success` or `Failed` exactly once.
pub async fn update_status_by_message_id(
    db: &Database,
    message_id: MessageId,
    status: LedgerStatus,
) -> Result<bool, SmsGateError> {
    let pending = LedgerStatus::Pending.to_string();
    let (updated, exists) = db
        .connection()
        .call(move |conn| -> rusqlite::Result<(bool, bool)> {
            let updated = conn.execute(
                &format!(
                    "UPDATE ledger_entries SET status = ?1, updated_at = {NOW} \
                     WHERE message_id = ?2 AND status = ?3"
                ),
                params![status.to_string(), message_id, pending],
            )?;
            if updated > 0 {
                return Ok((true, true));
            }
            let exists = conn
                .query_row(
                    "SELECT 1 FROM ledger_entries WHERE message_id = ?1",
                    params![message_id],
                    |_| Ok(()),
                )
                .optional()?
                .is_some();
            Ok((false, exists))
        })
        .await
        .map_err(map_tr_err)?;

    if !exists {
        return Err(SmsGateError::not_found("ledger entry", message_id));
    }
    Ok(updated)
}

/// The entry tied to `message_id`, if any.
pub async fn get_by_message_id(
    db: &Database,
    message_id: MessageId,
) -> Result<Option<LedgerEntry>, SmsGateError> {
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {LEDGER_COLUMNS} FROM ledger_entries WHERE message_id = ?1"),
                params![message_id],
                row_to_entry,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}
