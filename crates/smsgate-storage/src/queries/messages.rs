// SPDX-FileCopyrightText: 2026 SmsGate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message CRUD operations.

use rusqlite::{params, OptionalExtension};
use smsgate_core::types::{Message, MessageId, MessageStatus, NewMessage, UserId};
use smsgate_core::SmsGateError;

use crate::database::{map_tr_err, parse_column, Database, NOW};

const MESSAGE_COLUMNS: &str =
    "id, user_id, receiver, body, cost, status, created_at, updated_at";

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        user_id: row.get(1)?,
        receiver: row.get(2)?,
        body: row.get(3)?,
        cost: row.get(4)?,
        status: parse_column(5, row.get(5)?)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

/// Insert a new message at `PENDING` and return the stored row.
pub async fn create_message(db: &Database, msg: &NewMessage) -> Result<Message, SmsGateError> {
    let msg = msg.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO messages (user_id, receiver, body, cost, status)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    msg.user_id,
                    msg.receiver,
                    msg.body,
                    msg.cost,
                    MessageStatus::Pending.to_string(),
                ],
            )?;
            let id = conn.last_insert_rowid();
            conn.query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                params![id],
                row_to_message,
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Get a message by ID.
pub async fn get_message(db: &Database, id: MessageId) -> Result<Option<Message>, SmsGateError> {
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                params![id],
                row_to_message,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Move a `Pending` message to `status`, bumping `updated_at`.
///
/// Returns `false` when the message exists but has already left `Pending`;
/// a settled message is never transitioned again.
pub async fn update_status(
    db: &Database,
    id: MessageId,
    status: MessageStatus,
) -> Result<bool, SmsGateError> {
    let pending = MessageStatus::Pending.to_string();
    let (updated, exists) = db
        .connection()
        .call(move |conn| -> rusqlite::Result<(bool, bool)> {
            let updated = conn.execute(
                &format!(
                    "UPDATE messages SET status = ?1, updated_at = {NOW} \
                     WHERE id = ?2 AND status = ?3"
                ),
                params![status.to_string(), id, pending],
            )?;
            if updated > 0 {
                return Ok((true, true));
            }
            let exists = conn
                .query_row("SELECT 1 FROM messages WHERE id = ?1", params![id], |_| Ok(()))
                .optional()?
                .is_some();
            Ok((false, exists))
        })
        .await
        .map_err(map_tr_err)?;

    if !exists {
        return Err(SmsGateError::not_found("message", id));
    }
    Ok(updated)
}

/// A page of a user's messages, newest first.
pub async fn list_by_user(
    db: &Database,
    user_id: UserId,
    limit: u32,
    offset: u32,
) -> Result<Vec<Message>, SmsGateError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages WHERE user_id = ?1
                 ORDER BY created_at DESC, id DESC LIMIT ?2 OFFSET ?3"
            ))?;
            let rows = stmt.query_map(params![user_id, limit, offset], row_to_message)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::users;
    use smsgate_core::types::NewUser;
    use tempfile::tempdir;

    async fn setup() -> (Database, UserId, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        let user = users::create_user(
            &db,
            &NewUser {
                name: "Reza".into(),
                phone_number: "09121111111".into(),
            },
        )
        .await
        .unwrap();
        (db, user.id, dir)
    }

    fn new_message(user_id: UserId, body: &str) -> NewMessage {
        NewMessage {
            user_id,
            receiver: "09130000000".into(),
            body: body.into(),
            cost: 1000,
        }
    }

    #[tokio::test]
    async fn create_starts_pending() {
        let (db, user_id, _dir) = setup().await;
        let msg = create_message(&db, &new_message(user_id, "hello"))
            .await
            .unwrap();
        assert_eq!(msg.status, MessageStatus::Pending);
        assert_eq!(msg.cost, 1000);
        assert!(msg.id > 0);

        let loaded = get_message(&db, msg.id).await.unwrap().unwrap();
        assert_eq!(loaded, msg);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn update_status_persists() {
        let (db, user_id, _dir) = setup().await;
        let msg = create_message(&db, &new_message(user_id, "hello"))
            .await
            .unwrap();

        assert!(update_status(&db, msg.id, MessageStatus::Sent).await.unwrap());
        let loaded = get_message(&db, msg.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, MessageStatus::Sent);

        let err = update_status(&db, msg.id + 100, MessageStatus::Failed)
            .await
            .unwrap_err();
        assert!(matches!(err, SmsGateError::NotFound { entity: "message", .. }));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn settled_message_is_not_transitioned_again() {
        let (db, user_id, _dir) = setup().await;
        let msg = create_message(&db, &new_message(user_id, "once"))
            .await
            .unwrap();

        assert!(update_status(&db, msg.id, MessageStatus::Sent).await.unwrap());
        assert!(!update_status(&db, msg.id, MessageStatus::Failed).await.unwrap());
        assert!(!update_status(&db, msg.id, MessageStatus::Pending).await.unwrap());

        let loaded = get_message(&db, msg.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, MessageStatus::Sent);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn list_is_newest_first_and_paginated() {
        let (db, user_id, _dir) = setup().await;
        for i in 0..5 {
            create_message(&db, &new_message(user_id, &format!("m{i}")))
                .await
                .unwrap();
        }

        let first = list_by_user(&db, user_id, 2, 0).await.unwrap();
        let bodies: Vec<_> = first.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["m4", "m3"]);

        let last = list_by_user(&db, user_id, 2, 4).await.unwrap();
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].body, "m0");

        assert!(list_by_user(&db, user_id + 1, 10, 0).await.unwrap().is_empty());
        db.close().await.unwrap();
    }
}
