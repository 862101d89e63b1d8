//! The append-only message ledger: send, list, read receipts, soft delete.
//!
//! `append_message` is the one multi-entity mutation in the system: it
//! inserts the message, records the sender's read receipt, patches the
//! conversation's denormalized last-message fields and refreshes the
//! sender's presence, all inside a single transaction so no reader ever
//! observes a partially-applied send.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use crate::database::{ts_from_sql, ts_to_sql, uuid_from_sql, Database};
use crate::error::{Result, StoreError};
use crate::models::Message;
use crate::PREVIEW_MAX_CHARS;

/// Truncate message content to the preview length (codepoints, not
/// word-aware).
pub(crate) fn preview_of(content: &str) -> String {
    content.chars().take(PREVIEW_MAX_CHARS).collect()
}

impl Database {
    /// Append a message to a conversation.
    ///
    /// In one transaction: inserts the message with the sender already in
    /// its read-receipt set, patches the conversation's
    /// `last_message_at` / `last_message_preview`, and marks the sender
    /// online (send-as-heartbeat).
    pub fn append_message(
        &mut self,
        conversation_id: Uuid,
        sender_id: Uuid,
        content: &str,
        now: DateTime<Utc>,
    ) -> Result<Message> {
        let id = Uuid::new_v4();
        let sent_at = ts_to_sql(now);

        let tx = self.conn_mut().transaction()?;

        tx.execute(
            "INSERT INTO messages (id, conversation_id, sender_id, content, sent_at, is_deleted)
             VALUES (?1, ?2, ?3, ?4, ?5, 0)",
            params![
                id.to_string(),
                conversation_id.to_string(),
                sender_id.to_string(),
                content,
                sent_at,
            ],
        )?;

        tx.execute(
            "INSERT INTO message_reads (message_id, user_id) VALUES (?1, ?2)",
            params![id.to_string(), sender_id.to_string()],
        )?;

        tx.execute(
            "UPDATE conversations
             SET last_message_at = ?1, last_message_preview = ?2
             WHERE id = ?3",
            params![sent_at, preview_of(content), conversation_id.to_string()],
        )?;

        tx.execute(
            "UPDATE users SET is_online = 1, last_seen_at = ?1 WHERE id = ?2",
            params![sent_at, sender_id.to_string()],
        )?;

        tx.commit()?;

        Ok(Message {
            id,
            conversation_id,
            sender_id,
            content: content.to_string(),
            sent_at: now,
            is_deleted: false,
            deleted_at: None,
            read_by: vec![sender_id],
        })
    }

    /// List a conversation's messages ascending by send time, insertion
    /// order breaking ties.  Read-receipt sets are populated.
    pub fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, conversation_id, sender_id, content, sent_at, is_deleted, deleted_at
             FROM messages
             WHERE conversation_id = ?1
             ORDER BY sent_at ASC, rowid ASC",
        )?;

        let rows = stmt.query_map(params![conversation_id.to_string()], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }

        // One join fills every read-receipt set; no per-message queries.
        let mut stmt = self.conn().prepare(
            "SELECT r.message_id, r.user_id
             FROM message_reads r
             JOIN messages m ON m.id = r.message_id
             WHERE m.conversation_id = ?1",
        )?;
        let rows = stmt.query_map(params![conversation_id.to_string()], |row| {
            let msg_str: String = row.get(0)?;
            let user_str: String = row.get(1)?;
            Ok((uuid_from_sql(&msg_str, 0)?, uuid_from_sql(&user_str, 1)?))
        })?;

        let mut read_by: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for row in rows {
            let (message_id, user_id) = row?;
            read_by.entry(message_id).or_default().push(user_id);
        }
        for message in &mut messages {
            if let Some(readers) = read_by.remove(&message.id) {
                message.read_by = readers;
            }
        }

        Ok(messages)
    }

    /// Fetch a single message (read receipts included) by UUID.
    pub fn get_message(&self, id: Uuid) -> Result<Message> {
        let mut message = self
            .conn()
            .query_row(
                "SELECT id, conversation_id, sender_id, content, sent_at, is_deleted, deleted_at
                 FROM messages WHERE id = ?1",
                params![id.to_string()],
                row_to_message,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })?;

        let mut stmt = self
            .conn()
            .prepare("SELECT user_id FROM message_reads WHERE message_id = ?1")?;
        let rows = stmt.query_map(params![id.to_string()], |row| {
            let user_str: String = row.get(0)?;
            uuid_from_sql(&user_str, 0)
        })?;

        let mut readers = Vec::new();
        for row in rows {
            readers.push(row?);
        }
        message.read_by = readers;

        Ok(message)
    }

    /// Add `user_id` to the read-receipt set of every message in the
    /// conversation that does not contain it yet.  Idempotent; returns the
    /// number of newly covered messages.
    pub fn mark_conversation_read(&self, conversation_id: Uuid, user_id: Uuid) -> Result<usize> {
        let added = self.conn().execute(
            "INSERT OR IGNORE INTO message_reads (message_id, user_id)
             SELECT id, ?2 FROM messages WHERE conversation_id = ?1",
            params![conversation_id.to_string(), user_id.to_string()],
        )?;
        Ok(added)
    }

    /// Soft-delete a message: the content stays in storage but must not be
    /// rendered once the flag is set.  Returns `true` if a row changed.
    pub fn soft_delete_message(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE messages SET is_deleted = 1, deleted_at = ?1 WHERE id = ?2",
            params![ts_to_sql(now), id.to_string()],
        )?;
        Ok(affected > 0)
    }
}

/// Map a `rusqlite::Row` to a [`Message`] (read receipts filled in by the
/// caller).
fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let id_str: String = row.get(0)?;
    let conversation_str: String = row.get(1)?;
    let sender_str: String = row.get(2)?;
    let content: String = row.get(3)?;
    let sent_str: String = row.get(4)?;
    let is_deleted: i64 = row.get(5)?;
    let deleted_str: Option<String> = row.get(6)?;

    let deleted_at = deleted_str
        .as_deref()
        .map(|s| ts_from_sql(s, 6))
        .transpose()?;

    Ok(Message {
        id: uuid_from_sql(&id_str, 0)?,
        conversation_id: uuid_from_sql(&conversation_str, 1)?,
        sender_id: uuid_from_sql(&sender_str, 2)?,
        content,
        sent_at: ts_from_sql(&sent_str, 4)?,
        is_deleted: is_deleted != 0,
        deleted_at,
        read_by: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn setup() -> (Database, Uuid, Uuid, Uuid) {
        let mut db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        let a = db
            .upsert_user_by_external_id("e1", "a@example.com", "Alice", None, now)
            .unwrap()
            .id;
        let b = db
            .upsert_user_by_external_id("e2", "b@example.com", "Bob", None, now)
            .unwrap()
            .id;
        let conv = db.create_or_get_direct_conversation(a, b, now).unwrap();
        (db, a, b, conv.id)
    }

    #[test]
    fn append_inserts_sender_receipt_and_patches_conversation() {
        let (mut db, a, _, conv) = setup();
        let now = Utc::now();

        let msg = db.append_message(conv, a, "hi", now).unwrap();
        assert_eq!(msg.read_by, vec![a]);

        let stored = db.get_message(msg.id).unwrap();
        assert_eq!(stored.read_by, vec![a]);

        let conv = db.get_conversation(conv).unwrap();
        assert_eq!(conv.last_message_preview.as_deref(), Some("hi"));
        assert!(conv.last_message_at.is_some());

        // Send-as-heartbeat.
        let sender = db.get_user(a).unwrap();
        assert!(sender.is_online);
    }

    #[test]
    fn preview_truncates_at_fifty_codepoints() {
        let (mut db, a, _, conv) = setup();
        let now = Utc::now();

        let exactly_50 = "x".repeat(50);
        db.append_message(conv, a, &exactly_50, now).unwrap();
        let stored = db.get_conversation(conv).unwrap();
        assert_eq!(stored.last_message_preview.as_deref(), Some(exactly_50.as_str()));

        let len_51 = "y".repeat(51);
        db.append_message(conv, a, &len_51, now + Duration::milliseconds(1))
            .unwrap();
        let stored = db.get_conversation(conv).unwrap();
        assert_eq!(
            stored.last_message_preview.as_deref(),
            Some(&len_51[..50])
        );
    }

    #[test]
    fn list_orders_by_sent_at_with_insertion_tiebreak() {
        let (mut db, a, b, conv) = setup();
        let now = Utc::now();

        // Same timestamp: insertion order decides.
        let m1 = db.append_message(conv, a, "first", now).unwrap();
        let m2 = db.append_message(conv, b, "second", now).unwrap();
        let m3 = db
            .append_message(conv, a, "third", now + Duration::milliseconds(5))
            .unwrap();

        let listed = db.list_messages(conv).unwrap();
        let ids: Vec<_> = listed.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![m1.id, m2.id, m3.id]);
    }

    #[test]
    fn mark_read_is_idempotent() {
        let (mut db, a, b, conv) = setup();
        let now = Utc::now();

        db.append_message(conv, a, "one", now).unwrap();
        db.append_message(conv, a, "two", now).unwrap();

        assert_eq!(db.mark_conversation_read(conv, b).unwrap(), 2);
        assert_eq!(db.mark_conversation_read(conv, b).unwrap(), 0);

        for message in db.list_messages(conv).unwrap() {
            assert!(message.read_by.contains(&b));
        }
    }

    #[test]
    fn soft_delete_keeps_content_in_storage() {
        let (mut db, a, _, conv) = setup();
        let now = Utc::now();

        let msg = db.append_message(conv, a, "oops", now).unwrap();
        assert!(db.soft_delete_message(msg.id, now).unwrap());

        let stored = db.get_message(msg.id).unwrap();
        assert!(stored.is_deleted);
        assert!(stored.deleted_at.is_some());
        assert_eq!(stored.content, "oops");
    }
}
