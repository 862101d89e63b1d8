//! Unread-count aggregation.
//!
//! Counts are derived from the message and read-receipt tables rather than
//! maintained as running counters.  A message is unread for a user when the
//! user is not in its read-receipt set, did not send it, and it has not been
//! soft-deleted.  The per-user map and total are computed with a single
//! grouped scan so listing N conversations never issues N count queries.

use std::collections::HashMap;

use rusqlite::params;
use uuid::Uuid;

use crate::database::{uuid_from_sql, Database};
use crate::error::Result;

impl Database {
    /// Unread count for one user in one conversation.
    pub fn unread_count(&self, conversation_id: Uuid, user_id: Uuid) -> Result<i64> {
        let count = self.conn().query_row(
            "SELECT COUNT(*)
             FROM messages m
             WHERE m.conversation_id = ?1
               AND m.sender_id != ?2
               AND m.is_deleted = 0
               AND NOT EXISTS (
                   SELECT 1 FROM message_reads r
                   WHERE r.message_id = m.id AND r.user_id = ?2
               )",
            params![conversation_id.to_string(), user_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Per-conversation unread counts for every conversation the user
    /// belongs to.  Conversations with zero unread messages are absent from
    /// the map.
    pub fn unread_counts_for_user(&self, user_id: Uuid) -> Result<HashMap<Uuid, i64>> {
        let mut stmt = self.conn().prepare(
            "SELECT m.conversation_id, COUNT(*)
             FROM messages m
             JOIN conversation_participants p
               ON p.conversation_id = m.conversation_id AND p.user_id = ?1
             WHERE m.sender_id != ?1
               AND m.is_deleted = 0
               AND NOT EXISTS (
                   SELECT 1 FROM message_reads r
                   WHERE r.message_id = m.id AND r.user_id = ?1
               )
             GROUP BY m.conversation_id",
        )?;

        let rows = stmt.query_map(params![user_id.to_string()], |row| {
            let conv_str: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            Ok((uuid_from_sql(&conv_str, 0)?, count))
        })?;

        let mut counts = HashMap::new();
        for row in rows {
            let (conversation_id, count) = row?;
            counts.insert(conversation_id, count);
        }
        Ok(counts)
    }

    /// Total unread across all of the user's conversations.
    pub fn total_unread_count(&self, user_id: Uuid) -> Result<i64> {
        let total = self.conn().query_row(
            "SELECT COUNT(*)
             FROM messages m
             JOIN conversation_participants p
               ON p.conversation_id = m.conversation_id AND p.user_id = ?1
             WHERE m.sender_id != ?1
               AND m.is_deleted = 0
               AND NOT EXISTS (
                   SELECT 1 FROM message_reads r
                   WHERE r.message_id = m.id AND r.user_id = ?1
               )",
            params![user_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(total)
    }
}
