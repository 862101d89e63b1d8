//! CRUD operations for [`Conversation`] records and their participant sets.
//!
//! Direct-conversation uniqueness is enforced by the `direct_key` column: the
//! canonical `"min:max"` encoding of the sorted participant pair carries a
//! UNIQUE index, so two concurrent first-contact creations collapse to one
//! row (the loser re-reads the winner).

use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use crate::database::{ts_from_sql, ts_to_sql, uuid_from_sql, Database};
use crate::error::{Result, StoreError};
use crate::models::Conversation;

/// Canonical lookup key for a direct conversation between two users.
fn direct_key(a: Uuid, b: Uuid) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("{lo}:{hi}")
}

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Create a direct (two-participant) conversation, or return the
    /// existing one for this pair.
    ///
    /// Involutive across argument order: `(a, b)` and `(b, a)` resolve to
    /// the same row.
    pub fn create_or_get_direct_conversation(
        &mut self,
        caller: Uuid,
        other: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Conversation> {
        if let Some(existing) = self.find_direct_conversation(caller, other)? {
            return Ok(existing);
        }

        let id = Uuid::new_v4();
        let key = direct_key(caller, other);

        let tx = self.conn_mut().transaction()?;
        let inserted = tx.execute(
            "INSERT INTO conversations (id, is_group, name, created_by, direct_key, created_at)
             VALUES (?1, 0, NULL, ?2, ?3, ?4)
             ON CONFLICT(direct_key) DO NOTHING",
            params![id.to_string(), caller.to_string(), key, ts_to_sql(now)],
        )?;
        if inserted > 0 {
            insert_participants(&tx, id, &[caller, other])?;
        }
        tx.commit()?;

        if inserted == 0 {
            // Lost the creation race; the winner's row is committed.
            return self
                .find_direct_conversation(caller, other)?
                .ok_or(StoreError::NotFound);
        }

        self.get_conversation(id)
    }

    /// Create a group conversation.  The participant set is the caller
    /// followed by the given ids, deduplicated, in order.
    pub fn create_group_conversation(
        &mut self,
        caller: Uuid,
        name: &str,
        participant_ids: &[Uuid],
        now: DateTime<Utc>,
    ) -> Result<Conversation> {
        let mut participants = vec![caller];
        for &id in participant_ids {
            if !participants.contains(&id) {
                participants.push(id);
            }
        }

        let id = Uuid::new_v4();

        let tx = self.conn_mut().transaction()?;
        tx.execute(
            "INSERT INTO conversations (id, is_group, name, created_by, direct_key, created_at)
             VALUES (?1, 1, ?2, ?3, NULL, ?4)",
            params![id.to_string(), name, caller.to_string(), ts_to_sql(now)],
        )?;
        insert_participants(&tx, id, &participants)?;
        tx.commit()?;

        self.get_conversation(id)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Point lookup for the direct conversation between two users.
    pub fn find_direct_conversation(&self, a: Uuid, b: Uuid) -> Result<Option<Conversation>> {
        let row = self
            .conn()
            .query_row(
                "SELECT id, is_group, name, created_by, last_message_at,
                        last_message_preview, created_at
                 FROM conversations
                 WHERE direct_key = ?1",
                params![direct_key(a, b)],
                row_to_conversation,
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(StoreError::Sqlite(other)),
            })?;

        match row {
            Some(mut conv) => {
                conv.participants = self.get_participants(conv.id)?;
                Ok(Some(conv))
            }
            None => Ok(None),
        }
    }

    /// Fetch a single conversation (participants included) by UUID.
    pub fn get_conversation(&self, id: Uuid) -> Result<Conversation> {
        let mut conv = self
            .conn()
            .query_row(
                "SELECT id, is_group, name, created_by, last_message_at,
                        last_message_preview, created_at
                 FROM conversations
                 WHERE id = ?1",
                params![id.to_string()],
                row_to_conversation,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })?;

        conv.participants = self.get_participants(id)?;
        Ok(conv)
    }

    /// Ordered participant ids for a conversation.
    pub fn get_participants(&self, conversation_id: Uuid) -> Result<Vec<Uuid>> {
        let mut stmt = self.conn().prepare(
            "SELECT user_id FROM conversation_participants
             WHERE conversation_id = ?1
             ORDER BY position ASC",
        )?;

        let rows = stmt.query_map(params![conversation_id.to_string()], |row| {
            let id_str: String = row.get(0)?;
            uuid_from_sql(&id_str, 0)
        })?;

        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }

    /// Whether `user_id` belongs to the conversation's participant set.
    pub fn is_participant(&self, conversation_id: Uuid, user_id: Uuid) -> Result<bool> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM conversation_participants
             WHERE conversation_id = ?1 AND user_id = ?2",
            params![conversation_id.to_string(), user_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// List all conversations containing `user_id`, newest activity first;
    /// conversations that never had a message sort last.
    pub fn list_conversations_for_user(&self, user_id: Uuid) -> Result<Vec<Conversation>> {
        let mut stmt = self.conn().prepare(
            "SELECT c.id, c.is_group, c.name, c.created_by, c.last_message_at,
                    c.last_message_preview, c.created_at
             FROM conversations c
             JOIN conversation_participants p
               ON p.conversation_id = c.id AND p.user_id = ?1
             ORDER BY c.last_message_at IS NULL ASC, c.last_message_at DESC",
        )?;

        let rows = stmt.query_map(params![user_id.to_string()], row_to_conversation)?;

        let mut conversations = Vec::new();
        for row in rows {
            conversations.push(row?);
        }

        // Attach participant sets with a single join instead of one query
        // per conversation.
        let mut stmt = self.conn().prepare(
            "SELECT p.conversation_id, p.user_id
             FROM conversation_participants p
             JOIN conversation_participants me
               ON me.conversation_id = p.conversation_id AND me.user_id = ?1
             ORDER BY p.conversation_id, p.position ASC",
        )?;
        let rows = stmt.query_map(params![user_id.to_string()], |row| {
            let conv_str: String = row.get(0)?;
            let user_str: String = row.get(1)?;
            Ok((uuid_from_sql(&conv_str, 0)?, uuid_from_sql(&user_str, 1)?))
        })?;

        let mut by_conversation = std::collections::HashMap::new();
        for row in rows {
            let (conv_id, member) = row?;
            by_conversation
                .entry(conv_id)
                .or_insert_with(Vec::new)
                .push(member);
        }
        for conv in &mut conversations {
            if let Some(members) = by_conversation.remove(&conv.id) {
                conv.participants = members;
            }
        }

        Ok(conversations)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn insert_participants(
    tx: &rusqlite::Transaction<'_>,
    conversation_id: Uuid,
    participants: &[Uuid],
) -> Result<()> {
    for (position, user_id) in participants.iter().enumerate() {
        tx.execute(
            "INSERT INTO conversation_participants (conversation_id, user_id, position)
             VALUES (?1, ?2, ?3)",
            params![
                conversation_id.to_string(),
                user_id.to_string(),
                position as i64
            ],
        )?;
    }
    Ok(())
}

/// Map a `rusqlite::Row` to a [`Conversation`] (participants left empty).
fn row_to_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
    let id_str: String = row.get(0)?;
    let is_group: i64 = row.get(1)?;
    let name: Option<String> = row.get(2)?;
    let created_by_str: String = row.get(3)?;
    let last_message_at_str: Option<String> = row.get(4)?;
    let last_message_preview: Option<String> = row.get(5)?;
    let created_str: String = row.get(6)?;

    let last_message_at = last_message_at_str
        .as_deref()
        .map(|s| ts_from_sql(s, 4))
        .transpose()?;

    Ok(Conversation {
        id: uuid_from_sql(&id_str, 0)?,
        is_group: is_group != 0,
        name,
        participants: Vec::new(),
        created_by: uuid_from_sql(&created_by_str, 3)?,
        last_message_at,
        last_message_preview,
        created_at: ts_from_sql(&created_str, 6)?,
    })
}
