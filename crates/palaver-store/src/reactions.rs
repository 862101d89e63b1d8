//! Emoji reactions with toggle semantics.
//!
//! A user may hold several distinct emoji on one message, but never the same
//! emoji twice: the `(message_id, user_id, emoji)` UNIQUE constraint guards
//! against duplicate rows even when two sessions toggle concurrently.

use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use crate::database::{ts_to_sql, uuid_from_sql, Database};
use crate::error::Result;
use crate::models::ReactionGroup;

impl Database {
    /// Toggle `emoji` for `user_id` on a message: remove the reaction if it
    /// exists, add it otherwise.  Returns `true` if the reaction exists
    /// after the call.
    pub fn toggle_reaction(
        &mut self,
        message_id: Uuid,
        user_id: Uuid,
        emoji: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let tx = self.conn_mut().transaction()?;

        let removed = tx.execute(
            "DELETE FROM reactions WHERE message_id = ?1 AND user_id = ?2 AND emoji = ?3",
            params![message_id.to_string(), user_id.to_string(), emoji],
        )?;

        let present = if removed == 0 {
            tx.execute(
                "INSERT OR IGNORE INTO reactions (id, message_id, user_id, emoji, reacted_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    Uuid::new_v4().to_string(),
                    message_id.to_string(),
                    user_id.to_string(),
                    emoji,
                    ts_to_sql(now),
                ],
            )?;
            true
        } else {
            false
        };

        tx.commit()?;
        Ok(present)
    }

    /// Reactions on a message grouped by emoji.
    ///
    /// Group order is the first-seen insertion order of each emoji, which is
    /// deterministic within one result set.
    pub fn reactions_for_message(&self, message_id: Uuid) -> Result<Vec<ReactionGroup>> {
        let mut stmt = self.conn().prepare(
            "SELECT emoji, user_id FROM reactions
             WHERE message_id = ?1
             ORDER BY reacted_at ASC, rowid ASC",
        )?;

        let rows = stmt.query_map(params![message_id.to_string()], |row| {
            let emoji: String = row.get(0)?;
            let user_str: String = row.get(1)?;
            Ok((emoji, uuid_from_sql(&user_str, 1)?))
        })?;

        let mut groups: Vec<ReactionGroup> = Vec::new();
        for row in rows {
            let (emoji, user_id) = row?;
            match groups.iter_mut().find(|g| g.emoji == emoji) {
                Some(group) => {
                    group.count += 1;
                    group.user_ids.push(user_id);
                }
                None => groups.push(ReactionGroup {
                    emoji,
                    count: 1,
                    user_ids: vec![user_id],
                }),
            }
        }
        Ok(groups)
    }

    /// The set of emoji `user_id` has placed on a message.
    pub fn user_reactions(&self, message_id: Uuid, user_id: Uuid) -> Result<Vec<String>> {
        let mut stmt = self.conn().prepare(
            "SELECT emoji FROM reactions
             WHERE message_id = ?1 AND user_id = ?2
             ORDER BY reacted_at ASC, rowid ASC",
        )?;

        let rows = stmt.query_map(
            params![message_id.to_string(), user_id.to_string()],
            |row| row.get(0),
        )?;

        let mut emoji = Vec::new();
        for row in rows {
            emoji.push(row?);
        }
        Ok(emoji)
    }
}
