//! Ephemeral typing signals.
//!
//! One live row per (conversation, user), upserted on every pulse.  Expiry
//! is evaluated lazily against the caller-supplied `now` at read time; there
//! is no background sweep, so a missing `clear` followed by staleness reads
//! the same as an explicit clear.

use chrono::{DateTime, Duration, Utc};
use rusqlite::params;
use uuid::Uuid;

use crate::database::{ts_to_sql, Database};
use crate::error::Result;
use crate::models::User;
use crate::users::row_to_user;
use crate::TYPING_WINDOW_MS;

impl Database {
    /// Record a composing pulse, refreshing the existing row if present.
    pub fn upsert_typing_signal(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.conn().execute(
            "INSERT INTO typing_signals (conversation_id, user_id, last_pulse_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(conversation_id, user_id) DO UPDATE SET
                 last_pulse_at = excluded.last_pulse_at",
            params![
                conversation_id.to_string(),
                user_id.to_string(),
                ts_to_sql(now),
            ],
        )?;
        Ok(())
    }

    /// Remove a typing signal outright (trailing clear after the last
    /// keystroke).
    pub fn clear_typing_signal(&self, conversation_id: Uuid, user_id: Uuid) -> Result<()> {
        self.conn().execute(
            "DELETE FROM typing_signals WHERE conversation_id = ?1 AND user_id = ?2",
            params![conversation_id.to_string(), user_id.to_string()],
        )?;
        Ok(())
    }

    /// Users currently composing in a conversation, excluding `exclude`.
    ///
    /// A signal is live for query times in `[pulse, pulse + 3000ms)`.
    pub fn active_typists(
        &self,
        conversation_id: Uuid,
        exclude: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<User>> {
        let cutoff = now - Duration::milliseconds(TYPING_WINDOW_MS);

        let mut stmt = self.conn().prepare(
            "SELECT u.id, u.external_id, u.email, u.display_name, u.avatar_url,
                    u.is_online, u.last_seen_at, u.created_at
             FROM typing_signals t
             JOIN users u ON u.id = t.user_id
             WHERE t.conversation_id = ?1
               AND t.user_id != ?2
               AND t.last_pulse_at > ?3
             ORDER BY t.last_pulse_at ASC",
        )?;

        let rows = stmt.query_map(
            params![
                conversation_id.to_string(),
                exclude.to_string(),
                ts_to_sql(cutoff),
            ],
            row_to_user,
        )?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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
    fn signal_lives_for_the_window_and_expires_lazily() {
        let (db, a, b, conv) = setup();
        let pulse = Utc::now();

        db.upsert_typing_signal(conv, b, pulse).unwrap();

        // Visible at T and just inside the window.
        assert_eq!(db.active_typists(conv, a, pulse).unwrap().len(), 1);
        let almost = pulse + Duration::milliseconds(TYPING_WINDOW_MS - 1);
        assert_eq!(db.active_typists(conv, a, almost).unwrap().len(), 1);

        // Gone at exactly T + 3000ms, with no sweep having run.
        let expired = pulse + Duration::milliseconds(TYPING_WINDOW_MS);
        assert!(db.active_typists(conv, a, expired).unwrap().is_empty());
    }

    #[test]
    fn pulse_refreshes_and_clear_removes() {
        let (db, a, b, conv) = setup();
        let first = Utc::now();

        db.upsert_typing_signal(conv, b, first).unwrap();
        let second = first + Duration::milliseconds(2500);
        db.upsert_typing_signal(conv, b, second).unwrap();

        // Refreshed pulse extends the window past the original expiry.
        let query = first + Duration::milliseconds(4000);
        assert_eq!(db.active_typists(conv, a, query).unwrap().len(), 1);

        db.clear_typing_signal(conv, b).unwrap();
        assert!(db.active_typists(conv, a, second).unwrap().is_empty());
    }

    #[test]
    fn caller_is_excluded_from_the_result() {
        let (db, a, b, conv) = setup();
        let now = Utc::now();

        db.upsert_typing_signal(conv, a, now).unwrap();
        db.upsert_typing_signal(conv, b, now).unwrap();

        let typists = db.active_typists(conv, a, now).unwrap();
        assert_eq!(typists.len(), 1);
        assert_eq!(typists[0].id, b);
    }
}
