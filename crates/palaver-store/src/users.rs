//! CRUD and presence operations for [`User`] records.
//!
//! Users are created and updated exclusively by the identity-sync event
//! stream, keyed on the provider's stable `external_id`.

use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use crate::database::{ts_from_sql, ts_to_sql, uuid_from_sql, Database};
use crate::error::{Result, StoreError};
use crate::models::User;

/// Result-count bound for directory searches.
const SEARCH_LIMIT: u32 = 20;

impl Database {
    /// Create or update a user record keyed on its external identity.
    ///
    /// Idempotent: repeated calls with the same `external_id` update the
    /// profile fields in place and keep the internal id stable.
    pub fn upsert_user_by_external_id(
        &self,
        external_id: &str,
        email: &str,
        display_name: &str,
        avatar_url: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<User> {
        self.conn().execute(
            "INSERT INTO users (id, external_id, email, display_name, avatar_url,
                                is_online, last_seen_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?6)
             ON CONFLICT(external_id) DO UPDATE SET
                 email = excluded.email,
                 display_name = excluded.display_name,
                 avatar_url = excluded.avatar_url",
            params![
                Uuid::new_v4().to_string(),
                external_id,
                email,
                display_name,
                avatar_url,
                ts_to_sql(now),
            ],
        )?;

        self.get_user_by_external_id(external_id)
    }

    /// Delete a user by external identity.  Returns `true` if a row was
    /// removed.
    pub fn delete_user_by_external_id(&self, external_id: &str) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM users WHERE external_id = ?1",
            params![external_id],
        )?;
        Ok(affected > 0)
    }

    /// Fetch a single user by internal id.
    pub fn get_user(&self, id: Uuid) -> Result<User> {
        self.conn()
            .query_row(
                "SELECT id, external_id, email, display_name, avatar_url,
                        is_online, last_seen_at, created_at
                 FROM users WHERE id = ?1",
                params![id.to_string()],
                row_to_user,
            )
            .map_err(not_found)
    }

    /// Fetch a single user by external identity.
    pub fn get_user_by_external_id(&self, external_id: &str) -> Result<User> {
        self.conn()
            .query_row(
                "SELECT id, external_id, email, display_name, avatar_url,
                        is_online, last_seen_at, created_at
                 FROM users WHERE external_id = ?1",
                params![external_id],
                row_to_user,
            )
            .map_err(not_found)
    }

    /// Like [`Database::get_user`] but maps a missing row to `None`.
    pub fn find_user(&self, id: Uuid) -> Result<Option<User>> {
        match self.get_user(id) {
            Ok(user) => Ok(Some(user)),
            Err(StoreError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Case-insensitive prefix search over display name and email,
    /// excluding `exclude`, ordered by display name, bounded.
    ///
    /// LIKE metacharacters in the term are escaped so they match literally.
    pub fn search_users(&self, term: &str, exclude: Uuid) -> Result<Vec<User>> {
        let escaped = term
            .to_lowercase()
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        let prefix = format!("{escaped}%");

        let mut stmt = self.conn().prepare(
            "SELECT id, external_id, email, display_name, avatar_url,
                    is_online, last_seen_at, created_at
             FROM users
             WHERE id != ?1
               AND (LOWER(display_name) LIKE ?2 ESCAPE '\\'
                    OR LOWER(email) LIKE ?2 ESCAPE '\\')
             ORDER BY display_name ASC
             LIMIT ?3",
        )?;

        let rows = stmt.query_map(
            params![exclude.to_string(), prefix, SEARCH_LIMIT],
            row_to_user,
        )?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }

    /// List every user except `exclude`, ordered by display name.
    pub fn list_users(&self, exclude: Uuid) -> Result<Vec<User>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, external_id, email, display_name, avatar_url,
                    is_online, last_seen_at, created_at
             FROM users
             WHERE id != ?1
             ORDER BY display_name ASC",
        )?;

        let rows = stmt.query_map(params![exclude.to_string()], row_to_user)?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }

    /// Heartbeat / offline transition: set the online flag and refresh
    /// last-seen.  Returns `true` if the user exists.
    pub fn set_online_status(
        &self,
        user_id: Uuid,
        is_online: bool,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE users SET is_online = ?1, last_seen_at = ?2 WHERE id = ?3",
            params![is_online as i64, ts_to_sql(now), user_id.to_string()],
        )?;
        Ok(affected > 0)
    }
}

fn not_found(e: rusqlite::Error) -> StoreError {
    match e {
        rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
        other => StoreError::Sqlite(other),
    }
}

/// Map a `rusqlite::Row` to a [`User`].
pub(crate) fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let id_str: String = row.get(0)?;
    let external_id: String = row.get(1)?;
    let email: String = row.get(2)?;
    let display_name: String = row.get(3)?;
    let avatar_url: Option<String> = row.get(4)?;
    let is_online: i64 = row.get(5)?;
    let last_seen_str: String = row.get(6)?;
    let created_str: String = row.get(7)?;

    Ok(User {
        id: uuid_from_sql(&id_str, 0)?,
        external_id,
        email,
        display_name,
        avatar_url,
        is_online: is_online != 0,
        last_seen_at: ts_from_sql(&last_seen_str, 6)?,
        created_at: ts_from_sql(&created_str, 7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn upsert_is_idempotent_and_keeps_id() {
        let db = db();
        let now = Utc::now();

        let first = db
            .upsert_user_by_external_id("ext-1", "a@example.com", "Alice", None, now)
            .unwrap();
        let second = db
            .upsert_user_by_external_id("ext-1", "a2@example.com", "Alice B", Some("http://a"), now)
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.email, "a2@example.com");
        assert_eq!(second.display_name, "Alice B");
        assert_eq!(second.avatar_url.as_deref(), Some("http://a"));
    }

    #[test]
    fn delete_by_external_id() {
        let db = db();
        let now = Utc::now();
        db.upsert_user_by_external_id("ext-1", "a@example.com", "Alice", None, now)
            .unwrap();

        assert!(db.delete_user_by_external_id("ext-1").unwrap());
        assert!(!db.delete_user_by_external_id("ext-1").unwrap());
        assert!(matches!(
            db.get_user_by_external_id("ext-1"),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn search_matches_name_and_email_prefix() {
        let db = db();
        let now = Utc::now();
        let alice = db
            .upsert_user_by_external_id("e1", "alice@example.com", "Alice", None, now)
            .unwrap();
        let bob = db
            .upsert_user_by_external_id("e2", "bob@example.com", "Bob", None, now)
            .unwrap();

        let hits = db.search_users("ali", bob.id).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, alice.id);

        // Caller is always excluded.
        let hits = db.search_users("ali", alice.id).unwrap();
        assert!(hits.is_empty());

        // Email prefix matches too, case-insensitively.
        let hits = db.search_users("BOB@", alice.id).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, bob.id);
    }

    #[test]
    fn search_treats_like_metacharacters_literally() {
        let db = db();
        let now = Utc::now();
        let underscore = db
            .upsert_user_by_external_id("e1", "a_b@example.com", "Underscore", None, now)
            .unwrap();
        db.upsert_user_by_external_id("e2", "axb@example.com", "Lookalike", None, now)
            .unwrap();
        let carol = db
            .upsert_user_by_external_id("e3", "carol@example.com", "Carol", None, now)
            .unwrap();

        // `_` must not act as a single-character wildcard.
        let hits = db.search_users("a_b", carol.id).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, underscore.id);

        // `%` must not match everything.
        assert!(db.search_users("%", carol.id).unwrap().is_empty());
    }

    #[test]
    fn online_status_round_trip() {
        let db = db();
        let now = Utc::now();
        let alice = db
            .upsert_user_by_external_id("e1", "a@example.com", "Alice", None, now)
            .unwrap();
        assert!(!alice.is_online);

        assert!(db.set_online_status(alice.id, true, now).unwrap());
        assert!(db.get_user(alice.id).unwrap().is_online);

        assert!(db.set_online_status(alice.id, false, now).unwrap());
        assert!(!db.get_user(alice.id).unwrap().is_online);
    }
}
