//! v001 -- Initial schema creation.
//!
//! Creates the seven core tables: `users`, `conversations`,
//! `conversation_participants`, `messages`, `message_reads`, `reactions`
//! and `typing_signals`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users (synced from the external identity provider)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id           TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    external_id  TEXT NOT NULL UNIQUE,        -- identity-provider subject
    email        TEXT NOT NULL,
    display_name TEXT NOT NULL,
    avatar_url   TEXT,
    is_online    INTEGER NOT NULL DEFAULT 0,  -- boolean 0/1
    last_seen_at TEXT NOT NULL,               -- ISO-8601 / RFC-3339
    created_at   TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Conversations (direct and group)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS conversations (
    id                   TEXT PRIMARY KEY NOT NULL,  -- UUID v4
    is_group             INTEGER NOT NULL DEFAULT 0,
    name                 TEXT,                       -- present iff is_group
    created_by           TEXT NOT NULL,              -- FK -> users(id)
    direct_key           TEXT UNIQUE,                -- "min:max" sorted pair, direct chats only
    last_message_at      TEXT,
    last_message_preview TEXT,
    created_at           TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS conversation_participants (
    conversation_id TEXT NOT NULL,              -- FK -> conversations(id)
    user_id         TEXT NOT NULL,              -- FK -> users(id)
    position        INTEGER NOT NULL,           -- insertion order within the set

    PRIMARY KEY (conversation_id, user_id),
    FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_participants_user
    ON conversation_participants(user_id);

-- ----------------------------------------------------------------
-- Messages (append-only, soft-deleted)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id              TEXT PRIMARY KEY NOT NULL,  -- UUID v4
    conversation_id TEXT NOT NULL,              -- FK -> conversations(id)
    sender_id       TEXT NOT NULL,              -- FK -> users(id)
    content         TEXT NOT NULL,
    sent_at         TEXT NOT NULL,              -- ISO-8601, millisecond precision
    is_deleted      INTEGER NOT NULL DEFAULT 0,
    deleted_at      TEXT,

    FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_messages_conversation_sent
    ON messages(conversation_id, sent_at);

-- Read receipts: one row per (message, reader).
CREATE TABLE IF NOT EXISTS message_reads (
    message_id TEXT NOT NULL,                   -- FK -> messages(id)
    user_id    TEXT NOT NULL,                   -- FK -> users(id)

    PRIMARY KEY (message_id, user_id),
    FOREIGN KEY (message_id) REFERENCES messages(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_message_reads_user
    ON message_reads(user_id);

-- ----------------------------------------------------------------
-- Reactions
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS reactions (
    id         TEXT PRIMARY KEY NOT NULL,       -- UUID v4
    message_id TEXT NOT NULL,                   -- FK -> messages(id)
    user_id    TEXT NOT NULL,                   -- FK -> users(id)
    emoji      TEXT NOT NULL,
    reacted_at TEXT NOT NULL,

    UNIQUE (message_id, user_id, emoji),
    FOREIGN KEY (message_id) REFERENCES messages(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_reactions_message
    ON reactions(message_id);

-- ----------------------------------------------------------------
-- Typing signals (ephemeral, expired lazily at read time)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS typing_signals (
    conversation_id TEXT NOT NULL,              -- FK -> conversations(id)
    user_id         TEXT NOT NULL,              -- FK -> users(id)
    last_pulse_at   TEXT NOT NULL,

    PRIMARY KEY (conversation_id, user_id),
    FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
