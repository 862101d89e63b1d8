//! Domain model structs persisted in the SQLite database.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to the HTTP layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A user record, synced from the external identity provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    /// Internal identifier.
    pub id: Uuid,
    /// Stable identity-provider subject; unique across the table.
    pub external_id: String,
    pub email: String,
    pub display_name: String,
    /// Optional avatar URL supplied by the identity provider.
    pub avatar_url: Option<String>,
    /// Online flag, refreshed by heartbeat and by message send.
    pub is_online: bool,
    pub last_seen_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

/// A conversation (direct or group) with its ordered participant set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conversation {
    pub id: Uuid,
    pub is_group: bool,
    /// Display name; present iff `is_group`.
    pub name: Option<String>,
    /// Ordered, deduplicated participant set (size >= 2).
    pub participants: Vec<Uuid>,
    pub created_by: Uuid,
    /// Denormalized last-message metadata, patched on every send.
    pub last_message_at: Option<DateTime<Utc>>,
    pub last_message_preview: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A single chat message with its read-receipt set.
///
/// Messages are append-only: the only mutations are read-receipt additions
/// and soft deletion.  `content` is retained after deletion but must not be
/// rendered once `is_deleted` is set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub sent_at: DateTime<Utc>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    /// Users who have read this message; always contains the sender.
    pub read_by: Vec<Uuid>,
}

// ---------------------------------------------------------------------------
// Reaction
// ---------------------------------------------------------------------------

/// Reactions on one message, grouped by emoji.
///
/// Group order is first-seen insertion order within the result set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReactionGroup {
    pub emoji: String,
    pub count: usize,
    pub user_ids: Vec<Uuid>,
}
