//! # palaver-store
//!
//! SQLite persistence for the Palaver chat backend.
//!
//! The crate exposes a synchronous [`Database`] handle that wraps a
//! `rusqlite::Connection` and provides typed helpers for every domain model:
//! users, conversations, messages (with read receipts), reactions and
//! ephemeral typing signals.  Multi-entity mutations (message append,
//! mark-read) run inside a single SQLite transaction so a reader never
//! observes a partially-applied write.

pub mod conversations;
pub mod database;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod reactions;
pub mod typing;
pub mod unread;
pub mod users;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use models::*;

/// How long a typing pulse stays visible without a follow-up pulse.
pub const TYPING_WINDOW_MS: i64 = 3000;

/// Maximum length, in Unicode codepoints, of a conversation's
/// last-message preview.
pub const PREVIEW_MAX_CHARS: usize = 50;
