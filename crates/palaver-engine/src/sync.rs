//! Identity-sync events delivered by the external user-record producer.
//!
//! The webhook receiver normalizes provider payloads into [`IdentityEvent`]
//! before handing them to the engine, so the engine never sees the
//! provider's wire shape.

use serde::{Deserialize, Serialize};

/// A normalized user-sync event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IdentityEvent {
    /// `user.created` and `user.updated` both map here: the upsert is
    /// idempotent and keyed on the external id.
    Upserted {
        external_id: String,
        email: String,
        display_name: String,
        avatar_url: Option<String>,
    },
    /// `user.deleted`.
    Deleted { external_id: String },
}
