//! # palaver-engine
//!
//! The conversation/message consistency and presence-derivation engine.
//!
//! [`ChatEngine`] owns the store and exposes the full client-facing
//! operation set.  Every operation resolves the caller's identity first;
//! read paths degrade to empty results for unresolvable callers while write
//! paths fail with [`ChatError::Unauthenticated`].  Derived state (unread
//! counts, grouped reactions, active typists) is recomputed from the raw
//! tables on every read rather than maintained as counters.

pub mod engine;
pub mod summary;
pub mod sync;

mod error;

pub use engine::ChatEngine;
pub use error::ChatError;
pub use summary::{ConversationDetails, ConversationSummary};
pub use sync::IdentityEvent;
