use palaver_store::StoreError;
use thiserror::Error;

/// Errors surfaced by engine operations.
///
/// Best-effort operations (mark-read, typing, heartbeat) never return these;
/// they log and swallow failures locally.
#[derive(Error, Debug)]
pub enum ChatError {
    /// No resolvable caller on a write path.
    #[error("Not authenticated")]
    Unauthenticated,

    /// Caller is authenticated but lacks the required relationship.
    #[error("Not authorized: {0}")]
    NotAuthorized(&'static str),

    /// A referenced entity is absent.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Malformed request arguments.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Storage failure.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ChatError>;
