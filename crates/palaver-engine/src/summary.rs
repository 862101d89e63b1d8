//! Derived conversation views handed to the client surface.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use palaver_store::{Conversation, User};

/// A conversation annotated with everything the conversation list needs:
/// resolved participants, a display name, and the caller's unread count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    #[serde(flatten)]
    pub conversation: Conversation,
    /// Group name, or the other participant's name for direct chats.
    pub display_name: String,
    /// Participant records; ids that no longer resolve are dropped.
    pub participant_details: Vec<User>,
    /// Unread messages for the requesting caller.
    pub unread_count: i64,
}

/// A conversation with its participant records resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationDetails {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub participant_details: Vec<User>,
}

/// Derive the display name for a conversation as seen by `caller`.
///
/// Groups use their own name; direct chats show the other participant, or a
/// placeholder when that user record is gone.
pub(crate) fn display_name_for(
    conversation: &Conversation,
    participant_details: &[User],
    caller: Uuid,
) -> String {
    if conversation.is_group {
        return conversation
            .name
            .clone()
            .unwrap_or_else(|| "Group".to_string());
    }

    participant_details
        .iter()
        .find(|u| u.id != caller)
        .map(|u| u.display_name.clone())
        .unwrap_or_else(|| "Deleted user".to_string())
}
