//! The engine proper: caller resolution, authorization, and the full
//! client-surface operation set.
//!
//! Every operation threads identity resolution explicitly (no ambient
//! "current user").  Reads degrade gracefully for unresolvable callers;
//! mutations short-circuit with a specific [`ChatError`] before any side
//! effect.  Mark-read, typing and heartbeat are best-effort: their storage
//! failures are logged and swallowed.

use chrono::Utc;
use parking_lot::Mutex;
use uuid::Uuid;

use palaver_store::{Database, Message, ReactionGroup, StoreError, User};

use crate::error::{ChatError, Result};
use crate::summary::{display_name_for, ConversationDetails, ConversationSummary};
use crate::sync::IdentityEvent;

/// The conversation/message consistency engine.
///
/// Wraps the store in a mutex; SQLite transactions inside the store make
/// each multi-entity mutation atomic, the lock merely serializes access to
/// the single connection.
pub struct ChatEngine {
    db: Mutex<Database>,
}

impl ChatEngine {
    pub fn new(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }

    // ------------------------------------------------------------------
    // Identity
    // ------------------------------------------------------------------

    /// Map an identity-provider subject to a user record.
    pub fn resolve_caller(&self, subject: &str) -> Option<User> {
        match self.db.lock().get_user_by_external_id(subject) {
            Ok(user) => Some(user),
            Err(StoreError::NotFound) => None,
            Err(e) => {
                tracing::error!(error = %e, "caller resolution failed");
                None
            }
        }
    }

    fn require_caller(&self, subject: &str) -> Result<User> {
        self.resolve_caller(subject)
            .ok_or(ChatError::Unauthenticated)
    }

    /// Apply a normalized user-sync event from the external producer.
    pub fn apply_identity_event(&self, event: IdentityEvent) -> Result<()> {
        let db = self.db.lock();
        match event {
            IdentityEvent::Upserted {
                external_id,
                email,
                display_name,
                avatar_url,
            } => {
                let user = db.upsert_user_by_external_id(
                    &external_id,
                    &email,
                    &display_name,
                    avatar_url.as_deref(),
                    Utc::now(),
                )?;
                tracing::debug!(user_id = %user.id, external_id = %external_id, "user upserted");
            }
            IdentityEvent::Deleted { external_id } => {
                let removed = db.delete_user_by_external_id(&external_id)?;
                tracing::debug!(external_id = %external_id, removed, "user deletion applied");
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // User directory
    // ------------------------------------------------------------------

    /// Fuzzy directory search, excluding the caller.  Empty for anonymous
    /// callers.
    pub fn search_users(&self, subject: &str, term: &str) -> Result<Vec<User>> {
        let Some(caller) = self.resolve_caller(subject) else {
            return Ok(Vec::new());
        };
        Ok(self.db.lock().search_users(term, caller.id)?)
    }

    /// Everyone except the caller.  Empty for anonymous callers.
    pub fn list_users(&self, subject: &str) -> Result<Vec<User>> {
        let Some(caller) = self.resolve_caller(subject) else {
            return Ok(Vec::new());
        };
        Ok(self.db.lock().list_users(caller.id)?)
    }

    /// Presence heartbeat / offline transition.  Best-effort: failures are
    /// logged, never surfaced.
    pub fn set_online(&self, subject: &str, is_online: bool) {
        let Some(caller) = self.resolve_caller(subject) else {
            return;
        };
        if let Err(e) = self
            .db
            .lock()
            .set_online_status(caller.id, is_online, Utc::now())
        {
            tracing::warn!(error = %e, user_id = %caller.id, "presence update dropped");
        }
    }

    // ------------------------------------------------------------------
    // Conversations
    // ------------------------------------------------------------------

    /// The caller's conversations, newest activity first, each annotated
    /// with resolved participants, a display name and the unread count.
    pub fn list_conversations(&self, subject: &str) -> Result<Vec<ConversationSummary>> {
        let Some(caller) = self.resolve_caller(subject) else {
            return Ok(Vec::new());
        };

        let db = self.db.lock();
        let conversations = db.list_conversations_for_user(caller.id)?;
        let unread = db.unread_counts_for_user(caller.id)?;

        let mut summaries = Vec::with_capacity(conversations.len());
        for conversation in conversations {
            let mut participant_details = Vec::with_capacity(conversation.participants.len());
            for &participant in &conversation.participants {
                // Unresolvable ids are users who deleted their account.
                if let Some(user) = db.find_user(participant)? {
                    participant_details.push(user);
                }
            }

            let display_name = display_name_for(&conversation, &participant_details, caller.id);
            let unread_count = unread.get(&conversation.id).copied().unwrap_or(0);

            summaries.push(ConversationSummary {
                conversation,
                display_name,
                participant_details,
                unread_count,
            });
        }
        Ok(summaries)
    }

    /// A single conversation with resolved participants.  `None` when the
    /// conversation is absent, the caller is anonymous, or the caller is
    /// not a participant.
    pub fn conversation_details(
        &self,
        subject: &str,
        conversation_id: Uuid,
    ) -> Result<Option<ConversationDetails>> {
        let Some(caller) = self.resolve_caller(subject) else {
            return Ok(None);
        };

        let db = self.db.lock();
        let conversation = match db.get_conversation(conversation_id) {
            Ok(c) => c,
            Err(StoreError::NotFound) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if !conversation.participants.contains(&caller.id) {
            return Ok(None);
        }

        let mut participant_details = Vec::with_capacity(conversation.participants.len());
        for &participant in &conversation.participants {
            if let Some(user) = db.find_user(participant)? {
                participant_details.push(user);
            }
        }

        Ok(Some(ConversationDetails {
            conversation,
            participant_details,
        }))
    }

    /// Create a direct conversation with `other_user_id`, or return the
    /// existing one for this pair (involutive across argument order).
    pub fn create_or_get_direct(&self, subject: &str, other_user_id: Uuid) -> Result<Uuid> {
        let caller = self.require_caller(subject)?;

        let mut db = self.db.lock();
        if db.find_user(other_user_id)?.is_none() {
            return Err(ChatError::NotFound("user"));
        }

        let conversation =
            db.create_or_get_direct_conversation(caller.id, other_user_id, Utc::now())?;
        Ok(conversation.id)
    }

    /// Create a group conversation.  The caller is always included.
    pub fn create_group(
        &self,
        subject: &str,
        name: &str,
        participant_ids: &[Uuid],
    ) -> Result<Uuid> {
        let caller = self.require_caller(subject)?;

        if name.trim().is_empty() {
            return Err(ChatError::InvalidArgument(
                "group name must not be empty".to_string(),
            ));
        }

        let mut distinct = vec![caller.id];
        for &id in participant_ids {
            if !distinct.contains(&id) {
                distinct.push(id);
            }
        }
        if distinct.len() < 2 {
            return Err(ChatError::InvalidArgument(
                "a group needs at least two distinct participants".to_string(),
            ));
        }

        let conversation =
            self.db
                .lock()
                .create_group_conversation(caller.id, name, participant_ids, Utc::now())?;
        Ok(conversation.id)
    }

    // ------------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------------

    /// A conversation's messages, ascending by send time.  Membership is
    /// checked here too: non-participants and anonymous callers get `[]`.
    /// Soft-deleted messages keep their row but their content is redacted.
    pub fn list_messages(&self, subject: &str, conversation_id: Uuid) -> Result<Vec<Message>> {
        let Some(caller) = self.resolve_caller(subject) else {
            return Ok(Vec::new());
        };

        let db = self.db.lock();
        if !db.is_participant(conversation_id, caller.id)? {
            return Ok(Vec::new());
        }

        let mut messages = db.list_messages(conversation_id)?;
        for message in &mut messages {
            if message.is_deleted {
                message.content.clear();
            }
        }
        Ok(messages)
    }

    /// Append a message.  Fails before any side effect when the
    /// conversation is absent or the caller is not a participant.
    pub fn send_message(
        &self,
        subject: &str,
        conversation_id: Uuid,
        content: &str,
    ) -> Result<Uuid> {
        let caller = self.require_caller(subject)?;

        let mut db = self.db.lock();
        let conversation = match db.get_conversation(conversation_id) {
            Ok(c) => c,
            Err(StoreError::NotFound) => return Err(ChatError::NotFound("conversation")),
            Err(e) => return Err(e.into()),
        };
        if !conversation.participants.contains(&caller.id) {
            return Err(ChatError::NotAuthorized("not a participant"));
        }

        let message = db.append_message(conversation_id, caller.id, content, Utc::now())?;
        Ok(message.id)
    }

    /// Mark every message in the conversation as read by the caller.
    /// Best-effort and idempotent; failures are logged and swallowed.
    pub fn mark_read(&self, subject: &str, conversation_id: Uuid) {
        let Some(caller) = self.resolve_caller(subject) else {
            return;
        };
        match self
            .db
            .lock()
            .mark_conversation_read(conversation_id, caller.id)
        {
            Ok(added) if added > 0 => {
                tracing::debug!(conversation_id = %conversation_id, added, "messages marked read");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, conversation_id = %conversation_id, "mark-read dropped");
            }
        }
    }

    /// Soft-delete a message.  Only the original sender may delete.
    pub fn delete_message(&self, subject: &str, message_id: Uuid) -> Result<()> {
        let caller = self.require_caller(subject)?;

        let db = self.db.lock();
        let message = match db.get_message(message_id) {
            Ok(m) => m,
            Err(StoreError::NotFound) => return Err(ChatError::NotFound("message")),
            Err(e) => return Err(e.into()),
        };
        if message.sender_id != caller.id {
            return Err(ChatError::NotAuthorized("not the sender"));
        }

        db.soft_delete_message(message_id, Utc::now())?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Reactions
    // ------------------------------------------------------------------

    /// Toggle an emoji reaction on a message.
    pub fn toggle_reaction(&self, subject: &str, message_id: Uuid, emoji: &str) -> Result<()> {
        let caller = self.require_caller(subject)?;

        let mut db = self.db.lock();
        match db.get_message(message_id) {
            Ok(_) => {}
            Err(StoreError::NotFound) => return Err(ChatError::NotFound("message")),
            Err(e) => return Err(e.into()),
        }

        db.toggle_reaction(message_id, caller.id, emoji, Utc::now())?;
        Ok(())
    }

    /// Reactions on a message, grouped by emoji in first-seen order.
    pub fn list_reactions(&self, message_id: Uuid) -> Result<Vec<ReactionGroup>> {
        Ok(self.db.lock().reactions_for_message(message_id)?)
    }

    /// The emoji the caller has placed on a message.  Empty for anonymous
    /// callers.
    pub fn my_reactions(&self, subject: &str, message_id: Uuid) -> Result<Vec<String>> {
        let Some(caller) = self.resolve_caller(subject) else {
            return Ok(Vec::new());
        };
        Ok(self.db.lock().user_reactions(message_id, caller.id)?)
    }

    // ------------------------------------------------------------------
    // Typing
    // ------------------------------------------------------------------

    /// Record a composing pulse.  Best-effort.
    pub fn set_typing(&self, subject: &str, conversation_id: Uuid) {
        let Some(caller) = self.resolve_caller(subject) else {
            return;
        };
        if let Err(e) = self
            .db
            .lock()
            .upsert_typing_signal(conversation_id, caller.id, Utc::now())
        {
            tracing::warn!(error = %e, conversation_id = %conversation_id, "typing pulse dropped");
        }
    }

    /// Remove the caller's typing signal.  Best-effort.
    pub fn clear_typing(&self, subject: &str, conversation_id: Uuid) {
        let Some(caller) = self.resolve_caller(subject) else {
            return;
        };
        if let Err(e) = self.db.lock().clear_typing_signal(conversation_id, caller.id) {
            tracing::warn!(error = %e, conversation_id = %conversation_id, "typing clear dropped");
        }
    }

    /// Users composing in the conversation right now, excluding the caller.
    /// Empty for anonymous callers and non-participants.
    pub fn list_active_typists(&self, subject: &str, conversation_id: Uuid) -> Result<Vec<User>> {
        let Some(caller) = self.resolve_caller(subject) else {
            return Ok(Vec::new());
        };

        let db = self.db.lock();
        if !db.is_participant(conversation_id, caller.id)? {
            return Ok(Vec::new());
        }
        Ok(db.active_typists(conversation_id, caller.id, Utc::now())?)
    }

    // ------------------------------------------------------------------
    // Unread aggregation
    // ------------------------------------------------------------------

    /// Unread count for the caller in one conversation.  Zero for anonymous
    /// callers.
    pub fn unread_count(&self, subject: &str, conversation_id: Uuid) -> Result<i64> {
        let Some(caller) = self.resolve_caller(subject) else {
            return Ok(0);
        };
        Ok(self.db.lock().unread_count(conversation_id, caller.id)?)
    }

    /// Total unread across all of the caller's conversations.  Zero for
    /// anonymous callers.
    pub fn total_unread(&self, subject: &str) -> Result<i64> {
        let Some(caller) = self.resolve_caller(subject) else {
            return Ok(0);
        };
        Ok(self.db.lock().total_unread_count(caller.id)?)
    }
}
