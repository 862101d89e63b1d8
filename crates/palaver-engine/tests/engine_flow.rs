//! End-to-end engine scenarios, driven the way the HTTP layer drives the
//! engine: by identity-provider subject, never by internal id.

use palaver_engine::{ChatEngine, ChatError, IdentityEvent};
use palaver_store::Database;
use uuid::Uuid;

fn engine_with_users(subjects: &[(&str, &str, &str)]) -> ChatEngine {
    let engine = ChatEngine::new(Database::open_in_memory().unwrap());
    for &(subject, email, name) in subjects {
        engine
            .apply_identity_event(IdentityEvent::Upserted {
                external_id: subject.to_string(),
                email: email.to_string(),
                display_name: name.to_string(),
                avatar_url: None,
            })
            .unwrap();
    }
    engine
}

fn trio() -> ChatEngine {
    engine_with_users(&[
        ("sub-a", "alice@example.com", "Alice"),
        ("sub-b", "bob@example.com", "Bob"),
        ("sub-c", "carol@example.com", "Carol"),
    ])
}

#[test]
fn first_contact_scenario() {
    let engine = trio();
    let bob = engine.resolve_caller("sub-b").unwrap();

    // Alice sends "hi" to Bob for the first time.
    let conv = engine.create_or_get_direct("sub-a", bob.id).unwrap();
    engine.send_message("sub-a", conv, "hi").unwrap();

    // Bob sees one conversation, named after Alice, with one unread.
    let listed = engine.list_conversations("sub-b").unwrap();
    assert_eq!(listed.len(), 1);
    let summary = &listed[0];
    assert_eq!(summary.conversation.id, conv);
    assert_eq!(summary.display_name, "Alice");
    assert_eq!(summary.unread_count, 1);
    assert_eq!(
        summary.conversation.last_message_preview.as_deref(),
        Some("hi")
    );
    assert_eq!(summary.participant_details.len(), 2);

    // Bob opens the conversation.
    engine.mark_read("sub-b", conv);
    assert_eq!(engine.unread_count("sub-b", conv).unwrap(), 0);

    // Alice, as the sender of the only message, was never behind.
    assert_eq!(engine.unread_count("sub-a", conv).unwrap(), 0);
}

#[test]
fn direct_conversation_is_stable_across_argument_order() {
    let engine = trio();
    let alice = engine.resolve_caller("sub-a").unwrap();
    let bob = engine.resolve_caller("sub-b").unwrap();

    let first = engine.create_or_get_direct("sub-a", bob.id).unwrap();
    let again = engine.create_or_get_direct("sub-a", bob.id).unwrap();
    let swapped = engine.create_or_get_direct("sub-b", alice.id).unwrap();

    assert_eq!(first, again);
    assert_eq!(first, swapped);
}

#[test]
fn group_unread_counts_per_participant() {
    let engine = trio();
    let bob = engine.resolve_caller("sub-b").unwrap();
    let carol = engine.resolve_caller("sub-c").unwrap();

    let conv = engine
        .create_group("sub-a", "trio", &[bob.id, carol.id])
        .unwrap();

    // One message from Bob: unread for Alice and Carol, not for Bob.
    engine.send_message("sub-b", conv, "hello all").unwrap();
    assert_eq!(engine.unread_count("sub-a", conv).unwrap(), 1);
    assert_eq!(engine.unread_count("sub-b", conv).unwrap(), 0);
    assert_eq!(engine.unread_count("sub-c", conv).unwrap(), 1);
    assert_eq!(engine.total_unread("sub-c").unwrap(), 1);
}

#[test]
fn sender_is_always_in_the_read_set() {
    let engine = trio();
    let bob = engine.resolve_caller("sub-b").unwrap();
    let alice = engine.resolve_caller("sub-a").unwrap();

    let conv = engine.create_or_get_direct("sub-a", bob.id).unwrap();
    engine.send_message("sub-a", conv, "mine").unwrap();

    let messages = engine.list_messages("sub-a", conv).unwrap();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].read_by.contains(&alice.id));
}

#[test]
fn deleted_messages_stop_counting_as_unread() {
    let engine = trio();
    let bob = engine.resolve_caller("sub-b").unwrap();

    let conv = engine.create_or_get_direct("sub-a", bob.id).unwrap();
    engine.send_message("sub-a", conv, "oops").unwrap();
    assert_eq!(engine.unread_count("sub-b", conv).unwrap(), 1);

    let messages = engine.list_messages("sub-a", conv).unwrap();
    engine.delete_message("sub-a", messages[0].id).unwrap();

    assert_eq!(engine.unread_count("sub-b", conv).unwrap(), 0);

    // The row survives but its content is never rendered again.
    let messages = engine.list_messages("sub-b", conv).unwrap();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].is_deleted);
    assert!(messages[0].content.is_empty());
}

#[test]
fn only_the_sender_may_delete() {
    let engine = trio();
    let bob = engine.resolve_caller("sub-b").unwrap();

    let conv = engine.create_or_get_direct("sub-a", bob.id).unwrap();
    engine.send_message("sub-a", conv, "keep out").unwrap();
    let message = engine.list_messages("sub-b", conv).unwrap()[0].id;

    assert!(matches!(
        engine.delete_message("sub-b", message),
        Err(ChatError::NotAuthorized(_))
    ));
    assert!(matches!(
        engine.delete_message("ghost", message),
        Err(ChatError::Unauthenticated)
    ));
    engine.delete_message("sub-a", message).unwrap();
}

#[test]
fn reaction_toggle_is_an_involution() {
    let engine = trio();
    let bob = engine.resolve_caller("sub-b").unwrap();

    let conv = engine.create_or_get_direct("sub-a", bob.id).unwrap();
    engine.send_message("sub-a", conv, "react to me").unwrap();
    let message = engine.list_messages("sub-b", conv).unwrap()[0].id;

    engine.toggle_reaction("sub-b", message, "👍").unwrap();
    let groups = engine.list_reactions(message).unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].count, 1);
    assert_eq!(engine.my_reactions("sub-b", message).unwrap(), vec!["👍"]);

    engine.toggle_reaction("sub-b", message, "👍").unwrap();
    assert!(engine.list_reactions(message).unwrap().is_empty());
    assert!(engine.my_reactions("sub-b", message).unwrap().is_empty());
}

#[test]
fn typing_signals_exclude_the_caller() {
    let engine = trio();
    let bob = engine.resolve_caller("sub-b").unwrap();

    let conv = engine.create_or_get_direct("sub-a", bob.id).unwrap();
    engine.set_typing("sub-b", conv);

    let typists = engine.list_active_typists("sub-a", conv).unwrap();
    assert_eq!(typists.len(), 1);
    assert_eq!(typists[0].display_name, "Bob");
    assert!(engine.list_active_typists("sub-b", conv).unwrap().is_empty());

    engine.clear_typing("sub-b", conv);
    assert!(engine.list_active_typists("sub-a", conv).unwrap().is_empty());
}

#[test]
fn read_paths_degrade_for_anonymous_callers() {
    let engine = trio();
    let bob = engine.resolve_caller("sub-b").unwrap();
    let conv = engine.create_or_get_direct("sub-a", bob.id).unwrap();
    engine.send_message("sub-a", conv, "secret").unwrap();

    assert!(engine.list_conversations("ghost").unwrap().is_empty());
    assert!(engine.list_messages("ghost", conv).unwrap().is_empty());
    assert!(engine.conversation_details("ghost", conv).unwrap().is_none());
    assert_eq!(engine.total_unread("ghost").unwrap(), 0);
    assert!(engine.search_users("ghost", "ali").unwrap().is_empty());

    // Best-effort mutations are silently dropped.
    engine.mark_read("ghost", conv);
    engine.set_typing("ghost", conv);
    engine.set_online("ghost", true);
}

#[test]
fn write_paths_reject_anonymous_and_unrelated_callers() {
    let engine = trio();
    let bob = engine.resolve_caller("sub-b").unwrap();
    let conv = engine.create_or_get_direct("sub-a", bob.id).unwrap();

    assert!(matches!(
        engine.send_message("ghost", conv, "hi"),
        Err(ChatError::Unauthenticated)
    ));
    // Carol is not a participant of the Alice/Bob chat.
    assert!(matches!(
        engine.send_message("sub-c", conv, "let me in"),
        Err(ChatError::NotAuthorized(_))
    ));
    assert!(matches!(
        engine.send_message("sub-a", Uuid::new_v4(), "hi"),
        Err(ChatError::NotFound(_))
    ));

    // And Carol cannot read it either: membership is re-checked at read.
    engine.send_message("sub-a", conv, "private").unwrap();
    assert!(engine.list_messages("sub-c", conv).unwrap().is_empty());
    assert!(engine.conversation_details("sub-c", conv).unwrap().is_none());
}

#[test]
fn group_creation_validates_arguments() {
    let engine = trio();
    let alice = engine.resolve_caller("sub-a").unwrap();

    assert!(matches!(
        engine.create_group("sub-a", "  ", &[alice.id]),
        Err(ChatError::InvalidArgument(_))
    ));
    // Caller alone (even listed explicitly) is not a group.
    assert!(matches!(
        engine.create_group("sub-a", "solo", &[alice.id]),
        Err(ChatError::InvalidArgument(_))
    ));
}

#[test]
fn identity_deletion_degrades_participant_details() {
    let engine = trio();
    let bob = engine.resolve_caller("sub-b").unwrap();

    let conv = engine.create_or_get_direct("sub-a", bob.id).unwrap();
    engine.send_message("sub-b", conv, "bye").unwrap();

    engine
        .apply_identity_event(IdentityEvent::Deleted {
            external_id: "sub-b".to_string(),
        })
        .unwrap();

    // The conversation still lists, with Bob's record dropped and the
    // display name falling back.
    let listed = engine.list_conversations("sub-a").unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].participant_details.len(), 1);
    assert_eq!(listed[0].display_name, "Deleted user");
}

#[test]
fn send_refreshes_sender_presence() {
    let engine = trio();
    let bob = engine.resolve_caller("sub-b").unwrap();
    assert!(!engine.resolve_caller("sub-a").unwrap().is_online);

    let conv = engine.create_or_get_direct("sub-a", bob.id).unwrap();
    engine.send_message("sub-a", conv, "hi").unwrap();

    assert!(engine.resolve_caller("sub-a").unwrap().is_online);

    engine.set_online("sub-a", false);
    assert!(!engine.resolve_caller("sub-a").unwrap().is_online);
}
