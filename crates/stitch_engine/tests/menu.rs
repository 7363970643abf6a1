use std::sync::Arc;

use serde_json::json;
use stitch_core::{PreferenceFlag, SessionFlag};
use stitch_engine::{
    Command, CommandId, CommandMenu, KeyValueStore, MemoryStore, MenuBinder, MenuRegistry,
    SessionController, SessionHandle, PREFERENCES_KEY, SESSION_KEY,
};
use tokio::sync::mpsc::UnboundedReceiver;

fn controller() -> (SessionController, Arc<MemoryStore>, Arc<MemoryStore>) {
    let session = Arc::new(MemoryStore::new());
    let durable = Arc::new(MemoryStore::new());
    let controller = SessionController::load(session.clone(), durable.clone());
    (controller, session, durable)
}

fn drain(commands: &mut UnboundedReceiver<Command>) -> Vec<Command> {
    let mut received = Vec::new();
    while let Ok(command) = commands.try_recv() {
        received.push(command);
    }
    received
}

#[test]
fn binding_registers_every_command() {
    let (mut controller, _, _) = controller();
    let registry = Arc::new(MenuRegistry::new());
    let (handle, _commands) = SessionHandle::channel();
    let _binder = MenuBinder::bind(registry.clone(), controller.preferences_mut(), &handle);

    assert_eq!(
        registry.entries(),
        vec![
            (CommandId::Start, "Start Scraping".to_string()),
            (CommandId::Cancel, "Cancel Scraping".to_string()),
            (CommandId::StopAndSave, "Stop Scraping & Save".to_string()),
            (CommandId::SetTurnDelay, "Set Turn Delay (0 ms)".to_string()),
            (
                CommandId::Toggle(PreferenceFlag::InlineImages),
                "✓ Inline Images".to_string()
            ),
        ]
    );
}

#[test]
fn preference_changes_relabel_only_affected_commands() {
    let (mut controller, _, _) = controller();
    let registry = Arc::new(MenuRegistry::new());
    let (handle, _commands) = SessionHandle::channel();
    let _binder = MenuBinder::bind(registry.clone(), controller.preferences_mut(), &handle);
    let initial = registry.registrations().len();

    assert!(!controller.toggle(PreferenceFlag::InlineImages));
    assert_eq!(
        registry.label(CommandId::Toggle(PreferenceFlag::InlineImages)),
        Some("Inline Images".to_string())
    );
    controller.set_turn_delay("1500").unwrap();
    assert_eq!(
        registry.label(CommandId::SetTurnDelay),
        Some("Set Turn Delay (1500 ms)".to_string())
    );

    let relabelled = &registry.registrations()[initial..];
    assert_eq!(
        relabelled,
        &[
            CommandId::Toggle(PreferenceFlag::InlineImages),
            CommandId::SetTurnDelay
        ]
    );
    // Relabelling never duplicates an entry.
    assert_eq!(registry.entries().len(), CommandId::all().len());
}

#[test]
fn unbinding_removes_commands_and_stops_relabelling() {
    let (mut controller, _, _) = controller();
    let registry = Arc::new(MenuRegistry::new());
    let (handle, _commands) = SessionHandle::channel();
    let binder = MenuBinder::bind(registry.clone(), controller.preferences_mut(), &handle);

    binder.unbind(registry.as_ref(), controller.preferences_mut());
    assert!(registry.entries().is_empty());
    assert!(!registry.unregister(CommandId::Start));

    controller.toggle(PreferenceFlag::InlineImages);
    assert!(registry.entries().is_empty());
}

#[test]
fn menu_entries_issue_session_commands() {
    let (mut controller, _, _) = controller();
    let registry = Arc::new(MenuRegistry::new());
    let (handle, mut commands) = SessionHandle::channel();
    let _binder = MenuBinder::bind(registry.clone(), controller.preferences_mut(), &handle);

    for id in [
        CommandId::Start,
        CommandId::Cancel,
        CommandId::StopAndSave,
        CommandId::Toggle(PreferenceFlag::InlineImages),
    ] {
        assert!(registry.invoke(id));
    }
    // A dismissed prompt sends nothing.
    assert!(registry.invoke(CommandId::SetTurnDelay));
    registry.set_prompt_reply(Some("750".to_string()));
    assert!(registry.invoke(CommandId::SetTurnDelay));

    assert_eq!(
        drain(&mut commands),
        vec![
            Command::Start,
            Command::Cancel,
            Command::StopAndSave,
            Command::Toggle(PreferenceFlag::InlineImages),
            Command::SetTurnDelay("750".to_string()),
        ]
    );
}

#[test]
fn menu_entries_go_quiet_once_the_session_is_gone() {
    let (mut controller, _, _) = controller();
    let registry = Arc::new(MenuRegistry::new());
    let (handle, mut commands) = SessionHandle::channel();
    let _binder = MenuBinder::bind(registry.clone(), controller.preferences_mut(), &handle);

    registry.set_prompt_reply(Some("750".to_string()));
    drop(handle);
    assert!(registry.invoke(CommandId::Start));
    assert!(registry.invoke(CommandId::SetTurnDelay));
    assert!(drain(&mut commands).is_empty());
}

#[test]
fn rejected_delay_keeps_the_previous_value() {
    let (mut controller, _, durable) = controller();
    controller.set_turn_delay("250").unwrap();
    assert!(controller.set_turn_delay("soon").is_err());
    assert!(controller.set_turn_delay("-5").is_err());
    assert_eq!(controller.preferences().page_turn_delay_ms, 250.0);
    assert_eq!(
        durable.get(PREFERENCES_KEY).unwrap(),
        Some(json!({"page_turn_delay_ms": 250.0, "inline_images": true}))
    );
}

#[test]
fn session_flag_is_kept_only_while_scraping() {
    let (mut controller, session, _) = controller();
    assert!(controller.begin());
    assert!(!controller.begin());
    assert_eq!(
        session.get(SESSION_KEY).unwrap(),
        Some(json!({"scraping": true}))
    );
    assert!(controller.end());
    assert_eq!(session.get(SESSION_KEY).unwrap(), None);
}

#[test]
fn stored_state_is_restored() {
    let session = Arc::new(MemoryStore::new());
    let durable = Arc::new(MemoryStore::new());
    session.set(SESSION_KEY, json!({"scraping": true})).unwrap();
    durable
        .set(
            PREFERENCES_KEY,
            json!({"page_turn_delay_ms": -3.0, "inline_images": false}),
        )
        .unwrap();

    let controller = SessionController::load(session, durable);
    assert!(controller.is_scraping());
    // Out-of-range values fall back to the default.
    assert_eq!(controller.preferences().page_turn_delay_ms, 0.0);
    assert!(!controller.preferences().inline_images);
}

#[test]
fn unreadable_state_falls_back_to_defaults() {
    let session = Arc::new(MemoryStore::new());
    let durable = Arc::new(MemoryStore::new());
    session.set(SESSION_KEY, json!("yes")).unwrap();
    durable.set(PREFERENCES_KEY, json!("fast")).unwrap();

    let mut controller = SessionController::load(session, durable);
    assert!(!controller.is_scraping());
    assert_eq!(*controller.session_flag_mut().get(), SessionFlag::IDLE);
    assert!(controller.preferences().inline_images);
}
