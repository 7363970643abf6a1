use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use stitch_core::{ListenerId, Observable, PreferenceFlag, Preferences};

use crate::runtime::{Command, SessionHandle, WeakSessionHandle};

/// Stable identity of a menu command; labels may change, ids never do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandId {
    Start,
    Cancel,
    StopAndSave,
    SetTurnDelay,
    Toggle(PreferenceFlag),
}

impl CommandId {
    pub fn all() -> Vec<CommandId> {
        let mut ids = vec![
            CommandId::Start,
            CommandId::Cancel,
            CommandId::StopAndSave,
            CommandId::SetTurnDelay,
        ];
        ids.extend(PreferenceFlag::ALL.into_iter().map(CommandId::Toggle));
        ids
    }

    pub fn label(self, prefs: &Preferences) -> String {
        match self {
            CommandId::Start => "Start Scraping".to_string(),
            CommandId::Cancel => "Cancel Scraping".to_string(),
            CommandId::StopAndSave => "Stop Scraping & Save".to_string(),
            CommandId::SetTurnDelay => {
                format!("Set Turn Delay ({} ms)", prefs.page_turn_delay_ms)
            }
            CommandId::Toggle(flag) => {
                if prefs.flag(flag) {
                    format!("✓ {}", flag.label())
                } else {
                    flag.label().to_string()
                }
            }
        }
    }
}

/// A menu entry's callback. Runs on the menu's thread, so it only enqueues.
pub type MenuAction = Arc<dyn Fn() + Send + Sync>;

pub trait CommandMenu: Send + Sync {
    /// Add the command, or replace its label and action in place when it is
    /// already registered.
    fn register(&self, id: CommandId, label: &str, action: MenuAction);
    fn unregister(&self, id: CommandId) -> bool;
    /// Ask the user for a value, showing `current` as the suggestion.
    /// `None` means the user dismissed the prompt.
    fn prompt(&self, message: &str, current: &str) -> Option<String>;
}

const DELAY_PROMPT: &str = "Page turn delay in milliseconds";

/// Keeps the menu's labels in step with the preferences and routes each
/// entry to the session.
#[derive(Debug)]
pub struct MenuBinder {
    listener: ListenerId,
}

impl MenuBinder {
    pub fn bind(
        menu: Arc<dyn CommandMenu>,
        prefs: &mut Observable<Preferences>,
        session: &SessionHandle,
    ) -> Self {
        let session = session.downgrade();
        let weak_menu = Arc::downgrade(&menu);
        for id in CommandId::all() {
            let action = action_for(id, prefs.get(), &session, &weak_menu);
            menu.register(id, &id.label(prefs.get()), action);
        }
        let listener = prefs.subscribe(move |previous, current| {
            for id in CommandId::all() {
                let label = id.label(current);
                if label != id.label(previous) {
                    menu.register(id, &label, action_for(id, current, &session, &weak_menu));
                }
            }
        });
        Self { listener }
    }

    pub fn unbind(self, menu: &dyn CommandMenu, prefs: &mut Observable<Preferences>) {
        prefs.unsubscribe(self.listener);
        for id in CommandId::all() {
            menu.unregister(id);
        }
    }
}

fn action_for(
    id: CommandId,
    prefs: &Preferences,
    session: &WeakSessionHandle,
    menu: &Weak<dyn CommandMenu>,
) -> MenuAction {
    let session = session.clone();
    match id {
        CommandId::Start => Arc::new(move || {
            session.send(Command::Start);
        }),
        CommandId::Cancel => Arc::new(move || {
            session.send(Command::Cancel);
        }),
        CommandId::StopAndSave => Arc::new(move || {
            session.send(Command::StopAndSave);
        }),
        CommandId::SetTurnDelay => {
            let current = prefs.page_turn_delay_ms.to_string();
            let menu = menu.clone();
            Arc::new(move || {
                let answer = menu
                    .upgrade()
                    .and_then(|menu| menu.prompt(DELAY_PROMPT, &current));
                if let Some(raw) = answer {
                    session.send(Command::SetTurnDelay(raw));
                }
            })
        }
        CommandId::Toggle(flag) => Arc::new(move || {
            session.send(Command::Toggle(flag));
        }),
    }
}

struct MenuEntry {
    id: CommandId,
    label: String,
    action: MenuAction,
}

impl fmt::Debug for MenuEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MenuEntry")
            .field("id", &self.id)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    entries: Vec<MenuEntry>,
    registrations: Vec<CommandId>,
    prompt_reply: Option<String>,
}

/// In-process menu: ordered entries plus a log of every registration.
/// Prompts are answered with a preset reply.
#[derive(Debug, Default)]
pub struct MenuRegistry {
    state: Mutex<RegistryState>,
}

impl MenuRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<(CommandId, String)> {
        self.lock()
            .entries
            .iter()
            .map(|entry| (entry.id, entry.label.clone()))
            .collect()
    }

    pub fn label(&self, id: CommandId) -> Option<String> {
        self.lock()
            .entries
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| entry.label.clone())
    }

    pub fn registrations(&self) -> Vec<CommandId> {
        self.lock().registrations.clone()
    }

    /// The answer the next prompts get; `None` dismisses them.
    pub fn set_prompt_reply(&self, reply: Option<String>) {
        self.lock().prompt_reply = reply;
    }

    /// Run the entry's action as a click on it would. False when `id` is not
    /// registered.
    pub fn invoke(&self, id: CommandId) -> bool {
        // Actions may call back into the registry.
        let action = self
            .lock()
            .entries
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| entry.action.clone());
        match action {
            Some(action) => {
                action();
                true
            }
            None => false,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RegistryState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CommandMenu for MenuRegistry {
    fn register(&self, id: CommandId, label: &str, action: MenuAction) {
        let mut state = self.lock();
        state.registrations.push(id);
        match state.entries.iter_mut().find(|entry| entry.id == id) {
            Some(entry) => {
                entry.label = label.to_string();
                entry.action = action;
            }
            None => state.entries.push(MenuEntry {
                id,
                label: label.to_string(),
                action,
            }),
        }
    }

    fn unregister(&self, id: CommandId) -> bool {
        let mut state = self.lock();
        let before = state.entries.len();
        state.entries.retain(|entry| entry.id != id);
        state.entries.len() != before
    }

    fn prompt(&self, _message: &str, _current: &str) -> Option<String> {
        self.lock().prompt_reply.clone()
    }
}
