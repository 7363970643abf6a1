//! Stitch core: pure page-turn state machine, observable state containers and
//! user preferences.
mod effect;
mod msg;
mod observable;
mod prefs;
mod session;
mod state;
mod update;

pub use effect::{Effect, StallReason};
pub use msg::{Msg, PageProbe};
pub use observable::{ListenerId, Observable};
pub use prefs::{parse_turn_delay, PreferenceError, PreferenceFlag, Preferences, MAX_TURN_DELAY_MS};
pub use session::SessionFlag;
pub use state::{MachineView, PageMachine, PageState, Phase, TimerId};
pub use update::update;
