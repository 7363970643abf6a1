use std::sync::Arc;

use stitch_core::{
    parse_turn_delay, Observable, PreferenceError, PreferenceFlag, Preferences, SessionFlag,
};
use stitch_logging::{stitch_info, stitch_warn};

use crate::store::{load_typed, save_typed, KeyValueStore};

/// Session-store key of the scrape-in-progress flag.
pub const SESSION_KEY: &str = "scraper-session";
/// Durable-store key of the user preferences.
pub const PREFERENCES_KEY: &str = "scraper-preferences";

/// Owns the session flag and the preferences, and keeps both persisted.
///
/// Every mutation goes through an [`Observable`], so persistence, the page
/// machine and the menu all hang off the same change notifications.
pub struct SessionController {
    session: Observable<SessionFlag>,
    prefs: Observable<Preferences>,
}

impl SessionController {
    /// Restore both containers from their stores. Unreadable values fall
    /// back to defaults with a warning.
    pub fn load(session_store: Arc<dyn KeyValueStore>, durable_store: Arc<dyn KeyValueStore>) -> Self {
        let flag = match load_typed::<SessionFlag>(session_store.as_ref(), SESSION_KEY) {
            Ok(flag) => flag.unwrap_or(SessionFlag::IDLE),
            Err(err) => {
                stitch_warn!("ignoring stored session flag: {}", err);
                SessionFlag::IDLE
            }
        };
        let prefs = match load_typed::<Preferences>(durable_store.as_ref(), PREFERENCES_KEY) {
            Ok(prefs) => prefs.unwrap_or_default().sanitized(),
            Err(err) => {
                stitch_warn!("ignoring stored preferences: {}", err);
                Preferences::default()
            }
        };

        let mut session = Observable::new(flag);
        session.subscribe(move |_, current: &SessionFlag| {
            let result = if current.scraping {
                save_typed(session_store.as_ref(), SESSION_KEY, current)
            } else {
                session_store.delete(SESSION_KEY)
            };
            if let Err(err) = result {
                stitch_warn!("could not persist session flag: {}", err);
            }
        });

        let mut prefs = Observable::new(prefs);
        prefs.subscribe(move |_, current: &Preferences| {
            if let Err(err) = save_typed(durable_store.as_ref(), PREFERENCES_KEY, current) {
                stitch_warn!("could not persist preferences: {}", err);
            }
        });

        Self { session, prefs }
    }

    pub fn is_scraping(&self) -> bool {
        self.session.get().scraping
    }

    /// Returns true when the flag flipped.
    pub fn begin(&mut self) -> bool {
        self.session.set(SessionFlag::SCRAPING)
    }

    pub fn end(&mut self) -> bool {
        self.session.set(SessionFlag::IDLE)
    }

    pub fn preferences(&self) -> &Preferences {
        self.prefs.get()
    }

    /// Parse and apply a new turn delay. On error the previous delay stays.
    pub fn set_turn_delay(&mut self, raw: &str) -> Result<f64, PreferenceError> {
        let delay = parse_turn_delay(raw)?;
        let mut next = self.prefs.get().clone();
        next.set_turn_delay(delay)?;
        self.prefs.set(next);
        stitch_info!("page turn delay set to {} ms", delay);
        Ok(delay)
    }

    /// Flip a boolean preference; returns its new value.
    pub fn toggle(&mut self, flag: PreferenceFlag) -> bool {
        let value = !self.prefs.get().flag(flag);
        self.prefs.update(|prefs| prefs.set_flag(flag, value));
        stitch_info!("{} {}", flag.label(), if value { "on" } else { "off" });
        value
    }

    pub fn session_flag_mut(&mut self) -> &mut Observable<SessionFlag> {
        &mut self.session
    }

    pub fn preferences_mut(&mut self) -> &mut Observable<Preferences> {
        &mut self.prefs
    }
}
