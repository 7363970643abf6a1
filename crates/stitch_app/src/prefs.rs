use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use stitch_core::{PreferenceFlag, Preferences};
use stitch_engine::{FileStore, MemoryStore, SessionController};

use crate::config::AppConfig;

/// Opens the durable preferences the way a session would see them.
pub fn open_controller(config: &AppConfig) -> Result<SessionController> {
    let durable = FileStore::open(config.preferences_path())
        .context("cannot open the preferences store")?;
    Ok(SessionController::load(
        Arc::new(MemoryStore::new()),
        Arc::new(durable),
    ))
}

pub fn describe(prefs: &Preferences) -> String {
    let mut lines = vec![format!("turn delay: {} ms", prefs.page_turn_delay_ms)];
    for flag in PreferenceFlag::ALL {
        let state = if prefs.flag(flag) { "on" } else { "off" };
        lines.push(format!("{}: {}", flag.key(), state));
    }
    lines.join("\n")
}

pub fn set_delay(config: &AppConfig, raw: &str) -> Result<f64> {
    let mut controller = open_controller(config)?;
    Ok(controller.set_turn_delay(raw)?)
}

pub fn toggle(config: &AppConfig, key: &str) -> Result<(PreferenceFlag, bool)> {
    let flag = PreferenceFlag::from_key(key).ok_or_else(|| {
        let known: Vec<&str> = PreferenceFlag::ALL.iter().map(|flag| flag.key()).collect();
        anyhow!("unknown preference `{key}` (known: {})", known.join(", "))
    })?;
    let mut controller = open_controller(config)?;
    Ok((flag, controller.toggle(flag)))
}
