use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreferenceError {
    #[error("turn delay is not a number: {0:?}")]
    NotANumber(String),
    #[error("turn delay must be between 0 and 3600000 ms, got {0}")]
    OutOfRange(String),
}

/// Upper bound for the page-turn delay: one hour.
pub const MAX_TURN_DELAY_MS: f64 = 3_600_000.0;

fn delay_in_range(delay_ms: f64) -> bool {
    delay_ms.is_finite() && (0.0..=MAX_TURN_DELAY_MS).contains(&delay_ms)
}

/// Boolean preferences, each with a stable identity independent of display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PreferenceFlag {
    InlineImages,
}

impl PreferenceFlag {
    pub const ALL: [PreferenceFlag; 1] = [PreferenceFlag::InlineImages];

    pub fn label(self) -> &'static str {
        match self {
            PreferenceFlag::InlineImages => "Inline Images",
        }
    }

    /// Command-line / config spelling.
    pub fn key(self) -> &'static str {
        match self {
            PreferenceFlag::InlineImages => "inline-images",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|flag| flag.key() == key)
    }
}

/// Durable user preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub page_turn_delay_ms: f64,
    pub inline_images: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            page_turn_delay_ms: 0.0,
            inline_images: true,
        }
    }
}

impl Preferences {
    pub fn turn_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.page_turn_delay_ms / 1000.0).unwrap_or(Duration::ZERO)
    }

    /// Validated delay change; the current value is untouched on error.
    pub fn set_turn_delay(&mut self, delay_ms: f64) -> Result<(), PreferenceError> {
        if !delay_in_range(delay_ms) {
            return Err(PreferenceError::OutOfRange(delay_ms.to_string()));
        }
        self.page_turn_delay_ms = delay_ms;
        Ok(())
    }

    pub fn flag(&self, flag: PreferenceFlag) -> bool {
        match flag {
            PreferenceFlag::InlineImages => self.inline_images,
        }
    }

    pub fn set_flag(&mut self, flag: PreferenceFlag, value: bool) {
        match flag {
            PreferenceFlag::InlineImages => self.inline_images = value,
        }
    }

    /// Values persisted by an older build, or edited by hand, may be out of range.
    pub fn sanitized(mut self) -> Self {
        if !delay_in_range(self.page_turn_delay_ms) {
            self.page_turn_delay_ms = Self::default().page_turn_delay_ms;
        }
        self
    }
}

/// Parse user-entered delay text (milliseconds).
pub fn parse_turn_delay(raw: &str) -> Result<f64, PreferenceError> {
    let trimmed = raw.trim();
    let value: f64 = trimmed
        .parse()
        .map_err(|_| PreferenceError::NotANumber(trimmed.to_string()))?;
    if !delay_in_range(value) {
        return Err(PreferenceError::OutOfRange(trimmed.to_string()));
    }
    Ok(value)
}
