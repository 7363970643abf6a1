//! Optional `pagestitch.ron` config. Search order: an explicit `--config`
//! path, `./pagestitch.ron`, then `$PAGESTITCH_CONFIG`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use stitch_engine::{FetchSettings, SiteConfig};

use crate::platform::logging::LogDestination;

pub const CONFIG_FILE: &str = "pagestitch.ron";
pub const CONFIG_ENV: &str = "PAGESTITCH_CONFIG";
const PREFERENCES_FILE: &str = "preferences.json";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub site: SiteConfig,
    /// Where saved books land.
    pub output_dir: PathBuf,
    /// Holds the durable preferences store.
    pub state_dir: PathBuf,
    pub log: LogDestination,
    pub fetch: FetchConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            site: SiteConfig::default(),
            output_dir: PathBuf::from("."),
            state_dir: PathBuf::from(".pagestitch"),
            log: LogDestination::default(),
            fetch: FetchConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn preferences_path(&self) -> PathBuf {
        self.state_dir.join(PREFERENCES_FILE)
    }
}

/// Asset fetch limits. Unset keys keep the fetcher's defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub connect_timeout_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub max_bytes: Option<u64>,
    pub referer: Option<String>,
    pub user_agent: Option<String>,
}

impl FetchConfig {
    pub fn to_settings(&self) -> FetchSettings {
        let mut settings = FetchSettings::default();
        if let Some(secs) = self.connect_timeout_secs {
            settings.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.request_timeout_secs {
            settings.request_timeout = Duration::from_secs(secs);
        }
        if let Some(max) = self.max_bytes {
            settings.max_bytes = max;
        }
        settings.referer = self.referer.clone();
        settings.user_agent = self.user_agent.clone();
        settings
    }
}

/// Missing file returns the defaults. A present file that cannot be read or
/// parsed is an error.
pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig> {
    if let Some(path) = explicit {
        return read_config(path);
    }
    let mut candidates = vec![PathBuf::from(".").join(CONFIG_FILE)];
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        candidates.push(PathBuf::from(path));
    }
    for path in &candidates {
        if path.exists() {
            return read_config(path);
        }
    }
    Ok(AppConfig::default())
}

fn read_config(path: &Path) -> Result<AppConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("cannot read config {}", path.display()))?;
    parse_config(&text).with_context(|| format!("invalid config {}", path.display()))
}

pub fn parse_config(text: &str) -> Result<AppConfig> {
    if text.trim().is_empty() {
        return Ok(AppConfig::default());
    }
    Ok(ron::from_str(text)?)
}
