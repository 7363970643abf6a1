use serde::{Deserialize, Serialize};

/// The scrape-in-progress flag. Lives in session-scoped storage so it survives
/// a page reload but not a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionFlag {
    pub scraping: bool,
}

impl SessionFlag {
    pub const IDLE: SessionFlag = SessionFlag { scraping: false };
    pub const SCRAPING: SessionFlag = SessionFlag { scraping: true };
}
