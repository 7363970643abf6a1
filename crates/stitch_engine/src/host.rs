//! Seams between the scrape pipeline and the page it drives.
//!
//! A browser integration implements these traits over the live reader; the
//! [`crate::replay::ScriptedHost`] implements them over a recorded book.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pattern::UrlPattern;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("host page is gone")]
    Detached,
    #[error("observer could not be installed: {0}")]
    Observer(String),
    #[error("reload failed: {0}")]
    Reload(String),
}

/// Which reader request a matched URL belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestClass {
    /// Reading-progress report; sent once the visible page has fully loaded.
    ProgressReport,
    /// Chapter content fetch; sent when the page starts a new chapter.
    ChapterFetch,
}

/// What happens to a matched request after it was reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterceptAction {
    Cancel,
    /// Rewrite the request target. `None` keeps the URL, so the request goes
    /// through and is only observed.
    Redirect { to: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptRule {
    pub pattern: UrlPattern,
    pub action: InterceptAction,
    pub class: RequestClass,
}

/// Called with the class and URL of every intercepted request.
pub type RequestCallback = Arc<dyn Fn(RequestClass, &str) + Send + Sync>;
/// Called with the outer HTML of every element the observer reports.
pub type SnapshotCallback = Arc<dyn Fn(String) + Send + Sync>;

/// Unsubscribe handle for an installed observer. Dropping it detaches too.
pub struct Subscription {
    detach: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(detach: impl FnOnce() + Send + 'static) -> Self {
        Self {
            detach: Some(Box::new(detach)),
        }
    }

    pub fn unsubscribe(mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.detach.is_some())
            .finish()
    }
}

/// Pointer position carried by a synthetic click.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClickPoint {
    pub x: i32,
    pub y: i32,
}

impl ClickPoint {
    /// The reader ignores clicks at the origin as non-human; this is the
    /// smallest point it accepts.
    pub const HUMAN: ClickPoint = ClickPoint { x: 1, y: 1 };

    pub fn is_origin(self) -> bool {
        self.x == 0 && self.y == 0
    }
}

#[async_trait::async_trait]
pub trait HostPage: Send + Sync {
    async fn exists(&self, selector: &str) -> bool;
    /// Trimmed text content of the first match.
    async fn text_of(&self, selector: &str) -> Option<String>;
    /// Returns false when nothing matched the selector.
    async fn click(&self, selector: &str, at: ClickPoint) -> bool;
    async fn reload(&self) -> Result<(), HostError>;
}

pub trait RequestInterceptor: Send + Sync {
    fn intercept(
        &self,
        rules: Vec<InterceptRule>,
        on_request: RequestCallback,
    ) -> Result<Subscription, HostError>;
}

pub trait DomObserver: Send + Sync {
    fn observe(
        &self,
        selector: &str,
        on_snapshot: SnapshotCallback,
    ) -> Result<Subscription, HostError>;
}
