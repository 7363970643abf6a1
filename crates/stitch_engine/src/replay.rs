//! A host page that plays back a recorded book.
//!
//! Each scripted page produces the signals the live reader produces when it
//! shows that page: the chapter request (for a chapter's first page), the
//! settled render container, then the reading-progress report. A page marked
//! `late_container` swaps the last two.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use stitch_logging::stitch_trace;

use crate::config::SiteSelectors;
use crate::host::{
    ClickPoint, DomObserver, HostError, HostPage, InterceptAction, InterceptRule, RequestCallback,
    RequestInterceptor, SnapshotCallback, Subscription,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptedPage {
    /// Outer HTML of the settled render container.
    pub container: String,
    #[serde(default)]
    pub new_chapter: bool,
    /// Defaults to "not the last page".
    #[serde(default)]
    pub has_next: Option<bool>,
    /// Defaults to "is the last page".
    #[serde(default)]
    pub end_of_book: Option<bool>,
    /// The container settles only after the progress report went out, as on
    /// a slow reader.
    #[serde(default)]
    pub late_container: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayScript {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default = "default_progress_url")]
    pub progress_url: String,
    #[serde(default = "default_chapter_url")]
    pub chapter_url: String,
    pub pages: Vec<ScriptedPage>,
}

fn default_progress_url() -> String {
    "https://weread.qq.com/web/book/read".to_string()
}

fn default_chapter_url() -> String {
    "https://weread.qq.com/web/book/chapter/e_0".to_string()
}

impl ReplayScript {
    pub fn new(pages: Vec<ScriptedPage>) -> Self {
        Self {
            title: None,
            progress_url: default_progress_url(),
            chapter_url: default_chapter_url(),
            pages,
        }
    }

    fn has_next(&self, index: usize) -> bool {
        self.pages
            .get(index)
            .and_then(|page| page.has_next)
            .unwrap_or(index + 1 < self.pages.len())
    }

    fn end_of_book(&self, index: usize) -> bool {
        self.pages
            .get(index)
            .and_then(|page| page.end_of_book)
            .unwrap_or(index + 1 == self.pages.len())
    }
}

/// What the scripted host saw and did, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostRecord {
    Reload,
    /// A request no rule matched.
    Forwarded { url: String },
    Cancelled { url: String },
    Redirected { url: String, to: String },
    Snapshot { page: usize },
    Click { page: usize, accepted: bool },
}

struct Interception {
    id: u64,
    rules: Vec<InterceptRule>,
    callback: RequestCallback,
}

struct Observation {
    id: u64,
    callback: SnapshotCallback,
}

#[derive(Default)]
struct HostState {
    current: Option<usize>,
    interception: Option<Interception>,
    observers: Vec<Observation>,
    records: Vec<HostRecord>,
    next_id: u64,
}

#[derive(Clone)]
pub struct ScriptedHost {
    script: Arc<ReplayScript>,
    selectors: SiteSelectors,
    state: Arc<Mutex<HostState>>,
}

impl ScriptedHost {
    pub fn new(script: ReplayScript, selectors: SiteSelectors) -> Self {
        Self {
            script: Arc::new(script),
            selectors,
            state: Arc::new(Mutex::new(HostState::default())),
        }
    }

    pub fn records(&self) -> Vec<HostRecord> {
        self.lock().records.clone()
    }

    pub fn current_page(&self) -> Option<usize> {
        self.lock().current
    }

    pub fn observers_installed(&self) -> bool {
        let state = self.lock();
        state.interception.is_some() || !state.observers.is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HostState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn show_page(&self, index: usize) {
        let Some(page) = self.script.pages.get(index) else {
            return;
        };
        self.lock().current = Some(index);
        stitch_trace!("replay shows page {}", index + 1);
        if page.new_chapter {
            self.request(&self.script.chapter_url);
        }
        if page.late_container {
            self.request(&self.script.progress_url);
            self.snapshot(index, &page.container);
        } else {
            self.snapshot(index, &page.container);
            self.request(&self.script.progress_url);
        }
    }

    /// Callbacks run after the lock is released.
    fn request(&self, url: &str) {
        let matched = {
            let mut state = self.lock();
            let matched = state.interception.as_ref().and_then(|interception| {
                interception
                    .rules
                    .iter()
                    .find(|rule| rule.pattern.matches(url))
                    .map(|rule| (rule.clone(), interception.callback.clone()))
            });
            let record = match &matched {
                None => HostRecord::Forwarded {
                    url: url.to_string(),
                },
                Some((rule, _)) => match &rule.action {
                    InterceptAction::Cancel => HostRecord::Cancelled {
                        url: url.to_string(),
                    },
                    InterceptAction::Redirect { to } => HostRecord::Redirected {
                        url: url.to_string(),
                        to: to.clone().unwrap_or_else(|| url.to_string()),
                    },
                },
            };
            state.records.push(record);
            matched
        };
        if let Some((rule, callback)) = matched {
            callback(rule.class, url);
        }
    }

    fn snapshot(&self, index: usize, container: &str) {
        let callbacks: Vec<SnapshotCallback> = {
            let mut state = self.lock();
            if state.observers.is_empty() {
                return;
            }
            state.records.push(HostRecord::Snapshot { page: index });
            state.observers.iter().map(|o| o.callback.clone()).collect()
        };
        for callback in callbacks {
            callback(container.to_string());
        }
    }
}

#[async_trait::async_trait]
impl HostPage for ScriptedHost {
    async fn exists(&self, selector: &str) -> bool {
        let Some(index) = self.current_page() else {
            return false;
        };
        if selector == self.selectors.next_page {
            self.script.has_next(index)
        } else if selector == self.selectors.end_of_book {
            self.script.end_of_book(index)
        } else if selector == self.selectors.book_title {
            self.script.title.is_some()
        } else {
            false
        }
    }

    async fn text_of(&self, selector: &str) -> Option<String> {
        if selector == self.selectors.book_title {
            self.script.title.as_ref().map(|title| title.trim().to_string())
        } else {
            None
        }
    }

    async fn click(&self, selector: &str, at: ClickPoint) -> bool {
        let Some(index) = self.current_page() else {
            return false;
        };
        if selector != self.selectors.next_page || !self.script.has_next(index) {
            return false;
        }
        // The reader drops clicks without pointer coordinates.
        let accepted = !at.is_origin();
        self.lock().records.push(HostRecord::Click {
            page: index,
            accepted,
        });
        if accepted {
            self.show_page(index + 1);
        }
        true
    }

    async fn reload(&self) -> Result<(), HostError> {
        {
            let mut state = self.lock();
            state.records.push(HostRecord::Reload);
            state.current = None;
        }
        if !self.script.pages.is_empty() {
            self.show_page(0);
        }
        Ok(())
    }
}

impl RequestInterceptor for ScriptedHost {
    fn intercept(
        &self,
        rules: Vec<InterceptRule>,
        on_request: RequestCallback,
    ) -> Result<Subscription, HostError> {
        let id = {
            let mut state = self.lock();
            state.next_id += 1;
            let id = state.next_id;
            state.interception = Some(Interception {
                id,
                rules,
                callback: on_request,
            });
            id
        };
        let state = self.state.clone();
        Ok(Subscription::new(move || {
            let mut state = state.lock().unwrap_or_else(|p| p.into_inner());
            if state.interception.as_ref().is_some_and(|i| i.id == id) {
                state.interception = None;
            }
        }))
    }
}

impl DomObserver for ScriptedHost {
    fn observe(
        &self,
        selector: &str,
        on_snapshot: SnapshotCallback,
    ) -> Result<Subscription, HostError> {
        if selector != self.selectors.render_container {
            return Err(HostError::Observer(format!(
                "replay only renders `{}`",
                self.selectors.render_container
            )));
        }
        let id = {
            let mut state = self.lock();
            state.next_id += 1;
            let id = state.next_id;
            state.observers.push(Observation {
                id,
                callback: on_snapshot,
            });
            id
        };
        let state = self.state.clone();
        Ok(Subscription::new(move || {
            let mut state = state.lock().unwrap_or_else(|p| p.into_inner());
            state.observers.retain(|o| o.id != id);
        }))
    }
}
