use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::json;
use stitch_core::{Phase, PreferenceFlag, StallReason};
use stitch_engine::{
    AssetFetcher, Collaborators, Command, CommandId, CommandMenu, EventSink, FailureKind,
    FetchError, FetchOutput, HostPage, HostRecord, KeyValueStore, LightMinifier, MemoryStore,
    MenuRegistry, PersistError, ReplayScript, SaveError, SaveTarget, SavedBook, ScrapeSession,
    ScriptedHost, ScriptedPage, SessionEvent, SessionHandle, SiteConfig, PREFERENCES_KEY,
    SESSION_KEY,
};
use tokio::sync::Notify;

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(stitch_logging::initialize_for_tests);
}

const PROGRESS_URL: &str = "https://weread.qq.com/web/book/read";
const CHAPTER_URL: &str = "https://weread.qq.com/web/book/chapter/e_0";

#[derive(Default)]
struct RecordingSaver {
    saved: Mutex<Vec<(String, String)>>,
    failures_left: AtomicUsize,
}

impl RecordingSaver {
    fn saved(&self) -> Vec<(String, String)> {
        self.saved.lock().unwrap().clone()
    }

    fn fail_next(&self, count: usize) {
        self.failures_left.store(count, Ordering::SeqCst);
    }
}

impl SaveTarget for RecordingSaver {
    fn save(&self, html: &str, filename: &str) -> Result<SavedBook, SaveError> {
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(SaveError::Write {
                filename: filename.to_string(),
                source: PersistError::Io(io::Error::other("disk full")),
            });
        }
        self.saved
            .lock()
            .unwrap()
            .push((filename.to_string(), html.to_string()));
        Ok(SavedBook {
            location: PathBuf::from(filename),
            bytes: html.len(),
        })
    }
}

#[derive(Default)]
struct RecordingEvents {
    events: Mutex<Vec<SessionEvent>>,
}

impl RecordingEvents {
    fn events(&self) -> Vec<SessionEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl EventSink for RecordingEvents {
    fn emit(&self, event: SessionEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Every image host is unreachable.
struct OfflineFetcher;

#[async_trait]
impl AssetFetcher for OfflineFetcher {
    async fn fetch(&self, _url: &str) -> Result<FetchOutput, FetchError> {
        Err(FetchError::new(FailureKind::Network, "offline"))
    }
}

/// Holds every fetch until released.
#[derive(Default)]
struct GatedFetcher {
    started: Notify,
    release: Notify,
    calls: AtomicUsize,
}

#[async_trait]
impl AssetFetcher for GatedFetcher {
    async fn fetch(&self, _url: &str) -> Result<FetchOutput, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.started.notify_one();
        self.release.notified().await;
        Err(FetchError::new(FailureKind::Timeout, "released"))
    }
}

fn container(body: &str) -> String {
    format!(
        "<div class=\"preRenderContainer\"><style>.readerChapterContent p{{text-indent:2em}}</style>\
         <div id=\"preRenderContent\" class=\"preRenderContent\" data-wr-id=\"c\">{body}</div></div>"
    )
}

fn page(body: &str, new_chapter: bool) -> ScriptedPage {
    ScriptedPage {
        container: container(body),
        new_chapter,
        has_next: None,
        end_of_book: None,
        late_container: false,
    }
}

struct Harness {
    session: ScrapeSession,
    handle: SessionHandle,
    host: ScriptedHost,
    saver: Arc<RecordingSaver>,
    events: Arc<RecordingEvents>,
    menu: Arc<MenuRegistry>,
    session_store: Arc<MemoryStore>,
}

fn harness(script: ReplayScript) -> Harness {
    harness_with_stores(script, Arc::new(MemoryStore::new()), Arc::new(MemoryStore::new()))
}

fn harness_with_stores(
    script: ReplayScript,
    session_store: Arc<MemoryStore>,
    durable_store: Arc<MemoryStore>,
) -> Harness {
    harness_with(script, session_store, durable_store, Arc::new(OfflineFetcher))
}

fn harness_with(
    script: ReplayScript,
    session_store: Arc<MemoryStore>,
    durable_store: Arc<MemoryStore>,
    fetcher: Arc<dyn AssetFetcher>,
) -> Harness {
    init_logging();
    let site = SiteConfig::default();
    let host = ScriptedHost::new(script, site.selectors.clone());
    let saver = Arc::new(RecordingSaver::default());
    let events = Arc::new(RecordingEvents::default());
    let menu = Arc::new(MenuRegistry::new());
    let collab = Collaborators {
        host: Arc::new(host.clone()),
        interceptor: Arc::new(host.clone()),
        dom: Arc::new(host.clone()),
        fetcher,
        saver: saver.clone(),
        minifier: Arc::new(LightMinifier),
        session_store: session_store.clone(),
        durable_store,
        events: events.clone(),
        menu: Some(menu.clone() as Arc<dyn CommandMenu>),
        clock: Arc::new(|| "2026-10-18T08:00:00Z".to_string()),
    };
    let (session, handle) = ScrapeSession::new(site, collab).unwrap();
    Harness {
        session,
        handle,
        host,
        saver,
        events,
        menu,
        session_store,
    }
}

fn slow_turns() -> Arc<MemoryStore> {
    let durable = Arc::new(MemoryStore::new());
    durable
        .set(
            PREFERENCES_KEY,
            json!({"page_turn_delay_ms": 1000.0, "inline_images": true}),
        )
        .unwrap();
    durable
}

fn finished(session: &ScrapeSession) -> bool {
    let view = session.view();
    view.phase == Phase::Done && !view.observers_attached
}

#[tokio::test(start_paused = true)]
async fn scrapes_a_book_to_the_end_and_saves_it() {
    let mut script = ReplayScript::new(vec![
        page("<p>one</p>", true),
        page("<p>two</p><img src=\"https://res.weread.qq.com/x.png\">", false),
        page("<p><span>t</span><span>h</span>ree</p>", true),
    ]);
    script.title = Some("三体".to_string());
    let mut h = harness(script);

    assert!(h.handle.start());
    assert!(h.session.run_until(finished).await);

    let view = h.session.view();
    assert_eq!(view.pages_stored, 3);
    assert_eq!(view.pages_lost, 0);
    assert!(!h.host.observers_installed());

    let saved = h.saver.saved();
    assert_eq!(saved.len(), 1);
    let (filename, html) = &saved[0];
    assert_eq!(filename, "三体.html");
    assert!(html.contains("<title>三体</title>"));
    assert!(html.contains("<meta name=\"scraped-at\" content=\"2026-10-18T08:00:00Z\">"));
    assert!(html.contains(".preRenderContent p{text-indent:2em}"));
    assert!(html.ends_with(
        "<body><div class=\"preRenderContent\"><p>one</p><p>two</p>\
         <img src=\"https://res.weread.qq.com/x.png\"></div>\
         <div class=\"preRenderContent\"><p><span>th</span>ree</p></div></body></html>"
    ));

    assert_eq!(
        h.host.records(),
        vec![
            HostRecord::Reload,
            HostRecord::Redirected {
                url: CHAPTER_URL.to_string(),
                to: CHAPTER_URL.to_string(),
            },
            HostRecord::Snapshot { page: 0 },
            HostRecord::Cancelled {
                url: PROGRESS_URL.to_string(),
            },
            HostRecord::Click {
                page: 0,
                accepted: true,
            },
            HostRecord::Snapshot { page: 1 },
            HostRecord::Cancelled {
                url: PROGRESS_URL.to_string(),
            },
            HostRecord::Click {
                page: 1,
                accepted: true,
            },
            HostRecord::Redirected {
                url: CHAPTER_URL.to_string(),
                to: CHAPTER_URL.to_string(),
            },
            HostRecord::Snapshot { page: 2 },
            HostRecord::Cancelled {
                url: PROGRESS_URL.to_string(),
            },
        ]
    );

    let events = h.events.events();
    let stored: Vec<(bool, usize)> = events
        .iter()
        .filter_map(|event| match event {
            SessionEvent::PageStored {
                new_chapter,
                sections,
                ..
            } => Some((*new_chapter, *sections)),
            _ => None,
        })
        .collect();
    assert_eq!(stored, vec![(true, 1), (false, 1), (true, 2)]);
    assert!(events.contains(&SessionEvent::AssetFailed {
        url: "https://res.weread.qq.com/x.png".to_string(),
        kind: FailureKind::Network,
    }));
    assert_eq!(
        events.last(),
        Some(&SessionEvent::Saved {
            location: PathBuf::from("三体.html"),
            sections: 2,
        })
    );
    assert_eq!(h.session_store.get(SESSION_KEY).unwrap(), None);
}

#[tokio::test(start_paused = true)]
async fn untitled_book_is_saved_under_the_default_title() {
    let mut h = harness(ReplayScript::new(vec![page("<p>only</p>", true)]));
    h.handle.start();
    assert!(h.session.run_until(finished).await);

    let saved = h.saver.saved();
    assert_eq!(saved[0].0, "微信读书.html");
    assert!(saved[0].1.contains("<title>微信读书</title>"));
}

#[tokio::test(start_paused = true)]
async fn cancel_during_a_pending_turn_discards_everything() {
    let script = ReplayScript::new(vec![
        page("<p>one</p>", true),
        page("<p>two</p>", false),
    ]);
    let mut h = harness_with_stores(script, Arc::new(MemoryStore::new()), slow_turns());

    h.handle.start();
    assert!(
        h.session
            .run_until(|s| s.view().phase == Phase::AwaitingTurn)
            .await
    );
    assert_eq!(h.session.accumulator().sections().len(), 1);
    assert_eq!(
        h.session_store.get(SESSION_KEY).unwrap(),
        Some(json!({"scraping": true}))
    );

    h.handle.cancel();
    assert!(
        h.session
            .run_until(|s| s.view().phase == Phase::Idle && !s.view().observers_attached)
            .await
    );
    assert!(h.session.accumulator().is_empty());

    // The cancelled turn must never fire.
    tokio::time::advance(Duration::from_secs(5)).await;
    drop(h.handle);
    h.session.run().await;

    assert!(!h
        .host
        .records()
        .iter()
        .any(|record| matches!(record, HostRecord::Click { .. })));
    assert!(h.saver.saved().is_empty());
    assert!(h
        .events
        .events()
        .contains(&SessionEvent::Discarded { sections: 1 }));
    assert_eq!(h.session_store.get(SESSION_KEY).unwrap(), None);
}

#[tokio::test(start_paused = true)]
async fn stop_during_a_pending_turn_saves_what_was_collected() {
    let script = ReplayScript::new(vec![
        page("<p>one</p>", true),
        page("<p>two</p>", false),
    ]);
    let mut h = harness_with_stores(script, Arc::new(MemoryStore::new()), slow_turns());

    h.handle.start();
    assert!(
        h.session
            .run_until(|s| s.view().phase == Phase::AwaitingTurn)
            .await
    );
    h.handle.stop_and_save();
    assert!(
        h.session
            .run_until(|s| !s.view().observers_attached)
            .await
    );
    tokio::time::advance(Duration::from_secs(5)).await;

    let saved = h.saver.saved();
    assert_eq!(saved.len(), 1);
    assert!(saved[0].1.contains("<p>one</p>"));
    assert!(!saved[0].1.contains("<p>two</p>"));
    assert_eq!(h.session.view().phase, Phase::Idle);
    assert_eq!(h.host.current_page(), Some(0));
}

#[tokio::test(start_paused = true)]
async fn page_without_next_or_end_stalls() {
    let script = ReplayScript::new(vec![ScriptedPage {
        has_next: Some(false),
        end_of_book: Some(false),
        ..page("<p>stuck</p>", true)
    }]);
    let mut h = harness(script);

    h.handle.start();
    assert!(
        h.session
            .run_until(|s| s.view().phase == Phase::Stalled)
            .await
    );
    assert!(h.events.events().contains(&SessionEvent::Stalled {
        reason: StallReason::NoNextControl,
    }));
    assert!(h.saver.saved().is_empty());

    h.handle.stop_and_save();
    assert!(
        h.session
            .run_until(|s| !s.view().observers_attached)
            .await
    );
    assert_eq!(h.saver.saved().len(), 1);
    assert!(h.saver.saved()[0].1.contains("<p>stuck</p>"));
}

#[tokio::test(start_paused = true)]
async fn persisted_flag_resumes_after_a_reload() {
    let session_store = Arc::new(MemoryStore::new());
    session_store
        .set(SESSION_KEY, json!({"scraping": true}))
        .unwrap();
    let script = ReplayScript::new(vec![page("<p>one</p>", true), page("<p>two</p>", false)]);
    let mut h = harness_with_stores(script, session_store, Arc::new(MemoryStore::new()));

    assert!(
        h.session
            .run_until(|s| s.view().observers_attached)
            .await
    );
    assert!(h.session.controller().is_scraping());

    // The reader reloads on its own; no Start command is sent.
    h.host.reload().await.unwrap();
    assert!(h.session.run_until(finished).await);

    let saved = h.saver.saved();
    assert_eq!(saved.len(), 1);
    assert!(saved[0]
        .1
        .contains("<div class=\"preRenderContent\"><p>one</p><p>two</p></div>"));
}

#[tokio::test(start_paused = true)]
async fn start_while_scraping_is_ignored() {
    let script = ReplayScript::new(vec![page("<p>one</p>", true), page("<p>two</p>", false)]);
    let mut h = harness_with_stores(script, Arc::new(MemoryStore::new()), slow_turns());

    h.handle.start();
    assert!(
        h.session
            .run_until(|s| s.view().phase == Phase::AwaitingTurn)
            .await
    );
    h.handle.start();
    assert!(h.session.run_until(finished).await);

    let reloads = h
        .host
        .records()
        .iter()
        .filter(|record| **record == HostRecord::Reload)
        .count();
    assert_eq!(reloads, 1);
    assert_eq!(h.saver.saved().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn stop_with_nothing_collected_saves_nothing() {
    let mut h = harness(ReplayScript::new(vec![page("<p>one</p>", true)]));
    h.handle.stop_and_save();
    drop(h.handle);
    h.session.run().await;
    assert!(h.saver.saved().is_empty());
    assert!(h.host.records().is_empty());
}

#[tokio::test(start_paused = true)]
async fn shutdown_detaches_and_clears_the_menu() {
    let script = ReplayScript::new(vec![page("<p>one</p>", true), page("<p>two</p>", false)]);
    let mut h = harness_with_stores(script, Arc::new(MemoryStore::new()), slow_turns());
    assert_eq!(
        h.menu.label(CommandId::SetTurnDelay),
        Some("Set Turn Delay (1000 ms)".to_string())
    );

    h.handle.start();
    assert!(
        h.session
            .run_until(|s| s.view().phase == Phase::AwaitingTurn)
            .await
    );
    h.handle.shutdown();
    h.session.run().await;

    assert!(h.session.is_shut_down());
    assert!(!h.host.observers_installed());
    assert!(h.menu.entries().is_empty());
    drop(h.session);
    assert!(!h.handle.start());
}

#[tokio::test(start_paused = true)]
async fn preference_commands_apply_between_pages() {
    let mut h = harness(ReplayScript::new(vec![page("<p>one</p>", true)]));
    h.handle.send(Command::SetTurnDelay("40".to_string()));
    h.handle.send(Command::SetTurnDelay("later".to_string()));
    h.handle.send(Command::Toggle(PreferenceFlag::InlineImages));
    drop(h.handle);
    h.session.run().await;

    let prefs = h.session.controller().preferences();
    assert_eq!(prefs.page_turn_delay_ms, 40.0);
    assert!(!prefs.inline_images);
    // The menu goes away with the session.
    assert_eq!(h.menu.label(CommandId::SetTurnDelay), None);
}

#[tokio::test(start_paused = true)]
async fn failed_save_keeps_the_book_for_another_try() {
    let mut h = harness(ReplayScript::new(vec![page("<p>one</p>", true)]));
    h.saver.fail_next(1);

    h.handle.start();
    assert!(h.session.run_until(finished).await);
    assert!(h.saver.saved().is_empty());
    assert_eq!(h.session.accumulator().sections().len(), 1);
    assert!(matches!(
        h.events.events().last(),
        Some(SessionEvent::SaveFailed { .. })
    ));

    h.handle.stop_and_save();
    assert!(h.session.run_until(|s| s.accumulator().is_empty()).await);
    let saved = h.saver.saved();
    assert_eq!(saved.len(), 1);
    assert!(saved[0].1.contains("<p>one</p>"));
    assert_eq!(
        h.events.events().last(),
        Some(&SessionEvent::Saved {
            location: PathBuf::from("微信读书.html"),
            sections: 1,
        })
    );
}

#[tokio::test(start_paused = true)]
async fn cancel_while_assets_load_abandons_the_page() {
    let fetcher = Arc::new(GatedFetcher::default());
    let script = ReplayScript::new(vec![
        page("<p>one</p><img src=\"https://res.weread.qq.com/a.png\">", true),
        page("<p>two</p>", false),
    ]);
    let mut h = harness_with(
        script,
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryStore::new()),
        fetcher.clone(),
    );

    h.handle.start();
    assert!(h.session.run_until(|s| s.view().observers_attached).await);

    let Harness {
        session, handle, ..
    } = &mut h;
    let interrupt = async {
        fetcher.started.notified().await;
        handle.cancel();
    };
    let (_, idle) = tokio::join!(
        interrupt,
        session.run_until(|s| !s.controller().is_scraping() && !s.view().observers_attached)
    );
    assert!(idle);
    fetcher.release.notify_one();

    tokio::time::advance(Duration::from_secs(5)).await;
    drop(h.handle);
    h.session.run().await;

    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    assert!(h.session.accumulator().is_empty());
    assert_eq!(h.session.view().pages_stored, 0);
    assert!(h.saver.saved().is_empty());
    let events = h.events.events();
    assert!(!events
        .iter()
        .any(|event| matches!(event, SessionEvent::PageStored { .. })));
    assert!(events.contains(&SessionEvent::Discarded { sections: 0 }));
    assert!(!h
        .host
        .records()
        .iter()
        .any(|record| matches!(record, HostRecord::Click { .. })));
}

#[tokio::test(start_paused = true)]
async fn page_loaded_before_its_container_is_lost_and_paging_goes_on() {
    let script = ReplayScript::new(vec![
        ScriptedPage {
            late_container: true,
            ..page("<p>one</p>", true)
        },
        page("<p>two</p>", false),
    ]);
    let mut h = harness(script);

    h.handle.start();
    assert!(h.session.run_until(finished).await);

    let view = h.session.view();
    assert_eq!(view.pages_lost, 1);
    assert_eq!(view.pages_stored, 1);
    assert!(h
        .events
        .events()
        .iter()
        .any(|event| matches!(event, SessionEvent::PageLost { .. })));

    let saved = h.saver.saved();
    assert_eq!(saved.len(), 1);
    assert!(saved[0].1.contains("<p>two</p>"));
    assert!(!saved[0].1.contains("<p>one</p>"));
}

#[tokio::test(start_paused = true)]
async fn menu_entries_drive_the_session() {
    let mut h = harness(ReplayScript::new(vec![page("<p>one</p>", true)]));
    h.menu.set_prompt_reply(Some("25".to_string()));

    assert!(h.menu.invoke(CommandId::SetTurnDelay));
    assert!(h.menu.invoke(CommandId::Start));
    assert!(h.session.run_until(finished).await);

    assert_eq!(h.session.controller().preferences().page_turn_delay_ms, 25.0);
    assert_eq!(
        h.menu.label(CommandId::SetTurnDelay),
        Some("Set Turn Delay (25 ms)".to_string())
    );
    assert_eq!(h.saver.saved().len(), 1);
}
