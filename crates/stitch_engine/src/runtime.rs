use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;

use stitch_core::{
    update, Effect, MachineView, Msg, PageMachine, PageProbe, Phase, PreferenceFlag, SessionFlag,
    TimerId,
};
use stitch_logging::{stitch_debug, stitch_error, stitch_info, stitch_warn};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, WeakUnboundedSender};
use tokio::time::Sleep;

use crate::accumulate::{DocumentAccumulator, DocumentMeta};
use crate::config::{ConfigError, SiteConfig};
use crate::controller::SessionController;
use crate::events::EventSink;
use crate::extract::{ContentExtractor, ExtractError, ExtractOptions, ExtractedPage};
use crate::fetch::AssetFetcher;
use crate::filename::book_filename;
use crate::host::{ClickPoint, DomObserver, HostPage, RequestInterceptor};
use crate::menu::{CommandMenu, MenuBinder};
use crate::minify::Minifier;
use crate::save::SaveTarget;
use crate::signals::{ContainerFilter, SignalSources};
use crate::store::KeyValueStore;
use crate::SessionEvent;

/// Produces the scraped-at stamp written into saved books.
pub type Clock = Arc<dyn Fn() -> String + Send + Sync>;

/// Everything a session talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub host: Arc<dyn HostPage>,
    pub interceptor: Arc<dyn RequestInterceptor>,
    pub dom: Arc<dyn DomObserver>,
    pub fetcher: Arc<dyn AssetFetcher>,
    pub saver: Arc<dyn SaveTarget>,
    pub minifier: Arc<dyn Minifier>,
    pub session_store: Arc<dyn KeyValueStore>,
    pub durable_store: Arc<dyn KeyValueStore>,
    pub events: Arc<dyn EventSink>,
    pub menu: Option<Arc<dyn CommandMenu>>,
    pub clock: Clock,
}

/// User commands, as the menu would issue them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Cancel,
    StopAndSave,
    SetTurnDelay(String),
    Toggle(PreferenceFlag),
    Shutdown,
}

impl Command {
    /// Commands that abandon a page whose extraction is still in flight.
    fn interrupts_page(&self) -> bool {
        matches!(self, Command::Cancel | Command::StopAndSave | Command::Shutdown)
    }
}

/// Sends commands to a running [`ScrapeSession`].
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: UnboundedSender<Command>,
}

impl SessionHandle {
    /// A handle and the receiving end of its command channel.
    pub fn channel() -> (Self, UnboundedReceiver<Command>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Returns false once the session is gone.
    pub fn send(&self, command: Command) -> bool {
        self.tx.send(command).is_ok()
    }

    pub fn start(&self) -> bool {
        self.send(Command::Start)
    }

    pub fn cancel(&self) -> bool {
        self.send(Command::Cancel)
    }

    pub fn stop_and_save(&self) -> bool {
        self.send(Command::StopAndSave)
    }

    pub fn shutdown(&self) -> bool {
        self.send(Command::Shutdown)
    }

    /// A handle that does not keep the command channel open.
    pub fn downgrade(&self) -> WeakSessionHandle {
        WeakSessionHandle {
            tx: self.tx.downgrade(),
        }
    }
}

/// Held by long-lived callers such as menu actions; sends are dropped once
/// every [`SessionHandle`] is gone.
#[derive(Debug, Clone)]
pub struct WeakSessionHandle {
    tx: WeakUnboundedSender<Command>,
}

impl WeakSessionHandle {
    pub fn send(&self, command: Command) -> bool {
        self.tx
            .upgrade()
            .is_some_and(|tx| tx.send(command).is_ok())
    }
}

struct PendingTurn {
    timer: TimerId,
    sleep: Pin<Box<Sleep>>,
}

enum Input {
    Flag(Msg),
    Signal(Msg),
    Command(Command),
    CommandsClosed,
    TurnElapsed(TimerId),
}

enum ExtractEvent {
    Finished(Result<ExtractedPage, ExtractError>),
    Command(Option<Command>),
}

/// Drives the page machine against a host page.
///
/// All work happens on the task that polls [`ScrapeSession::run`]; host
/// callbacks only enqueue messages.
pub struct ScrapeSession {
    site: SiteConfig,
    collab: Collaborators,
    controller: SessionController,
    machine: PageMachine,
    accumulator: DocumentAccumulator,
    extractor: ContentExtractor,
    filter: ContainerFilter,
    signals: SignalSources,
    signal_tx: UnboundedSender<Msg>,
    signal_rx: UnboundedReceiver<Msg>,
    flag_rx: UnboundedReceiver<Msg>,
    cmd_rx: UnboundedReceiver<Command>,
    commands_open: bool,
    deferred: VecDeque<Command>,
    turn: Option<PendingTurn>,
    menu: Option<MenuBinder>,
    shut_down: bool,
}

impl ScrapeSession {
    /// Build a session. A session flag left on in the session store resumes
    /// scraping on the first step, the way a reloaded reader page picks up
    /// where it was.
    pub fn new(
        site: SiteConfig,
        collab: Collaborators,
    ) -> Result<(Self, SessionHandle), ConfigError> {
        let extractor =
            ContentExtractor::new(site.clone(), collab.fetcher.clone(), collab.minifier.clone())?;
        let filter = ContainerFilter::new(&site)?;
        let mut controller =
            SessionController::load(collab.session_store.clone(), collab.durable_store.clone());

        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (flag_tx, flag_rx) = mpsc::unbounded_channel();
        let (handle, cmd_rx) = SessionHandle::channel();

        controller
            .session_flag_mut()
            .subscribe_immediate(SessionFlag::IDLE, move |_, current| {
                let msg = if current.scraping {
                    Msg::SessionStarted
                } else {
                    Msg::SessionStopped
                };
                let _ = flag_tx.send(msg);
            });

        let menu = collab
            .menu
            .clone()
            .map(|menu| MenuBinder::bind(menu, controller.preferences_mut(), &handle));

        let session = Self {
            site,
            collab,
            controller,
            machine: PageMachine::new(),
            accumulator: DocumentAccumulator::new(),
            extractor,
            filter,
            signals: SignalSources::new(),
            signal_tx,
            signal_rx,
            flag_rx,
            cmd_rx,
            commands_open: true,
            deferred: VecDeque::new(),
            turn: None,
            menu,
            shut_down: false,
        };
        Ok((session, handle))
    }

    pub fn view(&self) -> MachineView {
        self.machine.view()
    }

    pub fn accumulator(&self) -> &DocumentAccumulator {
        &self.accumulator
    }

    pub fn controller(&self) -> &SessionController {
        &self.controller
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Run until shut down, or until the command channel closed and nothing
    /// is left to wait for.
    pub async fn run(&mut self) {
        while self.step().await {}
        self.teardown();
    }

    /// Step until `done` holds. Returns false if the session ran out of work first.
    pub async fn run_until(&mut self, mut done: impl FnMut(&ScrapeSession) -> bool) -> bool {
        loop {
            if done(&*self) {
                return true;
            }
            if !self.step().await {
                return done(&*self);
            }
        }
    }

    /// Handle one input. Returns false when the session has nothing more to do.
    pub async fn step(&mut self) -> bool {
        if self.shut_down {
            return false;
        }
        if let Some(command) = self.deferred.pop_front() {
            self.handle_command(command).await;
            return !self.shut_down;
        }
        if let Ok(msg) = self.flag_rx.try_recv() {
            self.dispatch(msg).await;
            return true;
        }
        if let Ok(msg) = self.signal_rx.try_recv() {
            self.dispatch(msg).await;
            return true;
        }
        let idle = !self.signals.is_attached() || self.machine.phase() == Phase::Stalled;
        if !self.commands_open && self.turn.is_none() && idle {
            return false;
        }

        let input = tokio::select! {
            biased;
            Some(msg) = self.flag_rx.recv() => Input::Flag(msg),
            Some(msg) = self.signal_rx.recv() => Input::Signal(msg),
            command = self.cmd_rx.recv(), if self.commands_open => match command {
                Some(command) => Input::Command(command),
                None => Input::CommandsClosed,
            },
            timer = wait_for_turn(&mut self.turn) => Input::TurnElapsed(timer),
        };

        match input {
            Input::Flag(msg) | Input::Signal(msg) => self.dispatch(msg).await,
            Input::Command(command) => self.handle_command(command).await,
            Input::CommandsClosed => {
                stitch_debug!("command channel closed");
                self.commands_open = false;
            }
            Input::TurnElapsed(timer) => {
                self.turn = None;
                self.dispatch(Msg::TurnDelayElapsed(timer)).await;
            }
        }
        !self.shut_down
    }

    async fn handle_command(&mut self, command: Command) {
        stitch_debug!("command {:?}", command);
        match command {
            Command::Start => {
                if self.controller.is_scraping() {
                    stitch_debug!("already scraping");
                    return;
                }
                self.accumulator.begin_session();
                self.controller.begin();
                // Observers must be in place before the reader requests its first page.
                self.pump_flag().await;
                if let Err(err) = self.collab.host.reload().await {
                    stitch_error!("reload failed: {}", err);
                }
            }
            Command::Cancel => {
                let was_scraping = self.controller.end();
                self.pump_flag().await;
                let dropped = self.accumulator.discard();
                if was_scraping || dropped > 0 {
                    stitch_info!("scraping cancelled, {} sections discarded", dropped);
                    self.emit(SessionEvent::Discarded { sections: dropped });
                }
            }
            Command::StopAndSave => {
                if !self.controller.is_scraping() && self.accumulator.is_empty() {
                    stitch_debug!("nothing to save");
                    return;
                }
                self.controller.end();
                self.pump_flag().await;
                self.save_book().await;
            }
            Command::SetTurnDelay(raw) => {
                if let Err(err) = self.controller.set_turn_delay(&raw) {
                    stitch_warn!("turn delay rejected: {}", err);
                }
            }
            Command::Toggle(flag) => {
                self.controller.toggle(flag);
            }
            Command::Shutdown => {
                self.teardown();
            }
        }
    }

    /// Apply queued session-flag transitions right away.
    async fn pump_flag(&mut self) {
        while let Ok(msg) = self.flag_rx.try_recv() {
            self.dispatch(msg).await;
        }
    }

    async fn dispatch(&mut self, msg: Msg) {
        let mut queue = VecDeque::from([msg]);
        while let Some(msg) = queue.pop_front() {
            let before = self.machine.phase();
            let machine = std::mem::take(&mut self.machine);
            let (machine, effects) = update(machine, msg);
            self.machine = machine;
            stitch_logging::set_page_cycle(self.machine.view().cycle);

            let after = self.machine.phase();
            if before != after {
                stitch_debug!("phase {:?} -> {:?}", before, after);
                self.emit(SessionEvent::PhaseChanged {
                    from: before,
                    to: after,
                });
            }
            for effect in effects {
                if let Some(next) = self.run_effect(effect).await {
                    queue.push_back(next);
                }
            }
        }
    }

    async fn run_effect(&mut self, effect: Effect) -> Option<Msg> {
        match effect {
            Effect::AttachObservers => {
                let attached = self.signals.attach(
                    &self.site,
                    self.collab.interceptor.as_ref(),
                    self.collab.dom.as_ref(),
                    self.filter.clone(),
                    self.signal_tx.clone(),
                );
                if let Err(err) = attached {
                    stitch_error!("could not attach observers: {}", err);
                    self.deferred.push_front(Command::Cancel);
                }
                None
            }
            Effect::DetachObservers => {
                self.signals.detach();
                None
            }
            Effect::StoreFragment {
                snapshot,
                new_chapter,
            } => self.store_fragment(snapshot, new_chapter).await,
            Effect::ReportMissingContent => {
                let cycle = self.machine.view().cycle;
                stitch_warn!("page loaded before its content was captured; content lost");
                self.emit(SessionEvent::PageLost { cycle });
                None
            }
            Effect::ProbePage => {
                let selectors = &self.site.selectors;
                let next_control = self.collab.host.exists(&selectors.next_page).await;
                let end_marker =
                    !next_control && self.collab.host.exists(&selectors.end_of_book).await;
                Some(Msg::PageProbed(PageProbe {
                    next_control,
                    end_marker,
                }))
            }
            Effect::ScheduleTurn { timer } => {
                let delay = self.controller.preferences().turn_delay();
                stitch_debug!("next page in {:?}", delay);
                self.turn = Some(PendingTurn {
                    timer,
                    sleep: Box::pin(tokio::time::sleep(delay)),
                });
                None
            }
            Effect::CancelTurn { timer } => {
                if self.turn.as_ref().is_some_and(|turn| turn.timer == timer) {
                    self.turn = None;
                }
                None
            }
            Effect::ClickNextPage => {
                let clicked = self
                    .collab
                    .host
                    .click(&self.site.selectors.next_page, ClickPoint::HUMAN)
                    .await;
                Some(Msg::TurnDispatched { clicked })
            }
            Effect::FinishBook => {
                stitch_info!("end of book reached");
                self.deferred.push_front(Command::StopAndSave);
                None
            }
            Effect::ReportStall { reason } => {
                stitch_warn!("page loop stalled: {}", reason);
                self.emit(SessionEvent::Stalled { reason });
                None
            }
        }
    }

    /// Extract and append one page. Stop, cancel and shutdown abandon the page
    /// and its asset fetches; any other command waits until the page is done.
    async fn store_fragment(&mut self, snapshot: String, new_chapter: bool) -> Option<Msg> {
        let opts = ExtractOptions {
            want_stylesheet: self.accumulator.needs_stylesheet(),
            inline_assets: self.controller.preferences().inline_images,
        };
        let extractor = self.extractor.clone();
        let extraction = async move { extractor.extract(&snapshot, opts).await };
        tokio::pin!(extraction);

        let result = loop {
            let event = tokio::select! {
                biased;
                result = &mut extraction => ExtractEvent::Finished(result),
                command = self.cmd_rx.recv(), if self.commands_open => ExtractEvent::Command(command),
            };
            match event {
                ExtractEvent::Finished(result) => break result,
                ExtractEvent::Command(Some(command)) if command.interrupts_page() => {
                    stitch_info!("page abandoned by {:?}", command);
                    self.deferred.push_front(command);
                    return None;
                }
                ExtractEvent::Command(Some(command)) => self.deferred.push_back(command),
                ExtractEvent::Command(None) => self.commands_open = false,
            }
        };

        let cycle = self.machine.view().cycle;
        match result {
            Ok(page) => {
                if let Some(css) = page.stylesheet {
                    if self.accumulator.inject_stylesheet(css) {
                        stitch_debug!("stylesheet stored");
                    }
                }
                for failure in page.failed_assets {
                    self.emit(SessionEvent::AssetFailed {
                        url: failure.url,
                        kind: failure.error.kind,
                    });
                }
                self.accumulator.append(page.fragment, new_chapter);
                let sections = self.accumulator.sections().len();
                stitch_info!(
                    "stored page ({}), {} sections",
                    if new_chapter { "new chapter" } else { "continued" },
                    sections
                );
                self.emit(SessionEvent::PageStored {
                    cycle,
                    new_chapter,
                    sections,
                });
                Some(Msg::FragmentStored)
            }
            Err(err) => {
                stitch_warn!("could not extract page: {}", err);
                self.emit(SessionEvent::PageLost { cycle });
                Some(Msg::FragmentSkipped)
            }
        }
    }

    async fn save_book(&mut self) {
        let title = self
            .collab
            .host
            .text_of(&self.site.selectors.book_title)
            .await
            .filter(|title| !title.is_empty());
        let meta = DocumentMeta {
            title: title
                .clone()
                .unwrap_or_else(|| self.site.default_title.clone()),
            scraped_at: Some((self.collab.clock)()),
        };
        let sections = self.accumulator.sections().len();
        let html = self.accumulator.render(&meta);
        let filename = book_filename(title.as_deref(), &self.site.default_title);

        match self.collab.saver.save(&html, &filename) {
            Ok(saved) => {
                self.accumulator.discard();
                stitch_info!(
                    "saved {} sections ({} bytes) to {}",
                    sections,
                    saved.bytes,
                    saved.location.display()
                );
                self.emit(SessionEvent::Saved {
                    location: saved.location,
                    sections,
                });
            }
            Err(err) => {
                // The sections stay, so Stop & Save can be retried.
                stitch_error!("save failed, {} sections kept: {}", sections, err);
                self.emit(SessionEvent::SaveFailed {
                    message: err.to_string(),
                });
            }
        }
    }

    fn teardown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.turn = None;
        self.signals.detach();
        if let (Some(binder), Some(menu)) = (self.menu.take(), self.collab.menu.clone()) {
            binder.unbind(menu.as_ref(), self.controller.preferences_mut());
        }
        stitch_debug!("session shut down");
    }

    fn emit(&self, event: SessionEvent) {
        self.collab.events.emit(event);
    }
}

async fn wait_for_turn(turn: &mut Option<PendingTurn>) -> TimerId {
    match turn {
        Some(turn) => {
            turn.sleep.as_mut().await;
            turn.timer
        }
        None => std::future::pending().await,
    }
}
