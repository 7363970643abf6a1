/// Identifies one scheduled page turn. Ids are never reused within a machine,
/// so an expiry for an older turn can always be told apart from the live one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TimerId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Observing,
    ContentReady,
    AwaitingTurn,
    Stalled,
    Done,
}

impl Phase {
    /// True while the page-turn loop is running.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            Phase::Observing | Phase::ContentReady | Phase::AwaitingTurn | Phase::Stalled
        )
    }
}

/// Transient state of the page currently in flight.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PageState {
    pub render_container: Option<String>,
    pub body_loaded: bool,
    pub is_new_chapter: bool,
    pub pending_timer: Option<TimerId>,
}

/// The page-turn state machine. Only [`crate::update`] mutates it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PageMachine {
    phase: Phase,
    page: PageState,
    attached: bool,
    next_timer: u64,
    cycle: u64,
    pages_stored: u64,
    pages_lost: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MachineView {
    pub phase: Phase,
    pub cycle: u64,
    pub pages_stored: u64,
    pub pages_lost: u64,
    pub turn_pending: bool,
    pub observers_attached: bool,
}

impl PageMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn page(&self) -> &PageState {
        &self.page
    }

    pub fn view(&self) -> MachineView {
        MachineView {
            phase: self.phase,
            cycle: self.cycle,
            pages_stored: self.pages_stored,
            pages_lost: self.pages_lost,
            turn_pending: self.page.pending_timer.is_some(),
            observers_attached: self.attached,
        }
    }

    pub fn observers_attached(&self) -> bool {
        self.attached
    }

    pub(crate) fn set_attached(&mut self, attached: bool) {
        self.attached = attached;
    }

    pub(crate) fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    pub(crate) fn page_mut(&mut self) -> &mut PageState {
        &mut self.page
    }

    pub(crate) fn reset_page(&mut self) {
        self.page = PageState::default();
    }

    pub(crate) fn begin_session(&mut self) {
        self.reset_page();
        self.cycle = 1;
        self.pages_stored = 0;
        self.pages_lost = 0;
    }

    pub(crate) fn advance_cycle(&mut self) {
        self.cycle += 1;
    }

    pub(crate) fn allocate_timer(&mut self) -> TimerId {
        self.next_timer += 1;
        TimerId(self.next_timer)
    }

    pub(crate) fn record_stored(&mut self) {
        self.pages_stored += 1;
    }

    pub(crate) fn record_lost(&mut self) {
        self.pages_lost += 1;
    }
}
