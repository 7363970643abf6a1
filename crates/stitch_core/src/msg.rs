use crate::TimerId;

/// Result of probing the host page for its footer controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageProbe {
    pub next_control: bool,
    pub end_marker: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    /// The session flag flipped on.
    SessionStarted,
    /// The session flag flipped off (stop, cancel or finish).
    SessionStopped,
    /// Network observer: the reading-progress report went out, the page body is loaded.
    BodyLoaded,
    /// Network observer: the page fetched fresh chapter content.
    ChapterFetched,
    /// DOM observer: a settled render container appeared; carries its markup snapshot.
    ContainerAppeared(String),
    /// The current snapshot has been extracted and appended to the document.
    FragmentStored,
    /// Extraction of the current snapshot failed; the page is lost but the loop goes on.
    FragmentSkipped,
    /// Result of looking for the next-page control and the end-of-book marker.
    PageProbed(PageProbe),
    /// The page-turn delay with the given id ran out.
    TurnDelayElapsed(TimerId),
    /// The synthetic click was dispatched; `clicked` is false when the control was gone.
    TurnDispatched { clicked: bool },
}
