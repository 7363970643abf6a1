use std::fmt;

use crate::TimerId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    AttachObservers,
    DetachObservers,
    /// Run the snapshot through extraction and append it to the document.
    StoreFragment { snapshot: String, new_chapter: bool },
    /// The page reported itself loaded before any render container was captured.
    ReportMissingContent,
    ProbePage,
    ScheduleTurn { timer: TimerId },
    CancelTurn { timer: TimerId },
    ClickNextPage,
    FinishBook,
    ReportStall { reason: StallReason },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StallReason {
    /// Neither a next-page control nor an end-of-book marker is on the page.
    NoNextControl,
    /// The next-page control disappeared between probing and clicking.
    NextControlVanished,
}

impl fmt::Display for StallReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StallReason::NoNextControl => {
                write!(f, "no next-page control and no end-of-book marker")
            }
            StallReason::NextControlVanished => {
                write!(f, "next-page control vanished before the page turn")
            }
        }
    }
}
