use std::path::PathBuf;
use std::sync::mpsc::Sender;

use stitch_core::{Phase, StallReason};

use crate::fetch::FailureKind;

/// Progress reported by a running scrape session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    PhaseChanged {
        from: Phase,
        to: Phase,
    },
    PageStored {
        cycle: u64,
        new_chapter: bool,
        sections: usize,
    },
    PageLost {
        cycle: u64,
    },
    AssetFailed {
        url: String,
        kind: FailureKind,
    },
    Stalled {
        reason: StallReason,
    },
    Saved {
        location: PathBuf,
        sections: usize,
    },
    SaveFailed {
        message: String,
    },
    Discarded {
        sections: usize,
    },
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: SessionEvent);
}

/// Forwards events to a std channel; a dropped receiver silences it.
pub struct ChannelEventSink {
    tx: Sender<SessionEvent>,
}

impl ChannelEventSink {
    pub fn new(tx: Sender<SessionEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: SessionEvent) {
        let _ = self.tx.send(event);
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: SessionEvent) {}
}
