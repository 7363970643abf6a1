use std::io::Write;

use stitch_engine::{EventSink, SessionEvent};

/// Prints session progress for the person running the CLI.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleEventSink {
    quiet: bool,
}

impl ConsoleEventSink {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

impl EventSink for ConsoleEventSink {
    fn emit(&self, event: SessionEvent) {
        let Some(line) = describe(&event) else {
            return;
        };
        let important = matches!(
            event,
            SessionEvent::Stalled { .. }
                | SessionEvent::Saved { .. }
                | SessionEvent::SaveFailed { .. }
                | SessionEvent::Discarded { .. }
        );
        if self.quiet && !important {
            return;
        }
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out, "{line}");
    }
}

fn describe(event: &SessionEvent) -> Option<String> {
    let line = match event {
        SessionEvent::PhaseChanged { .. } => return None,
        SessionEvent::PageStored {
            cycle,
            new_chapter: true,
            sections,
        } => format!("page {cycle}: new chapter (section {sections})"),
        SessionEvent::PageStored { cycle, .. } => format!("page {cycle}: stored"),
        SessionEvent::PageLost { cycle } => format!("page {cycle}: content lost"),
        SessionEvent::AssetFailed { url, kind } => format!("asset kept remote ({kind}): {url}"),
        SessionEvent::Stalled { reason } => format!("stalled: {reason}"),
        SessionEvent::Saved { location, sections } => {
            format!("saved {sections} sections to {}", location.display())
        }
        SessionEvent::SaveFailed { message } => format!("save failed: {message}"),
        SessionEvent::Discarded { sections } => format!("discarded {sections} sections"),
    };
    Some(line)
}
