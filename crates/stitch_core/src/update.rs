use crate::{Effect, Msg, PageMachine, PageProbe, Phase, StallReason};

/// Pure update function: applies a message to the machine and returns any effects.
///
/// Messages that do not fit the current phase are dropped without effects. This is
/// what makes late signals and stale timers harmless after a session was torn down.
pub fn update(mut machine: PageMachine, msg: Msg) -> (PageMachine, Vec<Effect>) {
    let effects = match msg {
        Msg::SessionStarted => match machine.phase() {
            Phase::Idle | Phase::Done if !machine.observers_attached() => {
                machine.begin_session();
                machine.set_attached(true);
                machine.set_phase(Phase::Observing);
                vec![Effect::AttachObservers]
            }
            _ => Vec::new(),
        },
        Msg::SessionStopped => {
            if !machine.observers_attached() {
                return (machine, Vec::new());
            }
            let mut effects = Vec::with_capacity(2);
            if let Some(timer) = machine.page().pending_timer {
                effects.push(Effect::CancelTurn { timer });
            }
            effects.push(Effect::DetachObservers);
            machine.reset_page();
            machine.set_attached(false);
            if machine.phase() != Phase::Done {
                machine.set_phase(Phase::Idle);
            }
            effects
        }
        Msg::ChapterFetched => {
            if machine.phase() == Phase::Observing {
                machine.page_mut().is_new_chapter = true;
            }
            Vec::new()
        }
        Msg::ContainerAppeared(snapshot) => match machine.phase() {
            Phase::Observing => {
                machine.page_mut().render_container = Some(snapshot);
                Vec::new()
            }
            // The page changed under a stalled loop; look at it once more.
            Phase::Stalled => {
                machine.set_phase(Phase::ContentReady);
                vec![Effect::ProbePage]
            }
            _ => Vec::new(),
        },
        Msg::BodyLoaded => {
            if machine.phase() != Phase::Observing {
                return (machine, Vec::new());
            }
            machine.set_phase(Phase::ContentReady);
            let page = machine.page_mut();
            page.body_loaded = true;
            match page.render_container.clone() {
                Some(snapshot) => vec![Effect::StoreFragment {
                    snapshot,
                    new_chapter: page.is_new_chapter,
                }],
                None => {
                    machine.record_lost();
                    vec![Effect::ReportMissingContent, Effect::ProbePage]
                }
            }
        }
        Msg::FragmentStored => {
            if machine.phase() == Phase::ContentReady && machine.page().body_loaded {
                machine.record_stored();
                vec![Effect::ProbePage]
            } else {
                Vec::new()
            }
        }
        Msg::FragmentSkipped => {
            if machine.phase() == Phase::ContentReady && machine.page().body_loaded {
                machine.record_lost();
                vec![Effect::ProbePage]
            } else {
                Vec::new()
            }
        }
        Msg::PageProbed(probe) => {
            if machine.phase() != Phase::ContentReady {
                return (machine, Vec::new());
            }
            apply_probe(&mut machine, probe)
        }
        Msg::TurnDelayElapsed(timer) => {
            let live = machine.phase() == Phase::AwaitingTurn
                && machine.page().pending_timer == Some(timer);
            if !live {
                return (machine, Vec::new());
            }
            machine.reset_page();
            machine.advance_cycle();
            machine.set_phase(Phase::Observing);
            vec![Effect::ClickNextPage]
        }
        Msg::TurnDispatched { clicked } => {
            if machine.phase() == Phase::Observing && !clicked {
                machine.set_phase(Phase::Stalled);
                vec![Effect::ReportStall {
                    reason: StallReason::NextControlVanished,
                }]
            } else {
                Vec::new()
            }
        }
    };

    (machine, effects)
}

fn apply_probe(machine: &mut PageMachine, probe: PageProbe) -> Vec<Effect> {
    match probe {
        PageProbe {
            next_control: true, ..
        } => {
            let timer = machine.allocate_timer();
            machine.page_mut().pending_timer = Some(timer);
            machine.set_phase(Phase::AwaitingTurn);
            vec![Effect::ScheduleTurn { timer }]
        }
        PageProbe {
            next_control: false,
            end_marker: true,
        } => {
            machine.set_phase(Phase::Done);
            vec![Effect::FinishBook]
        }
        PageProbe {
            next_control: false,
            end_marker: false,
        } => {
            machine.set_phase(Phase::Stalled);
            vec![Effect::ReportStall {
                reason: StallReason::NoNextControl,
            }]
        }
    }
}
