//! Overlay lifecycle as a pure state machine.
//!
//! `OverlayMachine::handle` takes one input and returns the effects the
//! driver must perform: surface changes, timers to arm, actions to submit.
//! Timers are tagged with the session that armed them; a timer for a session
//! that has since been replaced is ignored, so nothing ever needs cancelling.

use std::time::Duration;

use safesurf_core::{ActionKind, ActionOutcome, RiskLevel, RiskVerdict};
use tokio::time::Instant;
use tracing::debug;

use crate::style::{Emphasis, Tone, action_message, emphasis_for};

pub type SessionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayTimings {
    /// Delay before the slide-in completes.
    pub entrance: Duration,
    /// Time from creation until the overlay starts leaving.
    pub display: Duration,
    /// Exit animation length.
    pub exit: Duration,
    /// Lifetime of an inline action result.
    pub result: Duration,
}

impl Default for OverlayTimings {
    fn default() -> Self {
        Self {
            entrance: Duration::from_millis(90),
            display: Duration::from_millis(21_000),
            exit: Duration::from_millis(750),
            result: Duration::from_millis(3_800),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayPhase {
    Absent,
    Entering,
    Visible,
    Exiting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timer {
    EntranceDone,
    DisplayElapsed,
    ExitDone,
    /// Clears the inline result with this sequence number, and only that one.
    ResultExpired(u64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineResult {
    pub seq: u64,
    pub text: String,
    pub tone: Tone,
}

/// The one live alert of a page context.
#[derive(Debug, Clone)]
pub struct AlertSession {
    pub id: SessionId,
    pub verdict: RiskVerdict,
    pub emphasis: Emphasis,
    pub created_at: Instant,
    pub phase: OverlayPhase,
    pub in_flight: usize,
    pub result: Option<InlineResult>,
}

impl AlertSession {
    pub fn url(&self) -> &str {
        &self.verdict.url
    }

    /// The ACTING sub-state: an action is outstanding or its result is shown.
    pub fn is_acting(&self) -> bool {
        self.in_flight > 0 || self.result.is_some()
    }

    fn view(&self) -> AlertView {
        AlertView {
            session: self.id,
            phase: self.phase,
            emphasis: self.emphasis,
            url: self.verdict.url.clone(),
            reason: self.verdict.reason.clone(),
            result: self.result.as_ref().map(|r| (r.text.clone(), r.tone)),
        }
    }
}

/// What the surface needs to draw one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertView {
    pub session: SessionId,
    pub phase: OverlayPhase,
    pub emphasis: Emphasis,
    pub url: String,
    pub reason: String,
    pub result: Option<(String, Tone)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverlayInput {
    Show(RiskVerdict),
    Timer {
        session: SessionId,
        timer: Timer,
    },
    Pressed(ActionKind),
    ActionResolved {
        session: SessionId,
        kind: ActionKind,
        outcome: ActionOutcome,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Mount(AlertView),
    Update(AlertView),
    Unmount(SessionId),
    Schedule {
        session: SessionId,
        timer: Timer,
        after: Duration,
    },
    Submit {
        session: SessionId,
        url: String,
        kind: ActionKind,
    },
}

#[derive(Debug)]
pub struct OverlayMachine {
    timings: OverlayTimings,
    session: Option<AlertSession>,
    next_session: SessionId,
    next_result: u64,
}

impl OverlayMachine {
    pub fn new(timings: OverlayTimings) -> Self {
        Self {
            timings,
            session: None,
            next_session: 1,
            next_result: 1,
        }
    }

    pub fn phase(&self) -> OverlayPhase {
        self.session
            .as_ref()
            .map_or(OverlayPhase::Absent, |s| s.phase)
    }

    pub fn session(&self) -> Option<&AlertSession> {
        self.session.as_ref()
    }

    pub fn handle(&mut self, input: OverlayInput, now: Instant) -> Vec<Effect> {
        match input {
            OverlayInput::Show(verdict) => self.show(verdict, now),
            OverlayInput::Timer { session, timer } => self.on_timer(session, timer),
            OverlayInput::Pressed(kind) => self.on_pressed(kind),
            OverlayInput::ActionResolved {
                session,
                kind,
                outcome,
            } => self.on_resolved(session, kind, &outcome),
        }
    }

    fn show(&mut self, verdict: RiskVerdict, now: Instant) -> Vec<Effect> {
        let Some(emphasis) = emphasis_for(verdict.risk) else {
            debug!(url = %verdict.url, "trusted verdict, no overlay");
            return Vec::new();
        };
        debug_assert!(verdict.risk != RiskLevel::Trusted);

        let mut effects = Vec::new();
        if let Some(old) = self.session.take() {
            debug!(session = old.id, "replacing live overlay");
            effects.push(Effect::Unmount(old.id));
        }

        let id = self.next_session;
        self.next_session += 1;

        let session = AlertSession {
            id,
            verdict,
            emphasis,
            created_at: now,
            phase: OverlayPhase::Entering,
            in_flight: 0,
            result: None,
        };
        effects.push(Effect::Mount(session.view()));
        effects.push(Effect::Schedule {
            session: id,
            timer: Timer::EntranceDone,
            after: self.timings.entrance,
        });
        // The display clock starts at creation, alongside the entrance.
        effects.push(Effect::Schedule {
            session: id,
            timer: Timer::DisplayElapsed,
            after: self.timings.display,
        });
        self.session = Some(session);
        effects
    }

    fn on_timer(&mut self, id: SessionId, timer: Timer) -> Vec<Effect> {
        let exit = self.timings.exit;
        let Some(session) = self.session.as_mut().filter(|s| s.id == id) else {
            return Vec::new();
        };

        match (timer, session.phase) {
            (Timer::EntranceDone, OverlayPhase::Entering) => {
                session.phase = OverlayPhase::Visible;
                vec![Effect::Update(session.view())]
            }
            (Timer::DisplayElapsed, OverlayPhase::Entering | OverlayPhase::Visible) => {
                session.phase = OverlayPhase::Exiting;
                vec![
                    Effect::Update(session.view()),
                    Effect::Schedule {
                        session: id,
                        timer: Timer::ExitDone,
                        after: exit,
                    },
                ]
            }
            (Timer::ExitDone, OverlayPhase::Exiting) => {
                self.session = None;
                vec![Effect::Unmount(id)]
            }
            (Timer::ResultExpired(seq), _) => {
                if session.result.as_ref().is_some_and(|r| r.seq == seq) {
                    session.result = None;
                    vec![Effect::Update(session.view())]
                } else {
                    Vec::new()
                }
            }
            _ => Vec::new(),
        }
    }

    fn on_pressed(&mut self, kind: ActionKind) -> Vec<Effect> {
        let Some(session) = self
            .session
            .as_mut()
            .filter(|s| matches!(s.phase, OverlayPhase::Entering | OverlayPhase::Visible))
        else {
            debug!(kind = %kind, "action pressed without a live overlay");
            return Vec::new();
        };

        session.in_flight += 1;
        vec![Effect::Submit {
            session: session.id,
            url: session.verdict.url.clone(),
            kind,
        }]
    }

    fn on_resolved(
        &mut self,
        id: SessionId,
        kind: ActionKind,
        outcome: &ActionOutcome,
    ) -> Vec<Effect> {
        let result_after = self.timings.result;
        let Some(session) = self.session.as_mut().filter(|s| s.id == id) else {
            debug!(session = id, kind = %kind, "action resolved after its overlay closed");
            return Vec::new();
        };

        session.in_flight = session.in_flight.saturating_sub(1);
        let seq = self.next_result;
        self.next_result += 1;

        let ok = outcome.is_ok();
        session.result = Some(InlineResult {
            seq,
            text: action_message(kind, ok).to_owned(),
            tone: if ok { Tone::Success } else { Tone::Failure },
        });

        vec![
            Effect::Update(session.view()),
            Effect::Schedule {
                session: id,
                timer: Timer::ResultExpired(seq),
                after: result_after,
            },
        ]
    }
}
