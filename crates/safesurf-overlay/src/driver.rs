//! Runs an [`OverlayMachine`] on its own task, turning its effects into
//! surface calls, timers and relayed actions.

use std::sync::Arc;

use safesurf_core::{ActionKind, RiskVerdict};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::relay::ActionRelay;
use crate::state::{Effect, OverlayInput, OverlayMachine, OverlayPhase, OverlayTimings, SessionId};
use crate::surface::OverlaySurface;

/// What a page context currently shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlaySnapshot {
    pub phase: OverlayPhase,
    pub session: Option<SessionId>,
    pub url: Option<String>,
    pub result: Option<String>,
}

impl Default for OverlaySnapshot {
    fn default() -> Self {
        Self {
            phase: OverlayPhase::Absent,
            session: None,
            url: None,
            result: None,
        }
    }
}

impl OverlaySnapshot {
    fn of(machine: &OverlayMachine) -> Self {
        let session = machine.session();
        Self {
            phase: machine.phase(),
            session: session.map(|s| s.id),
            url: session.map(|s| s.url().to_owned()),
            result: session.and_then(|s| s.result.as_ref().map(|r| r.text.clone())),
        }
    }
}

#[derive(Debug)]
enum Command {
    Show(RiskVerdict),
    Press(ActionKind),
}

/// Feeds the overlay task. The task stops once every handle is dropped.
#[derive(Debug, Clone)]
pub struct OverlayHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<OverlaySnapshot>,
}

impl OverlayHandle {
    /// Returns false if the overlay task has stopped.
    pub fn show(&self, verdict: RiskVerdict) -> bool {
        self.commands.send(Command::Show(verdict)).is_ok()
    }

    pub fn press(&self, kind: ActionKind) -> bool {
        self.commands.send(Command::Press(kind)).is_ok()
    }

    pub fn snapshot(&self) -> OverlaySnapshot {
        self.snapshot.borrow().clone()
    }
}

pub fn spawn_overlay<S>(
    timings: OverlayTimings,
    surface: S,
    relay: Arc<ActionRelay>,
) -> (OverlayHandle, JoinHandle<()>)
where
    S: OverlaySurface + 'static,
{
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let (snapshot_tx, snapshot_rx) = watch::channel(OverlaySnapshot::default());

    let task = tokio::spawn(run_overlay(
        OverlayMachine::new(timings),
        surface,
        relay,
        commands_rx,
        snapshot_tx,
    ));

    (
        OverlayHandle {
            commands: commands_tx,
            snapshot: snapshot_rx,
        },
        task,
    )
}

async fn run_overlay<S: OverlaySurface>(
    mut machine: OverlayMachine,
    mut surface: S,
    relay: Arc<ActionRelay>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    snapshot: watch::Sender<OverlaySnapshot>,
) {
    let (internal_tx, mut internal_rx) = mpsc::unbounded_channel::<OverlayInput>();
    // Dropping the set aborts outstanding timers and submissions.
    let mut tasks = JoinSet::new();

    loop {
        let input = tokio::select! {
            biased;
            Some(input) = internal_rx.recv() => input,
            command = commands.recv() => match command {
                Some(Command::Show(verdict)) => OverlayInput::Show(verdict),
                Some(Command::Press(kind)) => OverlayInput::Pressed(kind),
                None => break,
            },
            Some(_) = tasks.join_next() => continue,
        };

        for effect in machine.handle(input, Instant::now()) {
            match effect {
                Effect::Mount(view) => {
                    info!(session = view.session, url = %view.url, "overlay shown");
                    surface.mount(&view);
                }
                Effect::Update(view) => surface.update(&view),
                Effect::Unmount(session) => {
                    debug!(session, "overlay removed");
                    surface.unmount(session);
                }
                Effect::Schedule {
                    session,
                    timer,
                    after,
                } => {
                    let tx = internal_tx.clone();
                    tasks.spawn(async move {
                        tokio::time::sleep(after).await;
                        let _ = tx.send(OverlayInput::Timer { session, timer });
                    });
                }
                Effect::Submit { session, url, kind } => {
                    let tx = internal_tx.clone();
                    let relay = Arc::clone(&relay);
                    tasks.spawn(async move {
                        let outcome = relay.submit(&url, kind).await;
                        let _ = tx.send(OverlayInput::ActionResolved {
                            session,
                            kind,
                            outcome,
                        });
                    });
                }
            }
        }

        snapshot.send_replace(OverlaySnapshot::of(&machine));
    }

    if let Some(session) = machine.session() {
        surface.unmount(session.id);
    }
    debug!("overlay task stopped");
}
