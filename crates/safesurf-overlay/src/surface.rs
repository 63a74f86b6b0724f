//! Rendering seam for the overlay.

use std::sync::{Arc, Mutex, PoisonError};

use crate::state::{AlertView, SessionId};

/// Draws overlay sessions. Calls arrive in order, one session at a time;
/// a new session is only mounted after the previous one was unmounted.
pub trait OverlaySurface: Send {
    fn mount(&mut self, view: &AlertView);
    fn update(&mut self, view: &AlertView);
    fn unmount(&mut self, session: SessionId);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceEvent {
    Mounted(AlertView),
    Updated(AlertView),
    Unmounted(SessionId),
}

/// Surface that records every call. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordingSurface {
    events: Arc<Mutex<Vec<SurfaceEvent>>>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SurfaceEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The most recent view drawn, if any session was ever mounted.
    pub fn last_view(&self) -> Option<AlertView> {
        self.events().into_iter().rev().find_map(|event| match event {
            SurfaceEvent::Mounted(view) | SurfaceEvent::Updated(view) => Some(view),
            SurfaceEvent::Unmounted(_) => None,
        })
    }

    fn push(&self, event: SurfaceEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

impl OverlaySurface for RecordingSurface {
    fn mount(&mut self, view: &AlertView) {
        self.push(SurfaceEvent::Mounted(view.clone()));
    }

    fn update(&mut self, view: &AlertView) {
        self.push(SurfaceEvent::Updated(view.clone()));
    }

    fn unmount(&mut self, session: SessionId) {
        self.push(SurfaceEvent::Unmounted(session));
    }
}
