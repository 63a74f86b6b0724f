// Emphasis is all the overlay knows about styling; colors belong to the renderer.

use safesurf_core::{ActionKind, RiskLevel};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emphasis {
    HighAlert,
    Caution,
}

/// Trusted sites never get an overlay.
pub fn emphasis_for(risk: RiskLevel) -> Option<Emphasis> {
    match risk {
        RiskLevel::Risky => Some(Emphasis::HighAlert),
        RiskLevel::Unknown => Some(Emphasis::Caution),
        RiskLevel::Trusted => None,
    }
}

/// Tone of an inline action result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Success,
    Failure,
}

pub fn action_message(kind: ActionKind, ok: bool) -> &'static str {
    match (kind, ok) {
        (ActionKind::Override, true) => "Override sent. Refresh to clear warning.",
        (ActionKind::Override, false) => "Error sending override!",
        (ActionKind::Report, true) => "Site reported. Thank you!",
        (ActionKind::Report, false) => "Error reporting site!",
    }
}
