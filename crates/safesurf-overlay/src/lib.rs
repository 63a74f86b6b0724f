//! Page-context side of SafeSurf: the alert overlay and its action relay.

pub mod driver;
pub mod relay;
pub mod state;
pub mod style;
pub mod surface;

pub use driver::{OverlayHandle, OverlaySnapshot, spawn_overlay};
pub use relay::{ActionLink, ActionRelay};
pub use state::{
    AlertSession, AlertView, Effect, InlineResult, OverlayInput, OverlayMachine, OverlayPhase,
    OverlayTimings, SessionId, Timer,
};
pub use style::{Emphasis, Tone, action_message, emphasis_for};
pub use surface::{OverlaySurface, RecordingSurface, SurfaceEvent};
