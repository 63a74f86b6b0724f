use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use safesurf_core::DestinationId;
use tokio::time::Instant;

pub(crate) const COOLDOWN: Duration = Duration::from_millis(2_000);

/// Per-destination cooldown between admitted classification checks.
///
/// Owned by the watcher for the lifetime of one monitor run.
#[derive(Debug)]
pub(crate) struct ThrottleGate {
    cooldown: Duration,
    last_checked: Mutex<HashMap<DestinationId, Instant>>,
}

impl Default for ThrottleGate {
    fn default() -> Self {
        Self::new(COOLDOWN)
    }
}

impl ThrottleGate {
    pub(crate) fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_checked: Mutex::new(HashMap::new()),
        }
    }

    /// Admit a check for `destination` at `now`, recording it.
    ///
    /// Denied checks leave the record untouched, so a steady stream of
    /// navigations is admitted once per cooldown rather than starved.
    pub(crate) fn admit(&self, destination: DestinationId, now: Instant) -> bool {
        let mut last_checked = self
            .last_checked
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        match last_checked.get(&destination) {
            Some(last) if now.saturating_duration_since(*last) < self.cooldown => false,
            _ => {
                last_checked.insert(destination, now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TAB: DestinationId = DestinationId(1);

    #[test]
    fn first_check_is_admitted() {
        let gate = ThrottleGate::default();
        assert!(gate.admit(TAB, Instant::now()));
    }

    #[test]
    fn cooldown_boundary() {
        let gate = ThrottleGate::default();
        let start = Instant::now();

        assert!(gate.admit(TAB, start));
        assert!(!gate.admit(TAB, start + Duration::from_millis(500)));
        assert!(!gate.admit(TAB, start + Duration::from_millis(1_999)));
        assert!(gate.admit(TAB, start + COOLDOWN));
    }

    #[test]
    fn denied_check_does_not_extend_window() {
        let gate = ThrottleGate::default();
        let start = Instant::now();

        assert!(gate.admit(TAB, start));
        assert!(!gate.admit(TAB, start + Duration::from_millis(1_500)));
        // Measured from the admitted check at `start`, not the denied one.
        assert!(gate.admit(TAB, start + Duration::from_millis(2_100)));
    }

    #[test]
    fn destinations_are_independent() {
        let gate = ThrottleGate::default();
        let now = Instant::now();

        assert!(gate.admit(DestinationId(1), now));
        assert!(gate.admit(DestinationId(2), now));
        assert!(!gate.admit(DestinationId(1), now));
    }

    #[test]
    fn concurrent_admits_let_one_through() {
        let gate = ThrottleGate::default();
        let now = Instant::now();
        let admitted = AtomicUsize::new(0);

        std::thread::scope(|scope| {
            for _ in 0..16 {
                scope.spawn(|| {
                    if gate.admit(TAB, now) {
                        admitted.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }
        });

        assert_eq!(admitted.load(Ordering::SeqCst), 1);
    }
}
