use std::sync::Arc;

use futures::{Stream, StreamExt};
use safesurf_backend::RiskClassifierClient;
use safesurf_core::NavigationEvent;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span};

use crate::router::MessageRouter;
use crate::throttle::ThrottleGate;

/// Turns completed navigations into classifications routed to page contexts.
#[derive(Debug)]
pub(crate) struct NavigationWatcher {
    gate: ThrottleGate,
    classifier: Arc<RiskClassifierClient>,
    router: Arc<MessageRouter>,
}

impl NavigationWatcher {
    pub(crate) fn new(
        gate: ThrottleGate,
        classifier: Arc<RiskClassifierClient>,
        router: Arc<MessageRouter>,
    ) -> Self {
        Self {
            gate,
            classifier,
            router,
        }
    }

    /// Handle one navigation. Returns the token of the admitted check, or
    /// `None` if the event was dropped.
    ///
    /// The check runs detached: a later navigation in the same destination
    /// does not cancel it, and verdicts are delivered in resolution order.
    pub(crate) fn observe(&self, event: NavigationEvent) -> Option<CancellationToken> {
        let span = info_span!(
            "navigation_check",
            destination = %event.destination,
            url = %event.url,
        );
        let _enter = span.enter();

        if !event.is_web() {
            debug!("not an http(s) navigation, skipped");
            return None;
        }
        if !self.gate.admit(event.destination, Instant::now()) {
            debug!("throttled");
            return None;
        }

        debug!("check admitted");
        let pending = self.classifier.classify_detached(event.url);
        Some(self.router.route_detached(event.destination, pending))
    }

    /// Observe events until the stream ends or `shutdown` fires.
    pub(crate) async fn run<S>(self, mut events: S, shutdown: CancellationToken)
    where
        S: Stream<Item = NavigationEvent> + Unpin,
    {
        loop {
            let event = tokio::select! {
                () = shutdown.cancelled() => break,
                event = events.next() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            self.observe(event);
        }
        info!("navigation watcher stopped");
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests;
