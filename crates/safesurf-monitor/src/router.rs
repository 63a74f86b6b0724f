use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use safesurf_backend::PendingVerdict;
use safesurf_core::{
    ActionOutcome, ActionRequest, DestinationId, Notification, Notifier, ReputationBackend,
    RiskLevel, RiskVerdict,
};
use safesurf_ipc::ServerMessage;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

/// Upper bound on one desktop notification.
pub(crate) const NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

struct PageSlot {
    registration: u64,
    tx: mpsc::UnboundedSender<ServerMessage>,
}

/// Carries verdicts to page contexts and user actions to the backend.
pub(crate) struct MessageRouter {
    backend: Arc<dyn ReputationBackend>,
    notifier: Arc<dyn Notifier>,
    pages: Mutex<HashMap<DestinationId, PageSlot>>,
    next_registration: AtomicU64,
}

impl std::fmt::Debug for MessageRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageRouter")
            .field("pages", &self.pages().len())
            .finish_non_exhaustive()
    }
}

impl MessageRouter {
    pub(crate) fn new(backend: Arc<dyn ReputationBackend>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            backend,
            notifier,
            pages: Mutex::new(HashMap::new()),
            next_registration: AtomicU64::new(1),
        }
    }

    /// Register the page context for `destination`, replacing any previous
    /// one. Returns a registration id for [`MessageRouter::unregister`].
    pub(crate) fn register(
        &self,
        destination: DestinationId,
        tx: mpsc::UnboundedSender<ServerMessage>,
    ) -> u64 {
        let registration = self.next_registration.fetch_add(1, Ordering::Relaxed);
        let replaced = self
            .pages()
            .insert(destination, PageSlot { registration, tx })
            .is_some();
        info!(destination = %destination, replaced, "page context attached");
        registration
    }

    /// Remove a registration, unless it has since been replaced.
    pub(crate) fn unregister(&self, destination: DestinationId, registration: u64) {
        let mut pages = self.pages();
        if pages
            .get(&destination)
            .is_some_and(|slot| slot.registration == registration)
        {
            pages.remove(&destination);
            debug!(destination = %destination, "page context detached");
        }
    }

    /// Send a verdict to its page context. Fire-and-forget: returns whether a
    /// message was handed off; a missing or closed context is not an error.
    pub(crate) fn deliver(&self, destination: DestinationId, verdict: &RiskVerdict) -> bool {
        let Some(message) = ServerMessage::from_verdict(verdict) else {
            return false;
        };

        let mut pages = self.pages();
        let Some(slot) = pages.get(&destination) else {
            debug!(destination = %destination, url = %verdict.url, "no page context, verdict dropped");
            return false;
        };

        if slot.tx.send(message).is_err() {
            debug!(destination = %destination, url = %verdict.url, "page context gone, verdict dropped");
            pages.remove(&destination);
            return false;
        }
        true
    }

    /// Log, deliver and then notify a resolved verdict.
    ///
    /// The page message goes out first; a notifier slower than
    /// [`NOTIFY_TIMEOUT`] is abandoned.
    pub(crate) async fn route(&self, destination: DestinationId, verdict: &RiskVerdict) {
        if verdict.risk == RiskLevel::Trusted {
            info!(url = %verdict.url, reason = %verdict.reason, "site trusted");
            return;
        }

        info!(
            url = %verdict.url,
            risk = %verdict.risk,
            reason = %verdict.reason,
            "site flagged"
        );
        self.deliver(destination, verdict);

        if let Some(notification) = Notification::for_verdict(verdict)
            && tokio::time::timeout(NOTIFY_TIMEOUT, self.notifier.notify(notification))
                .await
                .is_err()
        {
            warn!(
                url = %verdict.url,
                timeout_secs = NOTIFY_TIMEOUT.as_secs(),
                "notification timed out"
            );
        }
    }

    /// Route a classification once it resolves, on its own task.
    ///
    /// Late verdicts are still delivered. The returned token cancels both the
    /// classification and its delivery; callers may ignore it.
    pub(crate) fn route_detached(
        self: &Arc<Self>,
        destination: DestinationId,
        pending: PendingVerdict,
    ) -> CancellationToken {
        let token = pending.token();
        let router = Arc::clone(self);

        tokio::spawn(
            async move {
                match pending.wait().await {
                    Some(verdict) => router.route(destination, &verdict).await,
                    None => debug!("check cancelled before delivery"),
                }
            }
            .in_current_span(),
        );

        token
    }

    /// Forward a user action to the backend. No retry.
    pub(crate) async fn relay(&self, request: &ActionRequest) -> ActionOutcome {
        let span = info_span!(
            "action_relay",
            id = %request.id,
            kind = %request.kind,
            url = %request.url,
        );

        async {
            match self.backend.submit_action(request.kind, &request.url).await {
                Ok(()) => {
                    info!("action acknowledged");
                    ActionOutcome::Acknowledged
                }
                Err(error) => {
                    let reason = format!("{error:#}");
                    warn!(error = %reason, "action failed");
                    ActionOutcome::Failed(reason)
                }
            }
        }
        .instrument(span)
        .await
    }

    fn pages(&self) -> MutexGuard<'_, HashMap<DestinationId, PageSlot>> {
        self.pages.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use safesurf_backend::{RetryPolicy, RiskClassifierClient};
    use safesurf_core::ActionKind;
    use safesurf_core::fakes::{FakeBackend, RecordingNotifier};

    const TAB: DestinationId = DestinationId(3);

    fn router() -> (Arc<MessageRouter>, Arc<FakeBackend>, Arc<RecordingNotifier>) {
        let backend = Arc::new(FakeBackend::responding(2, "Known phishing"));
        let notifier = Arc::new(RecordingNotifier::new());
        let router = Arc::new(MessageRouter::new(
            Arc::clone(&backend) as Arc<dyn ReputationBackend>,
            Arc::clone(&notifier) as Arc<dyn Notifier>,
        ));
        (router, backend, notifier)
    }

    fn risky() -> RiskVerdict {
        RiskVerdict::new("http://evil.test", RiskLevel::Risky, "Known phishing")
    }

    #[tokio::test]
    async fn route_notifies_and_delivers() {
        let (router, _backend, notifier) = router();
        let (tx, mut rx) = mpsc::unbounded_channel();
        router.register(TAB, tx);

        router.route(TAB, &risky()).await;

        let message = rx.try_recv().unwrap();
        assert_eq!(message, ServerMessage::from_verdict(&risky()).unwrap());
        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].title, "⚠️ Risky Site Detected!");
        assert_eq!(sent[0].message, "http://evil.test\nReason: Known phishing");
    }

    /// A notification sink that never finishes, like a hung `notify-send`.
    struct StalledNotifier;

    #[async_trait::async_trait]
    impl Notifier for StalledNotifier {
        async fn notify(&self, _notification: Notification) {
            std::future::pending::<()>().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_notifier_does_not_hold_back_the_page() {
        let router = Arc::new(MessageRouter::new(
            Arc::new(FakeBackend::responding(2, "Known phishing")),
            Arc::new(StalledNotifier),
        ));
        let (tx, mut rx) = mpsc::unbounded_channel();
        router.register(TAB, tx);

        let routing = tokio::spawn({
            let router = Arc::clone(&router);
            async move { router.route(TAB, &risky()).await }
        });
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(
            rx.try_recv().unwrap(),
            ServerMessage::from_verdict(&risky()).unwrap()
        );

        // The stuck notification is given up on rather than pinning the task.
        tokio::time::sleep(NOTIFY_TIMEOUT + Duration::from_secs(1)).await;
        assert!(routing.is_finished());
        routing.await.unwrap();
    }

    #[tokio::test]
    async fn trusted_is_only_logged() {
        let (router, _backend, notifier) = router();
        let (tx, mut rx) = mpsc::unbounded_channel();
        router.register(TAB, tx);

        router
            .route(
                TAB,
                &RiskVerdict::new("http://ok.test", RiskLevel::Trusted, "Whitelisted"),
            )
            .await;

        assert!(rx.try_recv().is_err());
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn deliver_to_missing_context_is_a_noop() {
        let (router, _backend, _notifier) = router();
        assert!(!router.deliver(TAB, &risky()));

        let (tx, rx) = mpsc::unbounded_channel();
        router.register(TAB, tx);
        drop(rx);
        assert!(!router.deliver(TAB, &risky()));
    }

    #[tokio::test]
    async fn newer_registration_wins() {
        let (router, _backend, _notifier) = router();
        let (old_tx, mut old_rx) = mpsc::unbounded_channel();
        let (new_tx, mut new_rx) = mpsc::unbounded_channel();

        let old = router.register(TAB, old_tx);
        router.register(TAB, new_tx);
        // The replaced connection hanging up must not detach the new one.
        router.unregister(TAB, old);

        assert!(router.deliver(TAB, &risky()));
        assert!(new_rx.try_recv().is_ok());
        assert!(old_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn relay_reports_acknowledgment_and_failure() {
        let (router, backend, _notifier) = router();
        let request = ActionRequest::new("http://evil.test", ActionKind::Report);

        assert_eq!(router.relay(&request).await, ActionOutcome::Acknowledged);
        assert_eq!(
            backend.action_calls(),
            vec![(ActionKind::Report, "http://evil.test".to_owned())]
        );

        backend.fail_actions("HTTP 500 Internal Server Error");
        let outcome = router.relay(&request).await;
        assert!(!outcome.is_ok());
        assert!(matches!(outcome, ActionOutcome::Failed(reason) if reason.contains("500")));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_detached_route_delivers_nothing() {
        let (router, backend, notifier) = router();
        backend.set_delay("http://evil.test", Duration::from_secs(1));
        let (tx, mut rx) = mpsc::unbounded_channel();
        router.register(TAB, tx);

        let classifier = Arc::new(RiskClassifierClient::new(
            Arc::clone(&backend) as Arc<dyn ReputationBackend>,
            RetryPolicy::default(),
        ));
        let token = router.route_detached(TAB, classifier.classify_detached("http://evil.test"));
        tokio::time::sleep(Duration::from_millis(100)).await;
        token.cancel();

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(rx.try_recv().is_err());
        assert!(notifier.sent().is_empty());
    }
}
