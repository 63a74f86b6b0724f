use super::*;
use safesurf_backend::{RETRY_DELAY, RetryPolicy};
use safesurf_core::fakes::{FakeBackend, RecordingNotifier};
use safesurf_core::{DestinationId, Notifier, ReputationBackend, RiskLevel};
use safesurf_ipc::ServerMessage;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::navigation::navigation_channel;

const TAB: DestinationId = DestinationId(1);

struct Harness {
    watcher: NavigationWatcher,
    backend: Arc<FakeBackend>,
    notifier: Arc<RecordingNotifier>,
    page: mpsc::UnboundedReceiver<ServerMessage>,
}

fn harness(backend: FakeBackend) -> Harness {
    harness_with_policy(backend, RetryPolicy::default())
}

fn harness_with_policy(backend: FakeBackend, policy: RetryPolicy) -> Harness {
    let backend = Arc::new(backend);
    let notifier = Arc::new(RecordingNotifier::new());
    let router = Arc::new(MessageRouter::new(
        Arc::clone(&backend) as Arc<dyn ReputationBackend>,
        Arc::clone(&notifier) as Arc<dyn Notifier>,
    ));
    let classifier = Arc::new(RiskClassifierClient::new(
        Arc::clone(&backend) as Arc<dyn ReputationBackend>,
        policy,
    ));

    let (tx, page) = mpsc::unbounded_channel();
    router.register(TAB, tx);

    Harness {
        watcher: NavigationWatcher::new(ThrottleGate::default(), classifier, router),
        backend,
        notifier,
        page,
    }
}

async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

fn delivered_urls(page: &mut mpsc::UnboundedReceiver<ServerMessage>) -> Vec<String> {
    std::iter::from_fn(|| page.try_recv().ok())
        .filter_map(ServerMessage::into_verdict)
        .map(|verdict| verdict.url)
        .collect()
}

#[tokio::test(start_paused = true)]
async fn risky_site_reaches_page_and_notification() {
    let mut h = harness(FakeBackend::responding(2, "Known phishing"));

    assert!(
        h.watcher
            .observe(NavigationEvent::new(TAB, "http://evil.test"))
            .is_some()
    );
    advance(10).await;

    let message = h.page.try_recv().unwrap();
    assert!(matches!(message, ServerMessage::ShowWarning { .. }));
    let verdict = message.into_verdict().unwrap();
    assert_eq!(verdict.url, "http://evil.test");
    assert_eq!(verdict.risk, RiskLevel::Risky);
    assert_eq!(verdict.reason, "Known phishing");

    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].message.contains("Known phishing"));
}

#[tokio::test(start_paused = true)]
async fn unknown_site_shows_info() {
    let mut h = harness(FakeBackend::responding(1, "New domain"));

    h.watcher
        .observe(NavigationEvent::new(TAB, "https://new.test"));
    advance(10).await;

    assert!(matches!(
        h.page.try_recv().unwrap(),
        ServerMessage::ShowInfo { .. }
    ));
    assert_eq!(h.notifier.sent()[0].title, "ℹ️ Site May Be Risky");
}

#[tokio::test(start_paused = true)]
async fn duplicate_navigation_within_cooldown_is_checked_once() {
    let h = harness(FakeBackend::responding(2, "Known phishing"));

    h.watcher
        .observe(NavigationEvent::new(TAB, "http://evil.test"));
    advance(500).await;
    assert!(
        h.watcher
            .observe(NavigationEvent::new(TAB, "http://evil.test"))
            .is_none()
    );
    advance(10).await;
    assert_eq!(h.backend.check_count(), 1);

    // Once the cooldown has passed the destination is checked again.
    advance(1_500).await;
    assert!(
        h.watcher
            .observe(NavigationEvent::new(TAB, "http://evil.test"))
            .is_some()
    );
    advance(10).await;
    assert_eq!(h.backend.check_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn other_destinations_are_not_throttled() {
    let h = harness(FakeBackend::responding(0, "Whitelisted"));

    h.watcher
        .observe(NavigationEvent::new(DestinationId(1), "http://a.test"));
    h.watcher
        .observe(NavigationEvent::new(DestinationId(2), "http://a.test"));
    advance(10).await;

    assert_eq!(h.backend.check_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn non_web_navigations_are_ignored() {
    let h = harness(FakeBackend::responding(2, "Known phishing"));

    for url in ["chrome://settings", "file:///etc/passwd", "about:blank"] {
        assert!(h.watcher.observe(NavigationEvent::new(TAB, url)).is_none());
    }
    advance(10).await;
    assert_eq!(h.backend.check_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn verdicts_are_delivered_in_resolution_order() {
    let backend = FakeBackend::responding(2, "Known phishing");
    backend.set_delay("http://slow.test", Duration::from_secs(5));
    let mut h = harness(backend);

    h.watcher
        .observe(NavigationEvent::new(TAB, "http://slow.test"));
    advance(2_500).await;
    h.watcher
        .observe(NavigationEvent::new(TAB, "http://fast.test"));

    advance(100).await;
    assert_eq!(delivered_urls(&mut h.page), ["http://fast.test"]);

    // The older check is not cancelled by the newer navigation.
    advance(3_000).await;
    assert_eq!(delivered_urls(&mut h.page), ["http://slow.test"]);
}

#[tokio::test(start_paused = true)]
async fn failed_check_does_not_block_later_events() {
    let backend = FakeBackend::responding(2, "Known phishing");
    for _ in 0..3 {
        backend.push_failure();
    }
    let mut h = harness(backend);

    h.watcher
        .observe(NavigationEvent::new(TAB, "http://down.test"));
    advance(2_100).await;
    // Fail-open fallback: nothing shown, nothing notified.
    assert!(h.page.try_recv().is_err());
    assert!(h.notifier.sent().is_empty());
    assert_eq!(h.backend.check_count(), 3);

    h.watcher
        .observe(NavigationEvent::new(TAB, "http://evil.test"));
    advance(10).await;
    assert_eq!(delivered_urls(&mut h.page), ["http://evil.test"]);
}

#[tokio::test(start_paused = true)]
async fn fail_closed_policy_alerts_on_unreachable_backend() {
    let mut h = harness_with_policy(
        FakeBackend::failing(),
        RetryPolicy {
            fallback_risk: RiskLevel::Unknown,
            ..RetryPolicy::default()
        },
    );

    h.watcher
        .observe(NavigationEvent::new(TAB, "http://down.test"));
    advance(10 + 2 * u64::try_from(RETRY_DELAY.as_millis()).unwrap()).await;

    let verdict = h.page.try_recv().unwrap().into_verdict().unwrap();
    assert_eq!(verdict.risk, RiskLevel::Unknown);
    assert_eq!(verdict.reason, safesurf_core::FALLBACK_REASON);
}

#[tokio::test(start_paused = true)]
async fn run_consumes_stream_until_shutdown() {
    let mut h = harness(FakeBackend::responding(2, "Known phishing"));
    let (feed, events) = navigation_channel();
    let shutdown = CancellationToken::new();

    let task = tokio::spawn(h.watcher.run(events, shutdown.clone()));

    feed.publish(NavigationEvent::new(TAB, "http://evil.test"))
        .await
        .unwrap();
    advance(10).await;
    assert_eq!(delivered_urls(&mut h.page), ["http://evil.test"]);

    shutdown.cancel();
    task.await.unwrap();
}
