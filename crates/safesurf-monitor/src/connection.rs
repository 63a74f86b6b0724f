//! Monitor side of the IPC socket: page contexts and host feeds.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use safesurf_ipc::{
    IpcConnection, IpcServer, PROTOCOL_VERSION, PeerReplies, PeerRequest, ServerMessage,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info_span, warn};

use crate::navigation::NavigationFeed;
use crate::router::MessageRouter;

static NEXT_CONNECTION: AtomicU64 = AtomicU64::new(1);

/// Accept connections until `shutdown` fires.
pub(crate) async fn serve_ipc(
    server: IpcServer,
    router: Arc<MessageRouter>,
    feed: NavigationFeed,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            accepted = server.accept() => match accepted {
                Ok(connection) => {
                    let router = Arc::clone(&router);
                    let feed = feed.clone();
                    tokio::spawn(async move {
                        if let Err(error) = handle_connection(connection, router, feed).await {
                            warn!(error = %format!("{error:#}"), "ipc client disconnected with error");
                        }
                    });
                }
                Err(error) => {
                    warn!(error = %format!("{error:#}"), "failed to accept IPC client");
                }
            },
            () = shutdown.cancelled() => break,
        }
    }
}

pub(crate) async fn handle_connection(
    connection: IpcConnection,
    router: Arc<MessageRouter>,
    feed: NavigationFeed,
) -> Result<()> {
    let id = NEXT_CONNECTION.fetch_add(1, Ordering::Relaxed);
    let span = info_span!("page_connection", connection = id);
    serve_connection(connection, router, feed)
        .instrument(span)
        .await
}

async fn serve_connection(
    connection: IpcConnection,
    router: Arc<MessageRouter>,
    feed: NavigationFeed,
) -> Result<()> {
    let (mut requests, replies) = connection.into_split();
    // Hello replies, verdicts and action results for this connection, in send order.
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<ServerMessage>();
    tokio::spawn(write_replies(replies, outbound_rx).in_current_span());
    let mut registration: Option<u64> = None;

    let result = loop {
        let request = match requests.next_request().await {
            Ok(Some(request)) => request,
            Ok(None) => break Ok(()),
            Err(error) => break Err(error),
        };

        match request {
            PeerRequest::Hello { .. } => {
                let _ = outbound_tx.send(ServerMessage::Hello {
                    version: PROTOCOL_VERSION,
                });
            }
            PeerRequest::Attach {
                destination,
                previous,
            } => {
                if let (Some(previous), Some(registration)) = (previous, registration) {
                    router.unregister(previous, registration);
                }
                registration = Some(router.register(destination, outbound_tx.clone()));
            }
            PeerRequest::Navigated(event) => {
                debug!(destination = %event.destination, url = %event.url, "navigation reported");
                if let Err(error) = feed.publish(event).await {
                    break Err(error);
                }
            }
            PeerRequest::Action(request) => {
                let router = Arc::clone(&router);
                let tx = outbound_tx.clone();
                tokio::spawn(
                    async move {
                        let outcome = router.relay(&request).await;
                        let _ = tx.send(ServerMessage::action_result(&request, &outcome));
                    }
                    .in_current_span(),
                );
            }
        }
    };

    if let (Some(destination), Some(registration)) = (requests.destination(), registration) {
        router.unregister(destination, registration);
    }
    debug!("connection closed");
    result
}

/// Drain queued messages to the peer until every sender is gone or a write
/// fails.
async fn write_replies(
    mut replies: PeerReplies,
    mut outbound: mpsc::UnboundedReceiver<ServerMessage>,
) {
    while let Some(message) = outbound.recv().await {
        if let Err(error) = replies.send(&message).await {
            debug!(error = %format!("{error:#}"), "page connection write failed");
            break;
        }
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use safesurf_backend::{RetryPolicy, RiskClassifierClient};
    use safesurf_core::fakes::{FakeBackend, RecordingNotifier};
    use safesurf_core::{
        ActionKind, ActionRequest, DestinationId, Notifier, ReputationBackend, RiskLevel,
    };
    use safesurf_ipc::{ClientMessage, IpcClient};
    use std::time::Duration;

    use crate::navigation::navigation_channel;
    use crate::throttle::ThrottleGate;
    use crate::watcher::NavigationWatcher;

    const TIMEOUT: Duration = Duration::from_secs(5);

    struct Monitor {
        socket: std::path::PathBuf,
        backend: Arc<FakeBackend>,
        notifier: Arc<RecordingNotifier>,
        shutdown: CancellationToken,
        _dir: tempfile::TempDir,
    }

    fn start_monitor(backend: FakeBackend) -> Monitor {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("monitor.sock");
        let server = IpcServer::bind(&socket).unwrap();

        let backend = Arc::new(backend);
        let notifier = Arc::new(RecordingNotifier::new());
        let router = Arc::new(MessageRouter::new(
            Arc::clone(&backend) as Arc<dyn ReputationBackend>,
            Arc::clone(&notifier) as Arc<dyn Notifier>,
        ));
        let classifier = Arc::new(RiskClassifierClient::new(
            Arc::clone(&backend) as Arc<dyn ReputationBackend>,
            RetryPolicy::default(),
        ));
        let (feed, events) = navigation_channel();
        let shutdown = CancellationToken::new();

        let watcher = NavigationWatcher::new(ThrottleGate::default(), classifier, Arc::clone(&router));
        tokio::spawn(watcher.run(events, shutdown.clone()));
        tokio::spawn(serve_ipc(server, router, feed, shutdown.clone()));

        Monitor {
            socket,
            backend,
            notifier,
            shutdown,
            _dir: dir,
        }
    }

    async fn attach_page(socket: &std::path::Path, destination: DestinationId) -> IpcClient {
        let mut page = IpcClient::connect(socket).await.unwrap();
        page.send(&ClientMessage::Attach { destination }).await.unwrap();
        // The hello reply proves the attach before it was processed.
        page.send(&ClientMessage::Hello {
            version: PROTOCOL_VERSION,
        })
        .await
        .unwrap();
        assert_eq!(
            page.recv().await.unwrap(),
            Some(ServerMessage::Hello {
                version: PROTOCOL_VERSION
            })
        );
        page
    }

    async fn navigate(socket: &std::path::Path, destination: DestinationId, url: &str) {
        let mut host = IpcClient::connect(socket).await.unwrap();
        host.send(&ClientMessage::Navigated {
            destination,
            url: url.to_owned(),
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn verdict_and_action_round_trip_over_socket() {
        let monitor = start_monitor(FakeBackend::responding(2, "Known phishing"));
        let tab = DestinationId(4);
        let mut page = attach_page(&monitor.socket, tab).await;

        navigate(&monitor.socket, tab, "http://evil.test").await;

        let message = tokio::time::timeout(TIMEOUT, page.recv())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let verdict = message.into_verdict().unwrap();
        assert_eq!(verdict.risk, RiskLevel::Risky);
        assert_eq!(verdict.reason, "Known phishing");
        assert_eq!(monitor.notifier.sent().len(), 1);

        let request = ActionRequest::new("http://evil.test", ActionKind::Report);
        page.send(&ClientMessage::action(&request)).await.unwrap();
        let reply = tokio::time::timeout(TIMEOUT, page.recv())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(
            reply,
            ServerMessage::ActionResult {
                id: request.id,
                kind: ActionKind::Report,
                ok: true,
                detail: None,
            }
        );
        assert_eq!(
            monitor.backend.action_calls(),
            vec![(ActionKind::Report, "http://evil.test".to_owned())]
        );

        monitor.shutdown.cancel();
    }

    #[tokio::test]
    async fn failed_action_carries_detail() {
        let monitor = start_monitor(FakeBackend::responding(2, "Known phishing"));
        monitor.backend.fail_actions("HTTP 503 Service Unavailable");
        let mut page = attach_page(&monitor.socket, DestinationId(5)).await;

        let request = ActionRequest::new("http://evil.test", ActionKind::Override);
        page.send(&ClientMessage::action(&request)).await.unwrap();
        let reply = tokio::time::timeout(TIMEOUT, page.recv())
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        let ServerMessage::ActionResult { ok, detail, .. } = reply else {
            panic!("expected action result, got {reply:?}");
        };
        assert!(!ok);
        assert!(detail.unwrap().contains("503"));

        monitor.shutdown.cancel();
    }

    #[tokio::test]
    async fn reattach_moves_the_page_to_the_new_destination() {
        let monitor = start_monitor(FakeBackend::responding(2, "Known phishing"));
        let mut page = attach_page(&monitor.socket, DestinationId(6)).await;

        page.send(&ClientMessage::Attach {
            destination: DestinationId(7),
        })
        .await
        .unwrap();
        page.send(&ClientMessage::Hello {
            version: PROTOCOL_VERSION,
        })
        .await
        .unwrap();
        assert!(matches!(
            page.recv().await.unwrap(),
            Some(ServerMessage::Hello { .. })
        ));

        navigate(&monitor.socket, DestinationId(6), "http://evil.test").await;
        assert!(
            tokio::time::timeout(Duration::from_millis(200), page.recv())
                .await
                .is_err(),
            "old destination should no longer reach this page"
        );

        navigate(&monitor.socket, DestinationId(7), "http://evil.test").await;
        let message = tokio::time::timeout(TIMEOUT, page.recv())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(matches!(message, ServerMessage::ShowWarning { .. }));

        monitor.shutdown.cancel();
    }

    #[tokio::test]
    async fn verdicts_only_reach_their_destination() {
        let monitor = start_monitor(FakeBackend::responding(1, "New domain"));
        let mut first = attach_page(&monitor.socket, DestinationId(1)).await;
        let mut second = attach_page(&monitor.socket, DestinationId(2)).await;

        navigate(&monitor.socket, DestinationId(2), "https://new.test").await;

        let message = tokio::time::timeout(TIMEOUT, second.recv())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(matches!(message, ServerMessage::ShowInfo { .. }));
        assert!(
            tokio::time::timeout(Duration::from_millis(200), first.recv())
                .await
                .is_err(),
            "first page should receive nothing"
        );

        monitor.shutdown.cancel();
    }
}
