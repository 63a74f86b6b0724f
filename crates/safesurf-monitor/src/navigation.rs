//! Typed subscription to completed navigations.

use std::pin::Pin;
use std::task::{Context, Poll};

use anyhow::{Result, anyhow};
use futures::Stream;
use safesurf_core::NavigationEvent;
use tokio::sync::mpsc;

const FEED_BUFFER: usize = 256;

/// Producer side, one clone per host connection.
#[derive(Debug, Clone)]
pub(crate) struct NavigationFeed {
    tx: mpsc::Sender<NavigationEvent>,
}

impl NavigationFeed {
    pub(crate) async fn publish(&self, event: NavigationEvent) -> Result<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| anyhow!("navigation watcher stopped"))
    }
}

/// Completed navigations in arrival order. Ends once every feed is dropped;
/// it cannot be restarted.
#[derive(Debug)]
pub(crate) struct NavigationEvents {
    rx: mpsc::Receiver<NavigationEvent>,
}

impl Stream for NavigationEvents {
    type Item = NavigationEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

pub(crate) fn navigation_channel() -> (NavigationFeed, NavigationEvents) {
    let (tx, rx) = mpsc::channel(FEED_BUFFER);
    (NavigationFeed { tx }, NavigationEvents { rx })
}
