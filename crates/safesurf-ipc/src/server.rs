//! Monitor end of the socket.

use crate::framing::{read_frame, write_frame};
use crate::protocol::{ClientMessage, PROTOCOL_VERSION, ServerMessage};
use anyhow::{Context, Result, bail};
use safesurf_core::{ActionRequest, DestinationId, NavigationEvent};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::net::UnixListener;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tracing::{debug, warn};

/// Listening socket of a running monitor. Removes the socket file on drop.
#[allow(missing_debug_implementations)]
pub struct IpcServer {
    socket_path: PathBuf,
    listener: UnixListener,
}

impl IpcServer {
    /// Bind `socket_path`, replacing a socket left behind by a monitor that
    /// is gone. Fails if another monitor still answers on it.
    pub fn bind(socket_path: impl AsRef<Path>) -> Result<Self> {
        let socket_path = socket_path.as_ref().to_path_buf();

        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create socket directory {}", parent.display())
            })?;
        }

        if socket_path.exists() {
            if std::os::unix::net::UnixStream::connect(&socket_path).is_ok() {
                bail!(
                    "a monitor is already listening on {}",
                    socket_path.display()
                );
            }
            std::fs::remove_file(&socket_path)
                .with_context(|| format!("failed to remove {}", socket_path.display()))?;
            debug!(path = %socket_path.display(), "removed stale socket");
        }

        let listener = UnixListener::bind(&socket_path)
            .with_context(|| format!("failed to bind {}", socket_path.display()))?;

        Ok(Self {
            socket_path,
            listener,
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub async fn accept(&self) -> Result<IpcConnection> {
        let (stream, _) = self
            .listener
            .accept()
            .await
            .context("failed to accept IPC connection")?;
        let (read_half, write_half) = stream.into_split();
        Ok(IpcConnection {
            requests: PeerRequests {
                lines: BufReader::new(read_half).lines(),
                destination: None,
            },
            replies: PeerReplies { half: write_half },
        })
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

/// One accepted page context or host feed.
#[allow(missing_debug_implementations)]
pub struct IpcConnection {
    requests: PeerRequests,
    replies: PeerReplies,
}

impl IpcConnection {
    pub fn into_split(self) -> (PeerRequests, PeerReplies) {
        (self.requests, self.replies)
    }
}

/// A decoded request from a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerRequest {
    /// Answer with [`ServerMessage::Hello`].
    Hello { version: u32 },
    /// The connection now hosts the page for `destination`. `previous` is
    /// the destination it hosted before, if any.
    Attach {
        destination: DestinationId,
        previous: Option<DestinationId>,
    },
    Navigated(NavigationEvent),
    Action(ActionRequest),
}

/// Inbound half of a connection. Tracks the destination it is attached to.
#[allow(missing_debug_implementations)]
pub struct PeerRequests {
    lines: Lines<BufReader<OwnedReadHalf>>,
    destination: Option<DestinationId>,
}

impl PeerRequests {
    /// Destination of the latest attach on this connection.
    pub fn destination(&self) -> Option<DestinationId> {
        self.destination
    }

    /// `None` once the peer hung up.
    pub async fn next_request(&mut self) -> Result<Option<PeerRequest>> {
        let Some(message) = read_frame::<_, ClientMessage>(&mut self.lines, "page").await? else {
            return Ok(None);
        };

        let request = match message {
            ClientMessage::Hello { version } => {
                if version != PROTOCOL_VERSION {
                    warn!(
                        client_version = version,
                        server_version = PROTOCOL_VERSION,
                        "ipc version mismatch"
                    );
                }
                PeerRequest::Hello { version }
            }
            ClientMessage::Attach { destination } => PeerRequest::Attach {
                destination,
                previous: self.destination.replace(destination),
            },
            ClientMessage::Navigated { destination, url } => {
                PeerRequest::Navigated(NavigationEvent::new(destination, url))
            }
            ClientMessage::Action { id, url, kind } => {
                PeerRequest::Action(ActionRequest { id, url, kind })
            }
        };
        Ok(Some(request))
    }
}

/// Outbound half of a connection.
#[allow(missing_debug_implementations)]
pub struct PeerReplies {
    half: OwnedWriteHalf,
}

impl PeerReplies {
    pub async fn send(&mut self, message: &ServerMessage) -> Result<()> {
        write_frame(&mut self.half, message).await
    }
}
