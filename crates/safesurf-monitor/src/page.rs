//! A page context: attaches to the monitor for one destination and hosts
//! the alert overlay, rendered to the terminal.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use safesurf_core::{ActionKind, ActionRequest, DestinationId};
use safesurf_ipc::protocol::outcome_of;
use safesurf_ipc::{ClientMessage, IpcClient, IpcReader, IpcWriter, PROTOCOL_VERSION, ServerMessage};
use safesurf_overlay::{
    ActionLink, ActionRelay, AlertView, Emphasis, OverlayHandle, OverlayPhase, OverlaySurface,
    OverlayTimings, SessionId, Tone, spawn_overlay,
};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Connect and exchange hellos.
pub(crate) async fn connect_to_monitor(socket: &Path) -> Result<IpcClient> {
    let mut client = IpcClient::connect(socket).await.with_context(|| {
        format!(
            "is the monitor running? (safesurf monitor)\nsocket: {}",
            socket.display()
        )
    })?;

    client
        .send(&ClientMessage::Hello {
            version: PROTOCOL_VERSION,
        })
        .await?;
    match client.recv().await? {
        Some(ServerMessage::Hello { version }) => {
            if version != PROTOCOL_VERSION {
                warn!(
                    server_version = version,
                    client_version = PROTOCOL_VERSION,
                    "protocol version mismatch"
                );
            }
        }
        Some(other) => bail!("unexpected monitor response: {other:?}"),
        None => bail!("monitor closed the connection during the handshake"),
    }
    Ok(client)
}

pub(crate) async fn run_page(
    socket: &Path,
    destination: DestinationId,
    timings: OverlayTimings,
) -> Result<()> {
    let mut client = connect_to_monitor(socket).await?;
    client.send(&ClientMessage::Attach { destination }).await?;
    info!(destination = %destination, socket = %socket.display(), "page context attached");

    let (reader, writer) = client.into_split();
    let relay = Arc::new(ActionRelay::new(Arc::new(IpcActionLink::new(writer))));
    let (overlay, overlay_task) = spawn_overlay(
        timings,
        TerminalSurface::new(std::io::stdout()),
        Arc::clone(&relay),
    );

    println!("watching {destination}; while an alert is shown, enter o to override or r to report");

    let result = page_loop(reader, BufReader::new(tokio::io::stdin()), &overlay, &relay).await;

    relay.fail_pending("monitor connection closed");
    drop(overlay);
    if let Err(error) = overlay_task.await {
        warn!(error = %error, "overlay task failed");
    }
    result
}

async fn page_loop<R>(
    mut reader: IpcReader,
    input: R,
    overlay: &OverlayHandle,
    relay: &ActionRelay,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    let mut input_open = true;

    loop {
        tokio::select! {
            received = reader.recv() => match received {
                Ok(Some(message)) => apply_server_message(message, overlay, relay),
                Ok(None) => {
                    info!("monitor connection closed");
                    return Ok(());
                }
                Err(error) => {
                    warn!(error = %format!("{error:#}"), "monitor connection lost");
                    return Ok(());
                }
            },
            line = lines.next_line(), if input_open => match line.context("failed to read input")? {
                Some(line) => match parse_press(&line) {
                    Some(kind) => {
                        overlay.press(kind);
                    }
                    None if line.trim().is_empty() => {}
                    None => println!("unknown input '{}', use o or r", line.trim()),
                },
                None => input_open = false,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("page context stopping");
                return Ok(());
            }
        }
    }
}

fn apply_server_message(message: ServerMessage, overlay: &OverlayHandle, relay: &ActionRelay) {
    match message {
        ServerMessage::ActionResult {
            id, ok, detail, ..
        } => {
            relay.resolve(id, outcome_of(ok, detail));
        }
        ServerMessage::Hello { .. } => {}
        show => {
            if let Some(verdict) = show.into_verdict() {
                overlay.show(verdict);
            }
        }
    }
}

fn parse_press(line: &str) -> Option<ActionKind> {
    match line.trim().to_ascii_lowercase().as_str() {
        "o" | "override" => Some(ActionKind::Override),
        "r" | "report" => Some(ActionKind::Report),
        _ => None,
    }
}

/// Sends actions over the page's IPC connection.
struct IpcActionLink {
    writer: Mutex<IpcWriter>,
}

impl IpcActionLink {
    fn new(writer: IpcWriter) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }
}

#[async_trait]
impl ActionLink for IpcActionLink {
    async fn send(&self, request: &ActionRequest) -> Result<()> {
        debug!(id = %request.id, kind = %request.kind, "sending action");
        self.writer
            .lock()
            .await
            .send(&ClientMessage::action(request))
            .await
    }
}

/// Plain-text rendering of the overlay.
pub(crate) struct TerminalSurface<W> {
    out: W,
    shown_result: Option<String>,
    exiting: bool,
}

impl<W: Write> TerminalSurface<W> {
    pub(crate) fn new(out: W) -> Self {
        Self {
            out,
            shown_result: None,
            exiting: false,
        }
    }

    fn line(&mut self, text: &str) {
        if let Err(error) = writeln!(self.out, "{text}") {
            debug!(error = %error, "failed to render overlay");
        }
    }
}

impl<W: Write + Send> OverlaySurface for TerminalSurface<W> {
    fn mount(&mut self, view: &AlertView) {
        self.shown_result = None;
        self.exiting = false;
        let level = match view.emphasis {
            Emphasis::HighAlert => "HIGH ALERT",
            Emphasis::Caution => "CAUTION",
        };
        self.line(&format!("⚠️ SafeSurf Alert [{level}]"));
        self.line(&format!("  {}", view.reason));
        self.line(&format!("  {}", view.url));
        self.line("  [o] Override  [r] Report");
    }

    fn update(&mut self, view: &AlertView) {
        let result = view.result.as_ref().map(|(text, _)| text.clone());
        if result != self.shown_result {
            if let Some((text, tone)) = &view.result {
                let mark = match tone {
                    Tone::Success => "✓",
                    Tone::Failure => "✗",
                };
                self.line(&format!("  {mark} {text}"));
            }
            self.shown_result = result;
        }

        if view.phase == OverlayPhase::Exiting && !self.exiting {
            self.exiting = true;
            self.line("  (closing)");
        }
    }

    fn unmount(&mut self, _session: SessionId) {
        self.line("(alert dismissed)");
    }
}
