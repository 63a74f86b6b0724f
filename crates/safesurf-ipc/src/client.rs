use crate::framing::{read_frame, write_frame};
use crate::protocol::{ClientMessage, ServerMessage};
use anyhow::{Context, Result};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};

/// Connection from a page context (or the host feed) to the monitor.
#[allow(missing_debug_implementations)]
pub struct IpcClient {
    reader: IpcReader,
    writer: IpcWriter,
}

/// Monitor messages arriving at a page context.
#[allow(missing_debug_implementations)]
pub struct IpcReader {
    lines: Lines<BufReader<OwnedReadHalf>>,
}

#[allow(missing_debug_implementations)]
pub struct IpcWriter {
    half: OwnedWriteHalf,
}

impl IpcClient {
    pub async fn connect(socket_path: &Path) -> Result<Self> {
        let stream = UnixStream::connect(socket_path)
            .await
            .with_context(|| format!("failed to connect to {}", socket_path.display()))?;
        let (read_half, write_half) = stream.into_split();

        Ok(Self {
            reader: IpcReader {
                lines: BufReader::new(read_half).lines(),
            },
            writer: IpcWriter { half: write_half },
        })
    }

    pub fn into_split(self) -> (IpcReader, IpcWriter) {
        (self.reader, self.writer)
    }

    pub async fn send(&mut self, message: &ClientMessage) -> Result<()> {
        self.writer.send(message).await
    }

    /// `None` once the monitor closed the connection.
    pub async fn recv(&mut self) -> Result<Option<ServerMessage>> {
        self.reader.recv().await
    }
}

impl IpcReader {
    /// `None` once the monitor closed the connection. Lines that do not
    /// decode are logged and skipped.
    pub async fn recv(&mut self) -> Result<Option<ServerMessage>> {
        read_frame(&mut self.lines, "monitor").await
    }
}

impl IpcWriter {
    pub async fn send(&mut self, message: &ClientMessage) -> Result<()> {
        write_frame(&mut self.half, message).await
    }
}
