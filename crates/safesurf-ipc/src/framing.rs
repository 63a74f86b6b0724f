//! One JSON document per line, in both directions.

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, Lines};
use tracing::warn;

pub(crate) async fn write_frame<W, T>(writer: &mut W, message: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut frame = serde_json::to_vec(message).context("failed to encode message")?;
    frame.push(b'\n');
    writer
        .write_all(&frame)
        .await
        .context("failed to write message")?;
    writer.flush().await.context("failed to flush message")
}

/// Next decodable message, or `None` once the peer hung up.
///
/// Blank and undecodable lines are skipped. Only I/O failures are errors.
/// Cancel-safe: a line is never partially consumed.
pub(crate) async fn read_frame<R, T>(lines: &mut Lines<R>, peer: &'static str) -> Result<Option<T>>
where
    R: AsyncBufRead + Unpin,
    T: DeserializeOwned,
{
    loop {
        let Some(line) = lines
            .next_line()
            .await
            .with_context(|| format!("failed to read from {peer}"))?
        else {
            return Ok(None);
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(message) => return Ok(Some(message)),
            Err(error) => warn!(peer, error = %error, "skipping undecodable message"),
        }
    }
}
