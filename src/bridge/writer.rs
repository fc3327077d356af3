//! Agent stdin writing.
//!
//! Two wire formats are supported:
//!
//! - **Structured**: one JSON line per message,
//!   `{"type":"user","message":{"role":"user","content":<string|array>}}`.
//!   Stdin stays open so answers can be written while the agent runs; a
//!   [`run_writer`] task owns it and serialises queued messages.
//! - **Plain**: the raw prompt followed by `\n`, after which stdin is closed.

use serde_json::{json, Value};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{AppError, Result};

/// Wrap `content` in the structured-mode user envelope.
#[must_use]
pub fn user_message(content: Value) -> Value {
    json!({
        "type": "user",
        "message": {
            "role": "user",
            "content": content,
        }
    })
}

/// Structured-mode envelope carrying a prompt.
#[must_use]
pub fn prompt_envelope(prompt: &str) -> Value {
    user_message(Value::String(prompt.to_owned()))
}

/// Structured-mode envelope answering the tool call `tool_use_id`.
#[must_use]
pub fn answer_envelope(tool_use_id: &str, answer: &str) -> Value {
    user_message(json!([{
        "type": "tool_result",
        "tool_use_id": tool_use_id,
        "content": answer,
    }]))
}

/// Serialise `value` as one NDJSON line.
///
/// # Errors
///
/// Returns [`AppError::Bridge`] if serialisation fails.
pub fn encode_line(value: &Value) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec(value)
        .map_err(|e| AppError::Bridge(format!("failed to serialise stdin message: {e}")))?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Write a plain-mode prompt and close the stream.
///
/// # Errors
///
/// Returns [`AppError::Bridge`]`("write failed: …")` if the agent's stdin
/// rejects the write (typically because the process already exited).
pub async fn write_plain_prompt<W>(mut stdin: W, prompt: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut bytes = prompt.as_bytes().to_vec();
    if !prompt.ends_with('\n') {
        bytes.push(b'\n');
    }

    stdin
        .write_all(&bytes)
        .await
        .map_err(|e| AppError::Bridge(format!("write failed: {e}")))?;
    stdin
        .shutdown()
        .await
        .map_err(|e| AppError::Bridge(format!("close failed: {e}")))?;
    Ok(())
}

/// Structured stdin writer task.
///
/// Receives [`Value`] messages from `msg_rx` and writes each as an NDJSON
/// line. The task exits (dropping stdin, which the agent sees as EOF) when:
/// - `close` is triggered (turn finished or invocation cancelled), or
/// - `msg_rx` is closed (all senders dropped).
///
/// # Errors
///
/// - [`AppError::Bridge`]`("failed to serialise stdin message: …")`.
/// - [`AppError::Bridge`]`("write failed: …")` if the agent closed stdin.
pub async fn run_writer<W>(
    invocation_id: String,
    mut stdin: W,
    mut msg_rx: mpsc::Receiver<Value>,
    close: CancellationToken,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            biased;

            () = close.cancelled() => {
                debug!(invocation_id, "stdin writer: close requested");
                break;
            }

            msg = msg_rx.recv() => {
                let Some(value) = msg else {
                    debug!(invocation_id, "stdin writer: message channel closed");
                    break;
                };

                let bytes = encode_line(&value)?;
                if let Err(e) = write_flushed(&mut stdin, &bytes).await {
                    warn!(invocation_id, error = %e, "stdin writer: write failed");
                    return Err(AppError::Bridge(format!("write failed: {e}")));
                }
            }
        }
    }

    if let Err(e) = stdin.shutdown().await {
        debug!(invocation_id, error = %e, "stdin writer: shutdown failed");
    }
    Ok(())
}

async fn write_flushed<W>(stdin: &mut W, bytes: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    stdin.write_all(bytes).await?;
    stdin.flush().await
}
