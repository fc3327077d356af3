//! Caller-facing handles of a running invocation.

use std::pin::Pin;
use std::task::{ready, Context, Poll};

use futures_util::Stream;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::bridge::writer::{answer_envelope, prompt_envelope};
use crate::models::event::CanonicalEvent;
use crate::{AppError, Result};

/// A started invocation.
#[derive(Debug)]
pub struct Invocation {
    /// Identifier used in log output for this invocation.
    pub id: String,
    /// The invocation's event sequence.
    pub events: EventStream,
    /// In-band answer channel; `None` unless the agent supports in-band
    /// answers and structured input was requested.
    pub answers: Option<AnswerHandle>,
}

/// Lazy, single-pass sequence of [`CanonicalEvent`]s for one invocation.
///
/// Ends after [`CanonicalEvent::Done`]. Dropping the stream cancels the
/// invocation and terminates the agent process.
///
/// Once the invocation is cancelled, events the agent produced but the
/// caller has not yet received are discarded; the next item is `done`.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::Receiver<CanonicalEvent>,
    cancel: CancellationToken,
}

impl EventStream {
    pub(crate) fn new(rx: mpsc::Receiver<CanonicalEvent>, cancel: CancellationToken) -> Self {
        Self { rx, cancel }
    }

    /// Receive the next event; `None` once the stream is exhausted.
    pub async fn next_event(&mut self) -> Option<CanonicalEvent> {
        std::future::poll_fn(|cx| self.poll_event(cx)).await
    }

    /// Cancel the invocation. The stream still yields a final `done`.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the invocation has been cancelled (explicitly or by timeout).
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn poll_event(&mut self, cx: &mut Context<'_>) -> Poll<Option<CanonicalEvent>> {
        loop {
            match ready!(self.rx.poll_recv(cx)) {
                Some(event) if self.cancel.is_cancelled() && !event.is_done() => {
                    debug!(kind = event.kind(), "dropping event queued before cancellation");
                }
                next => return Poll::Ready(next),
            }
        }
    }
}

impl Stream for EventStream {
    type Item = CanonicalEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().poll_event(cx)
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Writes in-band messages to an agent's still-open stdin.
///
/// Cloneable; the agent's stdin closes when the turn ends (a `result` was
/// emitted), the invocation stops, or [`close`](Self::close) is called.
#[derive(Debug, Clone)]
pub struct AnswerHandle {
    tx: mpsc::Sender<Value>,
    close: CancellationToken,
}

impl AnswerHandle {
    pub(crate) fn new(tx: mpsc::Sender<Value>, close: CancellationToken) -> Self {
        Self { tx, close }
    }

    /// Answer the question raised by tool call `tool_use_id`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Bridge`] if stdin has already been closed.
    pub async fn answer(&self, tool_use_id: &str, answer: &str) -> Result<()> {
        debug!(tool_use_id, "answer handle: sending in-band answer");
        self.send(answer_envelope(tool_use_id, answer)).await
    }

    /// Send a follow-up user message on the same stdin.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Bridge`] if stdin has already been closed.
    pub async fn send_message(&self, text: &str) -> Result<()> {
        self.send(prompt_envelope(text)).await
    }

    /// Close the agent's stdin; the agent sees EOF.
    pub fn close(&self) {
        self.close.cancel();
    }

    /// Whether stdin has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.close.is_cancelled() || self.tx.is_closed()
    }

    async fn send(&self, value: Value) -> Result<()> {
        if self.is_closed() {
            return Err(AppError::Bridge("agent stdin is closed".into()));
        }
        self.tx
            .send(value)
            .await
            .map_err(|_| AppError::Bridge("agent stdin is closed".into()))
    }
}
