//! Invocation orchestrator.
//!
//! [`Bridge::start`] validates the request, wires the channels, and spawns
//! one task per invocation. The task walks the state machine
//!
//! ```text
//! NotStarted → Spawned → Streaming → { Completed | Failed | Cancelled }
//! ```
//!
//! pumping stdout through [`LineCodec`] and [`Normalizer`] into a bounded
//! event channel. The channel capacity is the backpressure: the task does not
//! read further stdout while the consumer is behind.
//!
//! # End-of-stream bookkeeping
//!
//! After stdout closes and the child exits:
//!
//! 1. Non-zero exit with neither a `result` nor an `error` → one
//!    `error{process_exit}`, carrying stderr when it is meaningful.
//! 2. Otherwise, output without a `result` or `error` → one synthesized
//!    `result` with the accumulated text.
//! 3. Meaningful stderr and no explicit `result` → one
//!    `error{stderr_warning}` (recoverable).
//!
//! Cancellation and timeout skip all three. Every path ends with exactly one
//! `done`.

use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use serde_json::{json, Value};
use tokio::process::{Child, ChildStdin};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::bridge::codec::LineCodec;
use crate::bridge::normalizer::Normalizer;
use crate::bridge::spawner::{spawn_agent, terminate, AgentProcess, SpawnPlan};
use crate::bridge::stderr::{collect_stderr, StderrFilter};
use crate::bridge::stream::{AnswerHandle, EventStream, Invocation};
use crate::bridge::writer::{prompt_envelope, run_writer, write_plain_prompt};
use crate::config::{AgentProfile, BridgeConfig};
use crate::models::event::{CanonicalEvent, ErrorType};
use crate::models::request::InvocationRequest;
use crate::{AppError, Result};

/// Capacity of the in-band stdin message queue.
const STDIN_QUEUE: usize = 8;

/// Spawns agent invocations according to a [`BridgeConfig`].
///
/// Holds no per-invocation state; clone it freely.
#[derive(Debug, Clone)]
pub struct Bridge {
    config: Arc<BridgeConfig>,
    home: Option<PathBuf>,
}

impl Bridge {
    /// Create a bridge; `HOME` is read once for user-local install lookup.
    #[must_use]
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config: Arc::new(config),
            home: std::env::var_os("HOME").map(PathBuf::from),
        }
    }

    /// Override the home directory used to expand `~/` in install paths.
    #[must_use]
    pub fn with_home(mut self, home: Option<PathBuf>) -> Self {
        self.home = home;
        self
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Start `request` on the default agent.
    ///
    /// # Errors
    ///
    /// See [`Bridge::start_agent`].
    pub fn start(
        &self,
        request: InvocationRequest,
        cancel: &CancellationToken,
    ) -> Result<Invocation> {
        self.start_agent(None, request, cancel)
    }

    /// Start `request` on the named agent profile.
    ///
    /// Must be called within a Tokio runtime. Failures to launch the agent
    /// are reported in-band (`error{spawn_error}` then `done`); only problems
    /// detectable before any event exists are returned as `Err`.
    ///
    /// Cancelling `cancel` (or dropping the returned event stream) stops the
    /// invocation and terminates the agent.
    ///
    /// # Errors
    ///
    /// - [`AppError::InvalidRequest`] if the request failed validation.
    /// - [`AppError::Config`] for an unknown agent profile.
    /// - [`AppError::Unsupported`] when structured input or resume is
    ///   requested from an agent that lacks the capability.
    pub fn start_agent(
        &self,
        agent: Option<&str>,
        request: InvocationRequest,
        cancel: &CancellationToken,
    ) -> Result<Invocation> {
        request.validate()?;
        let agent_name = agent.unwrap_or(&self.config.default_agent).to_owned();
        let profile = self.config.profile(Some(&agent_name))?;
        check_capabilities(&agent_name, profile, &request)?;

        let invocation_id = Uuid::new_v4().to_string();
        let cancel = cancel.child_token();
        let stdin_close = cancel.child_token();
        let (event_tx, event_rx) = mpsc::channel(self.config.event_buffer);

        let prompt = request.effective_prompt();
        let (stdin_mode, answers) = if request.structured_input {
            let (msg_tx, msg_rx) = mpsc::channel(STDIN_QUEUE);
            msg_tx
                .try_send(prompt_envelope(&prompt))
                .map_err(|e| AppError::Bridge(format!("failed to queue prompt: {e}")))?;
            // Without an answer handle the sender drops here, so the writer
            // closes stdin right after the prompt.
            let answers = profile
                .supports_in_band_answers
                .then(|| AnswerHandle::new(msg_tx, stdin_close.clone()));
            (StdinMode::Structured(msg_rx), answers)
        } else {
            (StdinMode::Plain(prompt), None)
        };

        let task = InvocationTask {
            invocation_id: invocation_id.clone(),
            plan: SpawnPlan::new(profile, &request, self.home.as_deref()),
            events: event_tx,
            cancel: cancel.clone(),
            stdin_close,
            timed_out: CancellationToken::new(),
            stderr_filter: StderrFilter::new(&profile.benign_stderr),
            max_duration: request.max_duration,
            exit_wait: self.config.exit_wait(),
            grace: self.config.termination_grace(),
        };

        info!(
            invocation_id = %invocation_id,
            agent = %agent_name,
            structured = request.structured_input,
            resume = request.resume_session_id.is_some(),
            "starting agent invocation"
        );

        let span = info_span!("invocation", invocation_id = %invocation_id, agent = %agent_name);
        tokio::spawn(task.run(stdin_mode).instrument(span));

        Ok(Invocation {
            id: invocation_id,
            events: EventStream::new(event_rx, cancel),
            answers,
        })
    }
}

fn check_capabilities(
    name: &str,
    profile: &AgentProfile,
    request: &InvocationRequest,
) -> Result<()> {
    if request.structured_input && !profile.supports_structured_input {
        return Err(AppError::Unsupported(format!(
            "agent {name} does not accept structured input"
        )));
    }
    if request.resume_session_id.is_some() && !profile.supports_resume {
        return Err(AppError::Unsupported(format!(
            "agent {name} cannot resume sessions"
        )));
    }
    Ok(())
}

// ── Invocation task ───────────────────────────────────────────────────────────

/// How the prompt reaches the agent.
enum StdinMode {
    /// Raw text then EOF.
    Plain(String),
    /// NDJSON envelopes from a queue; stdin stays open until closed.
    Structured(mpsc::Receiver<Value>),
}

/// Terminal state of an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Completed,
    Failed,
    Cancelled,
    TimedOut,
}

struct InvocationTask {
    invocation_id: String,
    plan: SpawnPlan,
    events: mpsc::Sender<CanonicalEvent>,
    cancel: CancellationToken,
    stdin_close: CancellationToken,
    /// Set by the deadline timer before it cancels.
    timed_out: CancellationToken,
    stderr_filter: StderrFilter,
    max_duration: Option<Duration>,
    exit_wait: Duration,
    grace: Duration,
}

impl InvocationTask {
    async fn run(self, stdin_mode: StdinMode) {
        let outcome = self.execute(stdin_mode).await;
        self.stdin_close.cancel();

        match outcome {
            Outcome::Completed => info!("invocation completed"),
            Outcome::Failed => info!("invocation failed"),
            Outcome::Cancelled => info!("invocation cancelled"),
            Outcome::TimedOut => {
                warn!(max_duration = ?self.max_duration, "invocation timed out");
            }
        }

        // `done` is sent even after cancellation; a dropped consumer simply
        // never sees it.
        if self.events.send(CanonicalEvent::Done).await.is_err() {
            debug!("event consumer gone before done");
        }
    }

    #[allow(clippy::too_many_lines)] // Read loop and exit handling form one sequential flow.
    async fn execute(&self, stdin_mode: StdinMode) -> Outcome {
        let process = match spawn_agent(&self.plan) {
            Ok(process) => process,
            Err(err) => {
                warn!(error = %err, "agent spawn failed");
                let event = CanonicalEvent::error_with_details(
                    ErrorType::SpawnError,
                    err.to_string(),
                    json!({ "program": self.plan.program.display().to_string() }),
                );
                self.emit(event).await;
                return Outcome::Failed;
            }
        };

        let AgentProcess {
            mut child,
            stdin,
            stdout,
            stderr,
        } = process;

        let mut stderr_task = tokio::spawn(collect_stderr(stderr));
        let structured = matches!(stdin_mode, StdinMode::Structured(_));
        self.spawn_stdin_writer(stdin, stdin_mode);
        let _deadline = self.arm_deadline();

        let mut lines = FramedRead::new(stdout, LineCodec::new());
        let mut normalizer = Normalizer::new();

        loop {
            let item = tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    return self.abort(child, &stderr_task);
                }
                item = lines.next() => item,
            };

            match item {
                None => break,
                Some(Err(err)) => {
                    warn!(error = %err, "agent stdout read failed");
                    normalizer.record_error();
                    self.emit(CanonicalEvent::error(
                        ErrorType::IoError,
                        format!("failed to read agent output: {err}"),
                    ))
                    .await;
                    self.stdin_close.cancel();
                    terminate(child, self.grace);
                    stderr_task.abort();
                    return Outcome::Failed;
                }
                Some(Ok(line)) => {
                    for event in normalizer.push_line(&line) {
                        let ends_turn = matches!(event, CanonicalEvent::Result { .. });
                        if !self.emit(event).await {
                            return self.abort(child, &stderr_task);
                        }
                        if ends_turn && structured {
                            debug!("turn finished, closing agent stdin");
                            self.stdin_close.cancel();
                        }
                    }
                }
            }
        }

        debug!("agent stdout closed");
        self.stdin_close.cancel();

        let exited = tokio::select! {
            biased;
            () = self.cancel.cancelled() => None,
            status = wait_for_exit(&mut child, self.exit_wait) => Some(status),
        };
        let Some(status) = exited else {
            return self.abort(child, &stderr_task);
        };
        if status.is_none() {
            warn!(wait = ?self.exit_wait, "agent did not exit after closing stdout");
            terminate(child, self.grace);
        }

        let stderr = match tokio::time::timeout(self.exit_wait, &mut stderr_task).await {
            Ok(Ok(text)) => text,
            Ok(Err(err)) => {
                debug!(%err, "stderr capture task failed");
                String::new()
            }
            Err(_) => {
                warn!("agent stderr still open after exit, ignoring it");
                stderr_task.abort();
                String::new()
            }
        };

        self.finish(&mut normalizer, status, &stderr).await
    }

    /// End-of-stream bookkeeping; see the module docs.
    async fn finish(
        &self,
        normalizer: &mut Normalizer,
        status: Option<ExitStatus>,
        stderr: &str,
    ) -> Outcome {
        let meaningful_stderr = self.stderr_filter.meaningful(stderr);
        let explicit_result = normalizer.saw_result();

        if let Some(status) = status.filter(|s| !s.success()) {
            info!(%status, "agent exited unsuccessfully");
            if !explicit_result && !normalizer.saw_error() {
                normalizer.record_error();
                let message = meaningful_stderr
                    .unwrap_or_else(|| format!("agent exited unsuccessfully ({status})"));
                let event = CanonicalEvent::error_with_details(
                    ErrorType::ProcessExit,
                    message,
                    json!({ "exitCode": status.code() }),
                );
                if !self.emit(event).await {
                    return self.interrupted();
                }
                return Outcome::Failed;
            }
        }

        if let Some(result) = normalizer.synthesize_result() {
            debug!("stream ended without a result, synthesizing one");
            if !self.emit(result).await {
                return self.interrupted();
            }
        }

        if let Some(text) = meaningful_stderr.filter(|_| !explicit_result) {
            warn!(stderr = %text, "agent wrote to stderr");
            let event = CanonicalEvent::error(ErrorType::StderrWarning, text);
            if !self.emit(event).await {
                return self.interrupted();
            }
        }

        if normalizer.saw_error() {
            Outcome::Failed
        } else {
            Outcome::Completed
        }
    }

    /// Deliver `event` unless the invocation is cancelled first.
    ///
    /// Returns `false` when the event was not delivered. A vanished consumer
    /// counts as cancellation.
    async fn emit(&self, event: CanonicalEvent) -> bool {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => false,
            sent = self.events.send(event) => {
                if sent.is_err() {
                    debug!("event consumer dropped, cancelling");
                    self.cancel.cancel();
                }
                sent.is_ok()
            }
        }
    }

    fn spawn_stdin_writer(&self, stdin: ChildStdin, mode: StdinMode) {
        match mode {
            StdinMode::Plain(prompt) => {
                tokio::spawn(
                    async move {
                        // An agent may exit without reading its input.
                        if let Err(err) = write_plain_prompt(stdin, &prompt).await {
                            debug!(error = %err, "plain prompt not delivered");
                        }
                    }
                    .in_current_span(),
                );
            }
            StdinMode::Structured(msg_rx) => {
                let id = self.invocation_id.clone();
                let close = self.stdin_close.clone();
                tokio::spawn(
                    async move {
                        if let Err(err) = run_writer(id, stdin, msg_rx, close).await {
                            debug!(error = %err, "structured stdin writer stopped");
                        }
                    }
                    .in_current_span(),
                );
            }
        }
    }

    /// Start the max-duration timer, if any. The timer is disarmed when the
    /// returned guard drops.
    fn arm_deadline(&self) -> Option<DropGuard> {
        let limit = self.max_duration?;
        let disarm = CancellationToken::new();
        let guard = disarm.clone().drop_guard();
        let cancel = self.cancel.clone();
        let timed_out = self.timed_out.clone();

        tokio::spawn(async move {
            tokio::select! {
                () = disarm.cancelled() => {}
                () = tokio::time::sleep(limit) => {
                    timed_out.cancel();
                    cancel.cancel();
                }
            }
        });

        Some(guard)
    }

    /// Stop reading and terminate the child.
    fn abort(&self, child: Child, stderr_task: &JoinHandle<String>) -> Outcome {
        self.cancel.cancel();
        self.stdin_close.cancel();
        terminate(child, self.grace);
        stderr_task.abort();
        self.interrupted()
    }

    fn interrupted(&self) -> Outcome {
        if self.timed_out.is_cancelled() {
            Outcome::TimedOut
        } else {
            Outcome::Cancelled
        }
    }
}

/// Wait up to `limit` for `child` to exit; `None` on timeout or wait error.
async fn wait_for_exit(child: &mut Child, limit: Duration) -> Option<ExitStatus> {
    match tokio::time::timeout(limit, child.wait()).await {
        Ok(Ok(status)) => Some(status),
        Ok(Err(err)) => {
            warn!(%err, "failed to wait for agent exit");
            None
        }
        Err(_) => None,
    }
}
