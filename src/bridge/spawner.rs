//! Agent process spawning and termination.
//!
//! Spawns agent processes with:
//! - stdin, stdout, and stderr all piped;
//! - `kill_on_drop(true)` so an abandoned invocation never leaks a child;
//! - the request's working directory and the profile's extra environment.
//!
//! Termination is graceful first: [`terminate`] sends `SIGTERM` (on Unix)
//! and hands the child to a detached reaper that force-kills it after the
//! grace period, so the caller never waits on a stubborn process.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::config::AgentProfile;
use crate::models::request::InvocationRequest;
use crate::{AppError, Result};

/// Fully resolved command line for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnPlan {
    /// Program to execute (user-local install or bare command).
    pub program: PathBuf,
    /// Argument vector, excluding the program.
    pub args: Vec<String>,
    /// Directory the child starts in.
    pub working_directory: PathBuf,
    /// Extra environment variables.
    pub env: HashMap<String, String>,
}

impl SpawnPlan {
    /// Build the command line for `request` against `profile`.
    ///
    /// Argument order: profile mode flags, structured-input flags (when
    /// requested), then the resume flag and session id (when resuming).
    #[must_use]
    pub fn new(profile: &AgentProfile, request: &InvocationRequest, home: Option<&Path>) -> Self {
        let mut args = profile.args.clone();

        if request.structured_input {
            args.extend(profile.structured_args.iter().cloned());
        }

        if let Some(session_id) = request.resume_session_id.as_deref() {
            args.push(profile.resume_flag.clone());
            args.push(session_id.to_owned());
        }

        Self {
            program: profile.resolve_program(home),
            args,
            working_directory: request.working_directory.clone(),
            env: profile.env.clone(),
        }
    }
}

/// Handles of a running agent process.
#[derive(Debug)]
pub struct AgentProcess {
    /// Child handle; dropping it kills the process.
    pub child: Child,
    /// Agent stdin.
    pub stdin: ChildStdin,
    /// Agent stdout (NDJSON stream).
    pub stdout: ChildStdout,
    /// Agent stderr (diagnostics).
    pub stderr: ChildStderr,
}

/// Spawn the agent described by `plan`.
///
/// # Errors
///
/// - `AppError::Bridge("failed to spawn agent …")`: binary missing, not
///   executable, or another OS spawn failure.
/// - `AppError::Bridge("failed to capture agent …")`: a pipe was not set up.
pub fn spawn_agent(plan: &SpawnPlan) -> Result<AgentProcess> {
    let mut cmd = Command::new(&plan.program);
    cmd.args(&plan.args)
        .envs(&plan.env)
        .current_dir(&plan.working_directory)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|err| {
        AppError::Bridge(format!(
            "failed to spawn agent {}: {err}",
            plan.program.display()
        ))
    })?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| AppError::Bridge("failed to capture agent stdin".into()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::Bridge("failed to capture agent stdout".into()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| AppError::Bridge("failed to capture agent stderr".into()))?;

    info!(
        program = %plan.program.display(),
        pid = child.id(),
        "agent process spawned"
    );

    Ok(AgentProcess {
        child,
        stdin,
        stdout,
        stderr,
    })
}

/// Terminate `child` without blocking the caller.
///
/// Sends a graceful terminate signal, then detaches a reaper task that waits
/// up to `grace` for exit before force-killing.
pub fn terminate(mut child: Child, grace: Duration) {
    let pid = child.id();

    if !send_terminate(pid) {
        if let Err(err) = child.start_kill() {
            debug!(?pid, %err, "kill failed; process likely already exited");
        }
    }

    tokio::spawn(async move {
        match tokio::time::timeout(grace, child.wait()).await {
            Ok(Ok(status)) => debug!(?pid, %status, "terminated agent exited"),
            Ok(Err(err)) => warn!(?pid, %err, "error waiting for terminated agent"),
            Err(_) => {
                warn!(?pid, "agent ignored terminate signal, forcing kill");
                if let Err(err) = child.kill().await {
                    warn!(?pid, %err, "failed to force-kill agent");
                }
            }
        }
    });
}

#[cfg(unix)]
fn send_terminate(pid: Option<u32>) -> bool {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(raw) = pid.and_then(|p| i32::try_from(p).ok()) else {
        return false;
    };

    match kill(Pid::from_raw(raw), Signal::SIGTERM) {
        Ok(()) => true,
        Err(err) => {
            debug!(pid = raw, %err, "SIGTERM failed");
            false
        }
    }
}

#[cfg(not(unix))]
fn send_terminate(_pid: Option<u32>) -> bool {
    false
}
