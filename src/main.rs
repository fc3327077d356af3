#![forbid(unsafe_code)]

//! `agent-bridge` command-line entry point.
//!
//! Runs one agent invocation and prints each canonical event as an NDJSON
//! line on stdout, or extracts a review payload from agent output. Logs go to
//! stderr so stdout stays machine-readable.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use agent_bridge::{
    AppError, Bridge, BridgeConfig, Extractor, InvocationRequest, Result, Transcript,
};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "agent-bridge", about = "Run CLI AI agents as normalized event streams", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file; built-in profiles when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run an agent and print its events as NDJSON.
    Run(RunArgs),
    /// Run an agent and extract a structured review from its answer.
    Review(RunArgs),
    /// Extract a structured review from a file of agent output.
    Extract {
        /// File containing the agent's completion text.
        file: PathBuf,
        /// Only accept fenced blocks or objects naming `score` and `summary`.
        #[arg(long)]
        strict: bool,
    },
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Agent profile name; the configured default when omitted.
    #[arg(long)]
    agent: Option<String>,

    /// Working directory for the agent.
    #[arg(long, default_value = ".")]
    cwd: PathBuf,

    /// Prompt text; read from stdin when omitted.
    #[arg(long)]
    prompt: Option<String>,

    /// Resume a previous session by id.
    #[arg(long)]
    resume: Option<String>,

    /// Send the prompt as a structured JSON envelope.
    #[arg(long)]
    structured: bool,

    /// File the agent should read before responding (repeatable).
    #[arg(long = "context")]
    context: Vec<PathBuf>,

    /// Cancel the invocation after this many milliseconds.
    #[arg(long)]
    max_duration_ms: Option<u64>,
}

fn main() -> Result<ExitCode> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<ExitCode> {
    match args.command {
        Command::Run(run_args) => {
            let bridge = Bridge::new(load_config(args.config.as_deref())?);
            run_agent(&bridge, run_args, false).await
        }
        Command::Review(run_args) => {
            let bridge = Bridge::new(load_config(args.config.as_deref())?);
            run_agent(&bridge, run_args, true).await
        }
        Command::Extract { file, strict } => {
            let text = std::fs::read_to_string(&file)?;
            let extractor = if strict {
                Extractor::strict()
            } else {
                Extractor::new()
            };
            let review = extractor.extract(&text);
            let found = review.is_some();
            print_json(&json!({ "review": review, "raw": text }))?;
            Ok(if found {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<BridgeConfig> {
    let config = match path {
        Some(path) => BridgeConfig::load_from_path(path)?,
        None => BridgeConfig::default(),
    };
    info!(
        default_agent = %config.default_agent,
        profiles = config.agents.len(),
        "configuration loaded"
    );
    Ok(config)
}

async fn run_agent(bridge: &Bridge, args: RunArgs, review: bool) -> Result<ExitCode> {
    let prompt = match args.prompt {
        Some(prompt) => prompt,
        None => read_stdin_prompt()?,
    };

    let mut request = InvocationRequest::new(prompt, args.cwd)
        .structured(args.structured)
        .context_paths(args.context);
    if let Some(session_id) = args.resume {
        request = request.resume(session_id);
    }
    if let Some(ms) = args.max_duration_ms {
        request = request.max_duration(Duration::from_millis(ms));
    }

    let ct = CancellationToken::new();
    let signal_ct = ct.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received, cancelling invocation");
        signal_ct.cancel();
    });

    let mut invocation = bridge.start_agent(args.agent.as_deref(), request, &ct)?;
    let mut transcript = Transcript::new();

    while let Some(event) = invocation.events.next_event().await {
        transcript.observe(&event);
        if !review {
            print_json(&event)?;
        }
        if event.is_done() {
            break;
        }
    }

    if review {
        let extracted = Extractor::new().extract(transcript.final_text());
        if extracted.is_none() {
            warn!("no structured review found in agent output");
        }
        print_json(&json!({
            "review": extracted,
            "raw": transcript.final_text(),
            "sessionId": transcript.session_id,
        }))?;
    }

    Ok(if transcript.succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn read_stdin_prompt() -> Result<String> {
    let mut prompt = String::new();
    std::io::stdin().read_to_string(&mut prompt)?;
    if prompt.trim().is_empty() {
        return Err(AppError::InvalidRequest(
            "no prompt given on --prompt or stdin".into(),
        ));
    }
    Ok(prompt)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let line = serde_json::to_string(value)
        .map_err(|err| AppError::Bridge(format!("failed to encode output: {err}")))?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{line}")?;
    stdout.flush()?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
