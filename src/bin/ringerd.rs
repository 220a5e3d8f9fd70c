//! ringerd - call orchestrator with an interactive console
//!
//! Runs the orchestrator against the in-process loopback signaling channel.
//! Lines typed on stdin either act as the local user (accept, reject, say)
//! or inject what the remote side would send (incoming, message, hangup).
//!
//! # Usage
//!
//! ```bash
//! # Start with the default config
//! ringerd run
//!
//! # Start with an explicit config file
//! ringerd run --config ./ringer.toml
//!
//! # Print the effective configuration
//! ringerd config
//! ```

use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use ringer_core::{MessageEntry, UserIdentity};
use ringer_protocol::{parse_incoming_call, SignalingEvent};
use ringerd::config::RingerConfig;
use ringerd::host::{HostServices, Ringtone};
use ringerd::local::{
    FileIdentityStore, HeadlessAudio, JsonlHistorySink, RecordingNotifier, StaticPermissionGate,
    StaticSettings, TokioTaskHost,
};
use ringerd::orchestrator::{spawn_orchestrator, CallEvent, OrchestratorHandle, Outcome};
use ringerd::signaling::{LoopbackSignaling, SignalingAdapter};

/// How long to wait for the orchestrator to release the channel on exit.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

const HELP: &str = "\
commands:
  login <calling-code> <phone>   sign in (e.g. login +1 5551234)
  incoming <name> [phone]        remote: place a call to this device
  message <text>                 remote: send a chat line
  peer-typing on|off             remote: typing indicator
  hangup                         remote: end or cancel the call
  accept | reject | end | finish local: call control
  say <text>                     local: send a chat line
  typing on|off                  local: typing indicator
  status                         print the current snapshot
  quit";

/// ringer daemon - client-side call orchestrator
#[derive(Parser, Debug)]
#[command(name = "ringerd", version, about)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the orchestrator with the interactive console
    Run {
        /// Config file (defaults to <config dir>/ringer/config.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print the effective configuration as TOML
    Config {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    match args.command.unwrap_or(Command::Run { config: None }) {
        Command::Run { config } => run(config),
        Command::Config { config } => {
            let config = RingerConfig::load(config.as_deref()).context("Failed to load config")?;
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

#[tokio::main]
async fn run(config_path: Option<PathBuf>) -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("ringerd=info".parse()?)
                .add_directive("ringer_core=info".parse()?)
                .add_directive("ringer_protocol=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "ringerd starting"
    );

    let config = RingerConfig::load(config_path.as_deref()).context("Failed to load config")?;
    let state_dir = config.state_dir();
    std::fs::create_dir_all(&state_dir)
        .with_context(|| format!("Failed to create state directory {}", state_dir.display()))?;
    info!(state_dir = %state_dir.display(), "Using state directory");

    let host = HostServices {
        identity_store: Arc::new(FileIdentityStore::new(&state_dir)),
        history: Arc::new(JsonlHistorySink::new(state_dir.join("history.jsonl"))),
        settings: Arc::new(StaticSettings::new(Ringtone::new(
            config.ring.ringtone_file.clone(),
        ))),
        permissions: Arc::new(StaticPermissionGate::granted()),
        notifier: Arc::new(RecordingNotifier::new()),
        audio: Arc::new(HeadlessAudio::new()),
        task_host: Arc::new(TokioTaskHost::new()),
    };

    let signaling = Arc::new(LoopbackSignaling::new());
    let handle = spawn_orchestrator(config.orchestrator_settings(), host, signaling.clone());

    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    spawn_event_printer(&handle, cancel_token.clone());

    match handle.bootstrap().await {
        Ok(Outcome::Applied) => {}
        Ok(Outcome::Ignored) => println!("Not signed in. Use: login <calling-code> <phone>"),
        Err(e) => warn!(error = %e, "Could not restore the stored identity"),
    }
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            biased;

            _ = cancel_token.cancelled() => break,

            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match parse_command(&line) {
                        Ok(ConsoleCommand::Quit) => break,
                        Ok(cmd) => {
                            if let Err(e) = execute(cmd, &handle, &signaling).await {
                                println!("error: {e:#}");
                            }
                        }
                        Err(e) => println!("{e}"),
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    error!(error = %e, "Failed to read stdin");
                    break;
                }
            },
        }
    }

    cancel_token.cancel();
    drop(handle);

    // The orchestrator disconnects once the last handle is gone
    let _ = tokio::time::timeout(SHUTDOWN_GRACE, async {
        while signaling.is_connected().await {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;

    info!("ringerd stopped");
    Ok(())
}

// ============================================================================
// Console
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum ConsoleCommand {
    Login { calling_code: String, phone: String },
    Incoming { name: String, phone: Option<String> },
    Message(String),
    PeerTyping(bool),
    Hangup,
    Accept,
    Reject,
    End,
    Finish,
    Say(String),
    Typing(bool),
    Status,
    Help,
    Quit,
}

fn parse_command(line: &str) -> Result<ConsoleCommand> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let cmd = match word {
        "login" => {
            let mut parts = rest.split_whitespace();
            match (parts.next(), parts.next()) {
                (Some(code), Some(phone)) => ConsoleCommand::Login {
                    calling_code: code.to_string(),
                    phone: phone.to_string(),
                },
                _ => bail!("usage: login <calling-code> <phone>"),
            }
        }
        "incoming" => {
            let mut parts = rest.split_whitespace();
            match parts.next() {
                Some(name) => ConsoleCommand::Incoming {
                    name: name.to_string(),
                    phone: parts.next().map(str::to_string),
                },
                None => bail!("usage: incoming <name> [phone]"),
            }
        }
        "message" if !rest.is_empty() => ConsoleCommand::Message(rest.to_string()),
        "say" if !rest.is_empty() => ConsoleCommand::Say(rest.to_string()),
        "message" | "say" => bail!("usage: {word} <text>"),
        "peer-typing" => ConsoleCommand::PeerTyping(parse_switch(rest)?),
        "typing" => ConsoleCommand::Typing(parse_switch(rest)?),
        "hangup" => ConsoleCommand::Hangup,
        "accept" => ConsoleCommand::Accept,
        "reject" => ConsoleCommand::Reject,
        "end" => ConsoleCommand::End,
        "finish" => ConsoleCommand::Finish,
        "status" => ConsoleCommand::Status,
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" => ConsoleCommand::Quit,
        other => bail!("unknown command: {other} (try `help`)"),
    };
    Ok(cmd)
}

fn parse_switch(value: &str) -> Result<bool> {
    match value {
        "on" => Ok(true),
        "off" => Ok(false),
        _ => bail!("expected on|off"),
    }
}

async fn execute(
    cmd: ConsoleCommand,
    handle: &OrchestratorHandle,
    signaling: &LoopbackSignaling,
) -> Result<()> {
    match cmd {
        ConsoleCommand::Login {
            calling_code,
            phone,
        } => {
            let identity = UserIdentity::new(phone, calling_code)?;
            report("login", handle.authenticate(identity).await?);
        }
        ConsoleCommand::Incoming { name, phone } => {
            let mut data = serde_json::json!({ "name": name });
            if let Some(phone) = phone {
                data["phone"] = serde_json::Value::String(phone);
            }
            let call = parse_incoming_call(data)?;
            inject(signaling, SignalingEvent::IncomingCall(call)).await;
        }
        ConsoleCommand::Message(text) => {
            let sender = remote_party(handle).await;
            inject(
                signaling,
                SignalingEvent::NewMessage(MessageEntry::new(sender.clone(), sender, text)),
            )
            .await;
        }
        ConsoleCommand::PeerTyping(is_typing) => {
            inject(signaling, SignalingEvent::PeerTyping { is_typing }).await;
        }
        ConsoleCommand::Hangup => inject(signaling, SignalingEvent::CallEnded).await,
        ConsoleCommand::Accept => report("accept", handle.accept().await?),
        ConsoleCommand::Reject => report("reject", handle.reject().await?),
        ConsoleCommand::End => report("end", handle.end_call().await?),
        ConsoleCommand::Finish => report("finish", handle.finish_ring().await?),
        ConsoleCommand::Say(text) => report("say", handle.send_message(text).await?),
        ConsoleCommand::Typing(is_typing) => report("typing", handle.set_typing(is_typing).await?),
        ConsoleCommand::Status => match handle.snapshot().await {
            Some(snapshot) => println!("{}", serde_json::to_string_pretty(&snapshot)?),
            None => bail!("orchestrator has stopped"),
        },
        ConsoleCommand::Help => println!("{HELP}"),
        ConsoleCommand::Quit => {}
    }
    Ok(())
}

async fn inject(signaling: &LoopbackSignaling, event: SignalingEvent) {
    if !signaling.emit(event).await {
        println!("(not delivered: nobody is listening yet, log in first)");
    }
}

/// Who the remote chat lines come from: the current caller, if any.
async fn remote_party(handle: &OrchestratorHandle) -> String {
    handle
        .snapshot()
        .await
        .and_then(|s| s.call)
        .map(|call| call.caller.e164().unwrap_or(call.caller.name))
        .unwrap_or_else(|| "remote".to_string())
}

fn report(action: &str, outcome: Outcome) {
    match outcome {
        Outcome::Applied => println!("{action}: ok"),
        Outcome::Ignored => println!("{action}: nothing to do in the current state"),
    }
}

fn spawn_event_printer(handle: &OrchestratorHandle, cancel: CancellationToken) {
    let mut events = handle.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                event = events.recv() => match event {
                    Ok(event) => print_event(&event),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "Console fell behind on events");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    });
}

fn print_event(event: &CallEvent) {
    match event {
        CallEvent::StateChanged { from, to, call_id } => match call_id {
            Some(id) => println!("[state] {from} -> {to} ({})", id.short()),
            None => println!("[state] {from} -> {to}"),
        },
        CallEvent::MessageAppended { entry } => {
            println!("[message] {}: {}", entry.sender, entry.message);
        }
        CallEvent::TypingChanged { is_typing } => {
            println!(
                "[typing] peer {}",
                if *is_typing { "is typing" } else { "stopped typing" }
            );
        }
        CallEvent::HistoryLogged { record } => println!("[history] {}", record.kind),
        CallEvent::IncomingDropped { call_id, reason } => {
            println!("[dropped] {call_id}: {reason}");
        }
    }
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
