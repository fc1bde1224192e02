//! Companion Daemon
//!
//! Headless host for the companion core. Prompts are read from stdin, the
//! avatar is a simulated runtime driven at the configured frame rate, and
//! replies are printed to stdout.
//!
//! # Usage
//!
//! ```bash
//! # Talk to the configured OpenAI-compatible endpoint
//! OPENAI_API_KEY=sk-... companion-daemon
//!
//! # No network: every prompt is echoed back as the reply
//! companion-daemon --offline
//!
//! # Emit every companion message as a JSON line
//! companion-daemon --offline --json
//!
//! # With verbose logging
//! RUST_LOG=debug companion-daemon
//! ```
//!
//! # Input
//!
//! - Any line: submitted as a prompt
//! - `/click`: click the avatar
//! - `/quit`: exit (so does end of input and Ctrl+C)
//!
//! # Environment Variables
//!
//! - `COMPANION_CONFIG`: config file path
//! - `OPENAI_API_KEY`: API key
//! - `COMPANION_API_BASE`, `COMPANION_MODEL`, `COMPANION_SYSTEM_PROMPT_PATH`,
//!   `COMPANION_FRAME_RATE`, `COMPANION_RESET_SENTINEL`: see the core config
//! - `RUST_LOG`: Log level (trace, debug, info, warn, error)

use std::path::PathBuf;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use companion_core::config::default_config_path;
use companion_core::{
    load_config_from_path, ChatBackend, CompanionConfigFile, CompanionMessage, ConfigOverrides,
    ConversationMachine, ConversationState, IpcEvent, ListenerRegistry, MotionScheduler,
    OpenAiBackend, ScriptedBackend, SimulatedRuntime,
};

/// Command line arguments
#[derive(Debug, Parser)]
#[command(name = "companion-daemon", version, about = "Headless avatar companion")]
struct Args {
    /// Config file (defaults to ~/.config/avatar-companion/companion.toml)
    #[arg(long, short, env = "COMPANION_CONFIG")]
    config: Option<PathBuf>,

    /// Model identifier
    #[arg(long)]
    model: Option<String>,

    /// OpenAI-compatible API base URL
    #[arg(long)]
    api_base: Option<String>,

    /// Frame ticks per second
    #[arg(long)]
    frame_rate: Option<u32>,

    /// File holding the system prompt
    #[arg(long)]
    system_prompt: Option<PathBuf>,

    /// Prompt that resets the conversation
    #[arg(long)]
    reset_sentinel: Option<String>,

    /// Echo prompts back instead of calling a backend
    #[arg(long)]
    offline: bool,

    /// Print companion messages as JSON lines
    #[arg(long)]
    json: bool,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            api_base: self.api_base.clone(),
            model: self.model.clone(),
            system_prompt_path: self.system_prompt.clone(),
            frame_rate: self.frame_rate,
            reset_sentinel: self.reset_sentinel.clone(),
        }
    }
}

/// What a line of input asks for
#[derive(Debug, PartialEq, Eq)]
enum InputLine {
    Prompt(String),
    Click,
    Quit,
}

fn parse_line(line: &str) -> InputLine {
    match line.trim_end_matches(['\r', '\n']) {
        "/click" => InputLine::Click,
        "/quit" => InputLine::Quit,
        prompt => InputLine::Prompt(prompt.to_string()),
    }
}

fn resolve_config(args: &Args) -> anyhow::Result<CompanionConfigFile> {
    let path = args.config.clone().or_else(default_config_path);
    let mut config = load_config_from_path(path)?;
    args.overrides().apply(&mut config);
    config.validate()?;

    info!(
        source = %config.source(),
        model = %config.backend.model,
        frame_rate = config.frame_rate,
        "Configuration loaded"
    );
    Ok(config)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries replies
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("companion_daemon=info".parse()?)
                .add_directive("companion_core=info".parse()?),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = resolve_config(&args)?;

    if args.offline {
        info!("Offline mode, prompts are echoed");
        let backend =
            ScriptedBackend::echo(&config.conversation.start_tag, &config.conversation.end_tag);
        return run(backend, config, args.json).await;
    }

    let system_prompt = config.load_system_prompt()?;
    let backend = OpenAiBackend::new(
        config.backend.api_base.clone(),
        config.backend.api_key.clone(),
        config.backend.model.clone(),
        config.backend.request_timeout,
    )?
    .with_system_prompt(system_prompt);
    info!(backend = ?backend, "Chat backend ready");

    run(backend, config, args.json).await
}

async fn run<B: ChatBackend + 'static>(
    backend: B,
    config: CompanionConfigFile,
    json: bool,
) -> anyhow::Result<()> {
    let scheduler = MotionScheduler::with_runtime(SimulatedRuntime::default());
    let (msg_tx, msg_rx) = mpsc::channel::<CompanionMessage>(100);
    let machine = ConversationMachine::new(
        backend,
        scheduler.clone(),
        config.conversation.clone(),
        msg_tx,
    );

    // Frame driver
    let frame_interval = config.frame_interval();
    let frames = scheduler.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(frame_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            frames.tick();
        }
    });

    tokio::spawn(print_messages(msg_rx, json));

    let greeter = machine.clone();
    tokio::spawn(async move {
        let outcome = greeter.on_avatar_ready().await;
        debug!(?outcome, "Greeting finished");
    });

    let registry = ListenerRegistry::new();
    let subscription = registry.subscribe()?;
    tokio::spawn(read_stdin(registry, machine.clone()));

    info!("Ready for input");

    tokio::select! {
        () = machine.serve(subscription) => {
            info!("Input closed, shutting down");
        }
        result = signal::ctrl_c() => {
            result?;
            info!("Received Ctrl+C, shutting down");
        }
    }

    scheduler.detach();
    info!(frames = scheduler.frames(), "Companion daemon stopped cleanly");
    Ok(())
}

/// Forward stdin lines to the listener registry
///
/// Dropping the registry when input ends stops the serve loop.
async fn read_stdin<B: ChatBackend + 'static>(
    registry: ListenerRegistry,
    machine: ConversationMachine<B>,
) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Failed to read stdin");
                break;
            }
        };

        match parse_line(&line) {
            InputLine::Quit => break,
            InputLine::Click => {
                let clicked = machine.clone();
                tokio::spawn(async move {
                    if let Some(outcome) = clicked.on_avatar_clicked().await {
                        debug!(?outcome, "Click reaction finished");
                    }
                });
            }
            InputLine::Prompt(message) => {
                machine.set_input(message.clone());
                if let Err(e) = registry.publish(IpcEvent::Chat { message }) {
                    warn!(error = %e, "Prompt dropped");
                }
            }
        }
    }

    debug!("Stdin closed");
}

async fn print_messages(mut rx: mpsc::Receiver<CompanionMessage>, json: bool) {
    let mut reply = String::new();

    while let Some(msg) = rx.recv().await {
        if json {
            match serde_json::to_string(&msg) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!(error = %e, "Failed to encode message"),
            }
            continue;
        }

        match msg {
            CompanionMessage::Response { text, .. } => reply = text,
            CompanionMessage::State {
                state: ConversationState::Done | ConversationState::Error,
            } => println!("companion> {reply}"),
            CompanionMessage::State { state } => {
                debug!(state = state.description(), "State changed");
            }
            CompanionMessage::MotionStarted { pair } => {
                debug!(body = %pair.body, face = %pair.face, "Motion pair started");
            }
            CompanionMessage::HistoryChanged { prompts, responses } => {
                debug!(prompts, responses, "History changed");
            }
            CompanionMessage::InputCleared => {}
        }
    }
}
