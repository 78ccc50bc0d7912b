//! Metronome - terminal front end
//!
//! Runs the metronome engine with a text cue backend and accepts commands on
//! stdin while it plays.
//!
//! Settings sources, highest priority first:
//! - command-line arguments / environment variables
//! - TOML configuration file
//! - built-in defaults

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter};

use metronome_common::config::{resolve_config_path, TomlConfig, CONFIG_ENV_VAR};
use metronome_common::MetronomeEvent;
use metronome_engine::settings::{BeatsPerMeasure, Tempo};
use metronome_engine::{
    Debouncer, EngineOptions, EngineSnapshot, MetronomeEngine, TerminalCueBackend, TokioScheduler,
};

/// Command-line arguments for the metronome
#[derive(Parser, Debug)]
#[command(name = "metronome")]
#[command(about = "Terminal metronome with accented downbeats")]
#[command(version)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Tempo in beats per minute (20-300)
    #[arg(short, long, env = "METRONOME_TEMPO")]
    tempo: Option<f64>,

    /// Beats per measure (1-16)
    #[arg(short, long, env = "METRONOME_BEATS")]
    beats: Option<f64>,

    /// Volume (0.0-1.0)
    #[arg(short, long, env = "METRONOME_VOLUME")]
    volume: Option<f64>,

    /// Downbeat cue source
    #[arg(long, requires = "upbeat")]
    downbeat: Option<String>,

    /// Upbeat cue source
    #[arg(long, requires = "downbeat")]
    upbeat: Option<String>,

    /// Stop after this many seconds
    #[arg(short, long)]
    duration: Option<u64>,

    /// Print engine events as JSON lines (cues go to stderr)
    #[arg(long)]
    json: bool,

    /// Log level (overrides the config file; RUST_LOG overrides both)
    #[arg(long, env = "METRONOME_LOG")]
    log_level: Option<String>,
}

/// Interactive commands read from stdin
#[derive(Debug, Clone, PartialEq)]
enum Command {
    Tempo(Tempo),
    Beats(BeatsPerMeasure),
    Volume(f64),
    Cues(String, String),
    Start,
    Stop,
    Toggle,
    Status,
    Quit,
}

impl Command {
    /// Parse one input line; `Err` carries a message for the user
    fn parse(line: &str) -> std::result::Result<Self, String> {
        let mut words = line.split_whitespace();
        let Some(word) = words.next() else {
            return Ok(Command::Toggle);
        };
        let arg = words.next();

        match (word, arg) {
            ("tempo" | "t", Some(value)) => Ok(Command::Tempo(Tempo::parse_lossy(value))),
            ("beats" | "b", Some(value)) => Ok(Command::Beats(BeatsPerMeasure::parse_lossy(value))),
            ("volume" | "v", Some(value)) => value
                .parse::<f64>()
                .map(Command::Volume)
                .map_err(|_| format!("not a volume: {}", value)),
            ("cues", Some(downbeat)) => match words.next() {
                Some(upbeat) => Ok(Command::Cues(downbeat.to_string(), upbeat.to_string())),
                None => Err("usage: cues <downbeat> <upbeat>".to_string()),
            },
            ("start", None) => Ok(Command::Start),
            ("stop", None) => Ok(Command::Stop),
            ("toggle", None) => Ok(Command::Toggle),
            ("status" | "s", None) => Ok(Command::Status),
            ("quit" | "q" | "exit", None) => Ok(Command::Quit),
            _ => Err(format!("unknown command: {}", line.trim())),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing; the filter is swapped once the config is known
    let cli_filter = std::env::var("RUST_LOG").ok().or_else(|| args.log_level.clone());
    let (filter, filter_handle) =
        reload::Layer::new(EnvFilter::new(cli_filter.as_deref().unwrap_or("info")));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load configuration
    let config_path = resolve_config_path(args.config.as_deref(), CONFIG_ENV_VAR);
    let config = TomlConfig::load_or_default(config_path.as_deref())
        .context("Failed to load configuration")?;

    if cli_filter.is_none() {
        filter_handle
            .reload(EnvFilter::new(&config.logging.level))
            .context("Failed to apply configured log level")?;
    }

    // CLI/environment overrides on top of the file
    let mut options = EngineOptions::from_config(&config.metronome);
    options.tempo = args.tempo.or(options.tempo);
    options.beats_per_measure = args.beats.or(options.beats_per_measure);
    options.volume = args.volume.or(options.volume);
    if let (Some(downbeat), Some(upbeat)) = (args.downbeat.clone(), args.upbeat.clone()) {
        options.cue_sources = vec![downbeat, upbeat];
    }
    options.cue_sources = cue_sources_or_default(options.cue_sources);

    let backend = if args.json {
        TerminalCueBackend::with_writer(Box::new(std::io::stderr()))
    } else {
        TerminalCueBackend::stdout()
    };
    let scheduler = TokioScheduler::from_current().context("Failed to create beat scheduler")?;

    let engine = Arc::new(MetronomeEngine::new(options, Arc::new(backend), Arc::new(scheduler)));

    if args.json {
        tokio::spawn(print_events(engine.subscribe()));
    }

    let debounce = Duration::from_millis(config.metronome.debounce_ms);
    let tempo_input = {
        let engine = Arc::clone(&engine);
        Debouncer::new(debounce, move |tempo: Tempo| engine.set_tempo(f64::from(tempo.bpm())))
            .context("Failed to create tempo debouncer")?
    };
    let beats_input = {
        let engine = Arc::clone(&engine);
        Debouncer::new(debounce, move |beats: BeatsPerMeasure| {
            engine.set_time_signature(f64::from(beats.get()))
        })
        .context("Failed to create time signature debouncer")?
    };

    let (command_tx, mut command_rx) = mpsc::channel(16);
    spawn_command_reader(command_tx);

    engine.start();
    info!("Commands: tempo N, beats N, volume V, cues A B, start, stop, toggle (empty line), status, quit");

    let deadline = async {
        match args.duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = &mut deadline => {
                info!("Duration elapsed, stopping");
                break;
            }
            Some(line) = command_rx.recv() => {
                match Command::parse(&line) {
                    Ok(Command::Quit) => break,
                    Ok(Command::Tempo(tempo)) => tempo_input.call(tempo),
                    Ok(Command::Beats(beats)) => beats_input.call(beats),
                    Ok(Command::Volume(volume)) => engine.set_volume(volume),
                    Ok(Command::Cues(downbeat, upbeat)) => {
                        engine.set_cue_sources(&[downbeat, upbeat]);
                    }
                    Ok(Command::Start) => engine.start(),
                    Ok(Command::Stop) => engine.stop(),
                    Ok(Command::Toggle) => engine.toggle(),
                    Ok(Command::Status) => print_status(&engine.snapshot(), args.json),
                    Err(message) => warn!("{}", message),
                }
            }
        }
    }

    tempo_input.cancel();
    beats_input.cancel();
    engine.stop();
    info!("Metronome shutdown complete");
    Ok(())
}

/// Built-in cue labels used when no usable pair is configured
const DEFAULT_CUES: [&str; 2] = ["TICK", "tock"];

/// Keep a configured [downbeat, upbeat] pair, otherwise use the built-in one
///
/// The engine ignores any other count and would run silently, so a wrong
/// count is reported here.
fn cue_sources_or_default(sources: Vec<String>) -> Vec<String> {
    match sources.len() {
        2 => sources,
        0 => DEFAULT_CUES.iter().map(|s| s.to_string()).collect(),
        count => {
            warn!(
                "cue_sources needs exactly 2 entries (downbeat, upbeat), got {}; using built-in cues",
                count
            );
            DEFAULT_CUES.iter().map(|s| s.to_string()).collect()
        }
    }
}

/// Read stdin lines on a dedicated thread
///
/// Blocking reads keep interactive input off the runtime; the thread ends
/// with stdin or when the receiver goes away.
fn spawn_command_reader(tx: mpsc::Sender<String>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else {
                break;
            };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
        debug!("Command input closed");
    });
}

/// Print every engine event as a JSON line
async fn print_events(mut rx: broadcast::Receiver<MetronomeEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => match event.to_json_line() {
                Ok(line) => println!("{}", line),
                Err(e) => warn!("Failed to serialize {} event: {}", event.event_type(), e),
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Event printer lagged, {} events skipped", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn print_status(snapshot: &EngineSnapshot, json: bool) {
    if json {
        match serde_json::to_string(snapshot) {
            Ok(line) => println!("{}", line),
            Err(e) => warn!("Failed to serialize status: {}", e),
        }
        return;
    }

    println!(
        "{} BPM | {} beats per measure | next beat {} | volume {:.2} | {}",
        snapshot.tempo,
        snapshot.beats_per_measure,
        snapshot.current_beat,
        snapshot.volume,
        if snapshot.running { "running" } else { "stopped" }
    );
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install terminate handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
