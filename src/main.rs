//! # OBD Logger
//!
//! Log live OBD-II data from an ELM327-style adapter to CSV.
//!
//! Usage: `obd-logger [config.toml]` (defaults to `config/default.toml`).
//! Acquisition starts immediately; commands are read line by line from
//! stdin.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use obd_logger::acquisition::{AcquisitionScheduler, AcquisitionSettings, SystemClock};
use obd_logger::config::Config;
use obd_logger::obd::TelegramCodec;
use obd_logger::serial::correlator::ResponseCorrelator;
use obd_logger::serial::ElmLink;
use obd_logger::telemetry::Session;

/// Configuration file used when none is given on the command line
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// File name prefix of the daily-rolling application log
const APP_LOG_FILE: &str = "obd-logger.log";

/// Operator command read from stdin
#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Start,
    Pause,
    Resume,
    Stop,
    Save,
    Load(PathBuf),
    Status,
    Quit,
}

impl Command {
    fn parse(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace();
        let command = match words.next()?.to_ascii_lowercase().as_str() {
            "start" => Command::Start,
            "pause" => Command::Pause,
            "resume" => Command::Resume,
            "stop" => Command::Stop,
            "save" => Command::Save,
            "load" => Command::Load(PathBuf::from(words.next()?)),
            "status" => Command::Status,
            "quit" | "exit" => Command::Quit,
            _ => return None,
        };
        Some(command)
    }
}

/// Main entry point for the OBD logger
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load configuration
///    - Set up console and rolling-file logging
///    - Open the adapter and start acquisition
///
/// 2. **Command Loop**
///    - `start`, `pause`, `resume`, `stop` drive the acquisition state
///    - `save` writes a snapshot, `load <path>` restores one
///    - `quit` or Ctrl+C stops acquisition and exits
///
/// # Errors
///
/// Returns error if the configuration is invalid or no adapter can be
/// opened.
#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;

    // Initialize logging
    let file_appender = tracing_appender::rolling::daily(&config.storage.log_dir, APP_LOG_FILE);
    let (file_writer, _log_guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(file_writer))
        .init();

    info!("OBD Logger v{} starting...", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded from {}", config_path);

    let settings = AcquisitionSettings::from_config(&config.acquisition)?;
    let codec = TelegramCodec::from_config(&config.codec)?;

    let correlator = Arc::new(ResponseCorrelator::new());
    let link = ElmLink::open(&config.serial, Arc::clone(&correlator))?;
    info!("OBD adapter opened at: {}", link.device_path());

    let scheduler = AcquisitionScheduler::new(
        settings,
        codec,
        link,
        correlator,
        Arc::new(Session::new()),
        Arc::new(SystemClock),
        &config.storage.log_dir,
    );
    scheduler.start()?;

    info!("Commands: start, pause, resume, stop, save, load <path>, status, quit");
    info!("Press Ctrl+C to exit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        // stdin closed; keep logging until Ctrl+C
                        tokio::signal::ctrl_c().await?;
                        info!("Received Ctrl+C, shutting down...");
                        break;
                    }
                    Err(e) => {
                        warn!("Failed to read command: {}", e);
                        continue;
                    }
                };

                if line.trim().is_empty() {
                    continue;
                }
                let Some(command) = Command::parse(&line) else {
                    warn!("Unknown command: {}", line.trim());
                    continue;
                };
                if command == Command::Quit {
                    break;
                }
                execute(&scheduler, &config, command).await;
            }

            // Handle Ctrl+C for graceful shutdown
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    scheduler.stop();
    if let Some(path) = scheduler.log_path() {
        info!("Session log: {}", path.display());
    }

    Ok(())
}

/// Run one operator command, reporting failures without exiting
async fn execute(scheduler: &AcquisitionScheduler, config: &Config, command: Command) {
    let result = match command {
        Command::Start => scheduler.start(),
        Command::Pause => scheduler.pause(),
        Command::Resume => scheduler.resume(),
        Command::Stop => {
            scheduler.stop();
            Ok(())
        }
        Command::Save => scheduler.save_snapshot(&config.storage.snapshot_dir).map(|_| ()),
        Command::Load(path) => scheduler.load_snapshot_file(&path).await.map(|_| ()),
        Command::Status => {
            info!(
                "State: {}, cycles: {}, rows written: {}, rows dropped: {}",
                scheduler.state(),
                scheduler.cycles_completed(),
                scheduler.rows_written(),
                scheduler.rows_dropped()
            );
            Ok(())
        }
        Command::Quit => Ok(()),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
    }
}
