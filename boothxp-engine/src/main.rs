//! Booth XP Reward Engine (boothxp-engine) - Main entry point
//!
//! Standalone host for the reward engine. Session activity arrives as
//! newline-delimited JSON commands on stdin; every published reward event is
//! written to stdout as a `{ "topic", "payload" }` JSON line. Logs go to
//! stderr.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use boothxp_common::config::{resolve_config_path, RewardConfig, CONFIG_ENV_VAR};
use boothxp_common::events::EventBus;
use boothxp_engine::session::{Accounts, Session, SessionCommand};
use boothxp_engine::store::{MemoryBooth, MemoryPresence, MemoryUserStore, SqliteUserStore};
use boothxp_engine::{EngineParts, RewardEngine};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for boothxp-engine
#[derive(Parser, Debug)]
#[command(name = "boothxp-engine")]
#[command(about = "Experience, points and levels for a listening session")]
#[command(version)]
struct Args {
    /// SQLite database for reward records (in-memory store if omitted)
    #[arg(short, long, env = "BOOTHXP_DATABASE")]
    database: Option<PathBuf>,

    /// Reward config TOML file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the dispensation interval in seconds
    #[arg(long)]
    interval_secs: Option<u64>,

    /// Event bus capacity
    #[arg(long, default_value = "1000")]
    event_capacity: usize,

    /// Exit when stdin closes instead of dispensing until interrupted
    #[arg(long)]
    exit_on_eof: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing (stderr, stdout carries events)
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "boothxp_engine=info,boothxp_common=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    info!(
        "Starting Booth XP reward engine v{}",
        env!("CARGO_PKG_VERSION")
    );

    let config_path = resolve_config_path(args.config.as_deref(), CONFIG_ENV_VAR);
    let mut config = RewardConfig::load_or_default(config_path.as_deref())
        .context("Failed to load reward config")?;
    if let Some(interval_secs) = args.interval_secs {
        config.dispenser.interval_secs = interval_secs;
        config.validate().context("Invalid interval override")?;
    }

    let accounts = match &args.database {
        Some(path) => Accounts::Sqlite(
            SqliteUserStore::open(path)
                .await
                .context("Failed to open reward database")?,
        ),
        None => {
            info!("No database given, reward records are kept in memory");
            Accounts::Memory(Arc::new(MemoryUserStore::new()))
        }
    };

    let presence = Arc::new(MemoryPresence::new());
    let booth = Arc::new(MemoryBooth::new());
    let events = EventBus::new(args.event_capacity);

    let engine = Arc::new(RewardEngine::new(EngineParts::new(
        config,
        accounts.store(),
        presence.clone(),
        booth.clone(),
        events.clone(),
    )));
    engine.start();

    let printer = spawn_event_printer(&events);
    let session = Session::new(engine.clone(), accounts, presence, booth);

    tokio::select! {
        result = run_feed(&session) => {
            result.context("Session feed error")?;
            if args.exit_on_eof {
                info!("Session feed closed, exiting");
            } else {
                info!("Session feed closed, dispensing until interrupted");
                let received = wait_for_stop_signal().await?;
                info!("{} received, stopping reward engine", received);
            }
        }
        received = wait_for_stop_signal() => {
            info!("{} received, stopping reward engine", received?);
        }
    }

    engine.shutdown();
    printer.abort();
    info!("Shutdown complete");
    Ok(())
}

/// Apply stdin commands until EOF
async fn run_feed(session: &Session) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let command = match SessionCommand::parse(line) {
            Ok(command) => command,
            Err(e) => {
                warn!("Skipping line: {}", e);
                continue;
            }
        };

        if let Err(e) = session.apply(command).await {
            error!("Session command failed: {}", e);
        }
    }

    Ok(())
}

/// Write every published event to stdout as a JSON line
fn spawn_event_printer(events: &EventBus) -> tokio::task::JoinHandle<()> {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let line = format!("{}\n", event.envelope());
                    if let Err(e) = stdout.write_all(line.as_bytes()).await {
                        error!("Failed to write event: {}", e);
                        break;
                    }
                    let _ = stdout.flush().await;
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Event printer lagged, {} events dropped", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// Wait for Ctrl+C or SIGTERM and name the signal that arrived
#[cfg(unix)]
async fn wait_for_stop_signal() -> Result<&'static str> {
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
        .context("Failed to install SIGTERM handler")?;

    tokio::select! {
        result = signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl+C")?;
            Ok("Ctrl+C")
        }
        _ = sigterm.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_stop_signal() -> Result<&'static str> {
    signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    Ok("Ctrl+C")
}
