//! # Ground Link
//!
//! Entry point for the four ground-control processes.
//!
//! ```bash
//! ground-link joystick config/default.toml   # sample the joystick into the store
//! ground-link radio config/default.toml      # exchange frames with the transceiver
//! ground-link relay                          # websocket fan-out on 127.0.0.1:8765
//! ground-link hud config/default.toml        # render the attitude display
//! ```
//!
//! Every role stops cleanly on Ctrl+C. Fatal errors exit non-zero.

use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use ground_link::config::{Config, FeedSource, LoggingConfig};
use ground_link::controller::run_joystick_service;
use ground_link::hud::{run_hud_service, AttitudeFeed, RelayFeed, StoreFeed};
use ground_link::radio::run_radio_service;
use ground_link::relay::RelayServer;
use ground_link::telemetry::SharedFileStore;

const USAGE: &str = "usage: ground-link <joystick|radio|relay|hud> [config.toml]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Joystick,
    Radio,
    Relay,
    Hud,
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "joystick" => Ok(Role::Joystick),
            "radio" => Ok(Role::Radio),
            "relay" => Ok(Role::Relay),
            "hud" => Ok(Role::Hud),
            other => Err(anyhow!("unknown role '{}'\n{}", other, USAGE)),
        }
    }
}

/// Role and optional config path from the command line (program name skipped).
fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<(Role, Option<PathBuf>)> {
    let mut args = args.into_iter();
    let role = args.next().ok_or_else(|| anyhow!(USAGE))?.parse()?;
    let config_path = args.next().map(PathBuf::from);
    if args.next().is_some() {
        return Err(anyhow!("too many arguments\n{}", USAGE));
    }
    Ok((role, config_path))
}

/// Stdout logging, plus a daily-rolling file when `log_dir` is set.
///
/// `RUST_LOG` overrides the configured level. The returned guard must live
/// until exit so buffered file output is flushed.
fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let registry = tracing_subscriber::registry().with(filter).with(fmt::layer());

    if config.log_dir.is_empty() {
        registry.init();
        return None;
    }

    let appender = tracing_appender::rolling::daily(&config.log_dir, "ground-link.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    registry
        .with(fmt::layer().with_ansi(false).with_writer(writer))
        .init();
    Some(guard)
}

/// Flip `shutdown` on Ctrl+C.
fn spawn_ctrl_c(shutdown: watch::Sender<bool>) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, shutting down...");
                let _ = shutdown.send(true);
            }
            Err(e) => {
                warn!("Ctrl+C handler unavailable: {}", e);
                // Keep the sender alive so receivers do not see a closed channel
                std::future::pending::<()>().await;
                drop(shutdown);
            }
        }
    });
}

async fn run(role: Role, config: Config, mut shutdown: watch::Receiver<bool>) -> Result<()> {
    match role {
        Role::Joystick => {
            let store = SharedFileStore::open(&config.store.path)?;
            run_joystick_service(config.joystick.clone(), store, shutdown).await?;
        }
        Role::Radio => {
            let store = SharedFileStore::open(&config.store.path)?;
            run_radio_service(&config, store, shutdown).await?;
        }
        Role::Relay => {
            let handle = RelayServer::new(config.relay.clone()).start()?;
            info!("Relay listening at {}", handle.url());
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
            tokio::task::spawn_blocking(move || handle.stop())
                .await
                .context("relay stop task panicked")??;
        }
        Role::Hud => {
            let feed: Box<dyn AttitudeFeed> = match config.hud.source {
                FeedSource::Relay => Box::new(RelayFeed::spawn(
                    config.relay.url(),
                    Duration::from_millis(config.relay.reconnect_interval_ms),
                    shutdown.clone(),
                )),
                FeedSource::Store => Box::new(StoreFeed::new(SharedFileStore::open(&config.store.path)?)),
            };
            run_hud_service(&config.hud, feed, shutdown).await?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let (role, config_path) = parse_args(std::env::args().skip(1))?;
    let config = match &config_path {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::default(),
    };

    let _log_guard = init_logging(&config.logging);
    info!("Ground Link v{} starting as {:?}", env!("CARGO_PKG_VERSION"), role);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    spawn_ctrl_c(shutdown_tx);

    if let Err(e) = run(role, config, shutdown_rx).await {
        error!("{:?} stopped: {:#}", role, e);
        return Err(e);
    }
    info!("{:?} exited cleanly", role);
    Ok(())
}
