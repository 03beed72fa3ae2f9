//! # envmon-monitor
//!
//! Command-line telemetry monitor: opens the sensor channel for one identity,
//! prints status transitions and readings, and keeps the link alive until
//! Ctrl-C.

#![deny(unsafe_code)]

mod console;
mod session;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use tokio::sync::watch;

use envmon_core::logging::{LogFormat, init_subscriber};
use envmon_link::{ConnectionManager, ConnectionState, ConnectionStatus, IdentitySource, LinkConfig};
use envmon_sensors::TelemetryCache;
use envmon_settings::{EnvmonSettings, load_settings_from_path, settings_path};

use crate::console::OutputMode;
use crate::session::SessionFileIdentity;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Live sensor telemetry monitor.
#[derive(Parser, Debug)]
#[command(name = "envmon-monitor", about = "Stream live sensor telemetry")]
struct Cli {
    /// Identity (email) to connect with. Falls back to settings, then the
    /// session file.
    #[arg(short, long)]
    identity: Option<String>,

    /// Telemetry endpoint (overrides settings).
    #[arg(long)]
    url: Option<String>,

    /// Settings file (default `~/.envmon/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Log filter used when `RUST_LOG` is unset (overrides settings).
    #[arg(long)]
    log_level: Option<String>,

    /// Print raw events as JSON lines.
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn load_settings(&self) -> Result<EnvmonSettings> {
        let path = self.settings.clone().unwrap_or_else(settings_path);
        let mut settings = load_settings_from_path(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?;

        if let Some(url) = &self.url {
            settings.link.url.clone_from(url);
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        settings.validate().context("Invalid command-line override")?;
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let settings = args.load_settings()?;

    init_subscriber(
        &settings.logging.level,
        LogFormat::from_json_flag(settings.logging.json),
    );

    if let Err(err) = rustls::crypto::ring::default_provider().install_default() {
        return Err(anyhow!("Unable to install TLS crypto provider: {err:?}"));
    }

    let session = SessionFileIdentity::new(settings.session.session_path());
    let identity = args
        .identity
        .clone()
        .or_else(|| settings.session.identity.clone())
        .or_else(|| session.lookup());
    let Some(identity) = identity else {
        bail!(
            "No identity available: pass --identity or sign in so that {} exists",
            session.path().display()
        );
    };

    let config = LinkConfig::from(&settings.link);
    tracing::info!(url = %config.url, identity = %identity, "starting telemetry monitor");

    let manager = ConnectionManager::websocket(config, Arc::new(session));
    let mode = if args.json {
        OutputMode::JsonLines
    } else {
        OutputMode::Human
    };
    let _console = manager.add_listener(console::listener(mode));
    let cache = TelemetryCache::default();
    let _cache = cache.attach(&manager);

    manager.connect(identity);

    let outcome = tokio::select! {
        signal = tokio::signal::ctrl_c() => signal.context("Failed to listen for ctrl-c"),
        () = wait_for(manager.watch_status(), ConnectionState::Failed) => {
            Err(anyhow!("Gave up reconnecting: {}", manager.status().last_error.unwrap_or_default()))
        }
    };

    tracing::info!("Shutting down...");
    manager.disconnect();
    let _ = tokio::time::timeout(
        SHUTDOWN_GRACE,
        wait_for(manager.watch_status(), ConnectionState::Disconnected),
    )
    .await;
    manager.shutdown();

    tracing::info!(
        readings = cache.history().len(),
        latest = ?cache.latest().map(|reading| reading.timestamp_iso()),
        "Shutdown complete"
    );
    outcome
}

/// Resolves once the published status reaches `state`, or never if the
/// manager goes away first.
async fn wait_for(mut status: watch::Receiver<ConnectionStatus>, state: ConnectionState) {
    if status.wait_for(|current| current.status == state).await.is_err() {
        std::future::pending::<()>().await;
    }
}
