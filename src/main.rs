/*!
 * A1PMS daemon
 *
 * Loads the configuration, restores persisted state and supervises the
 * configured near-RT RICs until interrupted.
 */

use a1pms::{logging, LogLevel, PmsApp, PmsConfig};
use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

/// A1 Policy Management Service
#[derive(Parser, Debug)]
#[command(name = "a1pms", author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, env = "A1PMS_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Seconds between checks of the configuration file for node changes (0 = never)
    #[arg(long, default_value = "60")]
    refresh_interval_s: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let mut config = match &args.config {
        Some(path) => PmsConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => PmsConfig::default(),
    };
    if args.debug {
        config.logging.level = LogLevel::Debug;
    }
    logging::init_logging(&config.logging).context("Failed to initialize logging")?;

    info!("A1PMS v{}", a1pms::VERSION);
    if args.config.is_none() {
        warn!("No configuration file given, running without nodes");
    }

    let app = PmsApp::new(config).context("Failed to build the service")?;
    app.restore().await;
    let supervisor = app
        .start_supervisor()
        .context("Failed to start supervision")?;

    match (&args.config, args.refresh_interval_s) {
        (Some(path), secs) if secs > 0 => {
            tokio::select! {
                _ = refresh_config(&app, path, Duration::from_secs(secs)) => {}
                result = tokio::signal::ctrl_c() => result.context("Failed to wait for Ctrl-C")?,
            }
        }
        _ => tokio::signal::ctrl_c()
            .await
            .context("Failed to wait for Ctrl-C")?,
    }

    info!("Shutting down");
    supervisor.shutdown().await;
    Ok(())
}

/// Re-read the configuration file and apply node changes, forever
async fn refresh_config(app: &PmsApp, path: &Path, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately and the file was just loaded
    interval.tick().await;

    loop {
        interval.tick().await;
        let refreshed = match PmsConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable configuration");
                continue;
            }
        };
        match app.apply_node_config(refreshed).await {
            Ok(changes) if !changes.is_empty() => {
                info!(changes = changes.len(), "Applied node configuration changes")
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Failed to apply configuration"),
        }
    }
}
