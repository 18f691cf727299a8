// Main entrypoint for the promexporter service.

use promexporter::app;
use promexporter::config::{Config, ConfigTrait};
use promexporter::liveness;
use promexporter::shutdown::GracefulShutdown;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const CONFIG_PATH: &str = "cfg/promexporter.cfg.yaml";
const CONFIG_PATH_LOCAL: &str = "cfg/promexporter.cfg.local.yaml";

/// promexporter - Prometheus counters for parsers, checkpointed to Redis
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Custom config file path
    #[arg(short, long, value_name = "FILE")]
    cfg: Option<PathBuf>,
}

/// Loads the configuration.
/// Tries the custom path, then the local config, then the default config,
/// and finally the built-in defaults with environment overrides.
fn load_cfg(path: Option<PathBuf>) -> Result<(Config, &'static str)> {
    if let Some(custom_path) = path {
        let cfg = Config::load(&custom_path)
            .with_context(|| format!("failed to load custom config from {:?}", custom_path))?;
        return Ok((cfg, "custom"));
    }

    for candidate in [CONFIG_PATH_LOCAL, CONFIG_PATH] {
        if !PathBuf::from(candidate).exists() {
            continue;
        }
        let cfg = Config::load(candidate)
            .with_context(|| format!("failed to load config from {}", candidate))?;
        return Ok((cfg, candidate));
    }

    let cfg = Config::from_env().context("failed to build config from environment")?;
    Ok((cfg, "environment"))
}

/// Configures structured logging based on configuration.
fn configure_logger(cfg: &Config) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let log_level = cfg
        .logs()
        .and_then(|logs| logs.level.as_ref())
        .map(|s| s.as_str())
        .unwrap_or("info");

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    if cfg.is_prod() {
        // Production: JSON format
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        // Development: Pretty console format
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().pretty())
            .init();
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    tokio::runtime::Runtime::new()
        .context("Failed to create tokio runtime")?
        .block_on(async_main(args))
}

async fn async_main(args: Args) -> Result<()> {
    // Create cancellation token for graceful shutdown
    let shutdown_token = CancellationToken::new();

    // Load configuration
    let (cfg, source) = load_cfg(args.cfg)?;

    // Configure logger (must be done after config is loaded)
    configure_logger(&cfg);

    info!(
        component = "config",
        event = "load_success",
        source = source,
        env = %cfg.exporter.env,
        driver = ?cfg.driver(),
        metric_types = cfg.definitions().len(),
        "config loaded"
    );
    if cfg.persistence().and_then(|p| p.password.as_ref()).is_none() {
        warn!(
            component = "config",
            event = "no_store_password",
            "store password is not set"
        );
    }

    // Setup graceful shutdown handler
    let graceful_shutdown = GracefulShutdown::new(shutdown_token.clone());
    graceful_shutdown
        .set_graceful_timeout(Duration::from_secs(60))
        .await;

    // Initialize liveness probe for Kubernetes health checks
    let probe_timeout = cfg
        .k8s()
        .and_then(|k8s| k8s.probe.timeout)
        .unwrap_or(Duration::from_secs(5));
    let probe = Arc::new(liveness::Probe::new(probe_timeout));

    // Restore counters and build the HTTP surface
    let app = app::App::new(shutdown_token.clone(), cfg, probe).await?;

    // Register app for graceful shutdown; it reports done after the final flush
    graceful_shutdown.add(1);

    if let Err(e) = app.serve(Arc::new(graceful_shutdown.clone())).await {
        error!(
            component = "main",
            scope = "app",
            event = "start_failed",
            error = %e,
            "failed to start app"
        );
        graceful_shutdown.done();
        shutdown_token.cancel();
        return Err(e);
    }

    // Listen for OS signals or cancellation and wait for graceful shutdown
    if let Err(e) = graceful_shutdown.await_shutdown().await {
        error!(
            component = "main",
            scope = "service",
            event = "graceful_shutdown_failed",
            error = %e,
            "failed to gracefully shut down service"
        );
        return Err(e);
    }

    Ok(())
}
