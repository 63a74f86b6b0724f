#![allow(clippy::print_stdout, clippy::print_stderr)] // CLI binary: stdout/stderr is the UI

mod cli;
mod config;
mod config_check;
mod connection;
mod navigation;
mod notify;
mod page;
mod router;
mod throttle;
mod tracing_setup;
mod watcher;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use safesurf_backend::{HttpBackend, RiskClassifierClient};
use safesurf_core::{DestinationId, ReputationBackend};
use safesurf_ipc::{ClientMessage, IpcServer};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cli::{Cli, Commands};
use crate::config::Config;
use crate::navigation::navigation_channel;
use crate::router::MessageRouter;
use crate::throttle::ThrottleGate;
use crate::watcher::NavigationWatcher;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let console_log = matches!(cli.command, Commands::Monitor);
    let _tracing_guard = tracing_setup::init(console_log);

    debug!(
        version = env!("CARGO_PKG_VERSION"),
        pid = std::process::id(),
        "safesurf starting"
    );

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Monitor => cmd_monitor(config_path).await,
        Commands::Page { destination } => cmd_page(config_path, DestinationId(destination)).await,
        Commands::Navigate { destination, url } => {
            cmd_navigate(config_path, DestinationId(destination), &url).await
        }
        Commands::Status { url } => cmd_status(config_path, &url).await,
        Commands::Ping => cmd_ping(config_path).await,
        Commands::Check { format } => cmd_check(config_path, &format),
        Commands::Version => {
            println!("safesurf {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn load_config(config_path: Option<&str>) -> Result<Config> {
    let config_file = Config::find_config_path(config_path);
    Config::load_or_default(&config_file)
        .with_context(|| format!("loading config from {}", config_file.display()))
}

fn build_backend(config: &Config) -> Result<HttpBackend> {
    HttpBackend::new(&config.backend.url, config.backend_timeout())
}

// ---------------------------------------------------------------------------
// cmd_monitor: navigation feed → watcher → router → page contexts
// ---------------------------------------------------------------------------

async fn cmd_monitor(config_path: Option<&str>) -> Result<()> {
    let config = load_config(config_path)?;

    let backend: Arc<dyn ReputationBackend> = Arc::new(build_backend(&config)?);
    let notifier = notify::build_notifier(&config.notifications);
    let router = Arc::new(MessageRouter::new(Arc::clone(&backend), notifier));
    let classifier = Arc::new(RiskClassifierClient::new(backend, config.retry_policy()));

    let socket = config.socket_path();
    let server = IpcServer::bind(&socket)?;
    let (feed, events) = navigation_channel();
    let shutdown_token = CancellationToken::new();

    let watcher = NavigationWatcher::new(
        ThrottleGate::new(config.cooldown()),
        classifier,
        Arc::clone(&router),
    );
    let watcher_task = tokio::spawn(watcher.run(events, shutdown_token.clone()));

    info!(
        backend = %config.backend.url,
        socket = %server.socket_path().display(),
        cooldown_ms = config.monitor.cooldown_ms,
        fallback = %config.classifier.fallback_risk,
        "monitor started"
    );
    println!("monitor listening on {}", server.socket_path().display());

    let server_task = tokio::spawn(connection::serve_ipc(
        server,
        router,
        feed,
        shutdown_token.clone(),
    ));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutting down");
    shutdown_token.cancel();

    // The server owns the socket file; awaiting it removes the socket.
    let _ = server_task.await;
    let _ = watcher_task.await;
    Ok(())
}

// ---------------------------------------------------------------------------
// cmd_page / cmd_navigate: clients of a running monitor
// ---------------------------------------------------------------------------

async fn cmd_page(config_path: Option<&str>, destination: DestinationId) -> Result<()> {
    let config = load_config(config_path)?;
    page::run_page(&config.socket_path(), destination, config.overlay_timings()).await
}

async fn cmd_navigate(
    config_path: Option<&str>,
    destination: DestinationId,
    url: &str,
) -> Result<()> {
    let config = load_config(config_path)?;
    let mut client = page::connect_to_monitor(&config.socket_path()).await?;
    client
        .send(&ClientMessage::Navigated {
            destination,
            url: url.to_owned(),
        })
        .await?;
    println!("navigation reported: {destination} {url}");
    Ok(())
}

// ---------------------------------------------------------------------------
// cmd_status / cmd_ping: one-shot backend queries
// ---------------------------------------------------------------------------

async fn cmd_status(config_path: Option<&str>, url: &str) -> Result<()> {
    let config = load_config(config_path)?;
    let backend = build_backend(&config)?;

    println!("Checking: {url}");
    // A single attempt, no fallback: failure is reported as such.
    match backend.check_url(url).await {
        Ok(response) => {
            let verdict = response.into_verdict(url);
            println!("Status: {}", verdict.risk.label());
            println!("Reason: {}", verdict.reason);
            if let Some(confidence) = &verdict.confidence {
                println!("Confidence: {confidence}");
            }
            Ok(())
        }
        Err(error) => {
            debug!(error = %format!("{error:#}"), "status check failed");
            println!("Unable to check risk");
            std::process::exit(1);
        }
    }
}

async fn cmd_ping(config_path: Option<&str>) -> Result<()> {
    let config = load_config(config_path)?;
    let backend = build_backend(&config)?;
    let status = backend
        .ping()
        .await
        .with_context(|| format!("backend at {} is not reachable", backend.base_url()))?;
    println!("{}: {status}", backend.base_url());
    Ok(())
}

// ---------------------------------------------------------------------------
// cmd_check: validate config without starting
// ---------------------------------------------------------------------------

#[allow(clippy::unnecessary_wraps)] // must return Result to match main's match arms
fn cmd_check(config_path: Option<&str>, format: &str) -> Result<()> {
    let config_file = Config::find_config_path(config_path);
    let report = config_check::validate_config(&config_file);

    match format {
        "json" => report.print_json(),
        _ => report.print_human(),
    }

    if report.has_errors() {
        std::process::exit(1);
    }
    Ok(())
}
