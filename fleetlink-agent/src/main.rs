//! FleetLink headless agent
//!
//! Runs one dashboard session without a UI: keeps the realtime channel
//! open, replays queued offline mutations when the backend comes back, and
//! serves the session's state over a local HTTP API.
//!
//! Usage:
//!   fleetlink-agent --api-base https://fleet.example.com --token $TOKEN

use std::{path::PathBuf, sync::Arc, time::Duration};
use anyhow::{Context, Result};
use clap::Parser;
use fleetlink_agent::{build_router, AgentState};
use fleetlink_store::StoreLocation;
use fleetlink_sync::{Session, SessionConfig, StaticAuth};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "fleetlink-agent")]
#[command(about = "Headless FleetLink session with a local status API")]
struct Args {
    /// Dashboard backend address (http or https) [default: http://localhost:8000]
    #[arg(long)]
    api_base: Option<String>,

    /// Session token
    #[arg(long, env = "FLEETLINK_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Path of the local store; in-memory when omitted
    #[arg(long)]
    db: Option<PathBuf>,

    /// JSON session config; command-line flags override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HTTP port for the status API
    #[arg(long, default_value = "4100")]
    http_port: u16,

    /// Seconds between backend health probes
    #[arg(long, default_value = "15")]
    probe_interval_secs: u64,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    info!("FleetLink agent starting...");

    let config = session_config(&args)?;
    if args.token.is_none() {
        warn!("No session token; realtime channel will stay closed");
    }
    let session = Session::builder(config)
        .auth(Arc::new(StaticAuth::new(args.token.clone())))
        .build()
        .context("failed to build session")?;
    info!("Session {}", session.id());

    session.start();
    session.start_health_probe(Duration::from_secs(args.probe_interval_secs.max(1)));

    let state = Arc::new(AgentState::new(session));
    let app = build_router(state.clone());
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", args.http_port))
        .await
        .with_context(|| format!("failed to bind HTTP port {}", args.http_port))?;
    info!("Status API listening on port {}", args.http_port);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl-C: {}", e);
            }
        })
        .await
        .context("HTTP server failed")?;

    state.session.shutdown().await;
    info!("FleetLink agent stopped");
    Ok(())
}

fn session_config(args: &Args) -> Result<SessionConfig> {
    let mut config = match &args.config {
        Some(path) => SessionConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => SessionConfig::default(),
    };

    if let Some(api_base) = &args.api_base {
        let base = api_base.trim_end_matches('/');
        config.connection.base_url = base.to_string();
        config.backend.base_url = format!("{base}/api/v1");
    }
    if let Some(db) = &args.db {
        config.store = StoreLocation::Path(db.clone());
    }
    Ok(config)
}
