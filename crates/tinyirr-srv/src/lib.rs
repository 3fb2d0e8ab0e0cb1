//! tinyirrd: IRR mirror and as-set expansion daemon.
//!
//! Mirrors a set of Internet Routing Registries into memory (bootstrap
//! dump plus NRTM realtime deltas, snapshotted to disk between runs) and
//! answers HTTP queries that expand an as-set macro or origin ASN into
//! the prefixes authorized under it.

pub mod config;
pub mod http;

use anyhow::Context;
use clap::Parser;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tinyirr_mirror::{supervisor, Registries};
use tokio::sync::RwLock;
use tracing::info;
use tracing_subscriber::EnvFilter;

pub use config::ServerConfig;

/// IRR mirror daemon: caches routing policy from IRR mirrors and expands
/// as-set macros and origin ASNs to prefix lists.
#[derive(Debug, Parser)]
#[command(name = "tinyirrd", version, about)]
pub struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "tinyirr.toml")]
    pub config: PathBuf,

    /// Override the configured HTTP listen address.
    #[arg(short, long)]
    pub listen: Option<std::net::SocketAddr>,

    /// Override the configured snapshot directory.
    #[arg(long)]
    pub state_dir: Option<PathBuf>,
}

/// Parse flags, load configuration, and run the daemon until shutdown.
pub async fn run() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = ServerConfig::load(&args.config)?;
    if let Some(listen) = args.listen {
        config.listen = listen;
    }
    if let Some(state_dir) = args.state_dir {
        config.state_dir = state_dir;
    }

    std::fs::create_dir_all(&config.state_dir)
        .with_context(|| format!("create state dir {}", config.state_dir.display()))?;

    let registries: Registries = Arc::new(RwLock::new(HashMap::new()));
    supervisor::spawn_all(config.registries.clone(), &config.state_dir, &registries);

    let router = http::build_router(http::AppState { registries });
    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("bind {}", config.listen))?;
    info!(
        addr = %config.listen,
        registries = config.registries.len(),
        state_dir = %config.state_dir.display(),
        "tinyirrd listening"
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server")?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown signal received");
    }
}
