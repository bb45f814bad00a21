// ============================
// crates/backend-bin/src/main.rs
// ============================

//! Binary entry point for the CodeSync session server.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use codesync_backend_lib::config::Settings;
use codesync_backend_lib::reaper::IdleReaper;
use codesync_backend_lib::ws_router;
use codesync_backend_lib::AppState;

/// Collaborative code session server.
#[derive(Parser, Debug)]
#[command(name = "codesync-backend", version, about)]
struct Args {
    /// Path to a TOML config file; without it, codesync.toml in the
    /// working directory is used when present.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen address, overriding the configured one.
    #[arg(long)]
    bind: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let mut settings = match &args.config {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load()?,
    };
    if let Some(bind) = args.bind {
        settings.bind_addr = bind;
    }

    let state = AppState::new(settings).context("failed to build application state")?;
    let _sweep = IdleReaper::spawn(state.registry.clone(), &state.settings);

    let listener = TcpListener::bind(state.settings.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", state.settings.bind_addr))?;
    info!(addr = %state.settings.bind_addr, "CodeSync server listening");

    let app = ws_router::create_router(state);
    axum::serve(listener, app).await?;
    Ok(())
}
