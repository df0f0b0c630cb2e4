//! # Reflex Entry Point
//!
//! The main executable of the gateway. This file drives the application lifecycle:
//!
//! 1. **Initialization**: sets up logging and reads [`cli::Cli`] and the optional config file.
//! 2. **Upstreams**: creates one lazily connected channel per upstream. Nothing is discovered
//!    until the first request reaches the gateway.
//! 3. **Serving**: exposes `reflex_core::http::router` on the listen address.
//! 4. **Reload**: on `SIGHUP` the registry is thrown away and discovery runs again.
mod cli;
mod config;

use anyhow::{Context, Result};
use clap::Parser;
use cli::Cli;
use config::Config;
use reflex_core::{Gateway, Upstream, UpstreamSource, http::router};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_cli(Cli::parse())?;

    let upstreams = config
        .upstreams
        .iter()
        .map(|u| -> Result<Arc<dyn UpstreamSource>> {
            let upstream = Upstream::connect_lazy(&u.name, &u.url)?;
            info!(upstream = %u.name, url = %u.url, "upstream configured");
            Ok(Arc::new(upstream))
        })
        .collect::<Result<Vec<_>>>()?;

    let gateway = Arc::new(Gateway::new(config.gateway.clone(), upstreams));

    tokio::spawn(rebuild_on_hangup(gateway.clone()));

    let app = router(gateway).layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(&config.listen)
        .await
        .with_context(|| format!("Failed to listen on '{}'", config.listen))?;

    info!(listen = %config.listen, "reflex gateway started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

#[cfg(unix)]
async fn rebuild_on_hangup(gateway: Arc<Gateway>) {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangups = match signal(SignalKind::hangup()) {
        Ok(hangups) => hangups,
        Err(e) => {
            error!(error = %e, "cannot listen for SIGHUP, reloads are disabled");
            return;
        }
    };

    while hangups.recv().await.is_some() {
        info!("SIGHUP received, rediscovering upstreams");

        match gateway.rebuild().await {
            Ok(registry) => info!(endpoints = registry.endpoints().len(), "registry rebuilt"),
            Err(e) => error!(error = %e, "registry rebuild failed"),
        }
    }
}

#[cfg(not(unix))]
async fn rebuild_on_hangup(_gateway: Arc<Gateway>) {}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "cannot listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
