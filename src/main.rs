//! reCAPTCHA authorization service.
//!
//! # Architecture Overview
//!
//! ```text
//!     Envoy / client                ┌──────────────────────────────────────────────┐
//!     ─────────────────────────────▶│  http::server (check, /authz, /health, ...)  │
//!                                   └──────────────────────┬───────────────────────┘
//!                                                          ▼
//!                                   ┌──────────────────────────────────────────────┐
//!                                   │  engine::DecisionEngine                      │
//!                                   │    cache ──▶ breaker ──▶ verdict client ─────┼──▶ reCAPTCHA
//!                                   │    failure-mode policy                       │    Enterprise
//!                                   └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;

use captcha_authz::config::load_config;
use captcha_authz::http::HttpServer;
use captcha_authz::lifecycle::{build_engine, wait_for_signal, Shutdown};
use captcha_authz::observability::{logging, metrics};

/// Interval between cache sweeps.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[command(name = "captcha-authz", version, about = "reCAPTCHA authorization service")]
struct Args {
    /// Path to a TOML config file.
    #[arg(short, long, env = "AUTHZ_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    logging::init_logging(&config.observability);
    tracing::info!("captcha-authz v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        failure_mode = config.failure_mode.as_str(),
        breaker_enabled = config.breaker.enabled,
        failure_threshold = config.breaker.failure_threshold,
        recovery_secs = config.breaker.recovery_secs,
        positive_ttl_secs = config.cache.positive_ttl_secs,
        negative_ttl_secs = config.cache.negative_ttl_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let engine = build_engine(&config).await?;
    let shutdown = Shutdown::new();

    let sweeper = tokio::spawn(
        engine
            .cache()
            .clone()
            .run_sweeper(SWEEP_INTERVAL, shutdown.subscribe()),
    );

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(config, engine);
    let mut server = tokio::spawn(server.run(listener, shutdown.subscribe()));

    tokio::select! {
        _ = wait_for_signal() => {
            shutdown.trigger();
            server.await??;
        }
        result = &mut server => {
            tracing::error!("HTTP server exited before shutdown was requested");
            shutdown.trigger();
            result??;
        }
    }
    let _ = sweeper.await;

    tracing::info!("Shutdown complete");
    Ok(())
}
