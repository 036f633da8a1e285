//! CloudBoard server -- REST API plus realtime task-sync gateway.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 0.0.0.0:4000
//! cargo run --bin cloudboard-server
//!
//! # Run on custom address
//! cargo run --bin cloudboard-server -- --bind 127.0.0.1:8080
//!
//! # Or via environment variable
//! CLOUDBOARD_ADDR=127.0.0.1:8080 cargo run --bin cloudboard-server
//! ```

use std::sync::Arc;

use clap::Parser;
use cloudboard_server::config::{CliArgs, ServerConfig};
use cloudboard_server::rest;
use cloudboard_server::state::AppState;

#[tokio::main]
async fn main() {
    let cli = CliArgs::parse();

    // Load config from CLI args + config file + env vars + defaults.
    let config = match ServerConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    // Initialize tracing with the resolved log level.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    if config.uses_dev_secret() {
        tracing::warn!("using built-in dev session secret; set CLOUDBOARD_SESSION_SECRET in production");
    }

    tracing::info!(addr = %config.bind_addr, "starting cloudboard server");

    let state = Arc::new(AppState::new(&config));

    match rest::start_server(&config.bind_addr, state, &config.frontend_origin).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "cloudboard server listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "server task failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start server");
            std::process::exit(1);
        }
    }
}
