//! meshmesh-probe: a diagnostic client for the meshmesh API bridge
//!
//! Opens one connection to the bridge and walks through a session:
//! - Sends the `INIT|<node>|<port>` handshake line
//! - Checks for the `!!OK!` acknowledgment
//! - Sends the hello payload
//! - Logs everything received and answers pings until Ctrl-C
//!
//! Configuration via CLI arguments or TOML file.

mod client;
mod config;
mod protocol;

use client::{Client, ClientError, SessionReport};
use config::Config;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        bridge = %config.target,
        node = %config.handshake.node,
        node_port = config.handshake.port,
        read_timeout_ms = config.read_timeout.as_millis() as u64,
        "Starting meshmesh-probe"
    );

    // One connection, no concurrency: a current-thread runtime is enough.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let client = Client::new(config);
    let outcome = runtime.block_on(client.run(interrupted()));

    Ok(finish(outcome))
}

/// Log the session outcome once and map it to the process exit code.
fn finish(outcome: Result<SessionReport, ClientError>) -> ExitCode {
    match outcome {
        Ok(report) => {
            info!(
                ack = ?report.ack,
                payload_sent = report.payload_sent,
                pings = report.pings_answered,
                "Probe finished"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Probe failed");
            ExitCode::FAILURE
        }
    }
}

/// Resolves on Ctrl-C.
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
