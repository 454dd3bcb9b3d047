//! Armreach solve server with Zenoh transport
//!
//! Answers solve requests on `armreach/solve` until interrupted.

use anyhow::{Context, Result};
use armreach_zenoh::{ReachService, ZenohSolveService, DISCOVER_KEY, SOLVE_KEY};
use clap::Parser;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tracing::info;

#[derive(Parser)]
#[command(name = "armreach-server")]
#[command(about = "Kinematics solve server with Zenoh transport")]
#[command(version)]
struct Args {
    /// Path to the engine configuration file
    #[arg(short, long)]
    config: Option<String>,
}

impl Args {
    fn get_config_path(&self) -> String {
        self.config
            .clone()
            .or_else(|| std::env::var("ARMREACH_CONFIG").ok())
            .unwrap_or_else(|| "config/default_config.yaml".to_string())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let args = Args::parse();
    let config_path = args.get_config_path();

    info!("Starting armreach solve server");
    info!("Configuration file: {}", config_path);

    let reach_service = ReachService::new_with_config(&config_path)
        .context("Failed to load engine configuration")?;
    info!(
        "Robot model '{}' loaded, max reach {:.3} m",
        reach_service.model().name(),
        reach_service.model().max_reach()
    );

    let shutdown_signal = Arc::new(AtomicBool::new(false));
    let shutdown_signal_clone = Arc::clone(&shutdown_signal);
    ctrlc::set_handler(move || {
        info!("Received interrupt signal, shutting down gracefully...");
        shutdown_signal_clone.store(true, Ordering::Relaxed);
    })
    .context("Failed to set signal handler")?;

    let rpc_service = ZenohSolveService::new(reach_service, Arc::clone(&shutdown_signal))
        .await
        .context("Failed to create Zenoh solve service")?;

    rpc_service
        .start_discovery_service()
        .await
        .context("Failed to start discovery service")?;
    rpc_service
        .start_solve_service()
        .await
        .context("Failed to start solve service")?;

    info!("Armreach server running");
    info!("  - {}   (service discovery)", DISCOVER_KEY);
    info!("  - {}      (trajectory solve)", SOLVE_KEY);

    while !shutdown_signal.load(Ordering::Relaxed) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }

    info!("Armreach server shut down successfully");
    Ok(())
}
