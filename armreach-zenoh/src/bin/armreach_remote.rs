//! Armreach remote client
//!
//! Runs a solve session against a Zenoh solve server, falling back to the
//! local engine when the server does not answer.

use anyhow::{Context, Result};
use armreach_zenoh::{
    ReachService, SessionTelemetry, SolveBackend, Toolpath, ZenohSolveBackend, ZenohTelemetry,
    DEFAULT_TOPIC_PREFIX, DISCOVER_KEY,
};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use zenoh::Session;

#[derive(Parser)]
#[command(name = "armreach-remote")]
#[command(about = "Solve toolpaths on a remote armreach server via Zenoh")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Path to the engine configuration file
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve a toolpath file (JSON or YAML)
    Solve {
        toolpath: String,
        /// Per-query timeout in seconds (defaults to a share of the session timeout)
        #[arg(long)]
        timeout: Option<u64>,
        /// Waypoints per remote request (0 sends the whole toolpath)
        #[arg(long)]
        chunk_size: Option<usize>,
        /// Publish session telemetry on Zenoh
        #[arg(long)]
        telemetry: bool,
    },
    /// Discover available services
    Discover,
}

impl Args {
    fn get_config_path(&self) -> String {
        self.config
            .clone()
            .or_else(|| std::env::var("ARMREACH_CONFIG").ok())
            .unwrap_or_else(|| "config/default_config.yaml".to_string())
    }

    fn render<T: serde::Serialize>(&self, value: &T) -> Result<String> {
        Ok(if self.pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let args = Args::parse();
    let session = zenoh::open(zenoh::Config::default())
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to Zenoh network: {}", e))?;

    match &args.command {
        Commands::Solve {
            toolpath,
            timeout,
            chunk_size,
            telemetry,
        } => solve(&args, session, toolpath, *timeout, *chunk_size, *telemetry).await,
        Commands::Discover => discover(&args, &session).await,
    }
}

async fn solve(
    args: &Args,
    session: Session,
    toolpath_path: &str,
    timeout: Option<u64>,
    chunk_size: Option<usize>,
    telemetry: bool,
) -> Result<()> {
    let mut service = ReachService::new_with_config(&args.get_config_path())
        .context("Failed to load engine configuration")?;
    if telemetry {
        let publisher = ZenohTelemetry::with_session(session.clone(), DEFAULT_TOPIC_PREFIX).await?;
        service = service.with_telemetry(Arc::new(publisher) as Arc<dyn SessionTelemetry>);
    }

    let toolpath = Toolpath::load_from_path(toolpath_path).context("Failed to load toolpath")?;
    let mut backend = ZenohSolveBackend::with_session(session).with_engine_config(service.config());
    if let Some(secs) = timeout {
        backend = backend.with_timeout(Duration::from_secs(secs));
    }
    if chunk_size.is_some() {
        backend = backend.with_chunk_size(chunk_size);
    }

    let mut controller = service.session(Some(Arc::new(backend) as Arc<dyn SolveBackend>));
    let handle = controller.handle();
    ctrlc::set_handler(move || {
        warn!("Interrupted, cancelling session");
        handle.cancel();
    })
    .context("Failed to set signal handler")?;

    info!("Solving {} waypoints remotely", toolpath.waypoints.len());
    let outcome = controller.run(service.job(&toolpath)).await?.clone();
    let report = service.analyze(&outcome.result, &toolpath);

    println!(
        "{}",
        args.render(&serde_json::json!({ "outcome": outcome, "quality": report }))?
    );
    Ok(())
}

async fn discover(args: &Args, session: &Session) -> Result<()> {
    let replies = session
        .get(DISCOVER_KEY)
        .timeout(Duration::from_secs(5))
        .await
        .map_err(|e| anyhow::anyhow!("Failed to send discovery request: {}", e))?;

    while let Ok(reply) = replies.recv_async().await {
        if let Ok(sample) = reply.into_result() {
            let response: serde_json::Value = serde_json::from_slice(&sample.payload().to_bytes())
                .context("Failed to parse discovery response")?;
            println!("{}", args.render(&response)?);
            return Ok(());
        }
    }

    anyhow::bail!("No response received from armreach server");
}
