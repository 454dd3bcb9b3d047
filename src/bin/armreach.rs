//! Armreach CLI
//!
//! Local solve sessions, forward and inverse kinematics from the command line.

use anyhow::{Context, Result};
use armreach::json_output::output_event;
use armreach::{
    ConsoleTelemetry, ErrorEvent, ForwardEvent, InverseEvent, JointVector, ReachService,
    SolveResultEvent, Toolpath,
};
use clap::{Parser, Subcommand};
use nalgebra::{Point3, Vector3};
use std::sync::Arc;
use tracing::{error, info, Level};

#[derive(Parser)]
#[command(name = "armreach")]
#[command(about = "Kinematics and reachability engine for 6-axis arms")]
#[command(version)]
struct Args {
    /// Path to the engine configuration file
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,

    /// Show debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve a toolpath file (JSON or YAML) in a local session
    Solve {
        toolpath: String,
        /// Print session telemetry to stderr
        #[arg(long)]
        telemetry: bool,
    },
    /// Forward kinematics of six joint angles (degrees)
    Fk {
        #[arg(num_args = 6, allow_negative_numbers = true)]
        joints: Vec<f64>,
    },
    /// Inverse kinematics of a tool-tip position (robot base frame, meters)
    Ik {
        #[arg(num_args = 3, allow_negative_numbers = true)]
        position: Vec<f64>,
        /// Surface normal to align the tool with
        #[arg(long, num_args = 3, allow_negative_numbers = true)]
        normal: Option<Vec<f64>>,
        /// Seed joint angles (degrees)
        #[arg(long, num_args = 6, allow_negative_numbers = true)]
        seed: Option<Vec<f64>>,
    },
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
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(&args).await {
        error!("{:#}", e);
        output_event(&ErrorEvent::new(&format!("{:#}", e)), args.pretty);
        std::process::exit(1);
    }
    Ok(())
}

async fn run(args: &Args) -> Result<()> {
    let config_path = args.get_config_path();
    let service = ReachService::new_with_config(&config_path)
        .with_context(|| format!("Failed to load engine configuration from {}", config_path))?;

    match &args.command {
        Commands::Solve { toolpath, telemetry } => {
            let service = if *telemetry {
                service.with_telemetry(Arc::new(ConsoleTelemetry::new()))
            } else {
                service
            };
            let toolpath = Toolpath::load_from_path(toolpath).context("Failed to load toolpath")?;
            info!("Solving {} waypoints locally", toolpath.waypoints.len());

            let (outcome, quality) = service.solve_toolpath(&toolpath).await?;
            output_event(&SolveResultEvent::new(outcome, quality), args.pretty);
        }
        Commands::Fk { joints } => {
            let joints = JointVector::from_degrees(to_array(joints)?);
            let (flange, tool) = service.forward(&joints);
            output_event(&ForwardEvent::new(&joints, &flange, &tool), args.pretty);
        }
        Commands::Ik { position, normal, seed } => {
            let target: [f64; 3] = to_array(position)?;
            let normal = normal.as_deref().map(to_array::<3>).transpose()?.map(Vector3::from);
            let seed = seed
                .as_deref()
                .map(to_array::<6>)
                .transpose()?
                .map(JointVector::from_degrees);

            let result = service.solve_tool_position(Point3::from(target), normal, seed.as_ref());
            output_event(&InverseEvent::new(target, result.clone()), args.pretty);
            result.into_result().context("Target not reachable")?;
        }
    }
    Ok(())
}

fn to_array<const N: usize>(values: &[f64]) -> Result<[f64; N]> {
    values
        .try_into()
        .map_err(|_| anyhow::anyhow!("expected {} values, got {}", N, values.len()))
}
