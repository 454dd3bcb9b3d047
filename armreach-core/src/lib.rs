//! Armreach Core - IPC-agnostic kinematics and reachability engine
//!
//! This library decides whether and how a 6-axis arm can follow a toolpath,
//! without any transport or IPC dependencies. It can be embedded in
//! applications using any communication framework (Zenoh, HTTP, gRPC, ...).
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use armreach_core::{ConsoleTelemetry, ReachService, Toolpath};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = ReachService::new_with_config("config/default_config.yaml")?
//!         .with_telemetry(Arc::new(ConsoleTelemetry::pretty()));
//!
//!     let toolpath = Toolpath::load_from_path("job.yaml")?;
//!     let (outcome, report) = service.solve_toolpath(&toolpath).await?;
//!     println!(
//!         "{:.1}% reachable, quality {:.1}",
//!         outcome.result.reachability_percent, report.overall_score
//!     );
//!
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **DhKinematicModel**: robot geometry, joint limits and forward kinematics
//! - **FrameConverter**: scene / slicer / robot base conversions
//! - **TcpComposer**: flange ↔ tool-tip composition and the tool-down wrist policy
//! - **IkSolver**: single-target inverse kinematics
//! - **TrajectoryBatchSolver**: continuity-seeded, chunkable, cooperative batch solving
//! - **ReachabilityQualityAnalyzer**: singularity zones and composite quality score
//! - **IkSessionController**: session state machine, cancellation, fallback, home padding
//! - **ReachService**: high-level wrapper wiring all of the above from configuration
//! - **SessionTelemetry**: transport-agnostic session telemetry interface

pub mod config;
pub mod error;
pub mod frames;
pub mod model;
pub mod quality;
pub mod service;
pub mod session;
pub mod solver;
pub mod tcp;
pub mod telemetry;
pub mod toolpath;
pub mod trajectory;
pub mod wire;

// High-level exports for easy usage
pub use service::ReachService;
pub use config::{EngineConfig, RobotConfig};
pub use error::{ReachError, Result};
pub use session::{
    IkSessionController, SessionHandle, SessionOutcome, SessionState, SolveBackend, SolveJob,
};
pub use telemetry::{ConsoleTelemetry, NoOpTelemetry, SessionTelemetry};
pub use toolpath::{SegmentType, Toolpath, Waypoint};
pub use trajectory::TrajectoryResult;
pub use quality::QualityReport;

// Core component exports for advanced usage
pub use config::{BatchConfig, LinkConfig, SessionConfig, SolverConfig};
pub use frames::{Frame, FrameConverter, PartPlacement, Pose, RobotMount};
pub use model::{DhKinematicModel, DhLink, JointLimit, JointVector, AXES};
pub use quality::{QualityWeights, ReachabilityQualityAnalyzer, ToolpathMetrics};
pub use session::LocalBackend;
pub use solver::{IkConfig, IkFailure, IkResult, IkSolver, IkTarget};
pub use tcp::{TcpComposer, TcpOffset, ToolAxis};
pub use trajectory::{OrientationMode, TrajectoryBatchSolver, TrajectoryChunk};
pub use wire::{ErrorPayload, SolveRequest, SolveResponse};

// Telemetry exports
pub use telemetry::{ProgressData, SessionEvent};
