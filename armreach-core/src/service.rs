//! Reach Service - High-level wrapper for easy initialization
//!
//! Builds the model, solvers, frame converter and session controllers from
//! one [`EngineConfig`] so applications and transports share a single setup.

use crate::{
    config::EngineConfig,
    error::Result,
    frames::{Frame, FrameConverter, Pose},
    model::{DhKinematicModel, JointVector},
    quality::{QualityReport, ReachabilityQualityAnalyzer, ToolpathMetrics},
    session::{IkSessionController, LocalBackend, SessionOutcome, SolveBackend, SolveJob},
    solver::{IkConfig, IkResult, IkSolver, IkTarget},
    tcp::{TcpComposer, TcpOffset},
    telemetry::{NoOpTelemetry, SessionTelemetry},
    toolpath::{Toolpath, Waypoint},
    trajectory::{TrajectoryBatchSolver, TrajectoryResult},
    wire::SolveRequest,
};
use nalgebra::{Point3, Vector3};
use std::sync::Arc;
use tracing::info;

/// Reach Service - shared engine setup for solving toolpaths
#[derive(Clone)]
pub struct ReachService {
    config: Arc<EngineConfig>,
    model: Arc<DhKinematicModel>,
    batch: TrajectoryBatchSolver,
    fallback_batch: TrajectoryBatchSolver,
    converter: FrameConverter,
    telemetry: Arc<dyn SessionTelemetry>,
}

impl ReachService {
    /// Create a new service from a configuration file
    pub fn new_with_config(config_path: &str) -> Result<Self> {
        Self::new(EngineConfig::load_from_path(config_path)?)
    }

    /// Create a new service from a configuration string
    pub fn new_with_config_str(config_str: &str) -> Result<Self> {
        Self::new(EngineConfig::load_from_str(config_str)?)
    }

    /// Create a new service from a configuration object
    pub fn new(config: EngineConfig) -> Result<Self> {
        let model = Arc::new(config.robot.model()?);
        info!("Initializing reach service for {}", model.name());

        let ik = config.solver().ik_config();
        let batch_config = config.batch();

        // The fallback trades iterations for latency
        let fallback_ik = IkConfig {
            max_iterations: (ik.max_iterations / 2).max(1),
            ..ik.clone()
        };
        let build = |ik: IkConfig| -> Result<TrajectoryBatchSolver> {
            let solver = IkSolver::new(Arc::clone(&model), ik)?;
            Ok(TrajectoryBatchSolver::new(Arc::new(solver))
                .with_orientation_mode(batch_config.orientation_mode())
                .with_yield_every(batch_config.yield_every()))
        };
        let batch = build(ik)?;
        let fallback_batch = build(fallback_ik)?;
        let converter = FrameConverter::new(config.robot.mount());

        Ok(Self {
            config: Arc::new(config),
            model,
            batch,
            fallback_batch,
            converter,
            telemetry: Arc::new(NoOpTelemetry),
        })
    }

    /// Configure telemetry for sessions created by this service
    pub fn with_telemetry(mut self, telemetry: Arc<dyn SessionTelemetry>) -> Self {
        self.telemetry = telemetry;
        info!("Telemetry configured for reach service");
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn model(&self) -> &Arc<DhKinematicModel> {
        &self.model
    }

    pub fn converter(&self) -> &FrameConverter {
        &self.converter
    }

    pub fn tcp_offset(&self) -> &TcpOffset {
        &self.config.tool
    }

    pub fn batch(&self) -> &TrajectoryBatchSolver {
        &self.batch
    }

    /// Flange and tool-tip poses for a joint vector
    pub fn forward(&self, joints: &JointVector) -> (Pose, Pose) {
        let composer = TcpComposer::new(self.config.tool);
        let flange = self.model.forward(joints);
        let tool = composer.tool_pose_from_flange(&flange);
        (flange, tool)
    }

    /// Solve a single tool-tip position (robot base frame) under the batch orientation mode
    pub fn solve_tool_position(
        &self,
        tip: Point3<f64>,
        normal: Option<Vector3<f64>>,
        seed: Option<&JointVector>,
    ) -> IkResult {
        let composer = TcpComposer::new(self.config.tool);
        let waypoint = Waypoint {
            normal: normal.map(Into::into),
            ..Waypoint::at([tip.x, tip.y, tip.z])
        };
        let target = self.batch.flange_target(&composer, &waypoint);
        self.batch.solver().solve(&target, seed)
    }

    /// Joints reaching an explicit flange pose
    ///
    /// Unreachable poses come back as [`ReachError::OutOfReach`],
    /// [`ReachError::NonConvergent`] or [`ReachError::JointLimit`].
    ///
    /// [`ReachError::OutOfReach`]: crate::error::ReachError::OutOfReach
    /// [`ReachError::NonConvergent`]: crate::error::ReachError::NonConvergent
    /// [`ReachError::JointLimit`]: crate::error::ReachError::JointLimit
    pub fn solve_flange_pose(
        &self,
        pose: &Pose,
        seed: Option<&JointVector>,
    ) -> Result<JointVector> {
        let pose = self.converter.pose_to_robot_base(pose)?;
        self.batch.solver().solve(&IkTarget::from_pose(&pose)?, seed).into_result()
    }

    /// Toolpath waypoints converted to the robot base frame (meters)
    pub fn prepare_toolpath(&self, toolpath: &Toolpath) -> Vec<Waypoint> {
        match toolpath.frame {
            Frame::RobotBase => toolpath.waypoints.clone(),
            Frame::Slicer => self
                .converter
                .waypoints_to_robot_base(&toolpath.waypoints, &toolpath.placement),
            Frame::Scene => {
                let as_slicer: Vec<Waypoint> = toolpath
                    .waypoints
                    .iter()
                    .map(|wp| Waypoint {
                        position: FrameConverter::scene_to_slicer(&Vector3::from(wp.position))
                            .into(),
                        normal: wp
                            .normal
                            .map(|n| FrameConverter::scene_to_slicer(&Vector3::from(n)).into()),
                        ..wp.clone()
                    })
                    .collect();
                self.converter
                    .waypoints_to_robot_base(&as_slicer, &toolpath.placement)
            }
        }
    }

    /// Answer a wire request synchronously (chunk-aware)
    pub fn solve_request(&self, request: &SolveRequest) -> TrajectoryResult {
        self.batch
            .solve_range(
                &request.waypoints,
                &request.tcp_offset,
                request.initial_guess.as_ref(),
                request.chunk_start.unwrap_or(0),
                request.chunk_size,
            )
            .result
    }

    pub fn local_backend(&self) -> Arc<LocalBackend> {
        Arc::new(LocalBackend::new(self.batch.clone()))
    }

    pub fn fallback_backend(&self) -> Arc<LocalBackend> {
        Arc::new(LocalBackend::named("local-fallback", self.fallback_batch.clone()))
    }

    /// Session controller over `primary`, or the local solver when `None`
    ///
    /// A remote primary gets the local fallback when the session config allows it.
    pub fn session(&self, primary: Option<Arc<dyn SolveBackend>>) -> IkSessionController {
        let session = self.config.session();
        let remote = primary.is_some();
        let primary = primary.unwrap_or_else(|| self.local_backend() as Arc<dyn SolveBackend>);

        let mut controller = IkSessionController::new(primary, Arc::clone(&self.model))
            .with_telemetry(Arc::clone(&self.telemetry))
            .with_home(self.config.robot.home_joints(), session.home_transit_secs())
            .with_timeout(session.timeout());
        if remote && session.use_fallback() {
            controller = controller.with_fallback(self.fallback_backend());
        }
        controller
    }

    /// Solve job for a toolpath, converted and seeded from the home posture
    pub fn job(&self, toolpath: &Toolpath) -> SolveJob {
        let mut job = SolveJob::new(self.prepare_toolpath(toolpath), self.config.tool);
        job.initial_guess = self.config.robot.home_joints();
        job
    }

    pub fn analyzer(&self) -> ReachabilityQualityAnalyzer {
        ReachabilityQualityAnalyzer::new(self.config.quality())
            .with_smoothness_bound(self.config.batch().smoothness_bound())
    }

    /// Score a solved trajectory against the toolpath it came from
    ///
    /// Home padding endpoints are excluded; they are transits, not toolpath.
    pub fn analyze(&self, result: &TrajectoryResult, toolpath: &Toolpath) -> QualityReport {
        let metrics = ToolpathMetrics::from_waypoints(&toolpath.waypoints);
        let analyzer = self.analyzer();
        if result.len() == toolpath.waypoints.len() + 2 {
            let inner = result.trajectory[1..result.len() - 1].to_vec();
            let unpadded = TrajectoryResult::from_entries(inner);
            analyzer.analyze_trajectory(&unpadded, &metrics)
        } else {
            analyzer.analyze_trajectory(result, &metrics)
        }
    }

    /// Run a full local session over a toolpath and score it
    pub async fn solve_toolpath(
        &self,
        toolpath: &Toolpath,
    ) -> Result<(SessionOutcome, QualityReport)> {
        self.solve_toolpath_with(toolpath, None).await
    }

    /// Run a full session over `primary` (local when `None`) and score it
    pub async fn solve_toolpath_with(
        &self,
        toolpath: &Toolpath,
        primary: Option<Arc<dyn SolveBackend>>,
    ) -> Result<(SessionOutcome, QualityReport)> {
        let mut controller = self.session(primary);
        let outcome = controller.run(self.job(toolpath)).await?.clone();
        let report = self.analyze(&outcome.result, toolpath);
        Ok((outcome, report))
    }
}
