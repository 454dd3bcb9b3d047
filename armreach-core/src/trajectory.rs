//! Trajectory batch solving with joint-continuity seeding

use crate::error::{ReachError, Result};
use crate::frames::{Frame, Pose};
use crate::model::JointVector;
use crate::solver::{IkResult, IkSolver, IkTarget};
use crate::tcp::{TcpComposer, TcpOffset};
use crate::toolpath::Waypoint;
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Joint trajectory with its reachability mask and counts
///
/// `trajectory[i]` is `None` exactly when `reachability[i]` is false.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrajectoryResult {
    pub trajectory: Vec<Option<JointVector>>,
    pub reachability: Vec<bool>,
    pub reachable_count: usize,
    pub total_points: usize,
    pub reachability_percent: f64,
}

impl TrajectoryResult {
    pub fn from_entries(trajectory: Vec<Option<JointVector>>) -> Self {
        let mut result = Self {
            reachability: trajectory.iter().map(Option::is_some).collect(),
            trajectory,
            ..Self::default()
        };
        result.recount();
        result
    }

    /// Recompute mask-derived counts after the entries changed
    pub fn recount(&mut self) {
        self.total_points = self.reachability.len();
        self.reachable_count = self.reachability.iter().filter(|r| **r).count();
        self.reachability_percent = percent(self.reachable_count, self.total_points);
    }

    fn push(&mut self, result: &IkResult) {
        let joints = if result.reachable { result.joints } else { None };
        self.reachability.push(joints.is_some());
        self.trajectory.push(joints);
    }

    /// Append a later chunk without touching earlier entries
    pub fn append(&mut self, chunk: TrajectoryResult) {
        self.trajectory.extend(chunk.trajectory);
        self.reachability.extend(chunk.reachability);
        self.recount();
    }

    pub fn last_reachable(&self) -> Option<JointVector> {
        self.trajectory.iter().rev().find_map(|j| *j)
    }

    pub fn is_empty(&self) -> bool {
        self.trajectory.is_empty()
    }

    pub fn len(&self) -> usize {
        self.trajectory.len()
    }
}

/// `part / total × 100`, zero for an empty total
pub fn percent(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

/// Tool orientation requested for each waypoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrientationMode {
    /// Position-only targets with the tool pointing straight down
    #[default]
    ToolDown,
    /// Tool axis against the waypoint normal where one is given
    FollowNormal,
}

/// One solved slice of a longer toolpath
#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryChunk {
    /// Index of the first waypoint in this chunk
    pub start: usize,
    pub result: TrajectoryResult,
    /// Seed for the next chunk
    pub last_reachable: Option<JointVector>,
}

/// Sequences IK solves over an ordered waypoint list
#[derive(Debug, Clone)]
pub struct TrajectoryBatchSolver {
    solver: Arc<IkSolver>,
    orientation_mode: OrientationMode,
    yield_every: usize,
}

impl TrajectoryBatchSolver {
    pub const DEFAULT_YIELD_EVERY: usize = 25;

    pub fn new(solver: Arc<IkSolver>) -> Self {
        Self {
            solver,
            orientation_mode: OrientationMode::default(),
            yield_every: Self::DEFAULT_YIELD_EVERY,
        }
    }

    pub fn with_orientation_mode(mut self, mode: OrientationMode) -> Self {
        self.orientation_mode = mode;
        self
    }

    pub fn with_yield_every(mut self, yield_every: usize) -> Self {
        self.yield_every = yield_every.max(1);
        self
    }

    pub fn solver(&self) -> &Arc<IkSolver> {
        &self.solver
    }

    pub fn orientation_mode(&self) -> OrientationMode {
        self.orientation_mode
    }

    /// Flange target for a tool-tip waypoint in the robot base frame
    pub fn flange_target(&self, composer: &TcpComposer, waypoint: &Waypoint) -> IkTarget {
        let tip = Point3::from(waypoint.position);
        let normal = match self.orientation_mode {
            OrientationMode::FollowNormal => waypoint
                .normal
                .map(Vector3::from)
                .and_then(|n| n.try_normalize(f64::EPSILON)),
            OrientationMode::ToolDown => None,
        };

        match normal {
            Some(normal) => {
                let theta1 = tip.y.atan2(tip.x);
                let rotation = composer.tool_orientation_from_normal(&normal, theta1);
                let tool = Pose::new(Frame::RobotBase, tip, rotation);
                let flange = composer.flange_target_from_tool(&tool);
                IkTarget::pose(flange.position, flange.rotation)
            }
            None => IkTarget::position(composer.flange_position_tool_down(&tip)),
        }
    }

    /// Solve every waypoint (robot base frame, meters)
    pub fn solve_all(
        &self,
        waypoints: &[Waypoint],
        tcp_offset: &TcpOffset,
        initial_guess: Option<&JointVector>,
    ) -> TrajectoryResult {
        self.solve_range(waypoints, tcp_offset, initial_guess, 0, None).result
    }

    /// Solve `waypoints[start..start + chunk_size]`
    ///
    /// A zero or missing `chunk_size` solves the whole remaining range.
    /// `seed` is the last reachable joint vector before `start`.
    pub fn solve_range(
        &self,
        waypoints: &[Waypoint],
        tcp_offset: &TcpOffset,
        seed: Option<&JointVector>,
        start: usize,
        chunk_size: Option<usize>,
    ) -> TrajectoryChunk {
        let start = start.min(waypoints.len());
        let end = match chunk_size {
            Some(size) if size > 0 => start.saturating_add(size).min(waypoints.len()),
            _ => waypoints.len(),
        };

        let composer = TcpComposer::new(*tcp_offset);
        let mut result = TrajectoryResult::default();
        let mut last_reachable = seed.copied();

        for waypoint in &waypoints[start..end] {
            let ik = self.solve_point(&composer, waypoint, last_reachable.as_ref());
            result.push(&ik);
            if let Some(joints) = ik.joints.filter(|_| ik.reachable) {
                last_reachable = Some(joints);
            }
        }
        result.recount();

        debug!(
            "Solved waypoints {}..{}: {}/{} reachable",
            start, end, result.reachable_count, result.total_points
        );

        TrajectoryChunk {
            start,
            result,
            last_reachable,
        }
    }

    /// Solve every waypoint without blocking the runtime
    ///
    /// Polls `abort` before each waypoint, yields every `yield_every`
    /// waypoints and stores the number of solved waypoints in `progress`.
    pub async fn solve_all_cooperative(
        &self,
        waypoints: &[Waypoint],
        tcp_offset: &TcpOffset,
        initial_guess: Option<&JointVector>,
        abort: &AtomicBool,
        progress: &AtomicUsize,
    ) -> Result<TrajectoryResult> {
        let composer = TcpComposer::new(*tcp_offset);
        let mut result = TrajectoryResult::default();
        let mut last_reachable = initial_guess.copied();

        for (i, waypoint) in waypoints.iter().enumerate() {
            if abort.load(Ordering::Relaxed) {
                debug!("Batch aborted at waypoint {}/{}", i, waypoints.len());
                return Err(ReachError::Cancelled);
            }

            let ik = self.solve_point(&composer, waypoint, last_reachable.as_ref());
            result.push(&ik);
            if let Some(joints) = ik.joints.filter(|_| ik.reachable) {
                last_reachable = Some(joints);
            }
            progress.store(i + 1, Ordering::Relaxed);

            if (i + 1) % self.yield_every == 0 {
                tokio::task::yield_now().await;
            }
        }

        result.recount();
        Ok(result)
    }

    fn solve_point(
        &self,
        composer: &TcpComposer,
        waypoint: &Waypoint,
        seed: Option<&JointVector>,
    ) -> IkResult {
        let target = self.flange_target(composer, waypoint);
        self.solver.solve(&target, seed)
    }
}
