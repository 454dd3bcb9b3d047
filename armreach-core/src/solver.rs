//! Single-target inverse kinematics
//!
//! Base rotation is solved in closed form from the wrist center, shoulder
//! and elbow are refined with damped least squares on the wrist-center
//! position, and the wrist is either set by the tool-down policy
//! (position-only targets) or decomposed from the requested orientation.
//!
//! Because the base angle comes from the wrist-center azimuth, a target off
//! the `x`-`z` plane converges exactly like its in-plane twin.
//!
//! Known limitation: only the front-reach base angle (`atan2` of the wrist
//! center, shifted by whole turns to fit the joint range) is tried. The
//! back-reach branch at `atan2 + π`, with the shoulder flipped over the base,
//! is never searched, so targets reachable only that way report `OutOfReach`
//! or `NonConvergent`.

use crate::error::{ReachError, Result};
use crate::frames::{Frame, Pose};
use crate::model::{DhKinematicModel, JointVector};
use crate::tcp::{tool_down_rotation, TcpComposer};
use nalgebra::{Isometry3, Matrix2x3, Matrix3, Matrix3x2, Point3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, PI, TAU};
use std::sync::Arc;
use tracing::trace;

const STRUCTURE_EPS: f64 = 1e-9;

/// Solver tuning
#[derive(Debug, Clone, PartialEq)]
pub struct IkConfig {
    /// Flange position tolerance (meters)
    pub position_tolerance: f64,
    /// Flange orientation tolerance (radians), explicit orientations only
    pub orientation_tolerance: f64,
    pub max_iterations: u32,
    /// Damping factor (lambda)
    pub damping: f64,
    /// Largest shoulder/elbow update per iteration (radians)
    pub max_step: f64,
    /// Seed used when no previous joint vector is supplied
    pub default_seed: JointVector,
}

impl Default for IkConfig {
    fn default() -> Self {
        Self {
            position_tolerance: 1e-4,
            orientation_tolerance: 1e-3,
            max_iterations: 100,
            damping: 0.01,
            max_step: 0.3,
            default_seed: JointVector::new([0.0, -0.6, 1.2, 0.0, -0.6, 0.0]),
        }
    }
}

/// Flange target in the robot base frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IkTarget {
    pub position: Point3<f64>,
    /// `None` selects the tool-down wrist policy
    pub orientation: Option<UnitQuaternion<f64>>,
}

impl IkTarget {
    pub fn position(position: Point3<f64>) -> Self {
        Self {
            position,
            orientation: None,
        }
    }

    pub fn pose(position: Point3<f64>, orientation: UnitQuaternion<f64>) -> Self {
        Self {
            position,
            orientation: Some(orientation),
        }
    }

    /// Full-pose target; the pose must already be in the robot base frame
    pub fn from_pose(pose: &Pose) -> Result<Self> {
        pose.expect_frame(Frame::RobotBase)?;
        Ok(Self::pose(pose.position, pose.rotation))
    }
}

/// Why a target could not be solved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IkFailure {
    /// Rejected before iterating
    OutOfReach,
    /// Iterations exhausted or tolerance missed
    NonConvergent,
    /// The only matching configuration violates a joint range
    JointLimit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IkResult {
    /// Always `None` when `reachable` is false
    pub joints: Option<JointVector>,
    pub reachable: bool,
    /// Flange position error (meters)
    pub residual_error: f64,
    /// Flange orientation error (radians), zero for position-only targets
    #[serde(default)]
    pub orientation_error: f64,
    pub iterations: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<IkFailure>,
}

impl IkResult {
    fn solved(
        joints: JointVector,
        residual_error: f64,
        orientation_error: f64,
        iterations: u32,
    ) -> Self {
        Self {
            joints: Some(joints),
            reachable: true,
            residual_error,
            orientation_error,
            iterations,
            failure: None,
        }
    }

    fn failed(failure: IkFailure, residual_error: f64, iterations: u32) -> Self {
        Self {
            joints: None,
            reachable: false,
            residual_error,
            orientation_error: 0.0,
            iterations,
            failure: Some(failure),
        }
    }

    /// Solved joints, or the failure as a [`ReachError`]
    pub fn into_result(self) -> Result<JointVector> {
        let residual = self.residual_error;
        match (self.joints, self.failure) {
            (Some(joints), None) if self.reachable => Ok(joints),
            (_, Some(IkFailure::OutOfReach)) => Err(ReachError::OutOfReach { excess: residual }),
            (_, Some(IkFailure::JointLimit)) => Err(ReachError::JointLimit { residual }),
            _ => Err(ReachError::NonConvergent {
                iterations: self.iterations,
                residual,
            }),
        }
    }
}

/// Inverse kinematics for a wrist-partitioned six-axis arm
#[derive(Debug, Clone)]
pub struct IkSolver {
    model: Arc<DhKinematicModel>,
    config: IkConfig,
    /// +1 or -1, sign of the joint-4 twist
    wrist_sign: f64,
}

impl IkSolver {
    /// Create a solver, rejecting geometries without a spherical wrist
    pub fn new(model: Arc<DhKinematicModel>, config: IkConfig) -> Result<Self> {
        let l = model.links();
        let spherical = l[3].a.abs() < STRUCTURE_EPS
            && l[4].a.abs() < STRUCTURE_EPS
            && l[4].d.abs() < STRUCTURE_EPS
            && l[5].a.abs() < STRUCTURE_EPS
            && l[5].alpha.abs() < STRUCTURE_EPS
            && (l[3].alpha.abs() - FRAC_PI_2).abs() < STRUCTURE_EPS
            && (l[3].alpha + l[4].alpha).abs() < STRUCTURE_EPS;
        if !spherical {
            return Err(ReachError::Geometry(format!(
                "model '{}' has no spherical wrist (joints 4-6 must intersect)",
                model.name()
            )));
        }
        if config.max_iterations == 0 || config.position_tolerance <= 0.0 {
            return Err(ReachError::Config(
                "IK needs at least one iteration and a positive tolerance".to_string(),
            ));
        }

        let wrist_sign = l[3].alpha.signum();
        Ok(Self {
            model,
            config,
            wrist_sign,
        })
    }

    pub fn with_defaults(model: Arc<DhKinematicModel>) -> Result<Self> {
        Self::new(model, IkConfig::default())
    }

    pub fn model(&self) -> &Arc<DhKinematicModel> {
        &self.model
    }

    pub fn config(&self) -> &IkConfig {
        &self.config
    }

    /// Solve for a flange target, seeding from `previous` when given
    pub fn solve(&self, target: &IkTarget, previous: Option<&JointVector>) -> IkResult {
        let seed = previous.copied().unwrap_or(self.config.default_seed);
        let links = self.model.links();

        let distance = target.position.coords.norm();
        let max_reach = self.model.max_reach();
        if distance > max_reach + self.config.position_tolerance {
            return IkResult::failed(IkFailure::OutOfReach, distance - max_reach, 0);
        }

        let d6 = links[5].d;
        let approach_offset = match target.orientation {
            Some(rotation) => rotation * Vector3::new(0.0, 0.0, d6),
            None => tool_down_rotation(0.0) * Vector3::new(0.0, 0.0, d6),
        };
        let wrist_center = target.position - approach_offset;

        // Base rotation
        let horizontal = wrist_center.x.hypot(wrist_center.y);
        let theta1 = if horizontal < STRUCTURE_EPS {
            seed.axis(1)
        } else {
            let raw = wrist_center.y.atan2(wrist_center.x);
            let limit = links[0].limit;
            let candidates = [raw, raw - TAU, raw + TAU];
            match candidates
                .iter()
                .copied()
                .filter(|c| limit.contains(*c, 0.0))
                .min_by(|a, b| (a - seed.axis(1)).abs().total_cmp(&(b - seed.axis(1)).abs()))
            {
                Some(theta1) => theta1,
                None => {
                    let excess = (raw - limit.clamp(raw)).abs();
                    return IkResult::failed(IkFailure::JointLimit, excess * horizontal, 0);
                }
            }
        };

        let shoulder = links[0].transform(theta1).translation.vector;
        let arm_span = links[1].a.abs() + links[2].a.hypot(links[3].d);
        let shoulder_distance = (wrist_center.coords - shoulder).norm();
        if shoulder_distance > arm_span + self.config.position_tolerance {
            return IkResult::failed(IkFailure::OutOfReach, shoulder_distance - arm_span, 0);
        }

        // Shoulder and elbow
        let (theta2, theta3, iterations, wc_error) = self.refine_arm(theta1, &seed, &wrist_center);
        if wc_error > self.config.position_tolerance {
            trace!(
                "IK non-convergent after {} iterations, residual {:.6} m",
                iterations,
                wc_error
            );
            return IkResult::failed(IkFailure::NonConvergent, wc_error, iterations);
        }

        // Wrist
        let joints = match target.orientation {
            None => TcpComposer::tool_down_joints(&self.model, [theta1, theta2, theta3]),
            Some(rotation) => {
                let arm = JointVector::new([theta1, theta2, theta3, 0.0, 0.0, 0.0]);
                let r03 = self.model.frames(&arm)[2].rotation.to_rotation_matrix();
                let r36 = r03.matrix().transpose() * rotation.to_rotation_matrix().matrix();
                let [q4, q5, q6] = self.decompose_wrist(&r36, &seed);
                JointVector::new([theta1, theta2, theta3, q4, q5, q6])
            }
        };

        let reached = self.model.forward(&joints);
        let residual = (reached.position - target.position).norm();
        let orientation_error = target
            .orientation
            .map(|r| reached.rotation.angle_to(&r))
            .unwrap_or(0.0);

        if !self.model.within_limits(&joints, STRUCTURE_EPS) {
            return IkResult::failed(IkFailure::JointLimit, residual, iterations);
        }
        if residual > self.config.position_tolerance
            || orientation_error > self.config.orientation_tolerance
        {
            return IkResult {
                orientation_error,
                ..IkResult::failed(IkFailure::NonConvergent, residual, iterations)
            };
        }

        IkResult::solved(joints, residual, orientation_error, iterations)
    }

    /// Wrist center (and the frames it depends on) for base/shoulder/elbow angles
    fn arm_frames(
        &self,
        theta1: f64,
        theta2: f64,
        theta3: f64,
    ) -> ([Isometry3<f64>; 3], Point3<f64>) {
        let links = self.model.links();
        let t1 = links[0].transform(theta1);
        let t2 = t1 * links[1].transform(theta2);
        let t3 = t2 * links[2].transform(theta3);
        let wc = t3 * Point3::new(0.0, 0.0, links[3].d);
        ([t1, t2, t3], wc)
    }

    /// Damped least squares on the wrist-center position
    ///
    /// Returns shoulder, elbow, iterations used and the final error.
    fn refine_arm(
        &self,
        theta1: f64,
        seed: &JointVector,
        target: &Point3<f64>,
    ) -> (f64, f64, u32, f64) {
        let limit2 = self.model.link(2).limit;
        let limit3 = self.model.link(3).limit;
        let mut q2 = limit2.clamp(seed.axis(2));
        let mut q3 = limit3.clamp(seed.axis(3));
        let lambda2 = self.config.damping * self.config.damping;

        for iteration in 0..self.config.max_iterations {
            let ([t1, t2, _], wc) = self.arm_frames(theta1, q2, q3);
            let error = *target - wc;
            let error_norm = error.norm();
            if error_norm <= self.config.position_tolerance {
                return (q2, q3, iteration, error_norm);
            }

            let z1 = t1.rotation * Vector3::z();
            let z2 = t2.rotation * Vector3::z();
            let j2 = z1.cross(&(wc.coords - t1.translation.vector));
            let j3 = z2.cross(&(wc.coords - t2.translation.vector));
            let jacobian = Matrix3x2::from_columns(&[j2, j3]);

            // dq = J^T (J J^T + lambda^2 I)^-1 e
            let damped = jacobian * jacobian.transpose() + Matrix3::identity() * lambda2;
            let Some(damped_inv) = damped.try_inverse() else {
                return (q2, q3, iteration, error_norm);
            };
            let jt: Matrix2x3<f64> = jacobian.transpose();
            let mut dq = jt * damped_inv * error;
            let step = dq.norm();
            if step > self.config.max_step {
                dq *= self.config.max_step / step;
            }

            q2 = limit2.clamp(q2 + dq[0]);
            q3 = limit3.clamp(q3 + dq[1]);
        }

        let (_, wc) = self.arm_frames(theta1, q2, q3);
        (q2, q3, self.config.max_iterations, (*target - wc).norm())
    }

    /// Split the wrist rotation into joints 4-6, closest branch to the seed
    ///
    /// With alternating ±90° twists the wrist is `Rz(q4) · Ry(-s·q5) · Rz(q6)`
    /// where `s` is the sign of the joint-4 twist.
    fn decompose_wrist(&self, r36: &Matrix3<f64>, seed: &JointVector) -> [f64; 3] {
        let (s4, s5, s6) = (seed.axis(4), seed.axis(5), seed.axis(6));
        let sin_b = r36[(0, 2)].hypot(r36[(1, 2)]);
        let cos_b = r36[(2, 2)];

        if sin_b < 1e-9 {
            // Joint 4 and 6 axes align; keep the seed's joint 4
            let q5 = if cos_b > 0.0 { 0.0 } else { -self.wrist_sign * PI };
            let q4 = s4;
            let q6 = if cos_b > 0.0 {
                r36[(1, 0)].atan2(r36[(0, 0)]) - q4
            } else {
                q4 - (-r36[(1, 0)]).atan2(-r36[(0, 0)])
            };
            return [q4, wrap_near(q5, s5), wrap_near(q6, s6)];
        }

        let b = sin_b.atan2(cos_b);
        let candidates = [
            [
                r36[(1, 2)].atan2(r36[(0, 2)]),
                -self.wrist_sign * b,
                r36[(2, 1)].atan2(-r36[(2, 0)]),
            ],
            [
                (-r36[(1, 2)]).atan2(-r36[(0, 2)]),
                self.wrist_sign * b,
                (-r36[(2, 1)]).atan2(r36[(2, 0)]),
            ],
        ]
        .map(|[q4, q5, q6]| [wrap_near(q4, s4), q5, wrap_near(q6, s6)]);

        let links = self.model.links();
        let cost = |c: &[f64; 3]| {
            let in_limits = (0..3).all(|i| links[3 + i].limit.contains(c[i], STRUCTURE_EPS));
            let distance = (c[0] - s4).abs() + (c[1] - s5).abs() + (c[2] - s6).abs();
            (!in_limits, distance)
        };
        let [first, second] = candidates;
        let (cost_first, cost_second) = (cost(&first), cost(&second));
        let first_wins = match cost_first.0.cmp(&cost_second.0) {
            std::cmp::Ordering::Equal => cost_first.1 <= cost_second.1,
            ordering => ordering.is_lt(),
        };
        if first_wins {
            first
        } else {
            second
        }
    }
}

/// `angle` shifted by whole turns to land closest to `reference`
fn wrap_near(angle: f64, reference: f64) -> f64 {
    angle + TAU * ((reference - angle) / TAU).round()
}
