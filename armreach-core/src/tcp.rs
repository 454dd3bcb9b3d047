//! Tool center point composition
//!
//! The solver always targets the flange; operators specify tool-tip
//! targets. [`TcpComposer`] maps between the two and owns the tool-down
//! wrist policy used for position-only targets.

use crate::frames::{Frame, Pose};
use crate::model::{DhKinematicModel, JointVector};
use nalgebra::{Isometry3, Point3, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Tool-local axis that points at the workpiece
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolAxis {
    X,
    Y,
    #[default]
    Z,
}

impl ToolAxis {
    pub fn unit(&self) -> Vector3<f64> {
        match self {
            ToolAxis::X => Vector3::x(),
            ToolAxis::Y => Vector3::y(),
            ToolAxis::Z => Vector3::z(),
        }
    }
}

/// Six-DOF tool offset relative to the flange
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TcpOffset {
    /// Translation in the flange frame (meters)
    pub translation_m: [f64; 3],
    /// Euler ZYX rotation `[rx, ry, rz]` (degrees)
    #[serde(default)]
    pub rotation_deg: [f64; 3],
    #[serde(default)]
    pub axis: ToolAxis,
    /// Carried for downstream load calculations only
    #[serde(default)]
    pub mass_kg: f64,
}

impl TcpOffset {
    /// Straight tool of `length` meters along the flange approach axis
    pub fn straight(length: f64) -> Self {
        Self {
            translation_m: [0.0, 0.0, length],
            rotation_deg: [0.0; 3],
            axis: ToolAxis::Z,
            mass_kg: 0.0,
        }
    }

    pub fn rotation(&self) -> UnitQuaternion<f64> {
        let [rx, ry, rz] = self.rotation_deg;
        UnitQuaternion::from_euler_angles(rx.to_radians(), ry.to_radians(), rz.to_radians())
    }

    pub fn isometry(&self) -> Isometry3<f64> {
        let translation = Translation3::from(Vector3::from(self.translation_m));
        Isometry3::from_parts(translation, self.rotation())
    }

    pub fn length(&self) -> f64 {
        Vector3::from(self.translation_m).norm()
    }
}

impl Default for TcpOffset {
    fn default() -> Self {
        Self::straight(0.0)
    }
}

/// Flange orientation of the tool-down convention for base angle `theta1`
pub fn tool_down_rotation(theta1: f64) -> UnitQuaternion<f64> {
    UnitQuaternion::from_axis_angle(&Vector3::z_axis(), theta1)
        * UnitQuaternion::from_axis_angle(&Vector3::x_axis(), PI)
}

/// Composes flange poses with one tool offset
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TcpComposer {
    offset: TcpOffset,
}

impl TcpComposer {
    /// Fixed-point iterations for the base angle of position-only targets
    const TOOL_DOWN_ITERATIONS: usize = 4;

    pub fn new(offset: TcpOffset) -> Self {
        Self { offset }
    }

    pub fn offset(&self) -> &TcpOffset {
        &self.offset
    }

    /// Tool-tip pose for a flange pose
    pub fn tool_pose_from_flange(&self, flange: &Pose) -> Pose {
        Pose::from_isometry(flange.frame, flange.isometry() * self.offset.isometry())
    }

    /// Flange pose that puts the tool tip at `tool` (exact inverse)
    pub fn flange_target_from_tool(&self, tool: &Pose) -> Pose {
        Pose::from_isometry(tool.frame, tool.isometry() * self.offset.isometry().inverse())
    }

    /// Flange position for a tool-tip position under the tool-down convention
    ///
    /// The flange yaw follows the base rotation, which itself depends on
    /// the flange position, so lateral tool offsets are resolved by a few
    /// fixed-point passes.
    pub fn flange_position_tool_down(&self, tip: &Point3<f64>) -> Point3<f64> {
        let t = Vector3::from(self.offset.translation_m);
        let mut flange = *tip;
        for _ in 0..Self::TOOL_DOWN_ITERATIONS {
            let theta1 = flange.y.atan2(flange.x);
            flange = *tip - tool_down_rotation(theta1) * t;
        }
        flange
    }

    /// Workpiece-facing axis of the tool in the flange pose's frame
    pub fn tool_axis_direction(&self, flange: &Pose) -> Vector3<f64> {
        self.tool_pose_from_flange(flange).rotation * self.offset.axis.unit()
    }

    /// Tool orientation whose working axis points against `normal`
    ///
    /// Starts from the tool-down orientation for `theta1` and applies the
    /// smallest rotation taking straight down onto `-normal`.
    pub fn tool_orientation_from_normal(
        &self,
        normal: &Vector3<f64>,
        theta1: f64,
    ) -> UnitQuaternion<f64> {
        let down_tool = tool_down_rotation(theta1) * self.offset.rotation();
        let current = down_tool * self.offset.axis.unit();
        let tilt = UnitQuaternion::rotation_between(&current, &(-normal))
            .unwrap_or_else(UnitQuaternion::identity);
        tilt * down_tool
    }

    /// Wrist joints of the tool-down policy
    ///
    /// Roll and yaw are zero; pitch cancels the shoulder/elbow sum so the
    /// approach axis stays vertical, clamped to the wrist pitch range.
    pub fn tool_down_wrist(model: &DhKinematicModel, theta2: f64, theta3: f64) -> [f64; 3] {
        let pitch = model.link(5).limit.clamp(-(theta2 + theta3));
        [0.0, pitch, 0.0]
    }

    /// Full joint vector of the tool-down policy for a base/shoulder/elbow triple
    pub fn tool_down_joints(model: &DhKinematicModel, arm: [f64; 3]) -> JointVector {
        let [q4, q5, q6] = Self::tool_down_wrist(model, arm[1], arm[2]);
        JointVector::new([arm[0], arm[1], arm[2], q4, q5, q6])
    }

    /// Tool-tip pose in the robot base frame for a joint vector
    pub fn tool_pose(&self, model: &DhKinematicModel, joints: &JointVector) -> Pose {
        let flange = model.forward(joints);
        debug_assert_eq!(flange.frame, Frame::RobotBase);
        self.tool_pose_from_flange(&flange)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn home_pose_tip_hangs_below_flange() {
        let model = DhKinematicModel::reference_arm();
        let l = model.links();
        for length in [0.0, 0.25, 0.5, 1.0] {
            let composer = TcpComposer::new(TcpOffset::straight(length));
            let tip = composer.tool_pose(&model, &JointVector::ZERO);

            assert_relative_eq!(tip.position.x, l[0].a + l[1].a + l[2].a, epsilon = 1e-12);
            assert_relative_eq!(tip.position.y, 0.0, epsilon = 1e-12);
            assert_relative_eq!(tip.position.z, l[0].d - l[5].d - length, epsilon = 1e-12);
        }
    }

    #[test]
    fn home_pose_tool_along_flange_minus_x_shortens_reach() {
        let model = DhKinematicModel::reference_arm();
        let l = model.links();
        for length in [0.0, 0.25, 0.5, 1.0] {
            let offset = TcpOffset {
                translation_m: [-length, 0.0, 0.0],
                rotation_deg: [0.0; 3],
                axis: ToolAxis::X,
                mass_kg: 0.0,
            };
            let tip = TcpComposer::new(offset).tool_pose(&model, &JointVector::ZERO);

            assert_relative_eq!(tip.position.x, l[0].a + l[1].a + l[2].a - length, epsilon = 1e-12);
            assert_relative_eq!(tip.position.y, 0.0, epsilon = 1e-12);
            assert_relative_eq!(tip.position.z, l[0].d - l[5].d, epsilon = 1e-12);
        }
    }

    #[test]
    fn flange_target_inverts_tool_pose() {
        let offset = TcpOffset {
            translation_m: [0.02, -0.01, 0.3],
            rotation_deg: [10.0, -5.0, 30.0],
            axis: ToolAxis::Z,
            mass_kg: 1.2,
        };
        let composer = TcpComposer::new(offset);
        let flange = Pose::new(
            Frame::RobotBase,
            Point3::new(1.4, 0.3, 0.8),
            UnitQuaternion::from_euler_angles(0.2, -0.4, 1.0),
        );

        let tool = composer.tool_pose_from_flange(&flange);
        let back = composer.flange_target_from_tool(&tool);
        assert_relative_eq!(back.position, flange.position, epsilon = 1e-12);
        assert_relative_eq!(back.rotation.angle_to(&flange.rotation), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn straight_tool_down_flange_sits_above_tip() {
        let composer = TcpComposer::new(TcpOffset::straight(0.5));
        let flange = composer.flange_position_tool_down(&Point3::new(1.8, 0.4, 0.1));
        assert_relative_eq!(flange, Point3::new(1.8, 0.4, 0.6), epsilon = 1e-12);
    }

    #[test]
    fn lateral_tool_offset_follows_base_yaw() {
        let offset = TcpOffset {
            translation_m: [0.1, 0.0, 0.4],
            ..TcpOffset::default()
        };
        let composer = TcpComposer::new(offset);
        let tip = Point3::new(0.0, 1.8, 0.2);
        let flange = composer.flange_position_tool_down(&tip);

        let theta1 = flange.y.atan2(flange.x);
        let rebuilt = flange + tool_down_rotation(theta1) * Vector3::new(0.1, 0.0, 0.4);
        assert_relative_eq!(rebuilt, tip, epsilon = 1e-9);
    }

    #[test]
    fn tool_down_wrist_keeps_approach_vertical() {
        let model = DhKinematicModel::reference_arm();
        let q = TcpComposer::tool_down_joints(&model, [0.4, -0.9, 1.5]);
        let flange = model.forward(&q);
        let approach = flange.rotation * Vector3::z();
        assert_relative_eq!(approach, -Vector3::z(), epsilon = 1e-12);
        assert_relative_eq!(q.axis(5), -(q.axis(2) + q.axis(3)), epsilon = 1e-12);
    }

    #[test]
    fn tool_down_wrist_pitch_is_clamped() {
        let model = DhKinematicModel::reference_arm();
        let wrist = TcpComposer::tool_down_wrist(&model, -2.0, -0.5);
        assert_relative_eq!(wrist[1], model.link(5).limit.max, epsilon = 1e-12);
    }

    #[test]
    fn tool_axis_points_down_at_home() {
        let model = DhKinematicModel::reference_arm();
        let composer = TcpComposer::new(TcpOffset::straight(0.3));
        let dir = composer.tool_axis_direction(&model.forward(&JointVector::ZERO));
        assert_relative_eq!(dir, -Vector3::z(), epsilon = 1e-12);
    }

    #[test]
    fn normal_orientation_points_tool_into_surface() {
        let composer = TcpComposer::new(TcpOffset::straight(0.3));
        let normal = Vector3::new(0.3, 0.0, 1.0).normalize();
        let rotation = composer.tool_orientation_from_normal(&normal, 0.0);
        assert_relative_eq!(rotation * Vector3::z(), -normal, epsilon = 1e-9);
    }
}
