//! Coordinate frames and conversions between them
//!
//! Three frames are in play:
//! - **scene**: Y-up, millimeters. Interactive editing and robot mounting.
//! - **slicer**: Z-up, millimeters. Output of the toolpath producer, centered
//!   on its own origin.
//! - **robot base**: Z-up, meters, origin at the robot mounting point.
//!
//! Positions go through translation, permutation and scaling. Normals only
//! go through the permutation (and the mount yaw), never translation or
//! scaling.

use crate::error::{ReachError, Result};
use crate::toolpath::Waypoint;
use nalgebra::{Isometry3, Matrix3, Point3, Rotation3, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;

const MM_PER_M: f64 = 1000.0;

/// Frame a position or pose is expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frame {
    Scene,
    Slicer,
    RobotBase,
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Frame::Scene => "scene",
            Frame::Slicer => "slicer",
            Frame::RobotBase => "robot_base",
        };
        f.write_str(name)
    }
}

/// Position and orientation tagged with the frame they are expressed in
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub frame: Frame,
    pub position: Point3<f64>,
    pub rotation: UnitQuaternion<f64>,
}

impl Pose {
    pub fn new(frame: Frame, position: Point3<f64>, rotation: UnitQuaternion<f64>) -> Self {
        Self { frame, position, rotation }
    }

    pub fn from_position(frame: Frame, position: Point3<f64>) -> Self {
        Self::new(frame, position, UnitQuaternion::identity())
    }

    pub fn from_isometry(frame: Frame, iso: Isometry3<f64>) -> Self {
        Self::new(frame, Point3::from(iso.translation.vector), iso.rotation)
    }

    pub fn isometry(&self) -> Isometry3<f64> {
        Isometry3::from_parts(Translation3::from(self.position.coords), self.rotation)
    }

    /// Fail unless this pose is expressed in `frame`
    pub fn expect_frame(&self, frame: Frame) -> Result<()> {
        if self.frame == frame {
            Ok(())
        } else {
            Err(ReachError::FrameMismatch {
                expected: frame.to_string(),
                actual: self.frame.to_string(),
            })
        }
    }
}

/// Where the robot stands in the scene
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RobotMount {
    /// Robot base origin in scene coordinates (mm)
    pub position_mm: [f64; 3],
    /// Rotation of the robot about the up axis (degrees)
    #[serde(default)]
    pub yaw_deg: f64,
}

impl Default for RobotMount {
    fn default() -> Self {
        Self {
            position_mm: [0.0; 3],
            yaw_deg: 0.0,
        }
    }
}

/// Workpiece placement relative to the producer's centered output (slicer mm)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PartPlacement {
    pub offset_mm: [f64; 3],
}

/// Scene (x, y-up, z) to slicer / robot base (x, -z, y)
fn scene_to_z_up(v: &Vector3<f64>) -> Vector3<f64> {
    Vector3::new(v.x, -v.z, v.y)
}

fn z_up_to_scene(v: &Vector3<f64>) -> Vector3<f64> {
    Vector3::new(v.x, v.z, -v.y)
}

fn scene_to_z_up_matrix() -> Matrix3<f64> {
    Matrix3::new(
        1.0, 0.0, 0.0,
        0.0, 0.0, -1.0,
        0.0, 1.0, 0.0,
    )
}

/// Stateless frame conversions for one robot mount
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameConverter {
    mount: RobotMount,
}

impl FrameConverter {
    pub fn new(mount: RobotMount) -> Self {
        Self { mount }
    }

    pub fn mount(&self) -> &RobotMount {
        &self.mount
    }

    pub fn scene_to_slicer(p: &Vector3<f64>) -> Vector3<f64> {
        scene_to_z_up(p)
    }

    pub fn slicer_to_scene(p: &Vector3<f64>) -> Vector3<f64> {
        z_up_to_scene(p)
    }

    fn mount_yaw(&self) -> Rotation3<f64> {
        Rotation3::from_axis_angle(&Vector3::z_axis(), self.mount.yaw_deg.to_radians())
    }

    /// Scene point (mm) to robot base point (m)
    pub fn to_robot_base(&self, p_scene: &Vector3<f64>) -> Vector3<f64> {
        let base = Vector3::from(self.mount.position_mm);
        let relative = scene_to_z_up(&(p_scene - base));
        self.mount_yaw().inverse() * relative / MM_PER_M
    }

    /// Robot base point (m) back to scene (mm)
    pub fn from_robot_base(&self, p_base: &Vector3<f64>) -> Vector3<f64> {
        let relative = self.mount_yaw() * (p_base * MM_PER_M);
        z_up_to_scene(&relative) + Vector3::from(self.mount.position_mm)
    }

    /// Scene direction to robot base direction (no translation, no scaling)
    pub fn transform_normal(&self, n_scene: &Vector3<f64>) -> Vector3<f64> {
        let n = self.mount_yaw().inverse() * scene_to_z_up(n_scene);
        n.try_normalize(f64::EPSILON).unwrap_or(n)
    }

    /// Slicer point (mm, centered output) plus part placement to robot base (m)
    pub fn slicer_to_robot_base(
        &self,
        p_slicer: &Vector3<f64>,
        placement: &PartPlacement,
    ) -> Vector3<f64> {
        let placed = p_slicer + Vector3::from(placement.offset_mm);
        self.to_robot_base(&z_up_to_scene(&placed))
    }

    /// Convert a framed pose into the robot base frame
    pub fn pose_to_robot_base(&self, pose: &Pose) -> Result<Pose> {
        let (position, rotation) = match pose.frame {
            Frame::RobotBase => return Ok(*pose),
            Frame::Scene => (
                self.to_robot_base(&pose.position.coords),
                self.scene_rotation_to_robot_base(&pose.rotation),
            ),
            Frame::Slicer => {
                let scene = z_up_to_scene(&pose.position.coords);
                let scene_rotation = pose.rotation.to_rotation_matrix();
                let p = scene_to_z_up_matrix();
                let in_scene =
                    UnitQuaternion::from_matrix(&(p.transpose() * scene_rotation.matrix() * p));
                (self.to_robot_base(&scene), self.scene_rotation_to_robot_base(&in_scene))
            }
        };
        Ok(Pose::new(Frame::RobotBase, Point3::from(position), rotation))
    }

    fn scene_rotation_to_robot_base(&self, rotation: &UnitQuaternion<f64>) -> UnitQuaternion<f64> {
        let p = scene_to_z_up_matrix();
        let permuted = p * rotation.to_rotation_matrix().matrix() * p.transpose();
        UnitQuaternion::from_rotation_matrix(&self.mount_yaw()).inverse()
            * UnitQuaternion::from_matrix(&permuted)
    }

    /// Convert producer waypoints (slicer mm) to robot base waypoints (m)
    ///
    /// The part offset is applied before conversion because the producer
    /// emits geometry centered at its own origin. Metadata is untouched.
    pub fn waypoints_to_robot_base(
        &self,
        waypoints: &[Waypoint],
        placement: &PartPlacement,
    ) -> Vec<Waypoint> {
        waypoints
            .iter()
            .map(|wp| {
                let position = self.slicer_to_robot_base(&Vector3::from(wp.position), placement);
                let normal = wp
                    .normal
                    .map(|n| self.transform_normal(&z_up_to_scene(&Vector3::from(n))).into());
                Waypoint {
                    position: position.into(),
                    normal,
                    ..wp.clone()
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn scene_and_slicer_swap_height_and_depth() {
        let scene = Vector3::new(10.0, 20.0, 30.0);
        let slicer = FrameConverter::scene_to_slicer(&scene);
        assert_eq!(slicer, Vector3::new(10.0, -30.0, 20.0));
        assert_eq!(FrameConverter::slicer_to_scene(&slicer), scene);
    }

    #[test]
    fn robot_base_subtracts_mount_and_scales() {
        let converter = FrameConverter::new(RobotMount {
            position_mm: [100.0, 0.0, -200.0],
            yaw_deg: 0.0,
        });
        let p = converter.to_robot_base(&Vector3::new(1600.0, 100.0, -200.0));
        assert_relative_eq!(p, Vector3::new(1.5, 0.0, 0.1), epsilon = 1e-12);

        let back = converter.from_robot_base(&p);
        assert_relative_eq!(back, Vector3::new(1600.0, 100.0, -200.0), epsilon = 1e-9);
    }

    #[test]
    fn normals_ignore_translation_and_scale() {
        let converter = FrameConverter::new(RobotMount {
            position_mm: [5000.0, 300.0, 700.0],
            yaw_deg: 0.0,
        });
        let up_in_scene = Vector3::new(0.0, 1.0, 0.0);
        assert_relative_eq!(
            converter.transform_normal(&up_in_scene),
            Vector3::z(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn mount_yaw_rotates_positions_and_normals() {
        let converter = FrameConverter::new(RobotMount {
            position_mm: [0.0; 3],
            yaw_deg: 90.0,
        });
        // Scene +x is robot -y when the robot faces scene -z
        let p = converter.to_robot_base(&Vector3::new(1000.0, 0.0, 0.0));
        assert_relative_eq!(p, Vector3::new(0.0, -1.0, 0.0), epsilon = 1e-12);
        let n = converter.transform_normal(&Vector3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(n, Vector3::new(0.0, -1.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn part_offset_is_applied_in_producer_frame() {
        let converter = FrameConverter::default();
        let placement = PartPlacement {
            offset_mm: [1800.0, 0.0, 100.0],
        };
        let p = converter.slicer_to_robot_base(&Vector3::new(0.0, 0.0, 0.0), &placement);
        assert_relative_eq!(p, Vector3::new(1.8, 0.0, 0.1), epsilon = 1e-12);
    }

    #[test]
    fn waypoint_conversion_keeps_metadata() {
        let converter = FrameConverter::default();
        let placement = PartPlacement {
            offset_mm: [1800.0, 0.0, 0.0],
        };
        let wp = Waypoint {
            position: [0.0, 50.0, 10.0],
            normal: Some([0.0, 0.0, 1.0]),
            timestamp: Some(1.5),
            layer: Some(3),
            ..Waypoint::default()
        };
        let converted = converter.waypoints_to_robot_base(&[wp], &placement);
        let out = &converted[0];

        assert_relative_eq!(
            Vector3::from(out.position),
            Vector3::new(1.8, 0.05, 0.01),
            epsilon = 1e-12
        );
        assert_relative_eq!(Vector3::from(out.normal.unwrap()), Vector3::z(), epsilon = 1e-12);
        assert_eq!(out.timestamp, Some(1.5));
        assert_eq!(out.layer, Some(3));
    }

    #[test]
    fn pose_in_wrong_frame_is_rejected() {
        let pose = Pose::from_position(Frame::Scene, Point3::origin());
        assert!(pose.expect_frame(Frame::RobotBase).is_err());
    }

    #[test]
    fn scene_pose_rotation_is_permuted() {
        let converter = FrameConverter::default();
        // Scene rotation about its up axis (y) is a rotation about robot z
        let rotation = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), 0.3);
        let pose = Pose::new(Frame::Scene, Point3::new(0.0, 1000.0, 0.0), rotation);
        let base = converter.pose_to_robot_base(&pose).unwrap();

        assert_relative_eq!(base.position, Point3::new(0.0, 0.0, 1.0), epsilon = 1e-12);
        let expected = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 0.3);
        assert_relative_eq!(base.rotation.angle_to(&expected), 0.0, epsilon = 1e-9);
    }
}
