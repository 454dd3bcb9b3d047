//! Denavit-Hartenberg kinematic model
//!
//! Fixed robot geometry (six DH links with joint limits) and forward
//! kinematics. Each stage contributes `Rz(θ) · Tz(d) · Tx(a) · Rx(α)`; the
//! product of all six stages is the flange pose in the robot base frame.

use crate::error::{ReachError, Result};
use crate::frames::{Frame, Pose};
use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_2;
use std::fmt;

/// Number of actuated axes
pub const AXES: usize = 6;

/// Six joint values in radians, axis 1 first
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JointVector(pub [f64; AXES]);

impl JointVector {
    pub const ZERO: Self = Self([0.0; AXES]);

    pub fn new(values: [f64; AXES]) -> Self {
        Self(values)
    }

    pub fn from_degrees(degrees: [f64; AXES]) -> Self {
        Self(degrees.map(f64::to_radians))
    }

    pub fn to_degrees(&self) -> [f64; AXES] {
        self.0.map(f64::to_degrees)
    }

    /// Joint value for a 1-based axis number
    ///
    /// # Panics
    ///
    /// Panics if `axis` is not in `1..=6`.
    pub fn axis(&self, axis: usize) -> f64 {
        assert!((1..=AXES).contains(&axis), "axis must be in 1..=6, got {}", axis);
        self.0[axis - 1]
    }

    pub fn as_array(&self) -> &[f64; AXES] {
        &self.0
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }

    /// Largest absolute per-joint difference to `other`
    pub fn max_abs_delta(&self, other: &JointVector) -> f64 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max)
    }
}

impl From<[f64; AXES]> for JointVector {
    fn from(values: [f64; AXES]) -> Self {
        Self(values)
    }
}

impl fmt::Display for JointVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let deg = self.to_degrees();
        write!(
            f,
            "[{:.2}°, {:.2}°, {:.2}°, {:.2}°, {:.2}°, {:.2}°]",
            deg[0], deg[1], deg[2], deg[3], deg[4], deg[5]
        )
    }
}

/// Inclusive joint range in radians
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointLimit {
    pub min: f64,
    pub max: f64,
}

impl JointLimit {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn from_degrees(min: f64, max: f64) -> Self {
        Self::new(min.to_radians(), max.to_radians())
    }

    pub fn contains(&self, value: f64, tolerance: f64) -> bool {
        value >= self.min - tolerance && value <= self.max + tolerance
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

/// One link of the DH chain
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DhLink {
    /// Link length along the rotated x axis (meters)
    pub a: f64,
    /// Link offset along the previous z axis (meters)
    pub d: f64,
    /// Link twist about the rotated x axis (radians)
    pub alpha: f64,
    pub limit: JointLimit,
}

impl DhLink {
    /// Homogeneous transform of this stage for joint angle `theta`
    pub fn transform(&self, theta: f64) -> Isometry3<f64> {
        let (s, c) = theta.sin_cos();
        let translation = Translation3::new(self.a * c, self.a * s, self.d);
        let rotation = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), theta)
            * UnitQuaternion::from_axis_angle(&Vector3::x_axis(), self.alpha);
        Isometry3::from_parts(translation, rotation)
    }
}

/// Immutable robot geometry shared by every solver
#[derive(Debug, Clone, PartialEq)]
pub struct DhKinematicModel {
    name: String,
    links: [DhLink; AXES],
}

impl DhKinematicModel {
    /// Create a model, rejecting non-finite parameters and empty joint ranges
    pub fn new(name: impl Into<String>, links: [DhLink; AXES]) -> Result<Self> {
        for (i, link) in links.iter().enumerate() {
            let finite = [link.a, link.d, link.alpha, link.limit.min, link.limit.max]
                .iter()
                .all(|v| v.is_finite());
            if !finite {
                return Err(ReachError::Geometry(format!(
                    "joint {} has non-finite DH parameters",
                    i + 1
                )));
            }
            if link.limit.min >= link.limit.max {
                return Err(ReachError::Geometry(format!(
                    "joint {} limit min {:.4} is not below max {:.4}",
                    i + 1,
                    link.limit.min,
                    link.limit.max
                )));
            }
        }

        Ok(Self {
            name: name.into(),
            links,
        })
    }

    /// Reference 2.5 m class floor-mounted arm with a spherical wrist
    ///
    /// At all-zero joints the upper arm and forearm point along +x and the
    /// flange hangs straight down.
    pub fn reference_arm() -> Self {
        let link = |a: f64, d: f64, alpha: f64, min_deg: f64, max_deg: f64| DhLink {
            a,
            d,
            alpha,
            limit: JointLimit::from_degrees(min_deg, max_deg),
        };
        let links = [
            link(0.35, 0.675, -FRAC_PI_2, -185.0, 185.0),
            link(1.15, 0.0, 0.0, -140.0, 35.0),
            link(1.20, 0.0, -FRAC_PI_2, -120.0, 160.0),
            link(0.0, 0.0, FRAC_PI_2, -350.0, 350.0),
            link(0.0, 0.0, -FRAC_PI_2, -125.0, 125.0),
            link(0.0, 0.215, 0.0, -350.0, 350.0),
        ];

        Self {
            name: "reference-arm-2500".to_string(),
            links,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn links(&self) -> &[DhLink; AXES] {
        &self.links
    }

    /// Link for a 1-based axis number
    ///
    /// # Panics
    ///
    /// Panics if `axis` is not in `1..=6`.
    pub fn link(&self, axis: usize) -> &DhLink {
        assert!((1..=AXES).contains(&axis), "axis must be in 1..=6, got {}", axis);
        &self.links[axis - 1]
    }

    pub fn limits(&self) -> [JointLimit; AXES] {
        self.links.map(|l| l.limit)
    }

    /// Flange pose in the robot base frame
    pub fn forward(&self, joints: &JointVector) -> Pose {
        let flange = self
            .links
            .iter()
            .zip(joints.0.iter())
            .fold(Isometry3::identity(), |acc, (link, &theta)| acc * link.transform(theta));
        Pose::from_isometry(Frame::RobotBase, flange)
    }

    /// Cumulative transform after each stage (`frames[i]` is base → frame i+1)
    pub fn frames(&self, joints: &JointVector) -> [Isometry3<f64>; AXES] {
        let mut frames = [Isometry3::identity(); AXES];
        let mut acc = Isometry3::identity();
        for (i, (link, &theta)) in self.links.iter().zip(joints.0.iter()).enumerate() {
            acc *= link.transform(theta);
            frames[i] = acc;
        }
        frames
    }

    /// Upper bound on the flange distance from the base origin
    pub fn max_reach(&self) -> f64 {
        self.links.iter().map(|l| l.a.abs() + l.d.abs()).sum()
    }

    pub fn within_limits(&self, joints: &JointVector, tolerance: f64) -> bool {
        self.links
            .iter()
            .zip(joints.0.iter())
            .all(|(link, &q)| link.limit.contains(q, tolerance))
    }

    /// 1-based axis numbers whose value lies outside the joint range
    pub fn limit_violations(&self, joints: &JointVector, tolerance: f64) -> Vec<usize> {
        self.links
            .iter()
            .zip(joints.0.iter())
            .enumerate()
            .filter(|(_, (link, &q))| !link.limit.contains(q, tolerance))
            .map(|(i, _)| i + 1)
            .collect()
    }
}

impl Default for DhKinematicModel {
    fn default() -> Self {
        Self::reference_arm()
    }
}
