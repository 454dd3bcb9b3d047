//! Configuration loading for the reachability engine
//!
//! Angles are degrees and lengths are the unit named in the field; the
//! accessors hand out radians and meters.

use crate::error::{ReachError, Result};
use crate::frames::RobotMount;
use crate::model::{DhKinematicModel, DhLink, JointLimit, JointVector, AXES};
use crate::quality::QualityWeights;
use crate::solver::IkConfig;
use crate::tcp::TcpOffset;
use crate::trajectory::{OrientationMode, TrajectoryBatchSolver};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EngineConfig {
    pub robot: RobotConfig,
    pub tool: TcpOffset,
    pub solver: Option<SolverConfig>,
    pub batch: Option<BatchConfig>,
    pub quality: Option<QualityWeights>,
    pub session: Option<SessionConfig>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RobotConfig {
    pub name: Option<String>,
    /// Six DH links; the reference arm when omitted
    pub links: Option<Vec<LinkConfig>>,
    pub mount: Option<RobotMount>,
    /// Home posture used to pad solved trajectories
    pub home_joints_deg: Option<[f64; AXES]>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct LinkConfig {
    pub a: f64,
    pub d: f64,
    pub alpha_deg: f64,
    pub min_deg: f64,
    pub max_deg: f64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SolverConfig {
    pub position_tolerance_mm: Option<f64>,
    pub orientation_tolerance_deg: Option<f64>,
    pub max_iterations: Option<u32>,
    pub damping: Option<f64>,
    pub max_step_deg: Option<f64>,
    pub default_seed_deg: Option<[f64; AXES]>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BatchConfig {
    pub orientation_mode: Option<OrientationMode>,
    pub yield_every: Option<usize>,
    pub chunk_size: Option<usize>,
    pub smoothness_bound_deg: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SessionConfig {
    pub timeout_minutes: Option<u64>,
    /// Per-query limit for remote backends; derived from the session timeout when omitted
    pub remote_query_secs: Option<u64>,
    pub home_transit_secs: Option<f64>,
    pub use_fallback: Option<bool>,
}

impl EngineConfig {
    pub fn load_from_path(config_path: &str) -> Result<Self> {
        let contents = fs::read_to_string(config_path)
            .map_err(|e| ReachError::Config(format!("Failed to read {}: {}", config_path, e)))?;
        Self::load_from_str(&contents)
    }

    pub fn load_from_str(contents: &str) -> Result<Self> {
        let config: EngineConfig = serde_yaml::from_str(contents)?;
        Ok(config)
    }

    /// Get solver configuration with defaults
    pub fn solver(&self) -> SolverConfig {
        self.solver.clone().unwrap_or_default()
    }

    /// Get batch configuration with defaults
    pub fn batch(&self) -> BatchConfig {
        self.batch.clone().unwrap_or_default()
    }

    /// Get quality weights with defaults
    pub fn quality(&self) -> QualityWeights {
        self.quality.unwrap_or_default()
    }

    /// Get session configuration with defaults
    pub fn session(&self) -> SessionConfig {
        self.session.clone().unwrap_or_default()
    }
}

impl RobotConfig {
    pub fn model(&self) -> Result<DhKinematicModel> {
        let Some(links) = &self.links else {
            return Ok(DhKinematicModel::reference_arm());
        };
        let links: [LinkConfig; AXES] = links.as_slice().try_into().map_err(|_| {
            ReachError::Config(format!("robot.links needs {} entries, got {}", AXES, links.len()))
        })?;

        let name = self.name.clone().unwrap_or_else(|| "custom".to_string());
        DhKinematicModel::new(name, links.map(LinkConfig::to_link))
    }

    pub fn mount(&self) -> RobotMount {
        self.mount.unwrap_or_default()
    }

    pub fn home_joints(&self) -> Option<JointVector> {
        self.home_joints_deg.map(JointVector::from_degrees)
    }
}

impl LinkConfig {
    pub fn to_link(self) -> DhLink {
        DhLink {
            a: self.a,
            d: self.d,
            alpha: self.alpha_deg.to_radians(),
            limit: JointLimit::from_degrees(self.min_deg, self.max_deg),
        }
    }
}

impl SolverConfig {
    /// Solver tuning in radians and meters
    pub fn ik_config(&self) -> IkConfig {
        let defaults = IkConfig::default();
        IkConfig {
            position_tolerance: self
                .position_tolerance_mm
                .map(|mm| mm / 1000.0)
                .unwrap_or(defaults.position_tolerance),
            orientation_tolerance: self
                .orientation_tolerance_deg
                .map(f64::to_radians)
                .unwrap_or(defaults.orientation_tolerance),
            max_iterations: self.max_iterations.unwrap_or(defaults.max_iterations),
            damping: self.damping.unwrap_or(defaults.damping),
            max_step: self.max_step_deg.map(f64::to_radians).unwrap_or(defaults.max_step),
            default_seed: self
                .default_seed_deg
                .map(JointVector::from_degrees)
                .unwrap_or(defaults.default_seed),
        }
    }
}

impl BatchConfig {
    pub fn orientation_mode(&self) -> OrientationMode {
        self.orientation_mode.unwrap_or_default()
    }

    pub fn yield_every(&self) -> usize {
        self.yield_every.unwrap_or(TrajectoryBatchSolver::DEFAULT_YIELD_EVERY)
    }

    /// Waypoints per remote request; `None` sends the whole toolpath
    pub fn chunk_size(&self) -> Option<usize> {
        self.chunk_size.filter(|size| *size > 0)
    }

    /// Continuity bound in radians
    pub fn smoothness_bound(&self) -> f64 {
        self.smoothness_bound_deg.unwrap_or(15.0).to_radians()
    }
}

impl SessionConfig {
    pub fn timeout_minutes(&self) -> u64 {
        self.timeout_minutes.unwrap_or(10)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_minutes() * 60)
    }

    /// How long one remote query may run before the backend reports itself unavailable
    ///
    /// With a fallback the remote side gets half the session budget so the
    /// local solve still has time left on the shared deadline.
    pub fn remote_query_timeout(&self) -> Duration {
        let budget = self.timeout();
        let derived = if self.use_fallback() { budget / 2 } else { budget };
        self.remote_query_secs
            .map(|secs| Duration::from_secs(secs).min(budget))
            .unwrap_or(derived)
    }

    pub fn home_transit_secs(&self) -> f64 {
        self.home_transit_secs.unwrap_or(5.0)
    }

    pub fn use_fallback(&self) -> bool {
        self.use_fallback.unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tcp::ToolAxis;
    use approx::assert_relative_eq;

    const MINIMAL: &str = r#"
robot: {}
tool:
  translation_m: [0.0, 0.0, 0.5]
"#;

    #[test]
    fn minimal_config_falls_back_to_defaults() {
        let config = EngineConfig::load_from_str(MINIMAL).unwrap();
        assert_eq!(config.robot.model().unwrap(), DhKinematicModel::reference_arm());
        assert_eq!(config.robot.home_joints(), None);
        assert_eq!(config.tool.axis, ToolAxis::Z);
        assert_eq!(config.solver().ik_config(), IkConfig::default());
        assert_eq!(config.batch().orientation_mode(), OrientationMode::ToolDown);
        assert_eq!(config.batch().chunk_size(), None);
        assert_eq!(config.quality(), QualityWeights::default());
        assert_eq!(config.session().timeout_minutes(), 10);
        assert!(config.session().use_fallback());
    }

    #[test]
    fn full_config_converts_units() {
        let yaml = r#"
robot:
  name: test-arm
  mount:
    position_mm: [100.0, 0.0, -250.0]
    yaw_deg: 90.0
  home_joints_deg: [0.0, -90.0, 90.0, 0.0, 0.0, 0.0]
tool:
  translation_m: [0.0, 0.0, 0.3]
  rotation_deg: [0.0, 0.0, 45.0]
  axis: x
  mass_kg: 3.5
solver:
  position_tolerance_mm: 0.5
  max_step_deg: 10.0
batch:
  orientation_mode: follow_normal
  chunk_size: 0
quality:
  reachability: 0.7
  singularity: 0.1
session:
  timeout_minutes: 30
  use_fallback: false
"#;
        let config = EngineConfig::load_from_str(yaml).unwrap();
        let ik = config.solver().ik_config();
        assert_relative_eq!(ik.position_tolerance, 0.0005);
        assert_relative_eq!(ik.max_step, 10f64.to_radians());
        assert_eq!(ik.max_iterations, IkConfig::default().max_iterations);

        let home = config.robot.home_joints().unwrap();
        assert_relative_eq!(home.axis(2), -std::f64::consts::FRAC_PI_2);
        assert_eq!(config.robot.mount().yaw_deg, 90.0);
        assert_eq!(config.tool.axis, ToolAxis::X);
        assert_eq!(config.batch().orientation_mode(), OrientationMode::FollowNormal);
        assert_eq!(config.batch().chunk_size(), None);
        assert_eq!(config.quality().reachability, 0.7);
        assert_eq!(config.quality().speed_consistency, 0.2);
        assert_eq!(config.session().timeout_minutes(), 30);
        assert!(!config.session().use_fallback());
    }

    #[test]
    fn custom_links_build_a_model() {
        let link = "{ a: 0.0, d: 0.0, alpha_deg: 0.0, min_deg: -90.0, max_deg: 90.0 }";
        let yaml = format!(
            "robot:\n  name: flat\n  links: [{l}, {l}, {l}, {l}, {l}, {l}]\n\
             tool:\n  translation_m: [0.0, 0.0, 0.0]\n",
            l = link
        );
        let config = EngineConfig::load_from_str(&yaml).unwrap();
        let model = config.robot.model().unwrap();
        assert_eq!(model.name(), "flat");
        assert_relative_eq!(model.link(1).limit.max, std::f64::consts::FRAC_PI_2);
    }

    #[test]
    fn wrong_link_count_is_a_config_error() {
        let yaml = r#"
robot:
  links: [{ a: 0.0, d: 0.0, alpha_deg: 0.0, min_deg: -1.0, max_deg: 1.0 }]
tool:
  translation_m: [0.0, 0.0, 0.0]
"#;
        let config = EngineConfig::load_from_str(yaml).unwrap();
        assert!(matches!(config.robot.model(), Err(ReachError::Config(_))));
    }

    #[test]
    fn missing_file_is_reported() {
        assert!(matches!(
            EngineConfig::load_from_path("does/not/exist.yaml"),
            Err(ReachError::Config(_))
        ));
    }

    #[test]
    fn remote_query_timeout_follows_session_budget() {
        let session = |yaml: &str| serde_yaml::from_str::<SessionConfig>(yaml).unwrap();

        let defaults = session("{}");
        assert_eq!(defaults.timeout(), Duration::from_secs(600));
        assert_eq!(defaults.remote_query_timeout(), Duration::from_secs(300));

        let remote_only = session("timeout_minutes: 30\nuse_fallback: false\n");
        assert_eq!(remote_only.remote_query_timeout(), Duration::from_secs(1800));

        let explicit = session("timeout_minutes: 1\nremote_query_secs: 20\n");
        assert_eq!(explicit.remote_query_timeout(), Duration::from_secs(20));

        let capped = session("timeout_minutes: 1\nremote_query_secs: 900\n");
        assert_eq!(capped.remote_query_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn shipped_default_config_parses() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../config/default_config.yaml");
        let config = EngineConfig::load_from_path(path).unwrap();
        assert!(config.robot.model().is_ok());
        assert!(config.robot.home_joints().is_some());
    }
}
