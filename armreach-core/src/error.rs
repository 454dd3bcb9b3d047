//! Error types for kinematics and solve-session operations

use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReachError>;

#[derive(Error, Debug)]
pub enum ReachError {
    #[error("Target out of reach by {excess:.4} m")]
    OutOfReach { excess: f64 },

    #[error("IK did not converge after {iterations} iterations (residual {residual:.6} m)")]
    NonConvergent { iterations: u32, residual: f64 },

    #[error("Joint limit violated (residual {residual:.6} m)")]
    JointLimit { residual: f64 },

    #[error("Solver unavailable: {0}")]
    SolverUnavailable(String),

    #[error("Solve cancelled")]
    Cancelled,

    #[error("Solve timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid session state: {0}")]
    InvalidState(String),

    #[error("Frame mismatch: expected {expected}, got {actual}")]
    FrameMismatch { expected: String, actual: String },

    #[error("Geometry error: {0}")]
    Geometry(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Tokio task error: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ReachError {
    /// Whether a session should degrade to its local fallback on this error
    pub fn is_unavailable(&self) -> bool {
        matches!(self, ReachError::SolverUnavailable(_) | ReachError::Timeout(_))
    }
}
