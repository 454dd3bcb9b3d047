//! JSON Output for CLI commands
//!
//! Provides structured JSON events for solve results, single-point
//! kinematics and errors that can be consumed by external tools.

use armreach_core::{IkResult, JointVector, Pose, QualityReport, SessionOutcome};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Current timestamp as f64 seconds since UNIX epoch, microsecond precision
pub fn current_timestamp() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Pose as plain arrays: position in meters, rotation as roll/pitch/yaw in degrees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseOutput {
    pub frame: String,
    pub position: [f64; 3],
    pub rpy_deg: [f64; 3],
}

impl From<&Pose> for PoseOutput {
    fn from(pose: &Pose) -> Self {
        let (roll, pitch, yaw) = pose.rotation.euler_angles();
        Self {
            frame: pose.frame.to_string(),
            position: [pose.position.x, pose.position.y, pose.position.z],
            rpy_deg: [roll.to_degrees(), pitch.to_degrees(), yaw.to_degrees()],
        }
    }
}

/// Finished solve session with its quality report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolveResultEvent {
    pub timestamp: f64,
    /// Event type for JSON parsing
    #[serde(rename = "type")]
    pub event_type: String,
    pub outcome: SessionOutcome,
    pub quality: QualityReport,
}

/// Forward kinematics of one joint vector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardEvent {
    pub timestamp: f64,
    #[serde(rename = "type")]
    pub event_type: String,
    pub joints_deg: [f64; 6],
    pub flange: PoseOutput,
    pub tool: PoseOutput,
}

/// Inverse kinematics of one tool-tip target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InverseEvent {
    pub timestamp: f64,
    #[serde(rename = "type")]
    pub event_type: String,
    pub target: [f64; 3],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub joints_deg: Option<[f64; 6]>,
    pub result: IkResult,
}

/// Error event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub timestamp: f64,
    #[serde(rename = "type")]
    pub event_type: String,
    pub error: String,
}

impl SolveResultEvent {
    pub fn new(outcome: SessionOutcome, quality: QualityReport) -> Self {
        Self {
            timestamp: current_timestamp(),
            event_type: "solve_result".to_string(),
            outcome,
            quality,
        }
    }
}

impl ForwardEvent {
    pub fn new(joints: &JointVector, flange: &Pose, tool: &Pose) -> Self {
        Self {
            timestamp: current_timestamp(),
            event_type: "forward".to_string(),
            joints_deg: joints.to_degrees(),
            flange: flange.into(),
            tool: tool.into(),
        }
    }
}

impl InverseEvent {
    pub fn new(target: [f64; 3], result: IkResult) -> Self {
        Self {
            timestamp: current_timestamp(),
            event_type: "inverse".to_string(),
            target,
            joints_deg: result.joints.filter(|_| result.reachable).map(|j| j.to_degrees()),
            result,
        }
    }
}

impl ErrorEvent {
    pub fn new(error: &str) -> Self {
        Self {
            timestamp: current_timestamp(),
            event_type: "error".to_string(),
            error: error.to_string(),
        }
    }
}

/// Output a JSON event to stdout
pub fn output_event<T: Serialize>(event: &T, pretty: bool) {
    let json = if pretty {
        serde_json::to_string_pretty(event)
    } else {
        serde_json::to_string(event)
    };
    if let Ok(json) = json {
        println!("{}", json);
    }
}
