//! JSON wire contract of the solve service
//!
//! Waypoints on the wire are already in the robot base frame (meters).

use crate::error::{ReachError, Result};
use crate::model::JointVector;
use crate::tcp::TcpOffset;
use crate::toolpath::Waypoint;
use crate::trajectory::TrajectoryResult;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolveRequest {
    pub waypoints: Vec<Waypoint>,
    pub tcp_offset: TcpOffset,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_guess: Option<JointVector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_start: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<usize>,
}

impl SolveRequest {
    pub fn new(waypoints: Vec<Waypoint>, tcp_offset: TcpOffset) -> Self {
        Self {
            waypoints,
            tcp_offset,
            initial_guess: None,
            chunk_start: None,
            chunk_size: None,
        }
    }

    pub fn with_initial_guess(mut self, initial_guess: Option<JointVector>) -> Self {
        self.initial_guess = initial_guess;
        self
    }

    pub fn with_chunk(mut self, start: usize, size: usize) -> Self {
        self.chunk_start = Some(start);
        self.chunk_size = Some(size);
        self
    }

    pub fn is_chunked(&self) -> bool {
        self.chunk_start.is_some() || self.chunk_size.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub error: String,
}

/// Either a trajectory or a human-readable error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SolveResponse {
    Error(ErrorPayload),
    Solved(TrajectoryResult),
}

impl SolveResponse {
    pub fn error(message: impl Into<String>) -> Self {
        SolveResponse::Error(ErrorPayload { error: message.into() })
    }

    /// A remote error means the remote could not produce a result
    pub fn into_result(self) -> Result<TrajectoryResult> {
        match self {
            SolveResponse::Solved(result) => Ok(result),
            SolveResponse::Error(payload) => Err(ReachError::SolverUnavailable(format!(
                "remote solver error: {}",
                payload.error
            ))),
        }
    }
}

impl From<Result<TrajectoryResult>> for SolveResponse {
    fn from(result: Result<TrajectoryResult>) -> Self {
        match result {
            Ok(result) => SolveResponse::Solved(result),
            Err(e) => SolveResponse::error(e.to_string()),
        }
    }
}
