//! Toolpath waypoints as consumed from the slicing engine

use crate::error::Result;
use crate::frames::{Frame, PartPlacement};
use serde::{Deserialize, Serialize};
use std::fs;

/// Kind of motion leading into a waypoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentType {
    Travel,
    #[default]
    Extrude,
    Other,
}

/// One toolpath point
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Waypoint {
    /// Position in the producing frame
    pub position: [f64; 3],
    /// Surface normal (unit, direction only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normal: Option<[f64; 3]>,
    /// Seconds since toolpath start
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer: Option<u32>,
    #[serde(default)]
    pub segment: SegmentType,
    /// Commanded feed rate into this point (mm/s)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedrate: Option<f64>,
}

impl Waypoint {
    pub fn at(position: [f64; 3]) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    pub fn is_travel(&self) -> bool {
        self.segment == SegmentType::Travel
    }
}

/// A toolpath job: waypoints plus where the producer placed the part
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Toolpath {
    /// Frame the waypoint positions are expressed in
    #[serde(default = "default_frame")]
    pub frame: Frame,
    #[serde(default)]
    pub placement: PartPlacement,
    pub waypoints: Vec<Waypoint>,
}

fn default_frame() -> Frame {
    Frame::Slicer
}

impl Toolpath {
    /// Load a toolpath from a JSON or YAML file (by extension)
    pub fn load_from_path(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        if path.ends_with(".json") {
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(serde_yaml::from_str(&contents)?)
        }
    }

    /// Duration between the first and last timestamped waypoint (seconds)
    pub fn duration_secs(&self) -> f64 {
        duration_secs(&self.waypoints)
    }
}

pub fn duration_secs(waypoints: &[Waypoint]) -> f64 {
    let mut stamps = waypoints.iter().filter_map(|w| w.timestamp);
    match stamps.next() {
        Some(first) => {
            let last = stamps.last().unwrap_or(first);
            (last - first).max(0.0)
        }
        None => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_yaml_job_with_defaults() {
        let yaml = r#"
placement:
  offset_mm: [1800.0, 0.0, 0.0]
waypoints:
  - position: [0.0, 0.0, 0.2]
    layer: 0
    timestamp: 0.0
  - position: [10.0, 0.0, 0.2]
    segment: travel
    timestamp: 2.5
"#;
        let job: Toolpath = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(job.frame, Frame::Slicer);
        assert_eq!(job.waypoints.len(), 2);
        assert_eq!(job.waypoints[0].segment, SegmentType::Extrude);
        assert!(job.waypoints[1].is_travel());
        assert_eq!(job.duration_secs(), 2.5);
    }

    #[test]
    fn duration_without_timestamps_is_zero() {
        let wps = vec![Waypoint::at([0.0; 3]), Waypoint::at([1.0, 0.0, 0.0])];
        assert_eq!(duration_secs(&wps), 0.0);
    }
}
