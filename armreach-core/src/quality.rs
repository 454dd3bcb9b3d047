//! Reachability and toolpath quality scoring

use crate::model::JointVector;
use crate::toolpath::Waypoint;
use crate::trajectory::{percent, TrajectoryResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Relative weight of each sub-score in the overall score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityWeights {
    pub reachability: f64,
    pub speed_consistency: f64,
    pub layer_uniformity: f64,
    pub singularity: f64,
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            reachability: 0.40,
            speed_consistency: 0.20,
            layer_uniformity: 0.20,
            singularity: 0.20,
        }
    }
}

/// Toolpath metadata the score depends on
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolpathMetrics {
    /// Speeds of non-travel segments
    pub segment_speeds: Vec<f64>,
    /// Point count per layer, ordered by layer index
    pub layer_counts: Vec<usize>,
}

impl ToolpathMetrics {
    /// Derive speeds and layer counts from waypoint metadata
    ///
    /// A segment's speed is the feed rate of its end point, or distance over
    /// elapsed time when both ends carry timestamps.
    pub fn from_waypoints(waypoints: &[Waypoint]) -> Self {
        let segment_speeds = waypoints
            .windows(2)
            .filter(|pair| !pair[1].is_travel())
            .filter_map(|pair| {
                let (from, to) = (&pair[0], &pair[1]);
                to.feedrate.or_else(|| {
                    let dt = to.timestamp? - from.timestamp?;
                    (dt > 0.0).then(|| distance(&from.position, &to.position) / dt)
                })
            })
            .collect();

        let mut layers: BTreeMap<u32, usize> = BTreeMap::new();
        for layer in waypoints.iter().filter_map(|w| w.layer) {
            *layers.entry(layer).or_default() += 1;
        }

        Self {
            segment_speeds,
            layer_counts: layers.into_values().collect(),
        }
    }
}

fn distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum::<f64>().sqrt()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityReport {
    pub reachability_score: f64,
    pub singularity_zones: usize,
    pub singularity_score: f64,
    pub speed_consistency: f64,
    pub layer_uniformity: f64,
    pub overall_score: f64,
    /// Adjacent reachable pairs jumping more than the smoothness bound
    pub continuity_violations: usize,
}

/// Number of maximal runs of unreachable points
pub fn count_singularity_zones(mask: &[bool]) -> usize {
    let mut zones = 0;
    let mut previous_reachable = true;
    for &reachable in mask {
        if !reachable && previous_reachable {
            zones += 1;
        }
        previous_reachable = reachable;
    }
    zones
}

/// Adjacent reachable pairs whose largest joint delta exceeds `bound` (radians)
pub fn continuity_violations(trajectory: &[Option<JointVector>], bound: f64) -> usize {
    trajectory
        .windows(2)
        .filter(|pair| match pair {
            [Some(a), Some(b)] => a.max_abs_delta(b) >= bound,
            _ => false,
        })
        .count()
}

pub struct ReachabilityQualityAnalyzer {
    weights: QualityWeights,
    smoothness_bound: f64,
}

impl ReachabilityQualityAnalyzer {
    pub const DEFAULT_SMOOTHNESS_BOUND_DEG: f64 = 15.0;

    pub fn new(weights: QualityWeights) -> Self {
        Self {
            weights,
            smoothness_bound: Self::DEFAULT_SMOOTHNESS_BOUND_DEG.to_radians(),
        }
    }

    /// Continuity bound in radians
    pub fn with_smoothness_bound(mut self, bound: f64) -> Self {
        self.smoothness_bound = bound;
        self
    }

    pub fn weights(&self) -> &QualityWeights {
        &self.weights
    }

    pub fn analyze(&self, mask: &[bool], metrics: &ToolpathMetrics) -> QualityReport {
        let reachable = mask.iter().filter(|r| **r).count();
        let reachability_score = percent(reachable, mask.len());
        let singularity_zones = count_singularity_zones(mask);
        let singularity_score = if singularity_zones == 0 {
            100.0
        } else {
            (100.0 - 10.0 * singularity_zones as f64).max(0.0)
        };
        let speed_consistency = speed_consistency(&metrics.segment_speeds);
        let layer_uniformity = layer_uniformity(&metrics.layer_counts);

        let w = &self.weights;
        let overall_score = w.reachability * reachability_score
            + w.speed_consistency * speed_consistency
            + w.layer_uniformity * layer_uniformity
            + w.singularity * singularity_score;

        QualityReport {
            reachability_score,
            singularity_zones,
            singularity_score,
            speed_consistency,
            layer_uniformity,
            overall_score,
            continuity_violations: 0,
        }
    }

    /// Score a solved trajectory, including the continuity check
    pub fn analyze_trajectory(
        &self,
        result: &TrajectoryResult,
        metrics: &ToolpathMetrics,
    ) -> QualityReport {
        QualityReport {
            continuity_violations: continuity_violations(&result.trajectory, self.smoothness_bound),
            ..self.analyze(&result.reachability, metrics)
        }
    }
}

impl Default for ReachabilityQualityAnalyzer {
    fn default() -> Self {
        Self::new(QualityWeights::default())
    }
}

fn speed_consistency(speeds: &[f64]) -> f64 {
    if speeds.len() < 2 {
        return 100.0;
    }
    let n = speeds.len() as f64;
    let mean = speeds.iter().sum::<f64>() / n;
    if mean <= 0.0 {
        return 100.0;
    }
    let variance = speeds.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
    (100.0 - 100.0 * variance.sqrt() / mean).max(0.0)
}

fn layer_uniformity(counts: &[usize]) -> f64 {
    if counts.is_empty() {
        return 100.0;
    }
    let mean = counts.iter().sum::<usize>() as f64 / counts.len() as f64;
    if mean <= 0.0 {
        return 100.0;
    }
    let max_deviation = counts
        .iter()
        .map(|&c| (c as f64 - mean).abs())
        .fold(0.0, f64::max);
    (100.0 - 50.0 * max_deviation / mean).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toolpath::SegmentType;
    use approx::assert_relative_eq;

    #[test]
    fn singularity_runs_count_once() {
        assert_eq!(count_singularity_zones(&[true, false, false, true, false, true]), 2);
        assert_eq!(count_singularity_zones(&[false; 10]), 1);
        assert_eq!(count_singularity_zones(&[true, true]), 0);
        assert_eq!(count_singularity_zones(&[]), 0);
    }

    #[test]
    fn perfect_toolpath_scores_100() {
        let metrics = ToolpathMetrics {
            segment_speeds: vec![20.0, 20.0, 20.0],
            layer_counts: vec![10, 10],
        };
        let report = ReachabilityQualityAnalyzer::default().analyze(&[true; 4], &metrics);
        assert_relative_eq!(report.overall_score, 100.0, epsilon = 1e-9);
        assert_eq!(report.singularity_score, 100.0);
    }

    #[test]
    fn sub_scores_follow_their_formulas() {
        let metrics = ToolpathMetrics {
            segment_speeds: vec![10.0, 30.0],
            layer_counts: vec![10, 20, 30],
        };
        let mask = [true, false, true, false];
        let report = ReachabilityQualityAnalyzer::default().analyze(&mask, &metrics);

        assert_relative_eq!(report.reachability_score, 50.0);
        assert_eq!(report.singularity_zones, 2);
        assert_relative_eq!(report.singularity_score, 80.0);
        // mean 20, sigma 10
        assert_relative_eq!(report.speed_consistency, 50.0, epsilon = 1e-9);
        // mean 20, max deviation 10
        assert_relative_eq!(report.layer_uniformity, 75.0, epsilon = 1e-9);
        let expected = 0.4 * 50.0 + 0.2 * 50.0 + 0.2 * 75.0 + 0.2 * 80.0;
        assert_relative_eq!(report.overall_score, expected, epsilon = 1e-9);
    }

    #[test]
    fn scores_are_floored_at_zero() {
        let metrics = ToolpathMetrics {
            segment_speeds: vec![1.0, 100.0, 1.0, 1.0],
            layer_counts: vec![1, 1, 1, 50],
        };
        let mask: Vec<bool> = (0..40).map(|i| i % 2 == 0).collect();
        let report = ReachabilityQualityAnalyzer::default().analyze(&mask, &metrics);
        assert_eq!(report.singularity_score, 0.0);
        assert_eq!(report.speed_consistency, 0.0);
        assert_eq!(report.layer_uniformity, 0.0);
    }

    #[test]
    fn empty_inputs_are_neutral() {
        let report =
            ReachabilityQualityAnalyzer::default().analyze(&[], &ToolpathMetrics::default());
        assert_eq!(report.reachability_score, 0.0);
        assert_eq!(report.speed_consistency, 100.0);
        assert_eq!(report.layer_uniformity, 100.0);
    }

    #[test]
    fn weights_are_configurable() {
        let weights = QualityWeights {
            reachability: 1.0,
            speed_consistency: 0.0,
            layer_uniformity: 0.0,
            singularity: 0.0,
        };
        let report = ReachabilityQualityAnalyzer::new(weights)
            .analyze(&[true, true, false], &ToolpathMetrics::default());
        assert_relative_eq!(report.overall_score, 200.0 / 3.0, epsilon = 1e-9);
    }

    #[test]
    fn metrics_skip_travel_and_use_timestamps() {
        let waypoints = vec![
            Waypoint { timestamp: Some(0.0), layer: Some(0), ..Waypoint::at([0.0, 0.0, 0.0]) },
            Waypoint { timestamp: Some(1.0), layer: Some(0), ..Waypoint::at([10.0, 0.0, 0.0]) },
            Waypoint {
                segment: SegmentType::Travel,
                timestamp: Some(1.5),
                layer: Some(1),
                ..Waypoint::at([50.0, 0.0, 0.0])
            },
            Waypoint { feedrate: Some(25.0), layer: Some(1), ..Waypoint::at([50.0, 20.0, 0.0]) },
            Waypoint { layer: Some(1), ..Waypoint::at([50.0, 40.0, 0.0]) },
        ];
        let metrics = ToolpathMetrics::from_waypoints(&waypoints);
        assert_eq!(metrics.segment_speeds, vec![10.0, 25.0]);
        assert_eq!(metrics.layer_counts, vec![2, 3]);
    }

    #[test]
    fn continuity_violations_only_count_reachable_pairs() {
        let small = JointVector::from_degrees([0.0, 5.0, 0.0, 0.0, 0.0, 0.0]);
        let jump = JointVector::from_degrees([0.0, 40.0, 0.0, 0.0, 0.0, 0.0]);
        let trajectory = vec![Some(JointVector::ZERO), Some(small), None, Some(jump), Some(small)];
        assert_eq!(continuity_violations(&trajectory, 15f64.to_radians()), 1);
    }
}
