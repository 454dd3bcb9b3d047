//! End-to-end reachability scenarios against the reference arm

use approx::assert_relative_eq;
use armreach_core::quality::count_singularity_zones;
use armreach_core::trajectory::percent;
use armreach_core::{
    DhKinematicModel, IkSolver, IkTarget, JointVector, ReachabilityQualityAnalyzer, TcpComposer,
    TcpOffset, ToolAxis, ToolpathMetrics, TrajectoryBatchSolver, TrajectoryResult, Waypoint,
};
use nalgebra::Point3;
use std::f64::consts::FRAC_PI_2;
use std::sync::Arc;

fn batch() -> TrajectoryBatchSolver {
    let model = Arc::new(DhKinematicModel::reference_arm());
    TrajectoryBatchSolver::new(Arc::new(IkSolver::with_defaults(model).unwrap()))
}

fn colinear_waypoints() -> Vec<Waypoint> {
    (0..20)
        .map(|i| Waypoint::at([1.6 + 0.4 * i as f64 / 19.0, 0.0, 0.1]))
        .collect()
}

#[test]
fn colinear_toolpath_is_mostly_reachable_and_smooth() {
    let batch = batch();
    let result = batch.solve_all(&colinear_waypoints(), &TcpOffset::straight(0.5), None);

    assert_eq!(result.total_points, 20);
    assert!(result.reachable_count >= 10, "{} reachable", result.reachable_count);

    let solved: Vec<JointVector> = result.trajectory.iter().flatten().copied().collect();
    for pair in solved.windows(2) {
        assert!(pair[0].max_abs_delta(&pair[1]) < 15f64.to_radians());
    }
}

#[test]
fn reachability_percent_of_two_in_three() {
    let q = Some(JointVector::ZERO);
    let result = TrajectoryResult::from_entries(vec![q, None, q]);
    assert_eq!(result.reachability, vec![true, false, true]);
    assert_relative_eq!(result.reachability_percent, 66.67, epsilon = 0.01);
    assert_relative_eq!(percent(2, 3), 200.0 / 3.0, epsilon = 1e-9);
}

#[test]
fn unreachable_runs_count_as_singularity_zones() {
    assert_eq!(count_singularity_zones(&[true, false, false, true, false, true]), 2);
    assert_eq!(count_singularity_zones(&[true, true]), 0);
    assert_eq!(count_singularity_zones(&[false, false]), 1);
}

#[test]
fn home_configuration_places_tool_below_outstretched_flange() {
    let model = DhKinematicModel::reference_arm();
    let composer = TcpComposer::new(TcpOffset::straight(0.5));
    let tool = composer.tool_pose(&model, &JointVector::ZERO);

    assert_relative_eq!(tool.position.x, 0.35 + 1.15 + 1.20, epsilon = 1e-9);
    assert_relative_eq!(tool.position.y, 0.0, epsilon = 1e-9);
    assert_relative_eq!(tool.position.z, 0.675 - 0.215 - 0.5, epsilon = 1e-9);
}

#[test]
fn home_configuration_tool_along_flange_x_ends_short_of_the_flange() {
    let model = DhKinematicModel::reference_arm();
    for length in [0.1, 0.5] {
        let offset = TcpOffset {
            translation_m: [-length, 0.0, 0.0],
            rotation_deg: [0.0; 3],
            axis: ToolAxis::X,
            mass_kg: 0.0,
        };
        let tool = TcpComposer::new(offset).tool_pose(&model, &JointVector::ZERO);

        assert_relative_eq!(tool.position.x, 0.35 + 1.15 + 1.20 - length, epsilon = 1e-9);
        assert_relative_eq!(tool.position.y, 0.0, epsilon = 1e-9);
        assert_relative_eq!(tool.position.z, 0.675 - 0.215, epsilon = 1e-9);
    }
}

#[test]
fn forward_then_inverse_recovers_tool_tip() {
    let model = Arc::new(DhKinematicModel::reference_arm());
    let solver = IkSolver::with_defaults(model.clone()).unwrap();
    let composer = TcpComposer::new(TcpOffset::straight(0.5));

    for arm in [[0.2, -0.9, 1.4], [-0.6, -0.5, 1.0], [1.1, -1.1, 1.7]] {
        let joints = TcpComposer::tool_down_joints(&model, arm);
        let tip = composer.tool_pose(&model, &joints).position;

        let target = IkTarget::position(composer.flange_position_tool_down(&tip));
        let result = solver.solve(&target, None);
        assert!(result.reachable, "{:?}", arm);

        let reached = composer.tool_pose(&model, &result.joints.unwrap()).position;
        assert!((reached - tip).norm() < 1e-3, "{:?}", arm);
    }
}

#[test]
fn quarter_turn_targets_are_symmetric() {
    let model = Arc::new(DhKinematicModel::reference_arm());
    let solver = IkSolver::with_defaults(model).unwrap();

    let left = solver.solve(&IkTarget::position(Point3::new(0.0, 1.8, 0.4)), None);
    let right = solver.solve(&IkTarget::position(Point3::new(0.0, -1.8, 0.4)), None);
    assert!(left.reachable && right.reachable);

    let (l, r) = (left.joints.unwrap(), right.joints.unwrap());
    assert_relative_eq!(l.axis(1), FRAC_PI_2, epsilon = 1e-9);
    assert_relative_eq!(r.axis(1), -FRAC_PI_2, epsilon = 1e-9);
    for axis in 2..=6 {
        assert_relative_eq!(l.axis(axis), r.axis(axis), epsilon = 1e-6);
    }
}

#[test]
fn solved_trajectory_respects_joint_limits() {
    let batch = batch();
    let model = batch.solver().model().clone();
    let waypoints: Vec<Waypoint> = (0..30)
        .map(|i| {
            let angle = -2.5 + 5.0 * i as f64 / 29.0;
            Waypoint::at([2.0 * angle.cos(), 2.0 * angle.sin(), 0.2])
        })
        .collect();

    let result = batch.solve_all(&waypoints, &TcpOffset::straight(0.5), None);
    assert!(result.reachable_count > 0);
    for joints in result.trajectory.iter().flatten() {
        assert!(model.within_limits(joints, 0.01), "{}", joints);
    }
}

#[test]
fn reachability_shrinks_as_targets_move_outward() {
    let batch = batch();
    let offset = TcpOffset::straight(0.5);
    let mut previous = f64::INFINITY;

    for radius in [1.8, 2.6, 3.2, 3.8] {
        let waypoints: Vec<Waypoint> = (0..10)
            .map(|i| Waypoint::at([radius, -0.45 + 0.1 * i as f64, 0.0]))
            .collect();
        let result = batch.solve_all(&waypoints, &offset, None);
        assert!(result.reachability_percent <= previous, "radius {}", radius);
        previous = result.reachability_percent;
    }
    assert_eq!(previous, 0.0);
}

#[test]
fn quality_score_rises_with_reachability() {
    let analyzer = ReachabilityQualityAnalyzer::default();
    let metrics = ToolpathMetrics::default();

    let worse = analyzer.analyze(&[true, false, false, true], &metrics);
    let better = analyzer.analyze(&[true, true, false, true], &metrics);
    let full = analyzer.analyze(&[true, true, true, true], &metrics);

    assert!(worse.overall_score < better.overall_score);
    assert!(better.overall_score < full.overall_score);
    assert_relative_eq!(full.overall_score, 100.0, epsilon = 1e-9);
}

#[test]
fn off_plane_targets_match_their_in_plane_twin() {
    let model = Arc::new(DhKinematicModel::reference_arm());
    let solver = IkSolver::with_defaults(model).unwrap();

    let in_plane = solver.solve(&IkTarget::position(Point3::new(1.9, 0.0, 0.5)), None);
    assert!(in_plane.reachable);

    let azimuth: f64 = 0.7;
    let twin = solver.solve(
        &IkTarget::position(Point3::new(1.9 * azimuth.cos(), 1.9 * azimuth.sin(), 0.5)),
        None,
    );
    assert!(twin.reachable);

    let (a, b) = (in_plane.joints.unwrap(), twin.joints.unwrap());
    assert_relative_eq!(a.axis(2), b.axis(2), epsilon = 1e-6);
    assert_relative_eq!(a.axis(3), b.axis(3), epsilon = 1e-6);
    assert!(in_plane.iterations.abs_diff(twin.iterations) <= 1);
}

#[test]
fn targets_beyond_max_reach_are_never_reachable() {
    let model = Arc::new(DhKinematicModel::reference_arm());
    let solver = IkSolver::with_defaults(model.clone()).unwrap();
    let reach = model.max_reach();

    for i in 0..24 {
        let azimuth = i as f64 * std::f64::consts::TAU / 24.0;
        let elevation = -0.6 + 0.05 * i as f64;
        let direction = nalgebra::Vector3::new(
            elevation.cos() * azimuth.cos(),
            elevation.cos() * azimuth.sin(),
            elevation.sin(),
        );
        for margin in [0.001, 0.1, 1.0] {
            let target = Point3::from(direction * (reach + margin));
            let result = solver.solve(&IkTarget::position(target), None);
            assert!(!result.reachable);
            assert!(result.joints.is_none());
        }
    }
}
