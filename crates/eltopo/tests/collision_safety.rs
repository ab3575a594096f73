//! Collision-safety properties over randomized and adversarial inputs.

use eltopo::ccd::{CcdSolver, MovingPoint};
use eltopo::geometry::{point_triangle_distance, segment_segment_distance};
use eltopo::{
    CcdStrategy, DynamicSurface, GeneralOptions, IntegrationOptions, StaticOptions, StepOutcome, SurfTrack,
    VertexId, api,
};
use glam::DVec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// `n × n` grid of spacing `h` at height `z`, vertex ids starting at `offset`.
fn grid(n: usize, h: f64, z: f64, offset: usize) -> (Vec<DVec3>, Vec<[usize; 3]>) {
    let mut positions = Vec::new();
    for j in 0..=n {
        for i in 0..=n {
            positions.push(DVec3::new(i as f64 * h, j as f64 * h, z));
        }
    }
    let idx = |i: usize, j: usize| offset + j * (n + 1) + i;
    let mut triangles = Vec::new();
    for j in 0..n {
        for i in 0..n {
            triangles.push([idx(i, j), idx(i + 1, j), idx(i + 1, j + 1)]);
            triangles.push([idx(i, j), idx(i + 1, j + 1), idx(i, j + 1)]);
        }
    }
    (positions, triangles)
}

/// Layers of 3×3 sheets stacked `spacing` apart, each jittered in height.
fn stacked_layers(rng: &mut StdRng, layers: usize, spacing: f64, jitter: f64) -> api::InputMesh {
    let mut positions = Vec::new();
    let mut triangles = Vec::new();
    for layer in 0..layers {
        let (p, t) = grid(3, 0.25, layer as f64 * spacing, positions.len());
        for p in p {
            let dz = if jitter > 0.0 { rng.gen_range(-jitter..jitter) } else { 0.0 };
            positions.push(p + DVec3::Z * dz);
        }
        triangles.extend(t);
    }
    let masses = vec![1.0; positions.len()];
    api::InputMesh {
        positions,
        triangles,
        masses,
    }
}

/// Smallest vertex–triangle or edge–edge distance over pairs sharing no vertex.
fn min_separation(surface: &DynamicSurface) -> f64 {
    let mesh = surface.mesh();
    let mut closest = f64::INFINITY;
    for (_, tri) in mesh.live_triangles() {
        let [a, b, c] = tri.map(|v| surface.position(v));
        for v in mesh.live_vertices().filter(|v| !tri.contains(v)) {
            closest = closest.min(point_triangle_distance(surface.position(v), a, b, c).0);
        }
    }
    let edges: Vec<[VertexId; 2]> = mesh.live_edges().map(|(_, pair)| pair).collect();
    for (i, &[a, b]) in edges.iter().enumerate() {
        for &[c, d] in &edges[i + 1..] {
            if [c, d].iter().any(|v| *v == a || *v == b) {
                continue;
            }
            let (distance, _, _) = segment_segment_distance(
                surface.position(a),
                surface.position(b),
                surface.position(c),
                surface.position(d),
            );
            closest = closest.min(distance);
        }
    }
    closest
}

fn assert_intersection_free(input: &api::InputMesh, positions: &[DVec3], general: &GeneralOptions) {
    let track = SurfTrack::new(
        positions.to_vec(),
        &input.triangles,
        input.masses.clone(),
        general,
        &StaticOptions::default(),
    )
    .unwrap();
    track.check_invariants().unwrap();
    assert!(min_separation(track.surface()) > 0.0);
}

#[test]
fn test_random_crushing_motion_stays_intersection_free() {
    let general = GeneralOptions::default();
    for seed in 0..8 {
        let mut rng = StdRng::seed_from_u64(seed);
        let input = stacked_layers(&mut rng, 2, 0.1, 0.02);
        let predicted: Vec<DVec3> = input
            .positions
            .iter()
            .map(|p| {
                let push = if p.z > 0.05 { -0.3 } else { 0.3 };
                *p + DVec3::new(
                    rng.gen_range(-0.05..0.05),
                    rng.gen_range(-0.05..0.05),
                    push * rng.gen_range(0.5..1.0),
                )
            })
            .collect();

        let result = api::integrate(&input, &predicted, &general, &IntegrationOptions::default()).unwrap();
        assert!(result.actual_dt >= 0.0 && result.actual_dt <= 1.0);
        assert!(result.positions.iter().all(|p| p.is_finite()));
        assert_intersection_free(&input, &result.positions, &general);
    }
}

#[test]
fn test_repulsion_restores_proximity_gap() {
    let general = GeneralOptions::default();
    let eps = general.proximity_epsilon;
    let (mut positions, mut triangles) = grid(2, 0.5, 0.0, 0);
    let (upper, upper_tris) = grid(2, 0.5, 0.5 * eps, positions.len());
    positions.extend(upper);
    triangles.extend(upper_tris);
    let n = positions.len();
    let mut track =
        SurfTrack::new(positions, &triangles, vec![1.0; n], &general, &StaticOptions::default()).unwrap();

    let mut gap = min_separation(track.surface());
    assert!((gap - 0.5 * eps).abs() < 1e-15);
    for _ in 0..30 {
        let resting = track.surface().positions().to_vec();
        let (_, outcome) = track.integrate(&resting, &IntegrationOptions::default()).unwrap();
        assert_eq!(outcome, StepOutcome::Impulses);
        let next = min_separation(track.surface());
        // Each step closes at least a tenth of the remaining shortfall
        assert!(next > gap || next >= eps);
        assert!((eps - next).max(0.0) <= 0.9 * (eps - gap).max(0.0) + 1e-12);
        gap = next;
    }
    assert!(gap >= 0.95 * eps);
    track.check_invariants().unwrap();
}

#[test]
fn test_random_static_operations_stay_intersection_free() {
    let general = GeneralOptions::default();
    let options = StaticOptions {
        min_edge_length: 0.05,
        max_edge_length: 0.2,
        ..StaticOptions::default()
    };
    for seed in 0..4 {
        let mut rng = StdRng::seed_from_u64(seed);
        let input = stacked_layers(&mut rng, 2, 0.04, 0.015);
        let (output, _) = api::static_operations(&input, &general, &options).unwrap();
        let track = SurfTrack::new(
            output.positions,
            &output.triangles,
            output.masses,
            &general,
            &StaticOptions::default(),
        )
        .unwrap();
        track.check_invariants().unwrap();
    }
}

#[test]
fn test_impact_zones_terminate_on_cyclic_squeeze() {
    // Three sheets all driven through each other, with tiny budgets
    let mut rng = StdRng::seed_from_u64(42);
    let input = stacked_layers(&mut rng, 3, 0.05, 0.0);
    let predicted: Vec<DVec3> = input
        .positions
        .iter()
        .map(|p| {
            let dz = match (p.z / 0.05).round() as i32 {
                0 => 0.2,
                1 => 0.0,
                _ => -0.2,
            };
            *p + DVec3::new(0.0, 0.0, dz)
        })
        .collect();
    let options = IntegrationOptions {
        max_collision_iterations: 1,
        max_zone_iterations: 2,
        max_dt_cuts: 2,
        ..IntegrationOptions::default()
    };

    let general = GeneralOptions::default();
    let result = api::integrate(&input, &predicted, &general, &options).unwrap();
    assert!(result.stats.collisions_detected > 0);
    if result.outcome == StepOutcome::Frozen {
        assert_eq!(result.actual_dt, 0.0);
        assert_eq!(result.positions, input.positions);
    }
    assert_intersection_free(&input, &result.positions, &general);
}

#[test]
fn test_ccd_strategies_agree_on_generic_queries() {
    let mut rng = StdRng::seed_from_u64(7);
    let floating = CcdSolver::new(CcdStrategy::FloatingPoint);
    let exact = CcdSolver::new(CcdStrategy::Exact);
    let mut point = || {
        let start = DVec3::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0));
        let motion = DVec3::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0));
        MovingPoint::new(start, start + motion)
    };

    let mut hits = 0;
    for _ in 0..200 {
        let (x, a, b, c) = (point(), point(), point(), point());
        let f = floating.point_triangle(x, [a, b, c], [0, 1, 2, 3]);
        let e = exact.point_triangle(x, [a, b, c], [0, 1, 2, 3]);
        assert_eq!(f.is_some(), e.is_some());
        if let (Some(f), Some(e)) = (f, e) {
            assert!((f.time - e.time).abs() < 1e-6);
            hits += 1;
        }

        let (p0, p1, q0, q1) = (point(), point(), point(), point());
        let f = floating.edge_edge([p0, p1], [q0, q1], [0, 1, 2, 3]);
        let e = exact.edge_edge([p0, p1], [q0, q1], [0, 1, 2, 3]);
        assert_eq!(f.is_some(), e.is_some());
    }
    assert!(hits > 0);
}
