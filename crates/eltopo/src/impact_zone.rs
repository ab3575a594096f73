//! Impact zones: groups of vertices whose collisions are resolved together.
//!
//! Zones are rebuilt every iteration from the collisions still present,
//! merged with the zones of the previous iteration. Each zone first tries an
//! inelastic projection that zeroes every normal relative displacement in
//! the zone at once; if that system is singular the zone moves rigidly,
//! keeping its linear and angular momentum.

use std::collections::HashMap;

use glam::{DMat3, DVec3};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use topology::VertexId;
use tracing::{debug, trace, warn};

use crate::collision::Collision;
use crate::error::TrackError;
use crate::geometry::outer;
use crate::stats::RunStats;
use crate::surface::DynamicSurface;

/// A set of dynamic vertices and the collisions binding them.
#[derive(Debug, Clone, PartialEq)]
pub struct ImpactZone {
    /// Non-solid vertices, sorted
    pub vertices: Vec<VertexId>,
    pub collisions: Vec<Collision>,
}

/// Result of running the zone solver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ZoneOutcome {
    Converged { iterations: usize },
    /// Iteration cap hit; these vertices were snapped back to their positions
    Frozen { vertices: Vec<VertexId> },
}

#[derive(Debug, Clone, Copy)]
pub struct ImpactZoneSolver {
    max_iterations: usize,
}

impl ImpactZoneSolver {
    pub fn new(max_iterations: usize) -> Self {
        Self { max_iterations }
    }

    pub fn solve(
        &self,
        surface: &mut DynamicSurface,
        stats: &mut RunStats,
    ) -> Result<ZoneOutcome, TrackError> {
        let mut zones: Vec<ImpactZone> = Vec::new();

        for iteration in 0..self.max_iterations {
            let collisions = surface.detect_collisions(stats);
            if collisions.is_empty() {
                return Ok(ZoneOutcome::Converged { iterations: iteration });
            }
            stats.impact_zone_iterations += 1;
            zones = merge_zones(surface, std::mem::take(&mut zones), collisions);
            debug!(iteration, zones = zones.len(), "Solving impact zones");

            for zone in &zones {
                if !inelastic_projection(surface, zone) {
                    stats.rigid_zone_fallbacks += 1;
                    rigid_motion(surface, zone);
                }
            }
            surface.rebuild_broad_phase()?;
        }

        if surface.detect_collisions(stats).is_empty() {
            return Ok(ZoneOutcome::Converged {
                iterations: self.max_iterations,
            });
        }

        let mut frozen: Vec<VertexId> = zones
            .iter()
            .flat_map(|z| z.vertices.iter().copied())
            .collect();
        frozen.sort_unstable();
        frozen.dedup();
        for &v in &frozen {
            surface.new_positions[v.index()] = surface.positions[v.index()];
        }
        // Zones pressed by moving solids stop those solids too
        for zone in &zones {
            for c in &zone.collisions {
                for &v in &c.vertices {
                    if surface.is_solid(v) {
                        surface.new_positions[v.index()] = surface.positions[v.index()];
                    }
                }
            }
        }
        stats.vertices_frozen += frozen.len() as u64;
        warn!(
            frozen = frozen.len(),
            iterations = self.max_iterations,
            "Impact zones did not converge; freezing zone vertices"
        );
        surface.rebuild_broad_phase()?;
        Ok(ZoneOutcome::Frozen { vertices: frozen })
    }
}

/// Minimal union-find over dense indices.
struct DisjointSets {
    parent: Vec<usize>,
}

impl DisjointSets {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[ra.max(rb)] = ra.min(rb);
        }
    }
}

/// Fold new collisions into the previous zones.
///
/// Only dynamic vertices join zones; a solid vertex touched by two zones
/// does not fuse them.
fn merge_zones(
    surface: &DynamicSurface,
    previous: Vec<ImpactZone>,
    collisions: Vec<Collision>,
) -> Vec<ImpactZone> {
    let mut slot: HashMap<VertexId, usize> = HashMap::new();
    let mut order: Vec<VertexId> = Vec::new();
    let mut index_of = |v: VertexId, slot: &mut HashMap<VertexId, usize>| {
        *slot.entry(v).or_insert_with(|| {
            order.push(v);
            order.len() - 1
        })
    };

    let all_collisions: Vec<Collision> = previous
        .into_iter()
        .flat_map(|z| z.collisions)
        .chain(collisions)
        .collect();

    let mut groups: Vec<Vec<usize>> = Vec::with_capacity(all_collisions.len());
    for c in &all_collisions {
        let members: Vec<usize> = c
            .vertices
            .iter()
            .filter(|&&v| !surface.is_solid(v))
            .map(|&v| index_of(v, &mut slot))
            .collect();
        groups.push(members);
    }

    let mut sets = DisjointSets::new(order.len());
    for members in &groups {
        for pair in members.windows(2) {
            sets.union(pair[0], pair[1]);
        }
    }

    let mut by_root: HashMap<usize, ImpactZone> = HashMap::new();
    for (c, members) in all_collisions.into_iter().zip(&groups) {
        let Some(&first) = members.first() else {
            continue;
        };
        let root = sets.find(first);
        by_root
            .entry(root)
            .or_insert_with(|| ImpactZone {
                vertices: Vec::new(),
                collisions: Vec::new(),
            })
            .collisions
            .push(c);
    }
    for (i, &v) in order.iter().enumerate() {
        let root = sets.find(i);
        if let Some(zone) = by_root.get_mut(&root) {
            zone.vertices.push(v);
        }
    }

    let mut zones: Vec<ImpactZone> = by_root.into_values().collect();
    for zone in &mut zones {
        zone.vertices.sort_unstable();
    }
    zones.sort_by_key(|z| z.vertices.first().copied());
    zones
}

/// Zero every constraint's normal relative displacement with the smallest
/// mass-weighted change. Returns false when the system cannot be solved.
fn inelastic_projection(surface: &mut DynamicSurface, zone: &ImpactZone) -> bool {
    let n = zone.vertices.len();
    let m = zone.collisions.len();
    if n == 0 || m == 0 {
        return false;
    }
    let column: HashMap<VertexId, usize> = zone
        .vertices
        .iter()
        .enumerate()
        .map(|(k, &v)| (v, k))
        .collect();

    // Row c of J holds w_i n_c in the three columns of vertex i
    let mut jacobian = DMatrix::<f64>::zeros(m, 3 * n);
    let mut rhs = DVector::<f64>::zeros(m);
    for (row, c) in zone.collisions.iter().enumerate() {
        let normal = c.impact.normal;
        let mut relative = 0.0;
        for (&v, w) in c.vertices.iter().zip(c.impact.weights) {
            let displacement = surface.new_positions[v.index()] - surface.positions[v.index()];
            relative += w * displacement.dot(normal);
            if let Some(&k) = column.get(&v) {
                for axis in 0..3 {
                    jacobian[(row, 3 * k + axis)] += w * normal[axis];
                }
            }
        }
        rhs[row] = -relative;
    }

    let inverse_mass = DVector::<f64>::from_fn(3 * n, |i, _| surface.inverse_mass(zone.vertices[i / 3]));
    let weighted = DMatrix::<f64>::from_fn(3 * n, m, |i, j| jacobian[(j, i)] * inverse_mass[i]);
    let mut system = &jacobian * &weighted;
    let scale = system.diagonal().max();
    if !(scale > 0.0) {
        return false;
    }
    for i in 0..m {
        system[(i, i)] += 1e-10 * scale;
    }

    let Some(cholesky) = system.cholesky() else {
        trace!(constraints = m, "Impact zone system not positive definite");
        return false;
    };
    let lambda = cholesky.solve(&rhs);
    let correction = &weighted * lambda;
    if correction.iter().any(|x| !x.is_finite()) {
        return false;
    }

    for (k, &v) in zone.vertices.iter().enumerate() {
        let delta = DVec3::new(correction[3 * k], correction[3 * k + 1], correction[3 * k + 2]);
        surface.new_positions[v.index()] += delta;
    }
    true
}

/// Replace the zone's motion by the rigid motion with the same linear and
/// angular momentum. Zones touching solid vertices stay put.
fn rigid_motion(surface: &mut DynamicSurface, zone: &ImpactZone) {
    let touches_solid = zone
        .collisions
        .iter()
        .any(|c| c.vertices.iter().any(|&v| surface.is_solid(v)));
    if touches_solid {
        for &v in &zone.vertices {
            surface.new_positions[v.index()] = surface.positions[v.index()];
        }
        return;
    }

    let mut total_mass = 0.0;
    let mut center = DVec3::ZERO;
    let mut velocity = DVec3::ZERO;
    for &v in &zone.vertices {
        let mass = surface.masses[v.index()];
        total_mass += mass;
        center += surface.positions[v.index()] * mass;
        velocity += (surface.new_positions[v.index()] - surface.positions[v.index()]) * mass;
    }
    center /= total_mass;
    velocity /= total_mass;

    let mut angular_momentum = DVec3::ZERO;
    let mut inertia = DMat3::ZERO;
    for &v in &zone.vertices {
        let mass = surface.masses[v.index()];
        let r = surface.positions[v.index()] - center;
        let d = surface.new_positions[v.index()] - surface.positions[v.index()] - velocity;
        angular_momentum += r.cross(d) * mass;
        inertia += (DMat3::from_diagonal(DVec3::splat(r.length_squared())) - outer(r, r)) * mass;
    }

    let omega = if inertia.determinant().abs() > 1e-300 {
        inertia.inverse() * angular_momentum
    } else {
        DVec3::ZERO
    };
    let angle = omega.length();
    let rotation = if angle > 0.0 {
        DMat3::from_axis_angle(omega / angle, angle)
    } else {
        DMat3::IDENTITY
    };

    for &v in &zone.vertices {
        let r = surface.positions[v.index()] - center;
        surface.new_positions[v.index()] = center + velocity + rotation * r;
    }
}
