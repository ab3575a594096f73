//! Pinching: repair of singular vertices and flaps.
//!
//! A vertex is singular when its triangles fall into several fans that only
//! touch at the vertex, e.g. where two sheets have pulled apart at a point:
//!
//! ```text
//!     \  fan 0 /              \  fan 0 /
//!      \      /                \      /
//!       \    /                  \    /
//!         v          ->           v
//!       /    \                    v'
//!      /      \                 /    \
//!     /  fan 1 \               /  fan 1 \
//! ```
//!
//! Every fan after the first gets its own copy of the vertex, nudged toward
//! the fan so the two no longer coincide.

use glam::DVec3;
use topology::{TriangleId, VertexId};
use tracing::{debug, trace};

use eltopo_config::StaticOptions;

use crate::error::TrackError;
use crate::geometry::triangle_centroid;
use crate::history::VertexOrigin;
use crate::maintenance::replace_vertex;
use crate::stats::RunStats;
use crate::surface::DynamicSurface;

#[derive(Debug, Clone, Copy)]
pub struct MeshPincher {
    pull_fraction: f64,
}

impl MeshPincher {
    pub fn new(options: &StaticOptions) -> Self {
        Self {
            pull_fraction: options.pinch_pull_fraction,
        }
    }

    /// Delete pairs of triangles spanning the same three vertices, then any
    /// vertex left without triangles. Returns the number of pairs removed.
    pub fn remove_flaps(
        &self,
        surface: &mut DynamicSurface,
        stats: &mut RunStats,
    ) -> Result<usize, TrackError> {
        let mut removed = 0usize;
        let mut touched: Vec<VertexId> = Vec::new();
        for group in surface.mesh().duplicate_triangles() {
            for pair in group.chunks_exact(2) {
                for &t in pair {
                    touched.extend(surface.remove_triangle(t)?);
                }
                removed += 1;
            }
        }

        touched.sort();
        touched.dedup();
        for v in touched {
            if surface.mesh().is_vertex_live(v) && surface.mesh().vertex_triangles(v).is_empty() {
                surface.remove_vertex(v)?;
            }
        }

        stats.flaps_removed += removed as u64;
        if removed > 0 {
            debug!(removed, "Removed flaps");
        }
        Ok(removed)
    }

    /// Give every extra fan of a singular vertex its own copy of the vertex.
    /// Returns the number of copies made.
    pub fn separate_singular_vertices(
        &self,
        surface: &mut DynamicSurface,
        stats: &mut RunStats,
    ) -> Result<usize, TrackError> {
        let vertices: Vec<VertexId> = surface.mesh().live_vertices().collect();
        let mut pinched = 0usize;
        for v in vertices {
            let fans = surface.mesh().vertex_fans(v);
            for fan in fans.iter().skip(1) {
                if self.pinch_fan(surface, v, fan, stats)? {
                    pinched += 1;
                } else {
                    stats.edits_rejected += 1;
                    trace!(?v, "Pinch rejected");
                }
            }
        }
        stats.vertices_pinched += pinched as u64;
        if pinched > 0 {
            debug!(pinched, "Separated singular vertices");
        }
        Ok(pinched)
    }

    fn pinch_fan(
        &self,
        surface: &mut DynamicSurface,
        v: VertexId,
        fan: &[TriangleId],
        stats: &mut RunStats,
    ) -> Result<bool, TrackError> {
        let mark = surface.history().len();
        let origin = surface.position(v);
        let mass = surface.masses()[v.index()];

        let centroid = fan
            .iter()
            .filter_map(|&t| surface.triangle_positions(t))
            .map(|[a, b, c]| triangle_centroid(a, b, c))
            .fold(DVec3::ZERO, |acc, c| acc + c)
            / fan.len().max(1) as f64;

        let copy = surface.add_vertex(origin, mass, VertexOrigin::Duplicate(v))?;
        let mut relabelled = Vec::with_capacity(fan.len());
        for &t in fan {
            let Some(tri) = surface.mesh().triangle(t) else {
                continue;
            };
            surface.relabel_triangle(t, replace_vertex(tri, v, copy))?;
            relabelled.push(t);
        }

        if surface.is_solid(v) {
            return Ok(true);
        }
        let target = origin + self.pull_fraction * (centroid - origin);
        let moves = [(copy, target)];
        if !surface.collision_safety() || !surface.pseudo_motion_collides(&moves, &[v, copy], &[], stats) {
            surface.set_position(copy, target)?;
            return Ok(true);
        }

        for t in relabelled {
            if let Some(tri) = surface.mesh().triangle(t) {
                surface.relabel_triangle(t, replace_vertex(tri, copy, v))?;
            }
        }
        surface.remove_vertex(copy)?;
        surface.history_mut().truncate(mark);
        Ok(false)
    }
}
