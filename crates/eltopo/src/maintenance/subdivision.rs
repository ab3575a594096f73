//! Placement of vertices created on an edge by splits and collapses.
//!
//! Butterfly stencil for edge (a, b), falling back to the midpoint whenever a
//! wing triangle is missing:
//!
//! ```text
//!      w1-----c-----w2
//!        \   / \   /        p = (a + b)/2 + (c + d)/8
//!         \ /   \ /             - (w1 + w2 + w3 + w4)/16
//!          a-----b
//!         / \   / \
//!        /   \ /   \
//!      w3-----d-----w4
//! ```

use glam::{DMat3, DVec3};
use topology::{TriangleId, VertexId};

use eltopo_config::SubdivisionKind;

use crate::geometry::{outer, triangle_unit_normal};
use crate::surface::DynamicSurface;

/// A rule for placing the vertex that replaces or splits edge `(a, b)`.
pub trait SubdivisionScheme: std::fmt::Debug + Send + Sync {
    fn edge_point(&self, surface: &DynamicSurface, a: VertexId, b: VertexId) -> DVec3;
}

pub fn scheme_for(kind: SubdivisionKind) -> Box<dyn SubdivisionScheme> {
    match kind {
        SubdivisionKind::Midpoint => Box::new(Midpoint),
        SubdivisionKind::Butterfly => Box::new(Butterfly),
        SubdivisionKind::QuadraticErrorMin => Box::new(QuadraticErrorMin),
    }
}

fn midpoint(surface: &DynamicSurface, a: VertexId, b: VertexId) -> DVec3 {
    (surface.position(a) + surface.position(b)) * 0.5
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Midpoint;

impl SubdivisionScheme for Midpoint {
    fn edge_point(&self, surface: &DynamicSurface, a: VertexId, b: VertexId) -> DVec3 {
        midpoint(surface, a, b)
    }
}

/// Modified butterfly stencil over the two incident triangles and their
/// four wing neighbors.
#[derive(Debug, Clone, Copy, Default)]
pub struct Butterfly;

impl Butterfly {
    fn stencil(surface: &DynamicSurface, a: VertexId, b: VertexId) -> Option<DVec3> {
        let mesh = surface.mesh();
        let edge = mesh.find_edge(a, b)?;
        let &[t0, t1] = mesh.edge_triangles(edge) else {
            return None;
        };
        let c = mesh.opposite_vertex(t0, a, b)?;
        let d = mesh.opposite_vertex(t1, a, b)?;

        let wing = |u: VertexId, w: VertexId, inner: TriangleId| -> Option<DVec3> {
            let e = mesh.find_edge(u, w)?;
            let &[s0, s1] = mesh.edge_triangles(e) else {
                return None;
            };
            let outer = if s0 == inner { s1 } else { s0 };
            mesh.opposite_vertex(outer, u, w).map(|v| surface.position(v))
        };
        let wings = wing(a, c, t0)? + wing(b, c, t0)? + wing(a, d, t1)? + wing(b, d, t1)?;

        Some(
            midpoint(surface, a, b) + (surface.position(c) + surface.position(d)) / 8.0
                - wings / 16.0,
        )
    }
}

impl SubdivisionScheme for Butterfly {
    fn edge_point(&self, surface: &DynamicSurface, a: VertexId, b: VertexId) -> DVec3 {
        Self::stencil(surface, a, b).unwrap_or_else(|| midpoint(surface, a, b))
    }
}

/// Point minimizing the summed squared distance to the planes of every
/// triangle around either endpoint, regularized toward the midpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuadraticErrorMin;

const QEM_REGULARIZATION: f64 = 1e-2;

impl SubdivisionScheme for QuadraticErrorMin {
    fn edge_point(&self, surface: &DynamicSurface, a: VertexId, b: VertexId) -> DVec3 {
        let mesh = surface.mesh();
        let mid = midpoint(surface, a, b);

        let mut triangles: Vec<TriangleId> = mesh.vertex_triangles(a).to_vec();
        for &t in mesh.vertex_triangles(b) {
            if !triangles.contains(&t) {
                triangles.push(t);
            }
        }

        let mut quadric = DMat3::ZERO;
        let mut rhs = DVec3::ZERO;
        for t in triangles {
            let Some([p, q, r]) = surface.triangle_positions(t) else {
                continue;
            };
            let n = triangle_unit_normal(p, q, r);
            if n == DVec3::ZERO {
                continue;
            }
            quadric += outer(n, n);
            rhs += n * n.dot(p);
        }

        let trace = quadric.x_axis.x + quadric.y_axis.y + quadric.z_axis.z;
        let lambda = (QEM_REGULARIZATION * trace / 3.0).max(1e-12);
        let system = quadric + DMat3::from_diagonal(DVec3::splat(lambda));
        if system.determinant().abs() <= f64::EPSILON {
            return mid;
        }
        let x = system.inverse() * (rhs + lambda * mid);
        if x.is_finite() { x } else { mid }
    }
}
