//! Mesh maintenance: keep edge lengths and triangle shapes within bounds
//! without ever introducing an intersection.
//!
//! ## Operators
//!
//! - **Split** long edges (or the longest edge of an obtuse triangle)
//! - **Collapse** short edges (or the shortest edge of a needle triangle)
//! - **Flip** edges toward shorter or Delaunay diagonals
//! - **Smooth** vertices along the null space of their face-normal quadric
//!
//! Every operator is a small parameter holder built from
//! [`StaticOptions`](eltopo_config::StaticOptions). Passes walk candidates in a
//! deterministic order (sorted by length, ties by id) and report whether
//! anything changed so callers can sweep until the mesh settles.
//!
//! ## Safety
//!
//! Edits that only change connectivity are checked statically against the
//! mesh. Edits that move vertices are checked as a pseudo-motion with
//! continuous collision detection. Either check failing rejects the edit and
//! leaves the surface untouched.

use glam::DVec3;
use topology::VertexId;

use crate::geometry::patch_volume;
use crate::surface::DynamicSurface;

mod curvature;
mod edge_collapse;
mod edge_flip;
mod edge_split;
mod metrics;
mod smoothing;
mod subdivision;

pub use curvature::{curvature_multiplier, mean_curvature};
pub use edge_collapse::{CollapseResult, EdgeCollapser};
pub use edge_flip::{EdgeFlipper, FlipResult};
pub use edge_split::{EdgeSplitter, SplitResult};
pub use metrics::{MeshQuality, QualityLimits, calculate_mesh_quality};
pub use smoothing::NullSpaceSmoother;
pub use subdivision::{Butterfly, Midpoint, QuadraticErrorMin, SubdivisionScheme, scheme_for};

/// Why a maintenance or topology edit was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The element was deleted by an earlier edit in the same pass
    DeadElement,
    /// A solid vertex would have to move
    SolidVertex,
    /// The edit would produce invalid or non-manifold connectivity
    Topology,
    /// A new triangle would be too small or badly shaped
    Quality,
    /// Enclosed volume would change by more than allowed
    VolumeChange,
    /// The edit would introduce an intersection
    Collision,
    /// The edit would not improve the mesh
    NoImprovement,
}

/// Outcome of a single edit attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum EditOutcome<T> {
    Applied(T),
    Rejected(Rejection),
}

impl<T> EditOutcome<T> {
    pub fn is_applied(&self) -> bool {
        matches!(self, EditOutcome::Applied(_))
    }

    pub fn applied(self) -> Option<T> {
        match self {
            EditOutcome::Applied(value) => Some(value),
            EditOutcome::Rejected(_) => None,
        }
    }

    pub fn rejection(&self) -> Option<Rejection> {
        match self {
            EditOutcome::Applied(_) => None,
            EditOutcome::Rejected(reason) => Some(*reason),
        }
    }
}

/// `tri` with every occurrence of `from` replaced by `to`.
pub(crate) fn replace_vertex(tri: [VertexId; 3], from: VertexId, to: VertexId) -> [VertexId; 3] {
    tri.map(|v| if v == from { to } else { v })
}

/// Enclosed-volume change when `v` alone moves to `target`.
pub(crate) fn displacement_volume(surface: &DynamicSurface, v: VertexId, target: DVec3) -> f64 {
    let origin = surface.position(v);
    let mut before = Vec::new();
    let mut after = Vec::new();
    for &t in surface.mesh().vertex_triangles(v) {
        let Some(tri) = surface.mesh().triangle(t) else {
            continue;
        };
        let points = surface.triangle_points(tri);
        before.push(points);
        after.push(tri.map(|u| if u == v { target } else { surface.position(u) }));
    }
    patch_volume(&after, origin) - patch_volume(&before, origin)
}
