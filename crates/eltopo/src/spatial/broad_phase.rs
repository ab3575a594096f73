use tracing::debug;

use super::{AccelerationGrid, Aabb, GridError};

/// Which element family a query targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Vertex,
    Edge,
    Triangle,
}

/// One acceleration grid per element family.
#[derive(Debug, Clone, Default)]
pub struct BroadPhaseGrid {
    vertices: AccelerationGrid,
    edges: AccelerationGrid,
    triangles: AccelerationGrid,
}

impl BroadPhaseGrid {
    /// Empty grids sized to `bounds` with cells near `cell_length`.
    pub fn sized_for(bounds: Aabb, cell_length: f64, counts: [usize; 3]) -> Self {
        debug!(
            vertices = counts[0],
            edges = counts[1],
            triangles = counts[2],
            cell_length,
            "Building broad phase"
        );
        Self {
            vertices: AccelerationGrid::sized_for(bounds, cell_length, counts[0]),
            edges: AccelerationGrid::sized_for(bounds, cell_length, counts[1]),
            triangles: AccelerationGrid::sized_for(bounds, cell_length, counts[2]),
        }
    }

    fn grid(&self, kind: ElementKind) -> &AccelerationGrid {
        match kind {
            ElementKind::Vertex => &self.vertices,
            ElementKind::Edge => &self.edges,
            ElementKind::Triangle => &self.triangles,
        }
    }

    fn grid_mut(&mut self, kind: ElementKind) -> &mut AccelerationGrid {
        match kind {
            ElementKind::Vertex => &mut self.vertices,
            ElementKind::Edge => &mut self.edges,
            ElementKind::Triangle => &mut self.triangles,
        }
    }

    pub fn update(&mut self, kind: ElementKind, idx: usize, aabb: Aabb) -> Result<(), GridError> {
        self.grid_mut(kind).update_element(idx, aabb)
    }

    pub fn remove(&mut self, kind: ElementKind, idx: usize) {
        self.grid_mut(kind).remove_element(idx);
    }

    pub fn contains(&self, kind: ElementKind, idx: usize) -> bool {
        self.grid(kind).contains(idx)
    }

    pub fn element_box(&self, kind: ElementKind, idx: usize) -> Option<Aabb> {
        self.grid(kind).element_box(idx)
    }

    /// Elements of `kind` whose stored box overlaps `query`.
    pub fn overlapping(&self, kind: ElementKind, query: &Aabb) -> Vec<usize> {
        let mut out = Vec::new();
        self.grid(kind).find_overlapping_elements(query, &mut out);
        out
    }
}
