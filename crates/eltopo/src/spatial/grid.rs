//! Uniform acceleration grid over element bounding boxes.

use std::cell::Cell;

use glam::DVec3;
use tracing::trace;

use super::Aabb;

/// Errors raised when inserting into the grid.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GridError {
    #[error("Element {0} has a degenerate bounding box")]
    DegenerateBox(usize),
}

type CellRange = ([usize; 3], [usize; 3]);

/// Uniform 3D grid of cells, each listing the elements whose box overlaps it.
///
/// Every element remembers the cell range it occupies so updates and removals
/// touch only those cells. Queries deduplicate with a per-element visit stamp
/// instead of sorting their output.
#[derive(Debug, Clone)]
pub struct AccelerationGrid {
    dims: [usize; 3],
    origin: DVec3,
    cell_size: DVec3,
    cells: Vec<Vec<usize>>,
    element_cells: Vec<Option<CellRange>>,
    element_boxes: Vec<Option<Aabb>>,
    last_visit: Vec<Cell<u32>>,
    query_stamp: Cell<u32>,
}

impl Default for AccelerationGrid {
    fn default() -> Self {
        Self::new([1, 1, 1], DVec3::ZERO, DVec3::ONE)
    }
}

impl AccelerationGrid {
    pub fn new(dims: [usize; 3], origin: DVec3, cell_size: DVec3) -> Self {
        let dims = dims.map(|d| d.max(1));
        Self {
            dims,
            origin,
            cell_size: cell_size.max(DVec3::splat(f64::MIN_POSITIVE)),
            cells: vec![Vec::new(); dims[0] * dims[1] * dims[2]],
            element_cells: Vec::new(),
            element_boxes: Vec::new(),
            last_visit: Vec::new(),
            query_stamp: Cell::new(0),
        }
    }

    /// Grid covering `bounds` with cells of roughly `cell_length`.
    ///
    /// The number of cells along any axis is capped at `element_count` so
    /// sparse inputs do not allocate large empty grids.
    pub fn sized_for(bounds: Aabb, cell_length: f64, element_count: usize) -> Self {
        if !bounds.is_valid() {
            return Self::default();
        }
        let extent = bounds.extent();
        let cap = element_count.max(1);
        let cell_length = if cell_length > 0.0 && cell_length.is_finite() {
            cell_length
        } else {
            extent.max_element().max(1.0)
        };
        let dims = extent
            .to_array()
            .map(|e| (((e / cell_length).ceil() as usize).max(1)).min(cap));
        let cell_size = DVec3::new(
            extent.x / dims[0] as f64,
            extent.y / dims[1] as f64,
            extent.z / dims[2] as f64,
        )
        .max(DVec3::splat(cell_length * 1e-6));
        trace!(?dims, cell_length, "Sized acceleration grid");
        Self::new(dims, bounds.min, cell_size)
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    pub fn contains(&self, idx: usize) -> bool {
        self.element_boxes.get(idx).is_some_and(Option::is_some)
    }

    pub fn element_box(&self, idx: usize) -> Option<Aabb> {
        self.element_boxes.get(idx).copied().flatten()
    }

    fn cell_coord(&self, p: DVec3) -> [usize; 3] {
        let rel = (p - self.origin) / self.cell_size;
        let mut out = [0usize; 3];
        for axis in 0..3 {
            let c = rel[axis].floor();
            out[axis] = if c <= 0.0 {
                0
            } else {
                (c as usize).min(self.dims[axis] - 1)
            };
        }
        out
    }

    fn cell_range(&self, aabb: &Aabb) -> CellRange {
        (self.cell_coord(aabb.min), self.cell_coord(aabb.max))
    }

    fn cell_index(&self, i: usize, j: usize, k: usize) -> usize {
        (k * self.dims[1] + j) * self.dims[0] + i
    }

    fn for_each_cell(range: CellRange, mut f: impl FnMut(usize, usize, usize)) {
        let (lo, hi) = range;
        for k in lo[2]..=hi[2] {
            for j in lo[1]..=hi[1] {
                for i in lo[0]..=hi[0] {
                    f(i, j, k);
                }
            }
        }
    }

    /// Insert or replace element `idx`.
    pub fn add_element(&mut self, idx: usize, aabb: Aabb) -> Result<(), GridError> {
        if !aabb.is_valid() {
            return Err(GridError::DegenerateBox(idx));
        }
        if self.contains(idx) {
            self.remove_element(idx);
        }
        if idx >= self.element_boxes.len() {
            self.element_boxes.resize(idx + 1, None);
            self.element_cells.resize(idx + 1, None);
            self.last_visit.resize_with(idx + 1, || Cell::new(0));
        }

        let range = self.cell_range(&aabb);
        let mut touched = Vec::new();
        Self::for_each_cell(range, |i, j, k| touched.push(self.cell_index(i, j, k)));
        for cell in touched {
            self.cells[cell].push(idx);
        }
        self.element_cells[idx] = Some(range);
        self.element_boxes[idx] = Some(aabb);
        Ok(())
    }

    pub fn update_element(&mut self, idx: usize, aabb: Aabb) -> Result<(), GridError> {
        self.add_element(idx, aabb)
    }

    /// Remove element `idx`; absent elements are ignored.
    pub fn remove_element(&mut self, idx: usize) {
        let Some(range) = self.element_cells.get_mut(idx).and_then(Option::take) else {
            return;
        };
        let mut touched = Vec::new();
        Self::for_each_cell(range, |i, j, k| touched.push(self.cell_index(i, j, k)));
        for cell in touched {
            let list = &mut self.cells[cell];
            if let Some(pos) = list.iter().position(|&e| e == idx) {
                list.swap_remove(pos);
            }
        }
        self.element_boxes[idx] = None;
    }

    pub fn clear(&mut self) {
        for cell in &mut self.cells {
            cell.clear();
        }
        self.element_cells.clear();
        self.element_boxes.clear();
        self.last_visit.clear();
        self.query_stamp.set(0);
    }

    fn next_stamp(&self) -> u32 {
        let stamp = self.query_stamp.get();
        if stamp == u32::MAX {
            for visit in &self.last_visit {
                visit.set(0);
            }
            self.query_stamp.set(1);
            1
        } else {
            self.query_stamp.set(stamp + 1);
            stamp + 1
        }
    }

    /// Elements whose stored box overlaps `query`, each reported once.
    pub fn find_overlapping_elements(&self, query: &Aabb, out: &mut Vec<usize>) {
        out.clear();
        if !query.is_valid() {
            return;
        }
        let stamp = self.next_stamp();
        let range = self.cell_range(query);
        Self::for_each_cell(range, |i, j, k| {
            for &element in &self.cells[self.cell_index(i, j, k)] {
                let visit = &self.last_visit[element];
                if visit.get() == stamp {
                    continue;
                }
                visit.set(stamp);
                if self.element_boxes[element].is_some_and(|b| b.overlaps(query)) {
                    out.push(element);
                }
            }
        });
    }

    #[cfg(test)]
    pub(crate) fn force_stamp(&self, stamp: u32) {
        self.query_stamp.set(stamp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box(at: DVec3) -> Aabb {
        Aabb::new(at, at + DVec3::splat(0.5))
    }

    fn grid() -> AccelerationGrid {
        AccelerationGrid::sized_for(Aabb::new(DVec3::ZERO, DVec3::splat(4.0)), 1.0, 100)
    }

    #[test]
    fn test_query_reports_each_element_once() {
        let mut g = grid();
        // Spans many cells
        g.add_element(0, Aabb::new(DVec3::ZERO, DVec3::splat(3.5))).unwrap();
        g.add_element(1, unit_box(DVec3::splat(3.0))).unwrap();
        let mut out = Vec::new();
        g.find_overlapping_elements(&Aabb::new(DVec3::ZERO, DVec3::splat(4.0)), &mut out);
        out.sort_unstable();
        assert_eq!(out, vec![0, 1]);
    }

    #[test]
    fn test_remove_and_update() {
        let mut g = grid();
        g.add_element(3, unit_box(DVec3::ZERO)).unwrap();
        let mut out = Vec::new();
        g.find_overlapping_elements(&unit_box(DVec3::ZERO), &mut out);
        assert_eq!(out, vec![3]);

        g.update_element(3, unit_box(DVec3::splat(3.0))).unwrap();
        g.find_overlapping_elements(&unit_box(DVec3::ZERO), &mut out);
        assert!(out.is_empty());

        g.remove_element(3);
        g.find_overlapping_elements(&unit_box(DVec3::splat(3.0)), &mut out);
        assert!(out.is_empty());
        assert!(!g.contains(3));
    }

    #[test]
    fn test_rejects_inverted_box() {
        let mut g = grid();
        let err = g.add_element(0, Aabb::new(DVec3::ONE, DVec3::ZERO));
        assert_eq!(err, Err(GridError::DegenerateBox(0)));
    }

    #[test]
    fn test_elements_outside_bounds_are_clamped() {
        let mut g = grid();
        g.add_element(0, unit_box(DVec3::splat(10.0))).unwrap();
        let mut out = Vec::new();
        g.find_overlapping_elements(&unit_box(DVec3::splat(10.2)), &mut out);
        assert_eq!(out, vec![0]);
    }

    #[test]
    fn test_stamp_wraparound_resets() {
        let mut g = grid();
        g.add_element(0, unit_box(DVec3::ZERO)).unwrap();
        g.force_stamp(u32::MAX - 1);
        let mut out = Vec::new();
        for _ in 0..3 {
            g.find_overlapping_elements(&unit_box(DVec3::ZERO), &mut out);
            assert_eq!(out, vec![0]);
        }
    }

    #[test]
    fn test_dims_capped_by_element_count() {
        let g = AccelerationGrid::sized_for(Aabb::new(DVec3::ZERO, DVec3::splat(100.0)), 0.01, 8);
        assert!(g.dims().iter().all(|&d| d <= 8));
    }
}
