//! Ordered record of mesh edits.
//!
//! Callers holding per-vertex or per-triangle data alongside the mesh replay
//! these events to keep their arrays in step with the tracker.

use serde::{Deserialize, Serialize};
use topology::{CompactionMap, TriangleId, VertexId};

/// Where a newly created vertex came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VertexOrigin {
    /// Inserted on the edge between two existing vertices
    EdgeSplit([VertexId; 2]),
    /// Copy of an existing vertex made when separating a singular vertex
    Duplicate(VertexId),
}

/// A single mesh edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeshEvent {
    VertexAdded {
        vertex: VertexId,
        origin: VertexOrigin,
    },
    VertexRemoved {
        vertex: VertexId,
    },
    TriangleAdded {
        triangle: TriangleId,
        vertices: [VertexId; 3],
    },
    TriangleRemoved {
        triangle: TriangleId,
    },
}

/// Append-only event log with rollback to a mark.
#[derive(Debug, Clone, Default)]
pub struct MeshHistory {
    events: Vec<MeshEvent>,
}

impl MeshHistory {
    pub fn record(&mut self, event: MeshEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[MeshEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Discard events recorded after `mark` (a previous [`len`](Self::len)).
    pub fn truncate(&mut self, mark: usize) {
        self.events.truncate(mark);
    }

    pub fn drain(&mut self) -> Vec<MeshEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn count(&self, pred: impl Fn(&MeshEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }
}

/// Everything a caller needs to remap its own arrays after defragmentation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DefragInfo {
    /// Events since the previous defragmentation, in order
    pub events: Vec<MeshEvent>,
    /// Old vertex slot to new slot, `None` for deleted vertices
    pub vertex_map: Vec<Option<VertexId>>,
    /// Old triangle slot to new slot, `None` for deleted triangles
    pub triangle_map: Vec<Option<TriangleId>>,
}

impl DefragInfo {
    pub fn new(events: Vec<MeshEvent>, map: CompactionMap) -> Self {
        Self {
            events,
            vertex_map: map.vertex_map,
            triangle_map: map.triangle_map,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_rolls_back() {
        let mut h = MeshHistory::default();
        h.record(MeshEvent::VertexRemoved {
            vertex: VertexId(1),
        });
        let mark = h.len();
        h.record(MeshEvent::TriangleRemoved {
            triangle: TriangleId(0),
        });
        h.truncate(mark);
        assert_eq!(h.len(), 1);
        assert_eq!(
            h.count(|e| matches!(e, MeshEvent::VertexRemoved { .. })),
            1
        );
        assert_eq!(h.drain().len(), 1);
        assert!(h.is_empty());
    }
}
