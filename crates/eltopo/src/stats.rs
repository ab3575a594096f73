//! Per-run operation counters.

use serde::{Deserialize, Serialize};

/// Counters accumulated over one tracking run.
///
/// Owned by the caller and passed down explicitly; nothing in the crate keeps
/// global counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub edges_split: u64,
    pub edges_collapsed: u64,
    pub edges_flipped: u64,
    pub vertices_smoothed: u64,
    pub edges_merged: u64,
    pub vertices_pinched: u64,
    pub flaps_removed: u64,
    /// Edits refused by a geometric, topological or collision check
    pub edits_rejected: u64,
    pub ccd_tests: u64,
    pub collisions_detected: u64,
    pub impulses_applied: u64,
    pub repulsion_impulses: u64,
    pub impact_zone_iterations: u64,
    pub rigid_zone_fallbacks: u64,
    pub vertices_frozen: u64,
    pub dt_cuts: u64,
}

impl RunStats {
    /// Fold another run's counters into this one.
    pub fn absorb(&mut self, other: &RunStats) {
        self.edges_split += other.edges_split;
        self.edges_collapsed += other.edges_collapsed;
        self.edges_flipped += other.edges_flipped;
        self.vertices_smoothed += other.vertices_smoothed;
        self.edges_merged += other.edges_merged;
        self.vertices_pinched += other.vertices_pinched;
        self.flaps_removed += other.flaps_removed;
        self.edits_rejected += other.edits_rejected;
        self.ccd_tests += other.ccd_tests;
        self.collisions_detected += other.collisions_detected;
        self.impulses_applied += other.impulses_applied;
        self.repulsion_impulses += other.repulsion_impulses;
        self.impact_zone_iterations += other.impact_zone_iterations;
        self.rigid_zone_fallbacks += other.rigid_zone_fallbacks;
        self.vertices_frozen += other.vertices_frozen;
        self.dt_cuts += other.dt_cuts;
    }

    /// Total topology edits performed.
    pub fn mesh_edits(&self) -> u64 {
        self.edges_split
            + self.edges_collapsed
            + self.edges_flipped
            + self.edges_merged
            + self.vertices_pinched
            + self.flaps_removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absorb_sums_counters() {
        let mut a = RunStats {
            edges_split: 2,
            ccd_tests: 10,
            ..Default::default()
        };
        let b = RunStats {
            edges_split: 1,
            edges_flipped: 4,
            ..Default::default()
        };
        a.absorb(&b);
        assert_eq!(a.edges_split, 3);
        assert_eq!(a.mesh_edits(), 7);
        assert_eq!(a.ccd_tests, 10);
    }
}
