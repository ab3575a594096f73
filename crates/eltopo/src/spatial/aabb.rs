use glam::DVec3;
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: DVec3,
    pub max: DVec3,
}

impl Aabb {
    pub fn new(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    /// Box around a point set. An empty slice yields an inverted box.
    pub fn from_points(points: &[DVec3]) -> Self {
        points.iter().fold(Self::empty(), |b, &p| b.include(p))
    }

    /// The inverted box that any `include` replaces.
    pub fn empty() -> Self {
        Self {
            min: DVec3::splat(f64::INFINITY),
            max: DVec3::splat(f64::NEG_INFINITY),
        }
    }

    pub fn include(self, p: DVec3) -> Self {
        Self {
            min: self.min.min(p),
            max: self.max.max(p),
        }
    }

    pub fn union(self, other: Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn padded(self, amount: f64) -> Self {
        Self {
            min: self.min - DVec3::splat(amount),
            max: self.max + DVec3::splat(amount),
        }
    }

    /// Finite and not inverted on any axis.
    pub fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min.cmple(self.max).all()
    }

    pub fn overlaps(&self, other: &Self) -> bool {
        self.min.cmple(other.max).all() && other.min.cmple(self.max).all()
    }

    pub fn extent(&self) -> DVec3 {
        self.max - self.min
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlap_and_validity() {
        let a = Aabb::from_points(&[DVec3::ZERO, DVec3::ONE]);
        let b = Aabb::new(DVec3::splat(1.0), DVec3::splat(2.0));
        let c = Aabb::new(DVec3::splat(1.5), DVec3::splat(2.0));
        assert!(a.is_valid());
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
        assert!(a.padded(0.6).overlaps(&c));
        assert!(!Aabb::empty().is_valid());
        assert!(!Aabb::new(DVec3::ONE, DVec3::ZERO).is_valid());
    }
}
