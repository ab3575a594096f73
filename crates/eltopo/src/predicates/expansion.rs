//! Floating-point expansion arithmetic.
//!
//! An [`Expansion`] represents a real number exactly as an unevaluated sum
//! of non-overlapping doubles, ordered by increasing magnitude. Sums and
//! products of expansions are exact (barring overflow/underflow), so the sign
//! of any polynomial in the input doubles can be decided exactly.
//!
//! Algorithms follow Shewchuk, "Adaptive Precision Floating-Point Arithmetic
//! and Fast Robust Geometric Predicates" (1997): `two_sum`, `two_product`,
//! grow-expansion, expansion-sum and scale-expansion, with zero elimination.

use std::cmp::Ordering;

/// Exact `a + b` as `(rounded sum, roundoff)`.
#[inline]
pub fn two_sum(a: f64, b: f64) -> (f64, f64) {
    let x = a + b;
    let b_virtual = x - a;
    let a_virtual = x - b_virtual;
    let b_roundoff = b - b_virtual;
    let a_roundoff = a - a_virtual;
    (x, a_roundoff + b_roundoff)
}

/// Exact `a - b` as `(rounded difference, roundoff)`.
#[inline]
pub fn two_diff(a: f64, b: f64) -> (f64, f64) {
    two_sum(a, -b)
}

/// Exact `a * b` as `(rounded product, roundoff)`.
#[inline]
pub fn two_product(a: f64, b: f64) -> (f64, f64) {
    let x = a * b;
    (x, a.mul_add(b, -x))
}

/// Exact real number stored as a sum of non-overlapping doubles.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Expansion {
    /// Components in increasing magnitude, zeros removed
    components: Vec<f64>,
}

impl Expansion {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn from_f64(value: f64) -> Self {
        let mut e = Self::zero();
        if value != 0.0 {
            e.components.push(value);
        }
        e
    }

    /// Exact `a - b`.
    pub fn diff(a: f64, b: f64) -> Self {
        let (x, y) = two_diff(a, b);
        Self::from_pair(x, y)
    }

    /// Exact `a * b`.
    pub fn product_of(a: f64, b: f64) -> Self {
        let (x, y) = two_product(a, b);
        Self::from_pair(x, y)
    }

    fn from_pair(high: f64, low: f64) -> Self {
        let mut components = Vec::with_capacity(2);
        if low != 0.0 {
            components.push(low);
        }
        if high != 0.0 {
            components.push(high);
        }
        Self { components }
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Add one double exactly (Grow-Expansion).
    pub fn grow(&self, b: f64) -> Self {
        let mut q = b;
        let mut out = Vec::with_capacity(self.components.len() + 1);
        for &e in &self.components {
            let (sum, err) = two_sum(q, e);
            if err != 0.0 {
                out.push(err);
            }
            q = sum;
        }
        if q != 0.0 {
            out.push(q);
        }
        Self { components: out }
    }

    /// Exact sum of two expansions.
    pub fn add(&self, other: &Self) -> Self {
        let (small, large) = if self.len() < other.len() {
            (self, other)
        } else {
            (other, self)
        };
        small
            .components
            .iter()
            .fold(large.clone(), |acc, &c| acc.grow(c))
    }

    pub fn neg(&self) -> Self {
        Self {
            components: self.components.iter().map(|c| -c).collect(),
        }
    }

    pub fn sub(&self, other: &Self) -> Self {
        self.add(&other.neg())
    }

    /// Multiply by one double exactly (Scale-Expansion).
    pub fn scale(&self, b: f64) -> Self {
        if b == 0.0 || self.is_empty() {
            return Self::zero();
        }
        let mut out = Vec::with_capacity(self.components.len() * 2);
        let (mut q, low) = two_product(self.components[0], b);
        if low != 0.0 {
            out.push(low);
        }
        for &e in &self.components[1..] {
            let (product, product_low) = two_product(e, b);
            let (sum, err) = two_sum(q, product_low);
            if err != 0.0 {
                out.push(err);
            }
            let (new_q, err) = two_sum(product, sum);
            if err != 0.0 {
                out.push(err);
            }
            q = new_q;
        }
        if q != 0.0 {
            out.push(q);
        }
        Self { components: out }
    }

    /// Exact product of two expansions.
    pub fn mul(&self, other: &Self) -> Self {
        let (small, large) = if self.len() < other.len() {
            (self, other)
        } else {
            (other, self)
        };
        small
            .components
            .iter()
            .fold(Self::zero(), |acc, &c| acc.add(&large.scale(c)))
    }

    /// Sign of the represented value: -1, 0 or 1.
    pub fn sign(&self) -> i32 {
        match self.components.last() {
            Some(&top) if top > 0.0 => 1,
            Some(&top) if top < 0.0 => -1,
            _ => 0,
        }
    }

    /// Nearest-double approximation of the value.
    pub fn estimate(&self) -> f64 {
        self.components.iter().sum()
    }

    /// Compare two expansions exactly.
    pub fn compare(&self, other: &Self) -> Ordering {
        match self.sub(other).sign() {
            1 => Ordering::Greater,
            -1 => Ordering::Less,
            _ => Ordering::Equal,
        }
    }
}

/// Three exact coordinates.
#[derive(Debug, Clone, Default)]
pub struct ExpansionVec3 {
    pub x: Expansion,
    pub y: Expansion,
    pub z: Expansion,
}

impl ExpansionVec3 {
    pub fn new(x: Expansion, y: Expansion, z: Expansion) -> Self {
        Self { x, y, z }
    }

    /// Exact `a - b` componentwise.
    pub fn diff(a: [f64; 3], b: [f64; 3]) -> Self {
        Self::new(
            Expansion::diff(a[0], b[0]),
            Expansion::diff(a[1], b[1]),
            Expansion::diff(a[2], b[2]),
        )
    }

    pub fn sub(&self, other: &Self) -> Self {
        Self::new(self.x.sub(&other.x), self.y.sub(&other.y), self.z.sub(&other.z))
    }

    pub fn cross(&self, other: &Self) -> Self {
        Self::new(
            self.y.mul(&other.z).sub(&self.z.mul(&other.y)),
            self.z.mul(&other.x).sub(&self.x.mul(&other.z)),
            self.x.mul(&other.y).sub(&self.y.mul(&other.x)),
        )
    }

    pub fn dot(&self, other: &Self) -> Expansion {
        self.x
            .mul(&other.x)
            .add(&self.y.mul(&other.y))
            .add(&self.z.mul(&other.z))
    }
}

/// Exact triple product `a · (b × c)`.
pub fn triple_product(a: &ExpansionVec3, b: &ExpansionVec3, c: &ExpansionVec3) -> Expansion {
    a.dot(&b.cross(c))
}
