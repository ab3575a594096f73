//! Orientation predicates with a floating-point filter and exact fallback.

use glam::DVec3;

use super::expansion::{Expansion, ExpansionVec3, triple_product};

/// Static error bound coefficient for the 3x3 determinant filter.
const ORIENT3D_ERROR_BOUND: f64 = (7.0 + 56.0 * f64::EPSILON / 2.0) * f64::EPSILON / 2.0;

/// One infinitesimal per coordinate of each of the four points.
const PERTURBATIONS: u32 = 12;

/// Signed volume-like determinant `(b - a) · ((c - a) × (d - a))`.
///
/// Positive when `d` lies on the side of the plane through `a, b, c` that the
/// normal `(b - a) × (c - a)` points into. The sign is always exact; the
/// magnitude is approximate when the filter falls back to expansions.
pub fn orient3d(a: DVec3, b: DVec3, c: DVec3, d: DVec3) -> f64 {
    let ba = b - a;
    let ca = c - a;
    let da = d - a;

    let det = ba.x * (ca.y * da.z - ca.z * da.y) + ba.y * (ca.z * da.x - ca.x * da.z)
        + ba.z * (ca.x * da.y - ca.y * da.x);

    let permanent = ba.x.abs() * ((ca.y * da.z).abs() + (ca.z * da.y).abs())
        + ba.y.abs() * ((ca.z * da.x).abs() + (ca.x * da.z).abs())
        + ba.z.abs() * ((ca.x * da.y).abs() + (ca.y * da.x).abs());

    if det.abs() > ORIENT3D_ERROR_BOUND * permanent {
        return det;
    }

    let exact = orient3d_exact(a, b, c, d);
    match exact {
        0 => 0.0,
        s => {
            let magnitude = det.abs().max(f64::MIN_POSITIVE);
            f64::from(s) * magnitude
        }
    }
}

/// Exact sign of [`orient3d`].
pub fn orient3d_exact(a: DVec3, b: DVec3, c: DVec3, d: DVec3) -> i32 {
    let ba = ExpansionVec3::diff(b.to_array(), a.to_array());
    let ca = ExpansionVec3::diff(c.to_array(), a.to_array());
    let da = ExpansionVec3::diff(d.to_array(), a.to_array());
    triple_product(&ba, &ca, &da).sign()
}

/// Sign of [`orient3d`] as -1, 0 or 1.
pub fn orient3d_sign(a: DVec3, b: DVec3, c: DVec3, d: DVec3) -> i32 {
    let det = orient3d(a, b, c, d);
    if det > 0.0 {
        1
    } else if det < 0.0 {
        -1
    } else {
        0
    }
}

/// Parity of the permutation that sorts `indices`: 1 for even, -1 for odd.
pub fn permutation_parity(indices: &[usize]) -> i32 {
    let mut inversions = 0usize;
    for i in 0..indices.len() {
        for j in (i + 1)..indices.len() {
            if indices[i] > indices[j] {
                inversions += 1;
            }
        }
    }
    if inversions % 2 == 0 { 1 } else { -1 }
}

/// [`orient3d_sign`] with exact zeros resolved by simulation of simplicity.
///
/// Coordinate `j` of the point with the `r`-th smallest index is perturbed by
/// `ε^(2^(3r + j))`, and the sign of the perturbed determinant as `ε → 0` is
/// returned. It depends on the coordinates, not only on the indices, and
/// permuting the arguments together with their indices changes it exactly
/// as it changes the determinant. The result is never zero.
pub fn orient3d_sos(points: [DVec3; 4], indices: [usize; 4]) -> i32 {
    match orient3d_sign(points[0], points[1], points[2], points[3]) {
        0 => perturbed_orient3d_sign(points, indices),
        sign => sign,
    }
}

/// Sign of the leading nonzero term of the perturbed determinant.
///
/// `orient3d` is minus the determinant of the rows `[x, y, z, 1]`. The
/// coefficient of a product of infinitesimals sitting at entries with
/// distinct rows and columns is the complementary minor with its Laplace
/// sign. Bit `k` of a mask stands for infinitesimal `k`, so masks in
/// increasing order visit the terms from largest to smallest.
fn perturbed_orient3d_sign(points: [DVec3; 4], indices: [usize; 4]) -> i32 {
    let matrix = points.map(|p| [p.x, p.y, p.z, 1.0]);
    let mut by_rank = [0usize, 1, 2, 3];
    by_rank.sort_by_key(|&row| indices[row]);

    (1u32..(1 << PERTURBATIONS))
        .find_map(|mask| {
            let mut entries: Vec<(usize, usize)> = (0..PERTURBATIONS)
                .filter(|k| mask & (1 << k) != 0)
                .map(|k| (by_rank[(k / 3) as usize], (k % 3) as usize))
                .collect();
            entries.sort();
            let rows: Vec<usize> = entries.iter().map(|&(row, _)| row).collect();
            let cols: Vec<usize> = entries.iter().map(|&(_, col)| col).collect();
            if has_repeat(&rows) || has_repeat(&cols) {
                return None;
            }

            let kept_rows: Vec<usize> = (0..4).filter(|r| !rows.contains(r)).collect();
            let mut kept_cols: Vec<usize> = (0..4).filter(|c| !cols.contains(c)).collect();
            let minor = exact_det(&matrix, &kept_rows, &mut kept_cols).sign();
            if minor == 0 {
                return None;
            }
            let offset: usize = rows.iter().chain(&cols).sum();
            let laplace = if offset % 2 == 0 { 1 } else { -1 };
            Some(-minor * laplace * permutation_parity(&cols))
        })
        .unwrap_or(0)
}

fn has_repeat(values: &[usize]) -> bool {
    values.iter().enumerate().any(|(i, v)| values[i + 1..].contains(v))
}

/// Exact determinant of the submatrix on `rows` × `cols`, by cofactor
/// expansion along the first row.
fn exact_det(matrix: &[[f64; 4]; 4], rows: &[usize], cols: &mut Vec<usize>) -> Expansion {
    let Some((&row, rest)) = rows.split_first() else {
        return Expansion::from_f64(1.0);
    };
    let mut total = Expansion::zero();
    for i in 0..cols.len() {
        let col = cols.remove(i);
        let term = exact_det(matrix, rest, cols).scale(matrix[row][col]);
        cols.insert(i, col);
        total = if i % 2 == 0 { total.add(&term) } else { total.sub(&term) };
    }
    total
}
