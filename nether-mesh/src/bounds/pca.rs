//! Principal axes of a point cloud
//!
//! Cyclic Jacobi eigen-decomposition of the covariance matrix, in f64.

use glam::{DMat3, DVec3, Mat3, Vec3};

/// Upper bound on Jacobi rotations
pub const JACOBI_MAX_ITERATIONS: usize = 100;

/// Off-diagonal norm, relative to the matrix norm, at which iteration stops
pub const JACOBI_TOLERANCE: f64 = 1e-12;

/// Mean of the points (zero for an empty set)
pub fn mean(points: &[Vec3]) -> DVec3 {
    if points.is_empty() {
        return DVec3::ZERO;
    }
    let sum: DVec3 = points.iter().map(|p| p.as_dvec3()).sum();
    sum / points.len() as f64
}

/// Population covariance matrix
pub fn covariance(points: &[Vec3], mean: DVec3) -> DMat3 {
    if points.is_empty() {
        return DMat3::ZERO;
    }
    let mut m = [[0.0f64; 3]; 3];
    for p in points {
        let d = p.as_dvec3() - mean;
        let d = d.to_array();
        for (r, row) in m.iter_mut().enumerate() {
            for (c, value) in row.iter_mut().enumerate() {
                *value += d[r] * d[c];
            }
        }
    }
    // symmetric, so rows and columns are interchangeable
    DMat3::from_cols_array_2d(&m) / points.len() as f64
}

/// `sqrt(a01² + a02² + a12²)`
fn off_diagonal_norm(a: &DMat3) -> f64 {
    let a01 = a.col(1).x;
    let a02 = a.col(2).x;
    let a12 = a.col(2).y;
    (a01 * a01 + a02 * a02 + a12 * a12).sqrt()
}

/// Largest off-diagonal element `(p, q)` with `p < q`
fn pivot(a: &DMat3) -> (usize, usize) {
    let candidates = [(0, 1), (0, 2), (1, 2)];
    let mut best = candidates[0];
    for &(p, q) in &candidates[1..] {
        if a.col(q)[p].abs() > a.col(best.1)[best.0].abs() {
            best = (p, q);
        }
    }
    best
}

/// Eigenvectors of a symmetric matrix as the columns of a rotation
///
/// Returns the identity when the matrix is already diagonal. The result is
/// right-handed.
pub fn eigenvectors(matrix: DMat3) -> DMat3 {
    let scale = matrix.to_cols_array().iter().map(|v| v * v).sum::<f64>().sqrt();
    let mut v = DMat3::IDENTITY;
    if scale == 0.0 {
        return v;
    }

    let mut a = matrix;
    let mut iterations = 0;
    while off_diagonal_norm(&a) >= JACOBI_TOLERANCE * scale && iterations < JACOBI_MAX_ITERATIONS {
        let (p, q) = pivot(&a);
        let a_pq = a.col(q)[p];
        let theta = 0.5 * (2.0 * a_pq).atan2(a.col(q)[q] - a.col(p)[p]);
        let (s, c) = theta.sin_cos();

        let mut j = DMat3::IDENTITY;
        j.col_mut(p)[p] = c;
        j.col_mut(q)[q] = c;
        j.col_mut(q)[p] = s;
        j.col_mut(p)[q] = -s;

        a = j.transpose() * a * j;
        v *= j;
        iterations += 1;
    }

    if v.determinant() < 0.0 {
        v.z_axis = -v.z_axis;
    }
    v
}

/// Principal axes (columns) of a point cloud
pub fn principal_axes(points: &[Vec3]) -> Mat3 {
    let center = mean(points);
    eigenvectors(covariance(points, center)).as_mat3()
}
