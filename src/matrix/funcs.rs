//! Dense matrix functions
//!
//! Matrix exponential, logarithm, square root and fractional powers for the
//! small dense matrices (N <= ~33) the transition engine works with.
//!
//! exp uses scaling-and-squaring with a truncated Taylor series; log uses
//! inverse scaling-and-squaring (repeated principal square roots via the
//! Denman-Beavers iteration, then a Mercator series). The inner solves run
//! on faer's partial-pivot LU. A matrix whose principal logarithm does not
//! exist (complex or non-positive spectrum) shows up as a failed square-root
//! iteration and is reported as `None`; callers attach domain context.

use faer::prelude::SpSolver;
use faer::{FaerMat, Mat};
use ndarray::Array2;

/// Convergence tolerance for the iterative kernels.
const TOL: f64 = 1e-13;

/// Maximum Denman-Beavers iterations per square root.
const MAX_SQRT_ITER: usize = 64;

/// Maximum square-root levels in the inverse scaling-and-squaring log.
const MAX_LOG_LEVELS: usize = 40;

fn to_faer(a: &Array2<f64>) -> Mat<f64> {
    let (n, m) = a.dim();
    let mut mat = Mat::zeros(n, m);
    for i in 0..n {
        for j in 0..m {
            mat.write(i, j, a[[i, j]]);
        }
    }
    mat
}

fn from_faer(mat: &Mat<f64>, n: usize) -> Array2<f64> {
    Array2::from_shape_fn((n, n), |(i, j)| mat.read(i, j))
}

/// Matrix 1-norm (maximum absolute column sum).
pub fn norm_1(a: &Array2<f64>) -> f64 {
    let (n, m) = a.dim();
    (0..m)
        .map(|j| (0..n).map(|i| a[[i, j]].abs()).sum())
        .fold(0.0, f64::max)
}

fn identity(n: usize) -> Array2<f64> {
    Array2::eye(n)
}

fn is_finite(a: &Array2<f64>) -> bool {
    a.iter().all(|v| v.is_finite())
}

/// Inverse via LU with partial pivoting. `None` when singular.
pub fn inverse(a: &Array2<f64>) -> Option<Array2<f64>> {
    let n = a.nrows();
    let lu = to_faer(a).partial_piv_lu();
    let solution = lu.solve(&Mat::from_fn(n, n, |i, j| if i == j { 1.0 } else { 0.0 }));
    let inv = from_faer(&solution, n);
    is_finite(&inv).then_some(inv)
}

/// Matrix exponential by scaling and squaring.
pub fn expm(a: &Array2<f64>) -> Array2<f64> {
    let n = a.nrows();
    let norm = norm_1(a);
    let squarings = if norm > 0.5 {
        (norm / 0.5).log2().ceil() as u32
    } else {
        0
    };
    let scaled = a / 2f64.powi(squarings as i32);

    // Taylor series on the scaled matrix; ||scaled|| <= 0.5 so the terms
    // decay fast enough for full double precision.
    let mut result = identity(n);
    let mut term = identity(n);
    for k in 1..=30 {
        term = term.dot(&scaled) / k as f64;
        result = &result + &term;
        if norm_1(&term) < TOL {
            break;
        }
    }

    for _ in 0..squarings {
        result = result.dot(&result);
    }
    result
}

/// Principal matrix square root via the Denman-Beavers iteration.
///
/// Fails (returns `None`) when an iterate is singular or the iteration
/// does not converge, which happens exactly when the principal root does
/// not exist for the input.
pub fn sqrtm(a: &Array2<f64>) -> Option<Array2<f64>> {
    let n = a.nrows();
    let mut y = a.clone();
    let mut z = identity(n);

    for _ in 0..MAX_SQRT_ITER {
        let y_inv = inverse(&y)?;
        let z_inv = inverse(&z)?;
        let y_next = (&y + &z_inv) * 0.5;
        let z_next = (&z + &y_inv) * 0.5;

        let delta = norm_1(&(&y_next - &y));
        y = y_next;
        z = z_next;
        if !is_finite(&y) {
            return None;
        }
        if delta < TOL * norm_1(&y).max(1.0) {
            // Residual check guards against converging to a non-principal root.
            let residual = norm_1(&(&y.dot(&y) - a));
            return (residual < 1e-8 * norm_1(a).max(1.0)).then_some(y);
        }
    }
    None
}

/// Principal matrix logarithm by inverse scaling and squaring.
pub fn logm(a: &Array2<f64>) -> Option<Array2<f64>> {
    let n = a.nrows();
    if !is_finite(a) {
        return None;
    }

    let mut root = a.clone();
    let mut levels = 0usize;
    while norm_1(&(&root - &identity(n))) > 0.1 {
        if levels >= MAX_LOG_LEVELS {
            return None;
        }
        root = sqrtm(&root)?;
        levels += 1;
    }

    // Mercator series log(I + E) with ||E|| <= 0.1.
    let e = &root - &identity(n);
    let mut result = Array2::zeros((n, n));
    let mut power = identity(n);
    let mut sign = 1.0;
    for k in 1..=30 {
        power = power.dot(&e);
        result = &result + &(&power * (sign / k as f64));
        sign = -sign;
        if norm_1(&power) / (k as f64) < TOL {
            break;
        }
    }

    result *= 2f64.powi(levels as i32);
    is_finite(&result).then_some(result)
}

/// Fractional matrix power `a^p` through the principal logarithm.
pub fn powm(a: &Array2<f64>, p: f64) -> Option<Array2<f64>> {
    let log = logm(a)?;
    Some(expm(&(&log * p)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn max_abs_diff(a: &Array2<f64>, b: &Array2<f64>) -> f64 {
        (a - b).iter().fold(0.0, |acc: f64, v| acc.max(v.abs()))
    }

    #[test]
    fn test_expm_diagonal() {
        let a = array![[1.0, 0.0], [0.0, -2.0]];
        let e = expm(&a);
        assert!((e[[0, 0]] - 1f64.exp()).abs() < 1e-12);
        assert!((e[[1, 1]] - (-2f64).exp()).abs() < 1e-12);
        assert!(e[[0, 1]].abs() < 1e-14);
    }

    #[test]
    fn test_expm_logm_round_trip() {
        let p = array![[0.95, 0.04, 0.01], [0.05, 0.90, 0.05], [0.0, 0.0, 1.0]];
        let q = logm(&p).unwrap();
        let back = expm(&q);
        assert!(max_abs_diff(&back, &p) < 1e-10);
    }

    #[test]
    fn test_sqrtm_squares_back() {
        let p = array![[0.9, 0.1], [0.02, 0.98]];
        let r = sqrtm(&p).unwrap();
        assert!(max_abs_diff(&r.dot(&r), &p) < 1e-10);
    }

    #[test]
    fn test_powm_fractional_root() {
        let p = array![[0.97, 0.03], [0.0, 1.0]];
        let monthly = powm(&p, 1.0 / 12.0).unwrap();
        let mut annual = Array2::eye(2);
        for _ in 0..12 {
            annual = annual.dot(&monthly);
        }
        assert!(max_abs_diff(&annual, &p) < 1e-6);
    }

    #[test]
    fn test_logm_fails_on_negative_spectrum() {
        // Rotation-like matrix with eigenvalues on the negative real axis.
        let a = array![[-1.0, 0.0], [0.0, -1.0]];
        assert!(logm(&a).is_none());
    }

    #[test]
    fn test_inverse() {
        let a = array![[2.0, 1.0], [1.0, 1.0]];
        let inv = inverse(&a).unwrap();
        assert!(max_abs_diff(&a.dot(&inv), &Array2::eye(2)) < 1e-12);

        let singular = array![[1.0, 1.0], [1.0, 1.0]];
        assert!(inverse(&singular).is_none());
    }
}
