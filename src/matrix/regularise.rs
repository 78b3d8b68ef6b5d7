//! Transition-matrix regularisation
//!
//! Converts an observed N x N row-stochastic TTC matrix over `frequency`
//! months into a one-month matrix by recovering its generator, repairing
//! spurious negative off-diagonal rates, and exponentiating back. Repair
//! strategies fall back WA -> DA -> QO when the exponentiated matrix misses
//! row-stochasticity by more than `ROW_SUM_TOL`. Finally the matrix is
//! augmented with an absorbing write-off state fed from the default row.

use super::funcs::{expm, logm};
use crate::assumptions::RepairStrategy;
use crate::error::{EngineError, Result};
use ndarray::{Array1, Array2};

/// Acceptable row-sum error after exponentiation.
const ROW_SUM_TOL: f64 = 1e-6;

/// Clip negatives to zero and renormalise every row to sum to one.
/// Rows with no mass collapse to the identity row.
pub fn standardise(m: &mut Array2<f64>) {
    let n = m.ncols();
    for (i, mut row) in m.rows_mut().into_iter().enumerate() {
        row.mapv_inplace(|v| v.max(0.0));
        let total: f64 = row.sum();
        if total > 0.0 {
            row.mapv_inplace(|v| v / total);
        } else if i < n {
            row[i] = 1.0;
        }
    }
}

/// Regularise a TTC matrix into a one-month row-stochastic matrix.
///
/// `frequency` is the number of months the observed matrix covers.
pub fn monthly_matrix(
    ttc: &Array2<f64>,
    frequency: u32,
    segment_id: i64,
) -> Result<Array2<f64>> {
    let mut x = ttc.clone();
    standardise(&mut x);

    let generator = logm(&x).ok_or_else(|| EngineError::InvalidTtcMatrix {
        segment_id,
        message: "no principal logarithm (complex or non-positive spectrum)".into(),
    })?;
    let q = generator / frequency as f64;

    for strategy in [
        RepairStrategy::WeightedAdjustment,
        RepairStrategy::DiagonalAdjustment,
        RepairStrategy::QuasiOptimisation,
    ] {
        let repaired = repair(&q, strategy);
        let mut p = expm(&repaired);
        if max_row_sum_error(&p) <= ROW_SUM_TOL && p.iter().all(|v| *v > -ROW_SUM_TOL) {
            standardise(&mut p);
            return Ok(p);
        }
    }

    Err(EngineError::MatrixRegularisation {
        segment_id,
        message: "no repair strategy produced a row-stochastic matrix".into(),
    })
}

fn max_row_sum_error(p: &Array2<f64>) -> f64 {
    p.rows()
        .into_iter()
        .map(|row| (row.sum() - 1.0).abs())
        .fold(0.0, f64::max)
}

/// Apply one repair strategy to every row of a generator matrix.
pub fn repair(q: &Array2<f64>, strategy: RepairStrategy) -> Array2<f64> {
    let mut out = q.clone();
    let n = q.ncols();
    for i in 0..n {
        let row: Vec<f64> = (0..n).map(|j| q[[i, j]]).collect();
        let fixed = match strategy {
            RepairStrategy::WeightedAdjustment => repair_row_wa(&row, i),
            RepairStrategy::DiagonalAdjustment => repair_row_da(&row, i),
            RepairStrategy::QuasiOptimisation => repair_row_qo(&row, i),
        };
        for (j, v) in fixed.into_iter().enumerate() {
            out[[i, j]] = v;
        }
    }
    out
}

/// WA: spread the negative off-diagonal mass over the positive
/// off-diagonals proportionally, keeping the diagonal untouched.
fn repair_row_wa(row: &[f64], diag: usize) -> Vec<f64> {
    let neg: f64 = row
        .iter()
        .enumerate()
        .filter(|(j, v)| *j != diag && **v < 0.0)
        .map(|(_, v)| -v)
        .sum();
    let pos: f64 = row
        .iter()
        .enumerate()
        .filter(|(j, v)| *j != diag && **v > 0.0)
        .map(|(_, v)| *v)
        .sum();

    if neg == 0.0 {
        return row.to_vec();
    }
    if pos <= 0.0 {
        // Nothing to absorb the mass; clear negatives and let the caller's
        // row-sum check decide whether to fall back.
        return row
            .iter()
            .enumerate()
            .map(|(j, v)| if j != diag && *v < 0.0 { 0.0 } else { *v })
            .collect();
    }

    let w = neg / pos;
    row.iter()
        .enumerate()
        .map(|(j, v)| {
            if j == diag {
                *v
            } else if *v > 0.0 {
                *v * (1.0 - w)
            } else {
                0.0
            }
        })
        .collect()
}

/// DA: clear negative off-diagonals and reset the diagonal so the row
/// sums to zero.
fn repair_row_da(row: &[f64], diag: usize) -> Vec<f64> {
    let mut out: Vec<f64> = row
        .iter()
        .enumerate()
        .map(|(j, v)| if j != diag { v.max(0.0) } else { *v })
        .collect();
    let off_sum: f64 = out
        .iter()
        .enumerate()
        .filter(|(j, _)| *j != diag)
        .map(|(_, v)| *v)
        .sum();
    out[diag] = -off_sum;
    out
}

/// QO: L2 projection of the row onto valid generator rows (off-diagonals
/// non-negative, row sum zero). Active-set projection; each pass shifts
/// the active coordinates onto the sum-zero hyperplane and freezes any
/// off-diagonal that lands negative.
fn repair_row_qo(row: &[f64], diag: usize) -> Vec<f64> {
    let n = row.len();
    let mut out = row.to_vec();
    let mut active: Vec<bool> = vec![true; n];

    loop {
        let count = active.iter().filter(|a| **a).count();
        if count == 0 {
            break;
        }
        let shift: f64 = out
            .iter()
            .enumerate()
            .filter(|(j, _)| active[*j])
            .map(|(_, v)| *v)
            .sum::<f64>()
            / count as f64;

        let mut changed = false;
        for j in 0..n {
            if !active[j] {
                continue;
            }
            let candidate = out[j] - shift;
            if j != diag && candidate < 0.0 {
                out[j] = 0.0;
                active[j] = false;
                changed = true;
            }
        }
        if !changed {
            for j in 0..n {
                if active[j] {
                    out[j] -= shift;
                }
            }
            break;
        }
    }
    out
}

/// Append an absorbing write-off state fed from the default row.
///
/// The force of transition out of default is `1 / time_to_sale`; cures and
/// write-offs split the outflow `p_cure : 1 - p_cure` in the long run.
pub fn augment_write_off(
    p: &Array2<f64>,
    time_to_sale: u32,
    probability_of_cure: f64,
    cure_state: usize,
) -> Array2<f64> {
    let n = p.ncols();
    let default_state = n - 1;
    let wo_state = n;

    let mut out = Array2::zeros((n + 1, n + 1));
    for i in 0..n {
        for j in 0..n {
            out[[i, j]] = p[[i, j]];
        }
    }

    let (stay, cure, write_off) = default_outflow(time_to_sale, probability_of_cure);
    let mut default_row = Array1::zeros(n + 1);
    default_row[cure_state] += cure;
    default_row[default_state] += stay;
    default_row[wo_state] += write_off;
    for j in 0..=n {
        out[[default_state, j]] = default_row[j];
    }

    for j in 0..=n {
        out[[wo_state, j]] = 0.0;
    }
    out[[wo_state, wo_state]] = 1.0;
    out
}

/// One-month (stay, cure, write-off) probabilities for the default state.
fn default_outflow(time_to_sale: u32, probability_of_cure: f64) -> (f64, f64, f64) {
    if (1.0 - probability_of_cure) < f64::EPSILON {
        // Limit of an infinite cure intensity: immediate certain cure.
        return (0.0, 1.0, 0.0);
    }
    let mu_w = 1.0 / time_to_sale as f64;
    let mu_c = mu_w * probability_of_cure / (1.0 - probability_of_cure);
    let stay = (-(mu_c + mu_w)).exp();
    let cure = (1.0 - stay) * probability_of_cure;
    let write_off = 1.0 - stay - cure;
    (stay, cure, write_off)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn row_sums_ok(p: &Array2<f64>) -> bool {
        max_row_sum_error(p) < 1e-9 && p.iter().all(|v| (0.0..=1.0 + 1e-9).contains(v))
    }

    #[test]
    fn test_standardise_clips_and_renormalises() {
        let mut m = array![[0.9, -0.1, 0.3], [0.0, 0.0, 0.0], [0.2, 0.2, 0.6]];
        standardise(&mut m);
        assert!((m.row(0).sum() - 1.0).abs() < 1e-12);
        assert!((m[[0, 1]]).abs() < 1e-12);
        // Empty row collapses to identity
        assert!((m[[1, 1]] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_monthly_matrix_round_trip() {
        // Annual matrix with a clean generator, so no repair mass is moved
        // and the fractional root composes back exactly.
        let generator = array![
            [-0.12, 0.10, 0.015, 0.005],
            [0.05, -0.15, 0.07, 0.03],
            [0.01, 0.09, -0.20, 0.10],
            [0.0, 0.0, 0.0, 0.0],
        ];
        let annual = crate::matrix::funcs::expm(&generator);
        let monthly = monthly_matrix(&annual, 12, 1).unwrap();
        assert!(row_sums_ok(&monthly));

        // Twelve monthly steps reproduce the annual matrix
        let mut composed = Array2::eye(4);
        for _ in 0..12 {
            composed = composed.dot(&monthly);
        }
        for (a, b) in composed.iter().zip(annual.iter()) {
            assert!((a - b).abs() < 1e-6, "round trip {a} vs {b}");
        }
    }

    #[test]
    fn test_wa_repair_clears_negatives_and_keeps_zero_sum() {
        let row = vec![-0.1, -0.02, 0.08, 0.04];
        let fixed = repair_row_wa(&row, 0);
        assert!(fixed[1] >= 0.0 && fixed[2] >= 0.0 && fixed[3] >= 0.0);
        let sum: f64 = fixed.iter().sum();
        assert!(sum.abs() < 1e-12);
    }

    #[test]
    fn test_da_repair_resets_diagonal() {
        let row = vec![-0.1, -0.02, 0.08, 0.04];
        let fixed = repair_row_da(&row, 0);
        assert_eq!(fixed[1], 0.0);
        assert!((fixed[0] + fixed[2] + fixed[3]).abs() < 1e-12);
    }

    #[test]
    fn test_qo_repair_projects_to_valid_row() {
        let row = vec![-0.15, -0.03, 0.09, 0.05];
        let fixed = repair_row_qo(&row, 0);
        let sum: f64 = fixed.iter().sum();
        assert!(sum.abs() < 1e-12);
        for (j, v) in fixed.iter().enumerate() {
            if j != 0 {
                assert!(*v >= 0.0);
            }
        }
    }

    #[test]
    fn test_invalid_matrix_is_rejected() {
        // Period-two chain: eigenvalues {1, -1}, no real generator.
        let flip = array![[0.0, 1.0], [1.0, 0.0]];
        assert!(matches!(
            monthly_matrix(&flip, 12, 7),
            Err(EngineError::InvalidTtcMatrix { segment_id: 7, .. })
        ));
    }

    #[test]
    fn test_write_off_augmentation() {
        let p = array![[0.98, 0.02], [0.0, 1.0]];
        let augmented = augment_write_off(&p, 12, 0.3, 0);
        assert_eq!(augmented.dim(), (3, 3));
        assert!(row_sums_ok(&augmented));

        // Default row: stay + cure + write-off split
        let stay = augmented[[1, 1]];
        let cure = augmented[[1, 0]];
        let wo = augmented[[1, 2]];
        assert!((stay + cure + wo - 1.0).abs() < 1e-12);
        // Long-run cure : write-off split is p_cure : 1 - p_cure
        assert!((cure / (cure + wo) - 0.3).abs() < 1e-9);

        // Write-off row is absorbing
        assert!((augmented[[2, 2]] - 1.0).abs() < 1e-12);
        assert_eq!(augmented[[2, 0]], 0.0);
    }

    #[test]
    fn test_certain_cure_limit() {
        let (stay, cure, wo) = default_outflow(12, 1.0);
        assert_eq!((stay, cure, wo), (0.0, 1.0, 0.0));
    }
}
