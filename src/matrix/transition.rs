//! Scenario-conditional transition matrices
//!
//! Takes the regularised one-month TTC matrix (write-off state included)
//! and produces one point-in-time matrix per forecast month by conditioning
//! on the credit-cycle index Z under the single-factor Merton-Vasicek
//! model. Prefix products are cached at construction because every
//! downstream component walks the whole cumulative path.

use super::regularise::{augment_write_off, monthly_matrix, standardise};
use crate::assumptions::{LgdAssumptions, PdAssumptions, PdMethod};
use crate::dates::MonthEnd;
use crate::error::Result;
use crate::scenario::Scenario;
use ndarray::{Array1, Array2};
use statrs::function::erf;

/// Probabilities are clamped this far inside (0, 1) before the quantile
/// transform so the tails stay finite.
const DELTA: f64 = 1e-10;

fn norm_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf::erf(x / std::f64::consts::SQRT_2))
}

fn norm_ppf(p: f64) -> f64 {
    std::f64::consts::SQRT_2 * erf::erf_inv(2.0 * p - 1.0)
}

/// Monthly transition matrices over a forecast window, with cached
/// cumulative products `P_0 * ... * P_t`.
#[derive(Debug, Clone)]
pub struct TransitionMatrix {
    start: MonthEnd,
    monthly: Vec<Array2<f64>>,
    cumulative: Vec<Array2<f64>>,
}

impl TransitionMatrix {
    /// Build the PiT series for one (segment, scenario) pair.
    ///
    /// The horizon must cover the longest remaining life among the
    /// accounts of the segment.
    pub fn from_assumptions(
        pd: &PdAssumptions,
        lgd: &LgdAssumptions,
        scenario: &Scenario,
        start: MonthEnd,
        horizon: usize,
        segment_id: i64,
    ) -> Result<Self> {
        let one_month = monthly_matrix(&pd.transition_matrix, pd.frequency, segment_id)?;
        let augmented = augment_write_off(
            &one_month,
            lgd.time_to_sale,
            lgd.probability_of_cure,
            pd.cure_state,
        );

        let z = scenario.series(&pd.z_index, start, horizon)?;
        let conditioner = ZConditioner::new(&augmented, pd.rho, pd.calibrated, pd.method);

        let monthly: Vec<Array2<f64>> = z.iter().map(|&z_t| conditioner.conditional(z_t)).collect();

        let mut cumulative: Vec<Array2<f64>> = Vec::with_capacity(monthly.len());
        for matrix in &monthly {
            let next = match cumulative.last() {
                Some(prefix) => prefix.dot(matrix),
                None => matrix.clone(),
            };
            cumulative.push(next);
        }

        Ok(Self {
            start,
            monthly,
            cumulative,
        })
    }

    pub fn start(&self) -> MonthEnd {
        self.start
    }

    pub fn len(&self) -> usize {
        self.monthly.len()
    }

    pub fn is_empty(&self) -> bool {
        self.monthly.is_empty()
    }

    /// Number of states, write-off included.
    pub fn n_states(&self) -> usize {
        self.monthly.first().map(|m| m.ncols()).unwrap_or(0)
    }

    /// Index of the default state (the worst rating before write-off).
    pub fn default_state(&self) -> usize {
        self.n_states() - 2
    }

    /// Index of the absorbing write-off state.
    pub fn write_off_state(&self) -> usize {
        self.n_states() - 1
    }

    /// One-month matrix at horizon `t`.
    pub fn monthly(&self, t: usize) -> &Array2<f64> {
        &self.monthly[t]
    }

    /// Cumulative product `P_0 * ... * P_t`.
    pub fn cumulative(&self, t: usize) -> &Array2<f64> {
        &self.cumulative[t]
    }
}

/// Precomputed quantile matrices for conditioning on Z.
struct ZConditioner {
    /// Default distance `D = ppf(C)` of the cumulative-from-right TTC rows
    distance: Array2<f64>,
    /// `-D[:, default]`, the default barrier per row (METHOD-2)
    barrier: Array1<f64>,
    rho: f64,
    calibrated: bool,
    method: PdMethod,
    write_off: usize,
}

impl ZConditioner {
    fn new(p: &Array2<f64>, rho: f64, calibrated: bool, method: PdMethod) -> Self {
        let n = p.ncols();
        let default_state = n - 2;

        // C[i, j] = sum_{k >= j} p[i, k], clamped into (0, 1)
        let mut distance = Array2::zeros((n, n));
        for i in 0..n {
            let mut tail = 0.0;
            for j in (0..n).rev() {
                tail += p[[i, j]];
                let clamped = tail.clamp(DELTA, 1.0 - DELTA);
                distance[[i, j]] = norm_ppf(clamped);
            }
        }
        let barrier = Array1::from_iter((0..n).map(|i| -distance[[i, default_state]]));

        Self {
            distance,
            barrier,
            rho,
            calibrated,
            method,
            write_off: n - 1,
        }
    }

    /// The PiT one-month matrix conditional on `z`.
    fn conditional(&self, z: f64) -> Array2<f64> {
        let n = self.distance.ncols();
        let shift = self.rho.sqrt() * z;
        let scale = (1.0 - self.rho).sqrt();

        let mut out = Array2::zeros((n, n));
        for i in 0..n {
            if i == self.write_off {
                continue;
            }
            // Conditional cumulative-from-right row
            let mut tail = vec![0.0; n + 1];
            for j in 0..n {
                let arg = match self.method {
                    PdMethod::ZShift => {
                        if self.calibrated {
                            self.distance[[i, j]] - shift
                        } else {
                            (self.distance[[i, j]] - shift) / scale
                        }
                    }
                    PdMethod::DefaultBarrier => {
                        let dd = self.barrier[i];
                        let dd_t = if self.calibrated {
                            dd + shift
                        } else {
                            (dd + shift) / scale
                        };
                        self.distance[[i, j]] + dd - dd_t
                    }
                };
                tail[j] = norm_cdf(arg);
            }
            for j in 0..n {
                out[[i, j]] = tail[j] - tail[j + 1];
            }
        }

        standardise(&mut out);

        // The write-off state stays absorbing regardless of Z.
        for j in 0..n {
            out[[self.write_off, j]] = 0.0;
        }
        out[[self.write_off, self.write_off]] = 1.0;
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assumptions::test_fixtures::two_state_segment;
    use std::collections::BTreeMap;

    fn scenario_with_z(z: f64, months: usize) -> Scenario {
        let mut vars = BTreeMap::new();
        vars.insert("Z".to_string(), vec![z; months]);
        Scenario::new("test", 1.0, MonthEnd::from_ym(2024, 1), vars)
    }

    fn build(
        rho: f64,
        calibrated: bool,
        method: PdMethod,
        z: f64,
    ) -> TransitionMatrix {
        let mut segment = two_state_segment(0.05);
        segment.pd.rho = rho;
        segment.pd.calibrated = calibrated;
        segment.pd.method = method;
        let scenario = scenario_with_z(z, 60);
        TransitionMatrix::from_assumptions(
            &segment.pd,
            &segment.lgd,
            &scenario,
            MonthEnd::from_ym(2024, 1),
            60,
            segment.id,
        )
        .unwrap()
    }

    fn assert_rows_stochastic(tm: &TransitionMatrix) {
        for t in 0..tm.len() {
            for row in tm.monthly(t).rows() {
                assert!((row.sum() - 1.0).abs() < 1e-9);
                assert!(row.iter().all(|v| (0.0..=1.0 + 1e-9).contains(v)));
            }
        }
    }

    #[test]
    fn test_calibrated_z_zero_reproduces_ttc() {
        for method in [PdMethod::ZShift, PdMethod::DefaultBarrier] {
            let tm = build(0.2, true, method, 0.0);
            let segment = two_state_segment(0.05);
            let one_month =
                monthly_matrix(&segment.pd.transition_matrix, 12, 1).unwrap();
            let ttc = augment_write_off(&one_month, 12, 0.0, 0);
            for (a, b) in tm.monthly(0).iter().zip(ttc.iter()) {
                assert!((a - b).abs() < 1e-8, "{a} vs {b}");
            }
        }
    }

    #[test]
    fn test_rows_stochastic_under_shift() {
        for z in [-2.0, -0.5, 0.0, 0.5, 2.0] {
            let tm = build(0.15, false, PdMethod::ZShift, z);
            assert_rows_stochastic(&tm);
            let tm = build(0.15, false, PdMethod::DefaultBarrier, z);
            assert_rows_stochastic(&tm);
        }
    }

    #[test]
    fn test_write_off_row_stays_absorbing() {
        let tm = build(0.3, false, PdMethod::ZShift, 1.5);
        let wo = tm.write_off_state();
        for t in 0..tm.len() {
            let row = tm.monthly(t).row(wo);
            assert_eq!(row[wo], 1.0);
            assert!(row.iter().take(wo).all(|v| *v == 0.0));
        }
    }

    #[test]
    fn test_write_off_probability_monotone() {
        let tm = build(0.2, false, PdMethod::ZShift, -1.0);
        let wo = tm.write_off_state();
        let mut previous = 0.0;
        for t in 0..tm.len() {
            let current = tm.cumulative(t)[[0, wo]];
            assert!(current >= previous - 1e-12);
            previous = current;
        }
    }

    #[test]
    fn test_positive_z_lowers_default_probability() {
        let benign = build(0.2, true, PdMethod::ZShift, 1.0);
        let stressed = build(0.2, true, PdMethod::ZShift, -1.0);
        let d = benign.default_state();
        assert!(benign.monthly(0)[[0, d]] < stressed.monthly(0)[[0, d]]);
    }

    #[test]
    fn test_cumulative_is_prefix_product() {
        let tm = build(0.1, false, PdMethod::ZShift, 0.7);
        let manual = tm.monthly(0).dot(tm.monthly(1)).dot(tm.monthly(2));
        for (a, b) in tm.cumulative(2).iter().zip(manual.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }
}
