//! Probability of default
//!
//! Derives the marginal monthly PD curve for an account from the cached
//! cumulative transition products, together with the 12-month and lifetime
//! views the reports carry.

use crate::account::Account;
use crate::matrix::TransitionMatrix;

/// Survival denominators below this are treated as fully defaulted.
const EPS: f64 = 1e-12;

/// Per-account PD curve derived from the transition-matrix series
#[derive(Debug, Clone)]
pub struct PdCurve {
    /// Marginal monthly default probability
    pub marginal: Vec<f64>,
    /// Cumulative default probability by horizon
    pub cumulative: Vec<f64>,
}

impl PdCurve {
    /// Read the account's default column off the cumulative products.
    pub fn from_transition(transition: &TransitionMatrix, account: &Account) -> Self {
        let life = account.remaining_life as usize;
        let rating = account.current_rating;
        let default_state = transition.default_state();

        let mut cumulative = Vec::with_capacity(life);
        let mut marginal = Vec::with_capacity(life);
        let mut previous = 0.0;
        for t in 0..life {
            let c = transition.cumulative(t)[[rating, default_state]];
            cumulative.push(c);
            marginal.push(c - previous);
            previous = c;
        }
        Self {
            marginal,
            cumulative,
        }
    }

    pub fn len(&self) -> usize {
        self.marginal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marginal.is_empty()
    }

    /// Conditional (hazard) default rate: marginal PD over the surviving
    /// mass. Zero once the survival denominator collapses.
    pub fn hazard(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.len());
        let mut survival = 1.0;
        for t in 0..self.len() {
            if survival > EPS {
                out.push(self.marginal[t] / survival);
            } else {
                out.push(0.0);
            }
            survival = 1.0 - self.cumulative[t];
        }
        out
    }

    /// Remaining lifetime PD at each horizon: `sum_{k >= t} pd_k`.
    pub fn lifetime(&self) -> Vec<f64> {
        let mut out = vec![0.0; self.len()];
        let mut acc = 0.0;
        for t in (0..self.len()).rev() {
            acc += self.marginal[t];
            out[t] = acc;
        }
        out
    }

    /// Forward 12-month PD at each horizon.
    pub fn twelve_month(&self) -> Vec<f64> {
        let lifetime = self.lifetime();
        (0..self.len())
            .map(|t| {
                let tail = lifetime.get(t + 12).copied().unwrap_or(0.0);
                lifetime[t] - tail
            })
            .collect()
    }
}
