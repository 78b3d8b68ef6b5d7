//! Effective interest rate
//!
//! Builds the monthly effective rate vector over an account's remaining
//! life. Fixed-rate contracts compound their contractual rate; floating
//! contracts add the compounded spread to the scenario base-rate curve.

use crate::account::{Account, InterestRateType};
use crate::assumptions::EirAssumptions;
use crate::error::Result;
use crate::scenario::Scenario;

/// Monthly EIR builder for one (segment, scenario) pair
#[derive(Debug, Clone)]
pub struct EffectiveInterestRate {
    base_rate: String,
}

impl EffectiveInterestRate {
    pub fn from_assumptions(assumptions: &EirAssumptions) -> Self {
        Self {
            base_rate: assumptions.base_rate.clone(),
        }
    }

    /// Monthly effective rates over the account's remaining life.
    pub fn vector(&self, account: &Account, scenario: &Scenario) -> Result<Vec<f64>> {
        let life = account.remaining_life as usize;
        let freq = account.interest_rate_freq as f64;
        match account.interest_rate_type {
            InterestRateType::Fixed => {
                let monthly = (1.0 + account.fixed_rate / freq).powf(freq / 12.0) - 1.0;
                Ok(vec![monthly; life])
            }
            InterestRateType::Float => {
                let spread_monthly = (1.0 + account.spread / freq).powf(freq / 12.0) - 1.0;
                (0..life)
                    .map(|t| {
                        let base = scenario.get(&self.base_rate, account.horizon_date(t))?;
                        Ok(spread_monthly + (1.0 + base).powf(1.0 / 12.0) - 1.0)
                    })
                    .collect()
            }
        }
    }
}
