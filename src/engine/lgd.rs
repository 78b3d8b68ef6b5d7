//! Loss given default
//!
//! Builds the LGD vector over an account's remaining life. Secured models
//! net the discounted forced-sale collateral proceeds off the exposure;
//! cure behaviour blends the loss given cure with the loss given
//! possession. Climate-risk value adjustments, when supplied, shift the
//! loss given possession before the floor is applied.

use crate::account::Account;
use crate::assumptions::{LgdAssumptions, LgdModel};
use crate::error::Result;
use crate::scenario::Scenario;

/// LGD strategy, dispatched once per (segment, scenario)
#[derive(Debug, Clone)]
pub enum LossGivenDefault {
    /// Flat loss rate
    Constant { loss_given_default: f64 },
    /// Cure-weighted blend of loss given cure and loss given write-off
    Unsecured { loss_given_default: f64 },
    /// Flat loss rate scaled by a macro index relative to the reporting date
    Indexed {
        loss_given_default: f64,
        index: String,
    },
    /// Collateralised: loss given possession from indexed collateral value
    Secured(SecuredParams),
    /// Collateralised with a deterministic collateral growth rate
    ConstantGrowth(SecuredParams),
}

/// Parameters shared by the collateralised models
#[derive(Debug, Clone)]
pub struct SecuredParams {
    pub probability_of_cure: f64,
    pub loss_given_cure: f64,
    pub forced_sale_discount: f64,
    pub sale_cost: f64,
    pub time_to_sale: u32,
    pub floor: f64,
    pub index: String,
    pub growth_rate: f64,
}

impl LossGivenDefault {
    pub fn from_assumptions(assumptions: &LgdAssumptions) -> Self {
        let secured = SecuredParams {
            probability_of_cure: assumptions.probability_of_cure,
            loss_given_cure: assumptions.loss_given_cure,
            forced_sale_discount: assumptions.forced_sale_discount,
            sale_cost: assumptions.sale_cost,
            time_to_sale: assumptions.time_to_sale,
            floor: assumptions.floor,
            index: assumptions.index.clone(),
            growth_rate: assumptions.growth_rate,
        };
        match assumptions.model {
            LgdModel::Constant => LossGivenDefault::Constant {
                loss_given_default: assumptions.loss_given_default,
            },
            LgdModel::Unsecured => LossGivenDefault::Unsecured {
                loss_given_default: assumptions.probability_of_cure
                    * assumptions.loss_given_cure
                    + (1.0 - assumptions.probability_of_cure)
                        * assumptions.loss_given_write_off,
            },
            LgdModel::Indexed => LossGivenDefault::Indexed {
                loss_given_default: assumptions.loss_given_default,
                index: assumptions.index.clone(),
            },
            LgdModel::Secured => LossGivenDefault::Secured(secured),
            LgdModel::ConstantGrowth => LossGivenDefault::ConstantGrowth(secured),
        }
    }

    /// LGD per month over the remaining life.
    ///
    /// `climate_adjustment` holds the expected per-horizon loss adjustment
    /// and is applied to the loss given possession before the floor.
    pub fn vector(
        &self,
        account: &Account,
        ead: &[f64],
        eir: &[f64],
        scenario: &Scenario,
        climate_adjustment: Option<&[f64]>,
    ) -> Result<Vec<f64>> {
        let life = account.remaining_life as usize;
        match self {
            LossGivenDefault::Constant { loss_given_default } => {
                Ok(vec![*loss_given_default; life])
            }
            LossGivenDefault::Unsecured { loss_given_default } => {
                Ok(vec![*loss_given_default; life])
            }
            LossGivenDefault::Indexed {
                loss_given_default,
                index,
            } => {
                let base = scenario.get(index, account.reporting_date)?;
                (0..life)
                    .map(|t| {
                        let level = scenario.get(index, account.horizon_date(t))?;
                        Ok(loss_given_default * level / base)
                    })
                    .collect()
            }
            LossGivenDefault::Secured(params) => {
                let base = scenario.get(&params.index, account.reporting_date)?;
                let collateral_index: Vec<f64> = (0..life)
                    .map(|t| {
                        let level = scenario
                            .get(&params.index, account.horizon_date(t + params.time_to_sale as usize))?;
                        Ok(level / base)
                    })
                    .collect::<Result<_>>()?;
                Ok(secured_vector(params, account, ead, eir, &collateral_index, climate_adjustment))
            }
            LossGivenDefault::ConstantGrowth(params) => {
                let collateral_index: Vec<f64> = (0..life)
                    .map(|t| {
                        (1.0 + params.growth_rate)
                            .powf((t + params.time_to_sale as usize) as f64 / 12.0)
                    })
                    .collect();
                Ok(secured_vector(params, account, ead, eir, &collateral_index, climate_adjustment))
            }
        }
    }
}

/// Cure-weighted secured LGD given a collateral index path.
fn secured_vector(
    params: &SecuredParams,
    account: &Account,
    ead: &[f64],
    eir: &[f64],
    collateral_index: &[f64],
    climate_adjustment: Option<&[f64]>,
) -> Vec<f64> {
    let life = ead.len();
    let haircut = (1.0 - params.forced_sale_discount) * (1.0 - params.sale_cost);
    (0..life)
        .map(|t| {
            let discount = (1.0 + eir[t]).powi(-(params.time_to_sale as i32));
            let mut loss_given_possession = if ead[t] > 0.0 {
                let recovery =
                    account.collateral_value * collateral_index[t] * haircut * discount;
                (ead[t] - recovery) / ead[t]
            } else {
                params.floor
            };
            if let Some(adjustment) = climate_adjustment {
                loss_given_possession += adjustment[t];
            }
            let loss_given_possession = loss_given_possession.max(params.floor);
            params.probability_of_cure * params.loss_given_cure
                + (1.0 - params.probability_of_cure) * loss_given_possession
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::test_fixtures::fixed_rate_loan;
    use crate::dates::MonthEnd;
    use approx::assert_relative_eq;
    use std::collections::BTreeMap;

    fn scenario_with_index(levels: Vec<f64>) -> Scenario {
        let mut vars = BTreeMap::new();
        vars.insert("HPI".to_string(), levels);
        Scenario::new("test", 1.0, MonthEnd::from_ym(2024, 1), vars)
    }

    fn secured_params() -> SecuredParams {
        SecuredParams {
            probability_of_cure: 0.0,
            loss_given_cure: 0.0,
            forced_sale_discount: 0.1,
            sale_cost: 0.05,
            time_to_sale: 12,
            floor: 0.05,
            index: "HPI".into(),
            growth_rate: 0.0,
        }
    }

    #[test]
    fn test_constant() {
        let account = fixed_rate_loan(100_000.0, 0.06, 12);
        let model = LossGivenDefault::Constant {
            loss_given_default: 0.45,
        };
        let scenario = scenario_with_index(vec![1.0; 30]);
        let lgd = model
            .vector(&account, &vec![1.0; 12], &vec![0.0; 12], &scenario, None)
            .unwrap();
        assert!(lgd.iter().all(|v| (*v - 0.45).abs() < 1e-12));
    }

    #[test]
    fn test_unsecured_blend() {
        let mut assumptions = crate::assumptions::test_fixtures::two_state_segment(0.02).lgd;
        assumptions.model = LgdModel::Unsecured;
        assumptions.probability_of_cure = 0.3;
        assumptions.loss_given_cure = 0.1;
        assumptions.loss_given_write_off = 0.9;
        let model = LossGivenDefault::from_assumptions(&assumptions);
        let account = fixed_rate_loan(100_000.0, 0.06, 6);
        let scenario = scenario_with_index(vec![1.0; 30]);
        let lgd = model
            .vector(&account, &vec![1.0; 6], &vec![0.0; 6], &scenario, None)
            .unwrap();
        assert_relative_eq!(lgd[0], 0.3 * 0.1 + 0.7 * 0.9, epsilon = 1e-12);
    }

    #[test]
    fn test_indexed_scales_relative_to_reporting_date() {
        let account = fixed_rate_loan(100_000.0, 0.06, 3);
        let model = LossGivenDefault::Indexed {
            loss_given_default: 0.4,
            index: "HPI".into(),
        };
        let scenario = scenario_with_index(vec![2.0, 2.2, 1.8]);
        let lgd = model
            .vector(&account, &vec![1.0; 3], &vec![0.0; 3], &scenario, None)
            .unwrap();
        assert_relative_eq!(lgd[0], 0.4, epsilon = 1e-12);
        assert_relative_eq!(lgd[1], 0.4 * 2.2 / 2.0, epsilon = 1e-12);
        assert_relative_eq!(lgd[2], 0.4 * 1.8 / 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_secured_hand_calculation() {
        // Flat index; lgp_0 = max((ead - C * 0.9 * 0.95 * (1+eir)^-12) / ead, floor)
        let mut account = fixed_rate_loan(100_000.0, 0.06, 12);
        account.collateral_value = 80_000.0;
        let params = secured_params();
        let model = LossGivenDefault::Secured(params);
        let scenario = scenario_with_index(vec![1.0; 36]);
        let eir = vec![0.06 / 12.0; 12];
        let ead = vec![100_000.0; 12];
        let lgd = model.vector(&account, &ead, &eir, &scenario, None).unwrap();

        let expected = ((100_000.0 - 80_000.0 * 0.9 * 0.95 * 1.005f64.powi(-12)) / 100_000.0)
            .max(0.05);
        assert_relative_eq!(lgd[0], expected, epsilon = 1e-8);
    }

    #[test]
    fn test_secured_floor_binds() {
        let mut account = fixed_rate_loan(10_000.0, 0.0, 6);
        account.collateral_value = 500_000.0;
        let model = LossGivenDefault::Secured(secured_params());
        let scenario = scenario_with_index(vec![1.0; 30]);
        let lgd = model
            .vector(&account, &vec![10_000.0; 6], &vec![0.0; 6], &scenario, None)
            .unwrap();
        assert!(lgd.iter().all(|v| (*v - 0.05).abs() < 1e-12));
    }

    #[test]
    fn test_constant_growth_index_path() {
        let mut account = fixed_rate_loan(100_000.0, 0.0, 2);
        account.collateral_value = 50_000.0;
        let mut params = secured_params();
        params.growth_rate = 0.12;
        let model = LossGivenDefault::ConstantGrowth(params);
        let scenario = scenario_with_index(vec![1.0; 30]);
        let lgd = model
            .vector(&account, &vec![100_000.0; 2], &vec![0.0; 2], &scenario, None)
            .unwrap();

        let ci0 = 1.12f64.powf(12.0 / 12.0);
        let expected0 = ((100_000.0 - 50_000.0 * ci0 * 0.9 * 0.95) / 100_000.0).max(0.05);
        assert_relative_eq!(lgd[0], expected0, epsilon = 1e-10);
        // Collateral grows month on month, so the loss falls
        assert!(lgd[1] < lgd[0]);
    }

    #[test]
    fn test_climate_adjustment_added_before_floor() {
        let mut account = fixed_rate_loan(100_000.0, 0.0, 2);
        account.collateral_value = 80_000.0;
        let model = LossGivenDefault::Secured(secured_params());
        let scenario = scenario_with_index(vec![1.0; 30]);
        let ead = vec![100_000.0; 2];
        let eir = vec![0.0; 2];

        let unadjusted = model.vector(&account, &ead, &eir, &scenario, None).unwrap();
        let adjustment = vec![0.02; 2];
        let adjusted = model
            .vector(&account, &ead, &eir, &scenario, Some(&adjustment))
            .unwrap();
        assert_relative_eq!(adjusted[0], unadjusted[0] + 0.02, epsilon = 1e-12);
    }

    #[test]
    fn test_secured_needs_index_past_maturity() {
        let account = fixed_rate_loan(100_000.0, 0.0, 12);
        let model = LossGivenDefault::Secured(secured_params());
        // Index only covers the remaining life, not the sale horizon
        let scenario = scenario_with_index(vec![1.0; 12]);
        assert!(model
            .vector(&account, &vec![1.0; 12], &vec![0.0; 12], &scenario, None)
            .is_err());
    }
}
