//! Exposure at default
//!
//! Builds the monetary EAD vector over an account's remaining life. The
//! model variant is selected once at pipeline build; the per-account work
//! is a single forward pass over the horizon.

use crate::account::Account;
use crate::assumptions::{CcfMethod, EadAssumptions, EadModel};

/// EAD strategy, dispatched once per (segment, scenario)
#[derive(Debug, Clone)]
pub enum ExposureAtDefault {
    /// Flat multiple of the outstanding balance
    Constant { factor: f64 },
    /// Contractual amortisation with fees, prepayments and an arrears allowance
    Amortising {
        fees_fixed: f64,
        fees_pct: f64,
        prepayment_pct: f64,
        default_penalty_pct: f64,
        default_penalty_amt: f64,
    },
    /// Single repayment at maturity; fees accrue on the balance
    Bullet {
        fees_fixed: f64,
        fees_pct: f64,
        prepayment_pct: f64,
        default_penalty_pct: f64,
        default_penalty_amt: f64,
    },
    /// Credit conversion factor on drawn/undrawn amounts
    Ccf { method: CcfMethod, ccf: f64 },
}

impl ExposureAtDefault {
    pub fn from_assumptions(assumptions: &EadAssumptions) -> Self {
        match assumptions.model {
            EadModel::Constant => ExposureAtDefault::Constant {
                factor: assumptions.exposure_at_default,
            },
            EadModel::Amortising => ExposureAtDefault::Amortising {
                fees_fixed: assumptions.fees_fixed,
                fees_pct: assumptions.fees_pct,
                prepayment_pct: assumptions.prepayment_pct,
                default_penalty_pct: assumptions.default_penalty_pct,
                default_penalty_amt: assumptions.default_penalty_amt,
            },
            EadModel::Bullet => ExposureAtDefault::Bullet {
                fees_fixed: assumptions.fees_fixed,
                fees_pct: assumptions.fees_pct,
                prepayment_pct: assumptions.prepayment_pct,
                default_penalty_pct: assumptions.default_penalty_pct,
                default_penalty_amt: assumptions.default_penalty_amt,
            },
            EadModel::Ccf => ExposureAtDefault::Ccf {
                method: assumptions.ccf_method,
                ccf: assumptions.ccf,
            },
        }
    }

    /// EAD per month over the remaining life, in money terms.
    pub fn vector(&self, account: &Account, eir: &[f64]) -> Vec<f64> {
        let life = account.remaining_life as usize;
        match self {
            ExposureAtDefault::Constant { factor } => {
                vec![account.outstanding_balance * factor; life]
            }
            ExposureAtDefault::Ccf { method, ccf } => {
                let exposure = match method {
                    CcfMethod::Method1 => account.outstanding_balance * ccf,
                    CcfMethod::Method2 => account.limit * ccf,
                    CcfMethod::Method3 => {
                        account.outstanding_balance
                            + (account.limit - account.outstanding_balance) * ccf
                    }
                };
                vec![exposure; life]
            }
            ExposureAtDefault::Bullet {
                fees_fixed,
                fees_pct,
                prepayment_pct,
                default_penalty_pct,
                default_penalty_amt,
            } => {
                let df = adjusted_discount(eir, *fees_pct, *prepayment_pct);
                let mut cum_cf = 0.0;
                (0..life)
                    .map(|t| {
                        cum_cf += fees_fixed * df[t];
                        let balance =
                            (account.outstanding_balance / df[t] + cum_cf / df[t]).max(0.0);
                        (balance * (1.0 + default_penalty_pct) + default_penalty_amt).max(0.0)
                    })
                    .collect()
            }
            ExposureAtDefault::Amortising {
                fees_fixed,
                fees_pct,
                prepayment_pct,
                default_penalty_pct,
                default_penalty_amt,
            } => {
                let (balance, arrears) = amortising_components(
                    account,
                    eir,
                    *fees_fixed,
                    *fees_pct,
                    *prepayment_pct,
                );
                (0..life)
                    .map(|t| {
                        ((balance[t] + arrears[t]) * (1.0 + default_penalty_pct)
                            + default_penalty_amt)
                            .max(0.0)
                    })
                    .collect()
            }
        }
    }
}

/// Discount factors on the fee- and prepayment-adjusted rate:
/// `df_t = 1 / prod_{k <= t} (1 + eir_adj_k)`.
fn adjusted_discount(eir: &[f64], fees_pct: f64, prepayment_pct: f64) -> Vec<f64> {
    let mut acc = 1.0;
    eir.iter()
        .map(|e| {
            let adjusted =
                (1.0 + e) * (1.0 + fees_pct / 12.0) / (1.0 + prepayment_pct / 12.0) - 1.0;
            acc *= 1.0 + adjusted;
            1.0 / acc
        })
        .collect()
}

/// Outstanding-balance and arrears-allowance paths for the amortising model.
pub(crate) fn amortising_components(
    account: &Account,
    eir: &[f64],
    fees_fixed: f64,
    fees_pct: f64,
    prepayment_pct: f64,
) -> (Vec<f64>, Vec<f64>) {
    let life = account.remaining_life as usize;
    let df = adjusted_discount(eir, fees_pct, prepayment_pct);
    let payment_gap = (12 / account.contractual_freq).max(1);
    let holiday = account.months_in_holiday();

    let remaining_allowance =
        (3.0 * account.contractual_payment - account.current_arrears).max(0.0);

    let mut balance = vec![0.0; life];
    let mut arrears = vec![0.0; life];
    let mut cum_cf = 0.0;
    for t in 0..life {
        // 1-based month within the forecast, counted back from maturity
        let month = (t + 1) as u32;
        let is_payment_month =
            (account.remaining_life - month) % payment_gap == 0 && month >= holiday.max(1);
        let cf = if is_payment_month {
            account.contractual_payment - fees_fixed
        } else {
            -fees_fixed
        };
        cum_cf += cf * df[t];
        balance[t] = (account.outstanding_balance / df[t] - cum_cf / df[t]).max(0.0);
        arrears[t] = (cum_cf / df[t]).clamp(0.0, remaining_allowance);
    }
    (balance, arrears)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::test_fixtures::fixed_rate_loan;
    use crate::assumptions::test_fixtures::two_state_segment;
    use approx::assert_relative_eq;

    #[test]
    fn test_constant_model() {
        let account = fixed_rate_loan(50_000.0, 0.05, 12);
        let model = ExposureAtDefault::Constant { factor: 0.8 };
        let ead = model.vector(&account, &vec![0.004; 12]);
        assert_eq!(ead.len(), 12);
        assert_relative_eq!(ead[0], 40_000.0);
        assert_relative_eq!(ead[11], 40_000.0);
    }

    #[test]
    fn test_ccf_methods() {
        let mut account = fixed_rate_loan(30_000.0, 0.05, 6);
        account.limit = 100_000.0;
        let eir = vec![0.0; 6];

        let m1 = ExposureAtDefault::Ccf { method: CcfMethod::Method1, ccf: 0.5 };
        assert_relative_eq!(m1.vector(&account, &eir)[0], 15_000.0);

        let m2 = ExposureAtDefault::Ccf { method: CcfMethod::Method2, ccf: 0.5 };
        assert_relative_eq!(m2.vector(&account, &eir)[0], 50_000.0);

        let m3 = ExposureAtDefault::Ccf { method: CcfMethod::Method3, ccf: 0.5 };
        assert_relative_eq!(m3.vector(&account, &eir)[0], 65_000.0);
    }

    #[test]
    fn test_amortising_balance_runs_to_zero() {
        // Textbook 60-month amortisation at 6%/yr; exhaust the arrears
        // allowance so EAD is the pure balance path.
        let mut account = fixed_rate_loan(100_000.0, 0.06, 60);
        account.current_arrears = 3.0 * account.contractual_payment;
        let eir = vec![0.06 / 12.0; 60];
        let (balance, arrears) =
            amortising_components(&account, &eir, 0.0, 0.0, 0.0);

        assert!(arrears.iter().all(|a| *a == 0.0));
        assert_relative_eq!(balance[59], 0.0, epsilon = 1e-6);

        // Balance path matches the closed-form amortisation curve
        let i = 0.06 / 12.0;
        let pmt = account.contractual_payment;
        let mut expected = 100_000.0;
        for t in 0..12 {
            expected = expected * (1.0 + i) - pmt;
            assert_relative_eq!(balance[t], expected, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_amortising_arrears_allowance_caps() {
        let account = fixed_rate_loan(100_000.0, 0.06, 60);
        let eir = vec![0.06 / 12.0; 60];
        let (_, arrears) = amortising_components(&account, &eir, 0.0, 0.0, 0.0);
        let cap = 3.0 * account.contractual_payment;
        assert!(arrears.iter().all(|a| *a <= cap + 1e-9));
        // Allowance fills up once three payments have passed
        assert_relative_eq!(arrears[30], cap, epsilon = 1e-6);
    }

    #[test]
    fn test_amortising_respects_payment_holiday() {
        let mut account = fixed_rate_loan(100_000.0, 0.0, 24);
        account.payment_holiday_end_date = Some(account.reporting_date + 6);
        let eir = vec![0.0; 24];
        let (balance, _) = amortising_components(&account, &eir, 0.0, 0.0, 0.0);
        // No payments during the holiday: balance stays at par
        assert_relative_eq!(balance[4], 100_000.0, epsilon = 1e-9);
        assert!(balance[6] < 100_000.0);
    }

    #[test]
    fn test_bullet_balance_accrues() {
        let account = fixed_rate_loan(100_000.0, 0.06, 12);
        let model = ExposureAtDefault::Bullet {
            fees_fixed: 0.0,
            fees_pct: 0.0,
            prepayment_pct: 0.0,
            default_penalty_pct: 0.0,
            default_penalty_amt: 0.0,
        };
        let eir = vec![0.06 / 12.0; 12];
        let ead = model.vector(&account, &eir);
        // Balance accrues at the effective rate with no repayments
        assert_relative_eq!(ead[0], 100_000.0 * 1.005, epsilon = 1e-6);
        assert_relative_eq!(ead[11], 100_000.0 * 1.005f64.powi(12), epsilon = 1e-6);
    }

    #[test]
    fn test_default_penalty_applied() {
        let account = fixed_rate_loan(10_000.0, 0.0, 6);
        let assumptions = {
            let mut segment = two_state_segment(0.02);
            segment.ead.model = crate::assumptions::EadModel::Bullet;
            segment.ead.default_penalty_pct = 0.1;
            segment.ead.default_penalty_amt = 50.0;
            segment.ead
        };
        let model = ExposureAtDefault::from_assumptions(&assumptions);
        let ead = model.vector(&account, &vec![0.0; 6]);
        assert_relative_eq!(ead[0], 10_000.0 * 1.1 + 50.0, epsilon = 1e-9);
    }
}
