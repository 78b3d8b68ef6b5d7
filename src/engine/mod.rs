//! ECL pipeline
//!
//! One `EclModel` is built per (segment, scenario) pair at a fixed
//! reporting date: the transition-matrix series (with its cumulative
//! cache) plus the concrete EAD/LGD/EIR/stage strategies. Computing an
//! account is then a linear pass over its remaining life producing one
//! result row per horizon.

mod ead;
mod eir;
mod lgd;
mod pd;
mod stage;

pub use ead::ExposureAtDefault;
pub use eir::EffectiveInterestRate;
pub use lgd::LossGivenDefault;
pub use pd::PdCurve;
pub use stage::StageProbability;

use crate::account::Account;
use crate::assumptions::SegmentAssumptions;
use crate::climate::ClimateRiskScenario;
use crate::dates::MonthEnd;
use crate::error::Result;
use crate::matrix::TransitionMatrix;
use crate::results::EclRow;
use crate::scenario::Scenario;

/// The per-(segment, scenario) ECL pipeline
pub struct EclModel<'a> {
    scenario: &'a Scenario,
    segment: &'a SegmentAssumptions,
    climate: Option<&'a ClimateRiskScenario>,
    transition: TransitionMatrix,
    eir: EffectiveInterestRate,
    ead: ExposureAtDefault,
    lgd: LossGivenDefault,
    stage: StageProbability,
}

impl<'a> EclModel<'a> {
    /// Build the pipeline for accounts reporting at `start` with remaining
    /// lives up to `horizon` months.
    pub fn from_assumptions(
        segment: &'a SegmentAssumptions,
        scenario: &'a Scenario,
        climate: Option<&'a ClimateRiskScenario>,
        start: MonthEnd,
        horizon: usize,
    ) -> Result<Self> {
        let transition = TransitionMatrix::from_assumptions(
            &segment.pd,
            &segment.lgd,
            scenario,
            start,
            horizon,
            segment.id,
        )?;
        Ok(Self {
            scenario,
            segment,
            climate,
            transition,
            eir: EffectiveInterestRate::from_assumptions(&segment.eir),
            ead: ExposureAtDefault::from_assumptions(&segment.ead),
            lgd: LossGivenDefault::from_assumptions(&segment.lgd),
            stage: StageProbability::new(segment.pd.time_in_watchlist),
        })
    }

    pub fn transition(&self) -> &TransitionMatrix {
        &self.transition
    }

    /// Compute the full ECL curve for one account.
    pub fn account_curve(&self, account: &Account) -> Result<Vec<EclRow>> {
        debug_assert_eq!(account.reporting_date, self.transition.start());
        let life = account.remaining_life as usize;

        let eir = self.eir.vector(account, self.scenario)?;
        let ead = self.ead.vector(account, &eir);
        let climate_adjustment = self
            .climate
            .and_then(|c| c.adjustment(&account.contract_id, account.reporting_date, life))
            .map(|adj| adj.expected_value());
        let lgd = self.lgd.vector(
            account,
            &ead,
            &eir,
            self.scenario,
            climate_adjustment.as_deref(),
        )?;
        let pd = PdCurve::from_transition(&self.transition, account);
        let stages = self
            .stage
            .vector(&self.transition, &self.segment.stage_map, account)?;
        let pd_12m = pd.twelve_month();
        let pd_lifetime = pd.lifetime();

        // Discount factors: df0 back to the reporting date, df back to the
        // horizon the stage components are conditioned on.
        let mut df0 = Vec::with_capacity(life);
        let mut df = Vec::with_capacity(life);
        let mut acc = 1.0;
        for e in &eir {
            acc *= 1.0 + e;
            df0.push(1.0 / acc);
            df.push(acc / (1.0 + eir[0]));
        }

        let marginal_cr: Vec<f64> = (0..life)
            .map(|t| pd.marginal[t] * ead[t] * lgd[t] * df0[t])
            .collect();

        // Reverse-cumulative marginal loss: lifetime component at each T
        let mut stage2_t0 = vec![0.0; life];
        let mut tail = 0.0;
        for t in (0..life).rev() {
            tail += marginal_cr[t];
            stage2_t0[t] = tail;
        }

        let mut rows = Vec::with_capacity(life);
        for t in 0..life {
            let stage2 = stage2_t0[t] * df[t];
            let stage1_t0 = stage2_t0[t] - stage2_t0.get(t + 12).copied().unwrap_or(0.0);
            let stage1 = stage1_t0 * df[t];
            let stage3 = ead[t] * lgd[t];

            let [p_s1, p_s2, p_s3, p_wo] = stages[t];
            let exposure = ead[t] * (p_s1 + p_s2 + p_s3);
            let ecl = p_s1 * stage1 + p_s2 * stage2 + p_s3 * stage3;
            let cr = if exposure > 0.0 { ecl / exposure } else { 0.0 };

            rows.push(EclRow {
                scenario: self.scenario.name().to_string(),
                contract_id: account.contract_id.clone(),
                segment_id: account.segment_id,
                account_type: account.account_type.to_string(),
                t: t as u32,
                forecast_reporting_date: account.horizon_date(t),
                pd: pd.marginal[t],
                pd_12m: pd_12m[t],
                pd_lifetime: pd_lifetime[t],
                ead: ead[t],
                lgd: lgd[t],
                df: df0[t],
                p_s1,
                p_s2,
                p_s3,
                p_wo,
                marginal_cr: marginal_cr[t],
                stage1,
                stage2,
                stage3,
                cr,
                exposure,
                write_off: ead[t] * p_wo,
                ecl,
            });
        }
        Ok(rows)
    }
}
