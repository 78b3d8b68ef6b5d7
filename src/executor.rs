//! Scenario execution
//!
//! Fans the account book out over the macro scenarios, reusing one ECL
//! pipeline per (segment, reporting date) within each scenario, then folds
//! the per-scenario row streams into the probability-weighted composite
//! scenario. Workers check a shared cancel flag between accounts;
//! cancellation discards in-flight rows and surfaces as an error.

use crate::account::{Account, AccountData};
use crate::assumptions::Assumptions;
use crate::climate::ClimateRiskScenarios;
use crate::dates::MonthEnd;
use crate::engine::EclModel;
use crate::error::{EngineError, Result};
use crate::results::{EclRow, Results};
use crate::scenario::{Scenario, Scenarios};
use log::info;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Work chunk size for intra-scenario parallelism.
const ACCOUNT_CHUNK: usize = 64;

/// Execution method for the scenario fan-out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// One scenario at a time, accounts in order
    Map,
    /// One parallel task per scenario
    ThreadMap,
    /// Parallel over scenarios and account chunks
    ProcessMap,
}

impl Method {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "map" => Ok(Method::Map),
            "thread_map" => Ok(Method::ThreadMap),
            "process_map" => Ok(Method::ProcessMap),
            other => Err(EngineError::invalid_config(
                "method",
                format!("unrecognised execution method '{other}'"),
            )),
        }
    }
}

/// Runs the model over all scenarios and composes the weighted scenario
pub struct Executor {
    method: Method,
    cancel: Arc<AtomicBool>,
}

impl Executor {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shared flag for cooperative cancellation. Workers poll it between
    /// accounts, never mid-account.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Run every scenario over the account book and append the
    /// probability-weighted composite rows.
    pub fn execute(
        &self,
        account_data: &AccountData,
        assumptions: &Assumptions,
        scenarios: &Scenarios,
        climate: Option<&ClimateRiskScenarios>,
    ) -> Result<Results> {
        let scenario_list: Vec<&Scenario> = scenarios.iter().collect();
        info!(
            "executing {} accounts over {} scenarios",
            account_data.len(),
            scenario_list.len()
        );

        let per_scenario: Vec<Vec<EclRow>> = match self.method {
            Method::Map => scenario_list
                .iter()
                .map(|s| self.run_scenario(s, account_data, assumptions, climate, false))
                .collect::<Result<_>>()?,
            Method::ThreadMap => scenario_list
                .par_iter()
                .map(|s| self.run_scenario(s, account_data, assumptions, climate, false))
                .collect::<Result<_>>()?,
            Method::ProcessMap => scenario_list
                .par_iter()
                .map(|s| self.run_scenario(s, account_data, assumptions, climate, true))
                .collect::<Result<_>>()?,
        };

        let weighted = weighted_composite(&per_scenario, &scenarios.weights());
        let mut rows: Vec<EclRow> = per_scenario.into_iter().flatten().collect();
        rows.extend(weighted);
        Ok(Results::new(rows))
    }

    /// Run one scenario over the whole book.
    fn run_scenario(
        &self,
        scenario: &Scenario,
        account_data: &AccountData,
        assumptions: &Assumptions,
        climate: Option<&ClimateRiskScenarios>,
        parallel_accounts: bool,
    ) -> Result<Vec<EclRow>> {
        let climate_scenario = climate.and_then(|c| c.get(scenario.name()));

        // Pipelines are keyed by (segment, reporting date) so the cached
        // cumulative products line up with every account in the group.
        let mut groups: BTreeMap<(i64, MonthEnd), Vec<&Account>> = BTreeMap::new();
        for account in account_data.iter() {
            groups
                .entry((account.segment_id, account.reporting_date))
                .or_default()
                .push(account);
        }

        let mut rows = Vec::new();
        for ((segment_id, reporting_date), accounts) in groups {
            let segment = assumptions.get(segment_id)?;
            let horizon = accounts
                .iter()
                .map(|a| a.remaining_life as usize)
                .max()
                .unwrap_or(0);
            let model = EclModel::from_assumptions(
                segment,
                scenario,
                climate_scenario,
                reporting_date,
                horizon,
            )?;
            info!(
                "scenario '{}': segment {} at {} ({} accounts, horizon {})",
                scenario.name(),
                segment_id,
                reporting_date,
                accounts.len(),
                horizon
            );

            if parallel_accounts {
                let chunked: Vec<Vec<EclRow>> = accounts
                    .par_chunks(ACCOUNT_CHUNK)
                    .map(|chunk| {
                        let mut out = Vec::new();
                        for account in chunk {
                            if self.cancel.load(Ordering::Relaxed) {
                                return Err(EngineError::Cancelled);
                            }
                            out.extend(model.account_curve(account)?);
                        }
                        Ok(out)
                    })
                    .collect::<Result<_>>()?;
                rows.extend(chunked.into_iter().flatten());
            } else {
                for account in accounts {
                    if self.cancel.load(Ordering::Relaxed) {
                        return Err(EngineError::Cancelled);
                    }
                    rows.extend(model.account_curve(account)?);
                }
            }
        }
        Ok(rows)
    }
}

/// Field-wise linear combination of the per-scenario rows, keyed by
/// (contract, horizon, month). Emission order does not matter; the fold
/// joins rows by key.
fn weighted_composite(
    per_scenario: &[Vec<EclRow>],
    weights: &BTreeMap<String, f64>,
) -> Vec<EclRow> {
    let mut composite: BTreeMap<(String, u32, i32), EclRow> = BTreeMap::new();
    for rows in per_scenario {
        for row in rows {
            let weight = weights.get(&row.scenario).copied().unwrap_or(0.0);
            composite
                .entry(row.weighted_key())
                .or_insert_with(|| row.weighted_template())
                .accumulate(row, weight);
        }
    }
    composite.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::test_fixtures::fixed_rate_loan;
    use crate::assumptions::test_fixtures::two_state_segment;
    use approx::assert_relative_eq;
    use std::collections::BTreeMap as Map;

    fn scenario(name: &str, weight: f64, z: f64, months: usize) -> Scenario {
        let mut vars = Map::new();
        vars.insert("Z".to_string(), vec![z; months]);
        vars.insert("BASE_RATE".to_string(), vec![0.03; months]);
        vars.insert("HPI".to_string(), vec![1.0; months]);
        Scenario::new(name, weight, MonthEnd::from_ym(2024, 1), vars)
    }

    fn setup() -> (AccountData, Assumptions, Scenarios) {
        let mut segment = two_state_segment(0.04);
        segment.pd.rho = 0.15;
        let assumptions = Assumptions::new(vec![segment]).unwrap();
        let accounts = AccountData::new(vec![
            fixed_rate_loan(100_000.0, 0.06, 36),
            {
                let mut a = fixed_rate_loan(50_000.0, 0.05, 24);
                a.contract_id = "LOAN-2".into();
                a
            },
        ])
        .unwrap();
        let scenarios = Scenarios::new(vec![
            scenario("downside", 0.6, 1.0, 60),
            scenario("upside", 0.4, -1.0, 60),
        ])
        .unwrap();
        (accounts, assumptions, scenarios)
    }

    #[test]
    fn test_weighted_composite_is_linear_combination() {
        let (accounts, assumptions, scenarios) = setup();
        let executor = Executor::new(Method::Map);
        let results = executor
            .execute(&accounts, &assumptions, &scenarios, None)
            .unwrap();

        let find = |scenario: &str, contract: &str, t: u32| {
            results
                .rows()
                .iter()
                .find(|r| r.scenario == scenario && r.contract_id == contract && r.t == t)
                .unwrap()
        };

        for t in [0, 5, 23] {
            let down = find("downside", "LOAN-2", t);
            let up = find("upside", "LOAN-2", t);
            let weighted = find("weighted", "LOAN-2", t);
            assert_relative_eq!(
                weighted.ecl,
                0.6 * down.ecl + 0.4 * up.ecl,
                epsilon = 1e-12
            );
            assert_relative_eq!(
                weighted.pd,
                0.6 * down.pd + 0.4 * up.pd,
                epsilon = 1e-12
            );
            assert_relative_eq!(
                weighted.p_s3,
                0.6 * down.p_s3 + 0.4 * up.p_s3,
                epsilon = 1e-12
            );
        }
    }

    #[test]
    fn test_row_counts() {
        let (accounts, assumptions, scenarios) = setup();
        let executor = Executor::new(Method::Map);
        let results = executor
            .execute(&accounts, &assumptions, &scenarios, None)
            .unwrap();
        // Two scenarios plus the weighted composite, 36 + 24 rows each
        assert_eq!(results.len(), 3 * (36 + 24));
    }

    #[test]
    fn test_methods_agree() {
        let (accounts, assumptions, scenarios) = setup();
        let sequential = Executor::new(Method::Map)
            .execute(&accounts, &assumptions, &scenarios, None)
            .unwrap();
        for method in [Method::ThreadMap, Method::ProcessMap] {
            let parallel = Executor::new(method)
                .execute(&accounts, &assumptions, &scenarios, None)
                .unwrap();
            assert_eq!(parallel.len(), sequential.len());
            let total: f64 = parallel.rows().iter().map(|r| r.ecl).sum();
            let expected: f64 = sequential.rows().iter().map(|r| r.ecl).sum();
            assert_relative_eq!(total, expected, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_cancellation_discards_results() {
        let (accounts, assumptions, scenarios) = setup();
        let executor = Executor::new(Method::Map);
        executor.cancel_flag().store(true, Ordering::Relaxed);
        let outcome = executor.execute(&accounts, &assumptions, &scenarios, None);
        assert!(matches!(outcome, Err(EngineError::Cancelled)));
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!(Method::parse("map").unwrap(), Method::Map);
        assert_eq!(Method::parse("thread-map").unwrap(), Method::ThreadMap);
        assert_eq!(Method::parse("PROCESS_MAP").unwrap(), Method::ProcessMap);
        assert!(Method::parse("fork").is_err());
    }
}
