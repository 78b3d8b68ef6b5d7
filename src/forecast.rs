//! Forecast modes
//!
//! Static closed-book runs, business-plan runs over the actual book plus a
//! simulated book, and dynamic balance-sheet runs that step the reporting
//! date forward and concatenate the results.

use crate::account::AccountData;
use crate::assumptions::Assumptions;
use crate::climate::ClimateRiskScenarios;
use crate::error::{EngineError, Result};
use crate::executor::{Executor, Method};
use crate::results::Results;
use crate::scenario::Scenarios;
use log::info;

/// Forecast mode selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForecastType {
    Static,
    BusinessPlan,
    Dynamic,
}

impl ForecastType {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "static" => Ok(ForecastType::Static),
            "business_plan" => Ok(ForecastType::BusinessPlan),
            "dynamic" => Ok(ForecastType::Dynamic),
            other => Err(EngineError::invalid_config(
                "forecast_type",
                format!("unrecognised forecast type '{other}'"),
            )),
        }
    }
}

/// Offsets for the dynamic forecast: `start, start+step, ... < stop` months
#[derive(Debug, Clone, Copy)]
pub struct DynamicRange {
    pub start: u32,
    pub stop: u32,
    pub step: u32,
}

impl Default for DynamicRange {
    fn default() -> Self {
        Self {
            start: 0,
            stop: 60,
            step: 12,
        }
    }
}

/// Run the requested forecast mode over the account book.
#[allow(clippy::too_many_arguments)]
pub fn forecast(
    forecast_type: ForecastType,
    method: Method,
    account_data: &AccountData,
    simulated: Option<AccountData>,
    assumptions: &Assumptions,
    scenarios: &Scenarios,
    climate: Option<&ClimateRiskScenarios>,
    range: DynamicRange,
) -> Result<Results> {
    match forecast_type {
        ForecastType::Static => {
            Executor::new(method).execute(account_data, assumptions, scenarios, climate)
        }
        ForecastType::BusinessPlan => {
            let simulated = simulated.ok_or_else(|| {
                EngineError::invalid_config(
                    "forecast_type",
                    "business_plan forecast requires portfolio assumptions",
                )
            })?;
            info!(
                "business plan forecast: {} actual + {} simulated accounts",
                account_data.len(),
                simulated.len()
            );
            let book = account_data.clone().union(simulated);
            Executor::new(method).execute(&book, assumptions, scenarios, climate)
        }
        ForecastType::Dynamic => {
            if range.step == 0 {
                return Err(EngineError::invalid_config("step", "must be positive"));
            }
            let mut combined = Results::default();
            let mut offset = range.start;
            while offset < range.stop {
                let book = account_data.offset(offset);
                if book.is_empty() {
                    info!("dynamic forecast: book empty at offset {offset}, stopping");
                    break;
                }
                info!(
                    "dynamic forecast: offset {offset} months ({} accounts)",
                    book.len()
                );
                let step_results =
                    Executor::new(method).execute(&book, assumptions, scenarios, climate)?;
                combined.extend(step_results);
                offset += range.step;
            }
            Ok(combined)
        }
    }
}
