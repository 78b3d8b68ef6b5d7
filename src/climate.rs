//! Climate-risk value adjustments
//!
//! Per account key and month, a discrete set of (value, probability)
//! outcomes describing the climate adjustment to the loss given
//! possession. Inputs anchor a handful of dates; months in between are
//! linearly interpolated and the probabilities renormalised. An absent
//! key means a zero adjustment, not an error.

use crate::dates::{parse_month_end, MonthEnd};
use crate::error::{EngineError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Discrete outcome set per month: `value[t][j]` with probability
/// `probability[t][j]`, each month's probabilities summing to one.
#[derive(Debug, Clone)]
pub struct ClimateRiskValueAdjustment {
    pub value: Vec<Vec<f64>>,
    pub probability: Vec<Vec<f64>>,
}

impl ClimateRiskValueAdjustment {
    /// Raw moment of the outcome distribution per month.
    fn moment(&self, order: i32) -> Vec<f64> {
        self.value
            .iter()
            .zip(&self.probability)
            .map(|(values, probabilities)| {
                values
                    .iter()
                    .zip(probabilities)
                    .map(|(v, p)| v.powi(order) * p)
                    .sum()
            })
            .collect()
    }

    /// Expected adjustment per month.
    pub fn expected_value(&self) -> Vec<f64> {
        self.moment(1)
    }

    /// Variance of the adjustment per month.
    pub fn variance(&self) -> Vec<f64> {
        self.moment(2)
            .into_iter()
            .zip(self.expected_value())
            .map(|(m2, mean)| m2 - mean * mean)
            .collect()
    }

    pub fn standard_deviation(&self) -> Vec<f64> {
        self.variance().into_iter().map(f64::sqrt).collect()
    }
}

/// Anchor observations for one (key, outcome index): (month, value, probability)
type Anchors = Vec<(MonthEnd, f64, f64)>;

/// Climate adjustments for one macro scenario, keyed by account key
#[derive(Debug, Clone, Default)]
pub struct ClimateRiskScenario {
    /// key -> outcome index -> anchors
    data: BTreeMap<String, BTreeMap<String, Anchors>>,
}

impl ClimateRiskScenario {
    /// The interpolated adjustment for `key` over `len` months from
    /// `start`. `None` when the key carries no adjustment data.
    pub fn adjustment(
        &self,
        key: &str,
        start: MonthEnd,
        len: usize,
    ) -> Option<ClimateRiskValueAdjustment> {
        let outcomes = self.data.get(key)?;
        let n_outcomes = outcomes.len();

        let mut value = vec![vec![0.0; n_outcomes]; len];
        let mut probability = vec![vec![0.0; n_outcomes]; len];
        for (j, anchors) in outcomes.values().enumerate() {
            for t in 0..len {
                let at = start + t as i32;
                let (v, p) = interpolate_anchor(anchors, at);
                value[t][j] = v;
                probability[t][j] = p;
            }
        }

        // Renormalise each month's probabilities
        for probs in probability.iter_mut() {
            let total: f64 = probs.iter().sum();
            if total > 0.0 {
                for p in probs.iter_mut() {
                    *p /= total;
                }
            }
        }

        Some(ClimateRiskValueAdjustment { value, probability })
    }
}

/// Linear interpolation of (value, probability) between anchor months;
/// the nearest anchor extends beyond the observed range.
fn interpolate_anchor(anchors: &Anchors, at: MonthEnd) -> (f64, f64) {
    match anchors.iter().position(|(date, _, _)| *date >= at) {
        // Before or at the first anchor
        Some(0) => (anchors[0].1, anchors[0].2),
        Some(i) => {
            let (d0, v0, p0) = anchors[i - 1];
            let (d1, v1, p1) = anchors[i];
            let span = (d1 - d0).max(1) as f64;
            let frac = (at - d0) as f64 / span;
            (v0 + (v1 - v0) * frac, p0 + (p1 - p0) * frac)
        }
        // Past the last anchor
        None => {
            let last = anchors.len() - 1;
            (anchors[last].1, anchors[last].2)
        }
    }
}

/// Climate adjustments across all scenarios
#[derive(Debug, Clone, Default)]
pub struct ClimateRiskScenarios {
    scenarios: BTreeMap<String, ClimateRiskScenario>,
}

impl ClimateRiskScenarios {
    pub fn get(&self, scenario: &str) -> Option<&ClimateRiskScenario> {
        self.scenarios.get(scenario)
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    /// Load the climate-risk table
    /// `{scenario, key, date, index, value, probability}`.
    pub fn from_csv_path(path: &Path) -> Result<Self> {
        #[derive(Debug, Deserialize)]
        struct ClimateRow {
            scenario: String,
            key: String,
            date: String,
            index: String,
            value: f64,
            probability: f64,
        }

        let mut reader = csv::Reader::from_path(path)
            .map_err(|e| EngineError::io(path.display().to_string(), e))?;

        let mut scenarios: BTreeMap<String, ClimateRiskScenario> = BTreeMap::new();
        for row in reader.deserialize::<ClimateRow>() {
            let row = row.map_err(|e| EngineError::io(path.display().to_string(), e))?;
            let date = parse_month_end(&row.date).ok_or_else(|| {
                EngineError::invalid_config(
                    format!("climate risk key '{}'", row.key),
                    format!("unparseable date '{}'", row.date),
                )
            })?;
            scenarios
                .entry(row.scenario)
                .or_default()
                .data
                .entry(row.key)
                .or_default()
                .entry(row.index)
                .or_default()
                .push((date, row.value, row.probability));
        }

        for scenario in scenarios.values_mut() {
            for outcomes in scenario.data.values_mut() {
                for anchors in outcomes.values_mut() {
                    anchors.sort_by_key(|(date, _, _)| *date);
                }
            }
        }

        Ok(Self { scenarios })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn scenario_with_anchors() -> ClimateRiskScenario {
        // Two outcomes with constant probabilities and values moving
        // linearly between two anchor dates a year apart.
        let start = MonthEnd::from_ym(2024, 1);
        let end = MonthEnd::from_ym(2025, 1);
        let mut outcomes = BTreeMap::new();
        outcomes.insert(
            "severe".to_string(),
            vec![(start, 0.10, 0.2), (end, 0.30, 0.2)],
        );
        outcomes.insert(
            "benign".to_string(),
            vec![(start, 0.00, 0.8), (end, 0.02, 0.8)],
        );
        let mut data = BTreeMap::new();
        data.insert("LOAN-1".to_string(), outcomes);
        ClimateRiskScenario { data }
    }

    #[test]
    fn test_expected_value_at_anchors() {
        let scenario = scenario_with_anchors();
        let adj = scenario
            .adjustment("LOAN-1", MonthEnd::from_ym(2024, 1), 13)
            .unwrap();
        let expected = adj.expected_value();
        assert_relative_eq!(expected[0], 0.2 * 0.10 + 0.8 * 0.00, epsilon = 1e-12);
        assert_relative_eq!(expected[12], 0.2 * 0.30 + 0.8 * 0.02, epsilon = 1e-12);
    }

    #[test]
    fn test_midpoint_is_average_of_anchor_expectations() {
        let scenario = scenario_with_anchors();
        let adj = scenario
            .adjustment("LOAN-1", MonthEnd::from_ym(2024, 1), 13)
            .unwrap();
        let expected = adj.expected_value();
        let anchor_average = (expected[0] + expected[12]) / 2.0;
        // 2024-07 is the midpoint of the two anchors
        assert_relative_eq!(expected[6], anchor_average, epsilon = 1e-10);
    }

    #[test]
    fn test_missing_key_is_zero_adjustment() {
        let scenario = scenario_with_anchors();
        assert!(scenario
            .adjustment("UNKNOWN", MonthEnd::from_ym(2024, 1), 12)
            .is_none());
    }

    #[test]
    fn test_variance_and_std_dev() {
        let adj = ClimateRiskValueAdjustment {
            value: vec![vec![1.0, -1.0]],
            probability: vec![vec![0.5, 0.5]],
        };
        assert_relative_eq!(adj.expected_value()[0], 0.0, epsilon = 1e-12);
        assert_relative_eq!(adj.variance()[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(adj.standard_deviation()[0], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_probabilities_renormalised() {
        let start = MonthEnd::from_ym(2024, 1);
        let mut outcomes = BTreeMap::new();
        outcomes.insert("a".to_string(), vec![(start, 0.5, 2.0)]);
        outcomes.insert("b".to_string(), vec![(start, 0.1, 6.0)]);
        let mut data = BTreeMap::new();
        data.insert("K".to_string(), outcomes);
        let scenario = ClimateRiskScenario { data };

        let adj = scenario.adjustment("K", start, 1).unwrap();
        let total: f64 = adj.probability[0].iter().sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-12);
    }
}
