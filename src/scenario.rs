//! Macroeconomic scenario series
//!
//! A scenario is an ordered mapping of named macro variables to monthly
//! vectors, together with a name and a probability weight. Scenario tables
//! arrive at arbitrary observation dates; the loader resamples them to
//! month ends and linearly interpolates interior gaps so that every lookup
//! inside the engine is a straight integer index.

use crate::dates::{parse_month_end, MonthEnd};
use crate::error::{EngineError, Result};
use std::collections::BTreeMap;
use std::path::Path;

/// A single named macro scenario
#[derive(Debug, Clone)]
pub struct Scenario {
    name: String,
    weight: f64,
    start: MonthEnd,
    variables: BTreeMap<String, Vec<f64>>,
}

impl Scenario {
    pub fn new(
        name: impl Into<String>,
        weight: f64,
        start: MonthEnd,
        variables: BTreeMap<String, Vec<f64>>,
    ) -> Self {
        Self {
            name: name.into(),
            weight,
            start,
            variables,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn start(&self) -> MonthEnd {
        self.start
    }

    /// Number of months covered by the scenario.
    pub fn len(&self) -> usize {
        self.variables.values().map(Vec::len).next().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value of `variable` at the given month end.
    pub fn get(&self, variable: &str, date: MonthEnd) -> Result<f64> {
        let series = self
            .variables
            .get(variable)
            .ok_or_else(|| self.lookup_miss(variable, date))?;
        let idx = date - self.start;
        if idx < 0 || idx as usize >= series.len() {
            return Err(self.lookup_miss(variable, date));
        }
        Ok(series[idx as usize])
    }

    /// Contiguous monthly slice of `variable` starting at `start`.
    pub fn series(&self, variable: &str, start: MonthEnd, len: usize) -> Result<Vec<f64>> {
        (0..len as i32).map(|t| self.get(variable, start + t)).collect()
    }

    fn lookup_miss(&self, variable: &str, date: MonthEnd) -> EngineError {
        EngineError::ScenarioLookup {
            scenario: self.name.clone(),
            variable: variable.to_string(),
            date: date.to_string(),
        }
    }
}

/// The full set of scenarios to run, keyed by name
#[derive(Debug, Clone, Default)]
pub struct Scenarios {
    scenarios: BTreeMap<String, Scenario>,
}

impl Scenarios {
    pub fn new(scenarios: Vec<Scenario>) -> Result<Self> {
        let collection = Self {
            scenarios: scenarios
                .into_iter()
                .map(|s| (s.name.clone(), s))
                .collect(),
        };
        collection.validate_weights()?;
        Ok(collection)
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Scenario> {
        self.scenarios.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Scenario> {
        self.scenarios.values()
    }

    pub fn weights(&self) -> BTreeMap<String, f64> {
        self.scenarios
            .iter()
            .map(|(name, s)| (name.clone(), s.weight))
            .collect()
    }

    /// Scenario weights must form a probability distribution.
    fn validate_weights(&self) -> Result<()> {
        let total: f64 = self.scenarios.values().map(|s| s.weight).sum();
        if (total - 1.0).abs() > 1e-6 {
            return Err(EngineError::invalid_config(
                "scenario weights",
                format!("weights sum to {total}, expected 1.0"),
            ));
        }
        for s in self.scenarios.values() {
            if !(0.0..=1.0).contains(&s.weight) {
                return Err(EngineError::invalid_config(
                    format!("scenario '{}'", s.name),
                    format!("weight {} outside [0, 1]", s.weight),
                ));
            }
        }
        Ok(())
    }

    /// Load scenarios from a CSV table with columns
    /// `SCENARIO, DATE, WEIGHT, <variable>...`.
    pub fn from_csv_path(path: &Path) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path)
            .map_err(|e| EngineError::io(path.display().to_string(), e))?;

        let headers = reader
            .headers()
            .map_err(|e| EngineError::io(path.display().to_string(), e))?
            .clone();

        let mut scenario_col = None;
        let mut date_col = None;
        let mut weight_col = None;
        let mut variable_cols = Vec::new();
        for (i, h) in headers.iter().enumerate() {
            match h.trim().to_uppercase().as_str() {
                "SCENARIO" => scenario_col = Some(i),
                "DATE" => date_col = Some(i),
                "WEIGHT" => weight_col = Some(i),
                _ => variable_cols.push((i, h.trim().to_string())),
            }
        }
        let (scenario_col, date_col, weight_col) = match (scenario_col, date_col, weight_col) {
            (Some(s), Some(d), Some(w)) => (s, d, w),
            _ => {
                return Err(EngineError::invalid_config(
                    "scenario table",
                    "missing SCENARIO, DATE or WEIGHT column",
                ))
            }
        };

        // name -> (weight, date -> (variable -> value))
        type Observations = BTreeMap<MonthEnd, BTreeMap<String, f64>>;
        let mut raw: BTreeMap<String, (f64, Observations)> = BTreeMap::new();

        for record in reader.records() {
            let record = record.map_err(|e| EngineError::io(path.display().to_string(), e))?;
            let name = record
                .get(scenario_col)
                .unwrap_or_default()
                .trim()
                .to_string();
            let date = record
                .get(date_col)
                .and_then(parse_month_end)
                .ok_or_else(|| {
                    EngineError::invalid_config(
                        format!("scenario '{name}'"),
                        "unparseable DATE value",
                    )
                })?;
            let weight: f64 = record
                .get(weight_col)
                .unwrap_or_default()
                .trim()
                .parse()
                .map_err(|_| {
                    EngineError::invalid_config(
                        format!("scenario '{name}'"),
                        "unparseable WEIGHT value",
                    )
                })?;

            let entry = raw.entry(name).or_insert_with(|| (weight, BTreeMap::new()));
            let row = entry.1.entry(date).or_default();
            for (col, var) in &variable_cols {
                let cell = record.get(*col).unwrap_or_default().trim();
                if !cell.is_empty() {
                    let value: f64 = cell.parse().map_err(|_| {
                        EngineError::invalid_config(
                            format!("scenario variable '{var}'"),
                            format!("unparseable value '{cell}'"),
                        )
                    })?;
                    row.insert(var.clone(), value);
                }
            }
        }

        let mut scenarios = Vec::new();
        for (name, (weight, observations)) in raw {
            scenarios.push(build_scenario(name, weight, &observations)?);
        }
        Self::new(scenarios)
    }

    /// Write the collection back out in the scenario table layout.
    pub fn to_csv_path(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)
            .map_err(|e| EngineError::io(path.display().to_string(), e))?;
        let io_err = |e: csv::Error| EngineError::io(path.display().to_string(), e);

        let mut variable_names: Vec<String> = Vec::new();
        for scenario in self.scenarios.values() {
            for var in scenario.variables.keys() {
                if !variable_names.contains(var) {
                    variable_names.push(var.clone());
                }
            }
        }

        let mut header = vec!["SCENARIO".to_string(), "DATE".to_string(), "WEIGHT".to_string()];
        header.extend(variable_names.clone());
        writer.write_record(&header).map_err(io_err)?;

        for scenario in self.scenarios.values() {
            for t in 0..scenario.len() {
                let date = scenario.start + t as i32;
                let mut record = vec![
                    scenario.name.clone(),
                    date.to_string(),
                    scenario.weight.to_string(),
                ];
                for var in &variable_names {
                    record.push(
                        scenario
                            .variables
                            .get(var)
                            .and_then(|s| s.get(t))
                            .map(|v| v.to_string())
                            .unwrap_or_default(),
                    );
                }
                writer.write_record(&record).map_err(io_err)?;
            }
        }
        writer
            .flush()
            .map_err(|e| EngineError::io(path.display().to_string(), e))
    }
}

/// Resample observations to a contiguous monthly grid, interpolating
/// interior gaps linearly per variable.
fn build_scenario(
    name: String,
    weight: f64,
    observations: &BTreeMap<MonthEnd, BTreeMap<String, f64>>,
) -> Result<Scenario> {
    let (first, last) = match (observations.keys().next(), observations.keys().last()) {
        (Some(f), Some(l)) => (*f, *l),
        _ => {
            return Err(EngineError::invalid_config(
                format!("scenario '{name}'"),
                "no observations",
            ))
        }
    };
    let len = (last - first) as usize + 1;

    let mut variable_names: Vec<String> = Vec::new();
    for row in observations.values() {
        for var in row.keys() {
            if !variable_names.contains(var) {
                variable_names.push(var.clone());
            }
        }
    }

    let mut variables = BTreeMap::new();
    for var in variable_names {
        let anchors: Vec<(i32, f64)> = observations
            .iter()
            .filter_map(|(date, row)| row.get(&var).map(|v| (*date - first, *v)))
            .collect();
        variables.insert(var, interpolate_monthly(&anchors, len));
    }

    Ok(Scenario::new(name, weight, first, variables))
}

/// Fill a monthly grid from sparse (month, value) anchors. Interior months
/// interpolate linearly; months outside the anchor range hold the nearest
/// anchor value.
fn interpolate_monthly(anchors: &[(i32, f64)], len: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; len];
    if anchors.is_empty() {
        return out;
    }
    for window in anchors.windows(2) {
        let (t0, v0) = window[0];
        let (t1, v1) = window[1];
        let span = (t1 - t0).max(1) as f64;
        for t in t0..=t1 {
            out[t as usize] = v0 + (v1 - v0) * (t - t0) as f64 / span;
        }
    }
    let (first_t, first_v) = anchors[0];
    let (last_t, last_v) = anchors[anchors.len() - 1];
    for t in 0..first_t {
        out[t as usize] = first_v;
    }
    for t in (last_t + 1)..len as i32 {
        out[t as usize] = last_v;
    }
    out
}
