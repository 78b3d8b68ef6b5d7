//! Result rows and aggregation
//!
//! The engine emits one `EclRow` per (scenario, contract, horizon). This
//! module owns the emitted rows, folds them into the summary and parameter
//! reports, and writes the CSV outputs.

use crate::dates::MonthEnd;
use crate::error::{EngineError, Result};
use std::collections::BTreeMap;
use std::path::Path;

/// One record of the detailed ECL output
#[derive(Debug, Clone)]
pub struct EclRow {
    pub scenario: String,
    pub contract_id: String,
    pub segment_id: i64,
    pub account_type: String,
    /// Horizon index within the account's remaining life
    pub t: u32,
    pub forecast_reporting_date: MonthEnd,
    /// Marginal monthly PD
    pub pd: f64,
    pub pd_12m: f64,
    pub pd_lifetime: f64,
    pub ead: f64,
    pub lgd: f64,
    /// Discount factor back to the reporting date
    pub df: f64,
    pub p_s1: f64,
    pub p_s2: f64,
    pub p_s3: f64,
    pub p_wo: f64,
    pub marginal_cr: f64,
    pub stage1: f64,
    pub stage2: f64,
    pub stage3: f64,
    pub cr: f64,
    pub exposure: f64,
    pub write_off: f64,
    pub ecl: f64,
}

impl EclRow {
    /// Join key for the weighted-scenario fold.
    pub fn weighted_key(&self) -> (String, u32, i32) {
        (
            self.contract_id.clone(),
            self.t,
            self.forecast_reporting_date.ordinal(),
        )
    }

    /// Add `other`'s numeric fields scaled by `weight`.
    pub fn accumulate(&mut self, other: &EclRow, weight: f64) {
        self.pd += weight * other.pd;
        self.pd_12m += weight * other.pd_12m;
        self.pd_lifetime += weight * other.pd_lifetime;
        self.ead += weight * other.ead;
        self.lgd += weight * other.lgd;
        self.df += weight * other.df;
        self.p_s1 += weight * other.p_s1;
        self.p_s2 += weight * other.p_s2;
        self.p_s3 += weight * other.p_s3;
        self.p_wo += weight * other.p_wo;
        self.marginal_cr += weight * other.marginal_cr;
        self.stage1 += weight * other.stage1;
        self.stage2 += weight * other.stage2;
        self.stage3 += weight * other.stage3;
        self.cr += weight * other.cr;
        self.exposure += weight * other.exposure;
        self.write_off += weight * other.write_off;
        self.ecl += weight * other.ecl;
    }

    /// A zeroed copy carrying the non-numeric fields, tagged as the
    /// weighted composite scenario.
    pub fn weighted_template(&self) -> EclRow {
        EclRow {
            scenario: "weighted".to_string(),
            contract_id: self.contract_id.clone(),
            segment_id: self.segment_id,
            account_type: self.account_type.clone(),
            t: self.t,
            forecast_reporting_date: self.forecast_reporting_date,
            pd: 0.0,
            pd_12m: 0.0,
            pd_lifetime: 0.0,
            ead: 0.0,
            lgd: 0.0,
            df: 0.0,
            p_s1: 0.0,
            p_s2: 0.0,
            p_s3: 0.0,
            p_wo: 0.0,
            marginal_cr: 0.0,
            stage1: 0.0,
            stage2: 0.0,
            stage3: 0.0,
            cr: 0.0,
            exposure: 0.0,
            write_off: 0.0,
            ecl: 0.0,
        }
    }

    /// Value of a group-by field by name.
    fn field(&self, name: &str) -> Result<String> {
        match name {
            "account_type" => Ok(self.account_type.clone()),
            "segment_id" => Ok(self.segment_id.to_string()),
            "contract_id" => Ok(self.contract_id.clone()),
            "forecast_reporting_date" => Ok(self.forecast_reporting_date.to_string()),
            "scenario" => Ok(self.scenario.clone()),
            other => Err(EngineError::invalid_config(
                "group-by",
                format!("unknown field '{other}'"),
            )),
        }
    }
}

/// Default aggregation key
pub const DEFAULT_GROUP_BY: [&str; 4] = [
    "account_type",
    "segment_id",
    "forecast_reporting_date",
    "scenario",
];

const STAGE_LABELS: [&str; 4] = ["1", "2", "3", "wo"];

/// One line of the stage-level summary report
#[derive(Debug, Clone)]
pub struct SummaryRow {
    pub group: Vec<String>,
    pub stage: String,
    /// Expected account count in the stage
    pub n: f64,
    pub exposure: f64,
    pub ecl: f64,
    pub coverage: f64,
}

/// One line of the exposure-weighted parameters report
#[derive(Debug, Clone)]
pub struct ParameterRow {
    pub group: Vec<String>,
    pub n: f64,
    pub exposure: f64,
    pub pd_12m: f64,
    pub lgd: f64,
}

/// Owns the emitted rows and derives the reports
#[derive(Debug, Clone, Default)]
pub struct Results {
    rows: Vec<EclRow>,
}

impl Results {
    pub fn new(rows: Vec<EclRow>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[EclRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Concatenate result sets (dynamic forecast offsets).
    pub fn extend(&mut self, other: Results) {
        self.rows.extend(other.rows);
    }

    /// Detailed rows at the reporting date for the actual book.
    pub fn reporting_date_slice(&self) -> Vec<&EclRow> {
        self.rows
            .iter()
            .filter(|r| r.t == 0 && r.account_type == "Actual")
            .collect()
    }

    /// Stage-level roll-up by the given key fields.
    pub fn summarise(&self, by: &[String]) -> Result<Vec<SummaryRow>> {
        // group -> per-stage (n, exposure, ecl)
        let mut groups: BTreeMap<Vec<String>, [(f64, f64, f64); 4]> = BTreeMap::new();
        for row in &self.rows {
            let key = by
                .iter()
                .map(|f| row.field(f))
                .collect::<Result<Vec<_>>>()?;
            let buckets = groups.entry(key).or_insert([(0.0, 0.0, 0.0); 4]);
            let stage_p = [row.p_s1, row.p_s2, row.p_s3, row.p_wo];
            let stage_ecl = [row.stage1, row.stage2, row.stage3, row.ead];
            for s in 0..4 {
                buckets[s].0 += stage_p[s];
                buckets[s].1 += row.ead * stage_p[s];
                buckets[s].2 += stage_ecl[s] * stage_p[s];
            }
        }

        let mut out = Vec::with_capacity(groups.len() * 4);
        for (group, buckets) in groups {
            for (s, (n, exposure, ecl)) in buckets.into_iter().enumerate() {
                out.push(SummaryRow {
                    group: group.clone(),
                    stage: STAGE_LABELS[s].to_string(),
                    n,
                    exposure,
                    ecl,
                    coverage: if exposure > 0.0 { ecl / exposure } else { 0.0 },
                });
            }
        }
        Ok(out)
    }

    /// Exposure-weighted 12-month PD and LGD by the given key fields.
    pub fn parameters(&self, by: &[String]) -> Result<Vec<ParameterRow>> {
        let mut groups: BTreeMap<Vec<String>, (f64, f64, f64, f64)> = BTreeMap::new();
        for row in &self.rows {
            let key = by
                .iter()
                .map(|f| row.field(f))
                .collect::<Result<Vec<_>>>()?;
            let acc = groups.entry(key).or_insert((0.0, 0.0, 0.0, 0.0));
            acc.0 += row.p_s1 + row.p_s2 + row.p_s3;
            acc.1 += row.exposure;
            acc.2 += row.exposure * row.pd_12m;
            acc.3 += row.exposure * row.lgd;
        }

        Ok(groups
            .into_iter()
            .map(|(group, (n, exposure, epd, elgd))| ParameterRow {
                group,
                n,
                exposure,
                pd_12m: if exposure > 0.0 { epd / exposure } else { 0.0 },
                lgd: if exposure > 0.0 { elgd / exposure } else { 0.0 },
            })
            .collect())
    }

    /// Write `detailed.csv`, `summary.csv`, `parameters.csv` and
    /// `reporting_date.csv` into `dir`.
    pub fn save(&self, dir: &Path, by: &[String]) -> Result<()> {
        std::fs::create_dir_all(dir).map_err(|e| EngineError::io(dir.display().to_string(), e))?;

        self.write_detailed(&dir.join("detailed.csv"), |_| true)?;
        self.write_detailed(&dir.join("reporting_date.csv"), |r| {
            r.t == 0 && r.account_type == "Actual"
        })?;
        self.write_summary(&dir.join("summary.csv"), by)?;
        self.write_parameters(&dir.join("parameters.csv"), by)?;
        Ok(())
    }

    fn write_detailed<F: Fn(&EclRow) -> bool>(&self, path: &Path, keep: F) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)
            .map_err(|e| EngineError::io(path.display().to_string(), e))?;
        let io_err = |e: csv::Error| EngineError::io(path.display().to_string(), e);

        writer
            .write_record([
                "scenario",
                "contract_id",
                "segment_id",
                "account_type",
                "T",
                "forecast_reporting_date",
                "PD(t)",
                "12mPD(t)",
                "LifetimePD(t)",
                "EAD(t)",
                "LGD(t)",
                "DF(t)",
                "P(S=1)",
                "P(S=2)",
                "P(S=3)",
                "P(S=WO)",
                "MarginalCR(t)",
                "STAGE1(t)",
                "STAGE2(t)",
                "STAGE3(t)",
                "CR(t)",
                "Exposure(t)",
                "WriteOff(t)",
                "ECL(t)",
            ])
            .map_err(io_err)?;

        for row in self.rows.iter().filter(|r| keep(r)) {
            writer
                .write_record([
                    row.scenario.clone(),
                    row.contract_id.clone(),
                    row.segment_id.to_string(),
                    row.account_type.clone(),
                    row.t.to_string(),
                    row.forecast_reporting_date.to_string(),
                    row.pd.to_string(),
                    row.pd_12m.to_string(),
                    row.pd_lifetime.to_string(),
                    row.ead.to_string(),
                    row.lgd.to_string(),
                    row.df.to_string(),
                    row.p_s1.to_string(),
                    row.p_s2.to_string(),
                    row.p_s3.to_string(),
                    row.p_wo.to_string(),
                    row.marginal_cr.to_string(),
                    row.stage1.to_string(),
                    row.stage2.to_string(),
                    row.stage3.to_string(),
                    row.cr.to_string(),
                    row.exposure.to_string(),
                    row.write_off.to_string(),
                    row.ecl.to_string(),
                ])
                .map_err(io_err)?;
        }
        writer
            .flush()
            .map_err(|e| EngineError::io(path.display().to_string(), e))
    }

    fn write_summary(&self, path: &Path, by: &[String]) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)
            .map_err(|e| EngineError::io(path.display().to_string(), e))?;
        let io_err = |e: csv::Error| EngineError::io(path.display().to_string(), e);

        let mut header: Vec<String> = by.to_vec();
        header.extend(["stage", "n", "Exposure(t)", "ECL(t)", "CR(t)"].map(String::from));
        writer.write_record(&header).map_err(io_err)?;

        for row in self.summarise(by)? {
            let mut record = row.group.clone();
            record.push(row.stage);
            record.push(row.n.to_string());
            record.push(row.exposure.to_string());
            record.push(row.ecl.to_string());
            record.push(row.coverage.to_string());
            writer.write_record(&record).map_err(io_err)?;
        }
        writer
            .flush()
            .map_err(|e| EngineError::io(path.display().to_string(), e))
    }

    fn write_parameters(&self, path: &Path, by: &[String]) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)
            .map_err(|e| EngineError::io(path.display().to_string(), e))?;
        let io_err = |e: csv::Error| EngineError::io(path.display().to_string(), e);

        let mut header: Vec<String> = by.to_vec();
        header.extend(["n", "Exposure(t)", "12mPD(t)", "LGD(t)"].map(String::from));
        writer.write_record(&header).map_err(io_err)?;

        for row in self.parameters(by)? {
            let mut record = row.group.clone();
            record.push(row.n.to_string());
            record.push(row.exposure.to_string());
            record.push(row.pd_12m.to_string());
            record.push(row.lgd.to_string());
            writer.write_record(&record).map_err(io_err)?;
        }
        writer
            .flush()
            .map_err(|e| EngineError::io(path.display().to_string(), e))
    }
}

#[cfg(test)]
pub(crate) mod test_fixtures {
    use super::*;

    pub fn row(scenario: &str, contract: &str, t: u32, ecl: f64) -> EclRow {
        EclRow {
            scenario: scenario.into(),
            contract_id: contract.into(),
            segment_id: 1,
            account_type: "Actual".into(),
            t,
            forecast_reporting_date: MonthEnd::from_ym(2024, 1) + t as i32,
            pd: 0.01,
            pd_12m: 0.05,
            pd_lifetime: 0.2,
            ead: 1000.0,
            lgd: 0.4,
            df: 1.0,
            p_s1: 0.8,
            p_s2: 0.15,
            p_s3: 0.05,
            p_wo: 0.0,
            marginal_cr: 4.0,
            stage1: 10.0,
            stage2: 25.0,
            stage3: 400.0,
            cr: 0.03,
            exposure: 1000.0,
            write_off: 0.0,
            ecl,
        }
    }
}
