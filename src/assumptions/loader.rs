//! CSV-based assumption loaders
//!
//! Loads the segment assumptions table with its companion transition-matrix
//! and stage-map tables from a directory. Files are validated as they load;
//! nothing downstream re-checks bounds.

use super::{
    Assumptions, CcfMethod, EadAssumptions, EadModel, EirAssumptions, LgdAssumptions, LgdModel,
    PdAssumptions, PdMethod, SegmentAssumptions, StageMap,
};
use crate::error::{EngineError, Result};
use ndarray::Array2;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// One row of the `assumptions.csv` table
#[derive(Debug, Deserialize)]
struct AssumptionRow {
    segment_id: i64,
    segment_name: String,
    pd_type: String,
    pd_z_index: String,
    pd_rho: f64,
    pd_calibrated: String,
    pd_cure_state: usize,
    pd_frequency: u32,
    pd_time_in_watchlist: u32,
    pd_method: String,
    ead_type: String,
    ead_exposure_at_default: f64,
    ead_ccf_method: String,
    ead_ccf: f64,
    ead_fees_fixed: f64,
    ead_fees_pct: f64,
    ead_prepayment_pct: f64,
    ead_default_penalty_pct: f64,
    ead_default_penalty_amt: f64,
    lgd_type: String,
    lgd_loss_given_default: f64,
    lgd_growth_rate: f64,
    lgd_index: String,
    lgd_probability_of_cure: f64,
    lgd_loss_given_cure: f64,
    lgd_forced_sale_discount: f64,
    lgd_sale_cost: f64,
    lgd_time_to_sale: u32,
    lgd_loss_given_write_off: f64,
    lgd_floor: f64,
    eir_base_rate: String,
}

fn parse_flag(s: &str) -> bool {
    matches!(s.trim().to_uppercase().as_str(), "TRUE" | "1" | "YES" | "Y")
}

/// Load segment assumptions from `assumptions.csv`,
/// `transition_matrices.csv` and `stage_map.csv` in `dir`.
pub fn load_assumptions(dir: &Path) -> Result<Assumptions> {
    let matrices = load_transition_matrices(&dir.join("transition_matrices.csv"))?;
    let stage_map = load_stage_map(&dir.join("stage_map.csv"))?;

    let path = dir.join("assumptions.csv");
    let mut reader = csv::Reader::from_path(&path)
        .map_err(|e| EngineError::io(path.display().to_string(), e))?;

    let mut segments = Vec::new();
    for row in reader.deserialize::<AssumptionRow>() {
        let row = row.map_err(|e| EngineError::io(path.display().to_string(), e))?;

        if row.pd_type.trim().to_uppercase().replace(' ', "_") != "TRANSITION_MATRIX" {
            return Err(EngineError::invalid_config(
                format!("segment {} pd_type", row.segment_id),
                format!("unsupported PD model '{}'", row.pd_type),
            ));
        }
        let transition_matrix = matrices.get(&row.segment_id).cloned().ok_or_else(|| {
            EngineError::invalid_config(
                format!("segment {}", row.segment_id),
                "no transition matrix rows",
            )
        })?;
        if row.pd_cure_state < 1 {
            return Err(EngineError::invalid_config(
                format!("segment {} pd_cure_state", row.segment_id),
                "ratings are 1-based",
            ));
        }

        segments.push(SegmentAssumptions {
            id: row.segment_id,
            name: row.segment_name.clone(),
            pd: PdAssumptions {
                z_index: row.pd_z_index.trim().to_string(),
                rho: row.pd_rho,
                calibrated: parse_flag(&row.pd_calibrated),
                cure_state: row.pd_cure_state - 1,
                frequency: row.pd_frequency,
                time_in_watchlist: row.pd_time_in_watchlist,
                transition_matrix,
                method: PdMethod::parse(&row.pd_method)?,
            },
            ead: EadAssumptions {
                model: EadModel::parse(&row.ead_type)?,
                exposure_at_default: row.ead_exposure_at_default,
                ccf_method: CcfMethod::parse(&row.ead_ccf_method)?,
                ccf: row.ead_ccf,
                fees_fixed: row.ead_fees_fixed,
                fees_pct: row.ead_fees_pct,
                prepayment_pct: row.ead_prepayment_pct,
                default_penalty_pct: row.ead_default_penalty_pct,
                default_penalty_amt: row.ead_default_penalty_amt,
            },
            lgd: LgdAssumptions {
                model: LgdModel::parse(&row.lgd_type)?,
                loss_given_default: row.lgd_loss_given_default,
                growth_rate: row.lgd_growth_rate,
                index: row.lgd_index.trim().to_string(),
                probability_of_cure: row.lgd_probability_of_cure,
                loss_given_cure: row.lgd_loss_given_cure,
                forced_sale_discount: row.lgd_forced_sale_discount,
                sale_cost: row.lgd_sale_cost,
                time_to_sale: row.lgd_time_to_sale,
                loss_given_write_off: row.lgd_loss_given_write_off,
                floor: row.lgd_floor,
            },
            eir: EirAssumptions {
                base_rate: row.eir_base_rate.trim().to_string(),
            },
            stage_map: stage_map.clone(),
        });
    }

    Assumptions::new(segments)
}

/// Load TTC matrices from the long-form table
/// `segment_id, from, to, value` with 1-based ratings.
pub fn load_transition_matrices(path: &Path) -> Result<BTreeMap<i64, Array2<f64>>> {
    #[derive(Debug, Deserialize)]
    struct MatrixRow {
        segment_id: i64,
        from: usize,
        to: usize,
        value: f64,
    }

    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| EngineError::io(path.display().to_string(), e))?;

    let mut cells: BTreeMap<i64, Vec<(usize, usize, f64)>> = BTreeMap::new();
    for row in reader.deserialize::<MatrixRow>() {
        let row = row.map_err(|e| EngineError::io(path.display().to_string(), e))?;
        if row.from < 1 || row.to < 1 {
            return Err(EngineError::invalid_config(
                format!("segment {} transition matrix", row.segment_id),
                "ratings are 1-based",
            ));
        }
        cells
            .entry(row.segment_id)
            .or_default()
            .push((row.from - 1, row.to - 1, row.value));
    }

    let mut matrices = BTreeMap::new();
    for (segment_id, entries) in cells {
        let n = entries
            .iter()
            .map(|(from, to, _)| from.max(to) + 1)
            .max()
            .unwrap_or(0);
        let mut matrix = Array2::zeros((n, n));
        for (from, to, value) in entries {
            matrix[[from, to]] = value;
        }
        matrices.insert(segment_id, matrix);
    }
    Ok(matrices)
}

/// Load the stage map table. The first column is the origination rating;
/// the remaining columns are current ratings; each cell assigns a stage
/// number 1-4.
pub fn load_stage_map(path: &Path) -> Result<StageMap> {
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| EngineError::io(path.display().to_string(), e))?;

    let n_ratings = reader
        .headers()
        .map_err(|e| EngineError::io(path.display().to_string(), e))?
        .len()
        .saturating_sub(1);

    let mut assignments: BTreeMap<usize, Vec<u8>> = BTreeMap::new();
    for record in reader.records() {
        let record = record.map_err(|e| EngineError::io(path.display().to_string(), e))?;
        let origination: usize = record
            .get(0)
            .unwrap_or_default()
            .trim()
            .parse()
            .map_err(|_| {
                EngineError::invalid_config("stage map", "unparseable origination rating")
            })?;
        if origination < 1 {
            return Err(EngineError::invalid_config(
                "stage map",
                "ratings are 1-based",
            ));
        }
        let stages: Vec<u8> = (1..record.len())
            .map(|i| {
                record
                    .get(i)
                    .unwrap_or_default()
                    .trim()
                    .parse()
                    .map_err(|_| {
                        EngineError::invalid_config(
                            "stage map",
                            format!("unparseable stage for origination rating {origination}"),
                        )
                    })
            })
            .collect::<Result<_>>()?;
        assignments.insert(origination - 1, stages);
    }

    StageMap::new(&assignments, n_ratings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(name: &str, contents: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join("ecl_engine_loader_tests");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_load_transition_matrices_long_form() {
        let path = write_temp(
            "tm.csv",
            "segment_id,from,to,value\n\
             1,1,1,0.97\n1,1,2,0.03\n1,2,1,0.0\n1,2,2,1.0\n",
        );
        let matrices = load_transition_matrices(&path).unwrap();
        let m = matrices.get(&1).unwrap();
        assert_eq!(m.dim(), (2, 2));
        assert!((m[[0, 1]] - 0.03).abs() < 1e-12);
        assert!((m[[1, 1]] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_load_stage_map() {
        let path = write_temp("sm.csv", "origination,1,2,3\n1,1,2,3\n2,1,1,3\n3,2,2,3\n");
        let map = load_stage_map(&path).unwrap();
        assert_eq!(map.n_ratings(), 3);
        let sets = map.stages(1).unwrap();
        assert_eq!(sets[0], vec![0, 1]);
        assert_eq!(sets[2], vec![2]);
    }

    #[test]
    fn test_flag_parsing() {
        assert!(parse_flag("TRUE"));
        assert!(parse_flag("1"));
        assert!(parse_flag(" yes "));
        assert!(!parse_flag("false"));
        assert!(!parse_flag("0"));
    }
}
