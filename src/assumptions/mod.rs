//! Segment-level model assumptions
//!
//! Each portfolio segment carries one immutable assumptions record: the PD
//! transition-matrix parameters, the EAD and LGD model selections, the EIR
//! base-rate binding and the staging rules. Records are validated when
//! loaded and shared read-only by every worker afterwards.

mod stage_map;
pub mod loader;

pub use stage_map::{StageMap, STAGES};
pub use loader::load_assumptions;

use crate::error::{EngineError, Result};
use ndarray::Array2;
use std::collections::BTreeMap;

/// TTC to PiT reparameterisation method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PdMethod {
    /// METHOD-1: shift the default-distance matrix by the Z index
    ZShift,
    /// METHOD-2: shift through the default barrier only
    DefaultBarrier,
}

impl PdMethod {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "METHOD-1" | "METHOD 1" | "Z-SHIFT" => Ok(PdMethod::ZShift),
            "METHOD-2" | "METHOD 2" | "DEFAULT-BARRIER" => Ok(PdMethod::DefaultBarrier),
            other => Err(EngineError::invalid_config(
                "pd_method",
                format!("unrecognised method '{other}'"),
            )),
        }
    }
}

/// Generator-matrix row repair strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairStrategy {
    /// Weighted adjustment: spread negative mass over positive off-diagonals
    WeightedAdjustment,
    /// Diagonal adjustment: clip negatives, absorb into the diagonal
    DiagonalAdjustment,
    /// Quasi-optimisation: L2 projection onto valid generator rows
    QuasiOptimisation,
}

/// PD assumptions for a segment (transition-matrix based)
#[derive(Debug, Clone)]
pub struct PdAssumptions {
    /// Scenario variable holding the credit-cycle index Z
    pub z_index: String,
    /// Asset correlation, in [0, 1)
    pub rho: f64,
    /// When set, the Z conditioning leaves the TTC matrix unchanged at Z=0
    pub calibrated: bool,
    /// Rating (0-based) a cured default returns to
    pub cure_state: usize,
    /// Months covered by one observation of the TTC matrix (1, 4 or 12)
    pub frequency: u32,
    /// Horizons a watchlisted account is pinned to its watchlist stage
    pub time_in_watchlist: u32,
    /// N x N row-stochastic TTC matrix
    pub transition_matrix: Array2<f64>,
    pub method: PdMethod,
}

/// EAD model selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EadModel {
    Constant,
    Amortising,
    Bullet,
    Ccf,
}

impl EadModel {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "CONSTANT" => Ok(EadModel::Constant),
            "AMORTISING" => Ok(EadModel::Amortising),
            "BULLET" => Ok(EadModel::Bullet),
            "CCF" => Ok(EadModel::Ccf),
            other => Err(EngineError::invalid_config(
                "ead_type",
                format!("unrecognised EAD model '{other}'"),
            )),
        }
    }
}

/// Credit conversion factor method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CcfMethod {
    /// EAD = outstanding balance x CCF
    Method1,
    /// EAD = limit x CCF
    Method2,
    /// EAD = outstanding + (limit - outstanding) x CCF
    Method3,
}

impl CcfMethod {
    pub fn parse(s: &str) -> Result<Self> {
        match s
            .trim()
            .to_uppercase()
            .replace("METHOD", "M")
            .replace([' ', '-'], "")
            .as_str()
        {
            "M1" => Ok(CcfMethod::Method1),
            "M2" => Ok(CcfMethod::Method2),
            "M3" => Ok(CcfMethod::Method3),
            other => Err(EngineError::invalid_config(
                "ead_ccf_method",
                format!("unrecognised CCF method '{other}'"),
            )),
        }
    }
}

/// EAD assumptions for a segment
#[derive(Debug, Clone)]
pub struct EadAssumptions {
    pub model: EadModel,
    /// EAD multiplier for the CONSTANT model
    pub exposure_at_default: f64,
    pub ccf_method: CcfMethod,
    pub ccf: f64,
    /// Fixed monthly fees added to the balance
    pub fees_fixed: f64,
    /// Annual percentage fees, applied through the adjusted rate
    pub fees_pct: f64,
    /// Annual prepayment rate, applied through the adjusted rate
    pub prepayment_pct: f64,
    /// Penalty applied to the balance at default
    pub default_penalty_pct: f64,
    pub default_penalty_amt: f64,
}

/// LGD model selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LgdModel {
    Secured,
    Unsecured,
    Constant,
    Indexed,
    ConstantGrowth,
}

impl LgdModel {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().replace('_', "-").as_str() {
            "SECURED" => Ok(LgdModel::Secured),
            "UNSECURED" => Ok(LgdModel::Unsecured),
            "CONSTANT" => Ok(LgdModel::Constant),
            "INDEXED" => Ok(LgdModel::Indexed),
            "CONSTANT-GROWTH" => Ok(LgdModel::ConstantGrowth),
            other => Err(EngineError::invalid_config(
                "lgd_type",
                format!("unrecognised LGD model '{other}'"),
            )),
        }
    }
}

/// LGD assumptions for a segment
#[derive(Debug, Clone)]
pub struct LgdAssumptions {
    pub model: LgdModel,
    /// Flat loss rate for the CONSTANT and INDEXED models
    pub loss_given_default: f64,
    /// Annual collateral growth rate for CONSTANT-GROWTH
    pub growth_rate: f64,
    /// Scenario variable holding the collateral index
    pub index: String,
    pub probability_of_cure: f64,
    pub loss_given_cure: f64,
    /// Haircut applied on forced sale of collateral
    pub forced_sale_discount: f64,
    pub sale_cost: f64,
    /// Months from default to collateral sale (also the write-off horizon)
    pub time_to_sale: u32,
    pub loss_given_write_off: f64,
    /// Lower bound on the loss rate given possession
    pub floor: f64,
}

/// EIR assumptions for a segment
#[derive(Debug, Clone)]
pub struct EirAssumptions {
    /// Scenario variable holding the floating base rate
    pub base_rate: String,
}

/// Immutable per-segment assumptions record
#[derive(Debug, Clone)]
pub struct SegmentAssumptions {
    pub id: i64,
    pub name: String,
    pub pd: PdAssumptions,
    pub ead: EadAssumptions,
    pub lgd: LgdAssumptions,
    pub eir: EirAssumptions,
    pub stage_map: StageMap,
}

impl SegmentAssumptions {
    /// Validate numeric bounds and structural consistency at load time.
    pub fn validate(&self) -> Result<()> {
        let ctx = |field: &str| format!("segment {} {field}", self.id);

        if !(0.0..1.0).contains(&self.pd.rho) {
            return Err(EngineError::invalid_config(
                ctx("pd_rho"),
                format!("{} outside [0, 1)", self.pd.rho),
            ));
        }
        if ![1, 4, 12].contains(&self.pd.frequency) {
            return Err(EngineError::invalid_config(
                ctx("pd_frequency"),
                format!("{} not one of 1, 4, 12", self.pd.frequency),
            ));
        }
        if self.pd.time_in_watchlist < 1 {
            return Err(EngineError::invalid_config(
                ctx("pd_time_in_watchlist"),
                "must be at least 1",
            ));
        }

        let (rows, cols) = self.pd.transition_matrix.dim();
        if rows != cols || rows < 2 {
            return Err(EngineError::invalid_config(
                ctx("transition_matrix"),
                format!("expected square matrix of size >= 2, got {rows}x{cols}"),
            ));
        }
        if self.pd.cure_state >= rows {
            return Err(EngineError::invalid_config(
                ctx("pd_cure_state"),
                format!("rating {} outside universe of {rows}", self.pd.cure_state + 1),
            ));
        }
        if self.stage_map.n_ratings() != rows {
            return Err(EngineError::invalid_config(
                ctx("stage_map"),
                format!(
                    "stage map covers {} ratings, transition matrix has {rows}",
                    self.stage_map.n_ratings()
                ),
            ));
        }

        for (field, value) in [
            ("lgd_probability_of_cure", self.lgd.probability_of_cure),
            ("lgd_loss_given_cure", self.lgd.loss_given_cure),
            ("lgd_loss_given_write_off", self.lgd.loss_given_write_off),
            ("lgd_floor", self.lgd.floor),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(EngineError::invalid_config(
                    ctx(field),
                    format!("{value} outside [0, 1]"),
                ));
            }
        }
        if self.lgd.time_to_sale < 1 {
            return Err(EngineError::invalid_config(
                ctx("lgd_time_to_sale"),
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// All segment assumptions, keyed by segment id
#[derive(Debug, Clone, Default)]
pub struct Assumptions {
    segments: BTreeMap<i64, SegmentAssumptions>,
}

impl Assumptions {
    pub fn new(segments: Vec<SegmentAssumptions>) -> Result<Self> {
        for segment in &segments {
            segment.validate()?;
        }
        Ok(Self {
            segments: segments.into_iter().map(|s| (s.id, s)).collect(),
        })
    }

    pub fn get(&self, segment_id: i64) -> Result<&SegmentAssumptions> {
        self.segments.get(&segment_id).ok_or_else(|| {
            EngineError::invalid_config(
                "segment_id",
                format!("no assumptions for segment {segment_id}"),
            )
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &SegmentAssumptions> {
        self.segments.values()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod test_fixtures {
    use super::*;
    use ndarray::array;

    /// Two-rating universe (performing, default) with an annual TTC matrix.
    pub fn two_state_segment(annual_pd: f64) -> SegmentAssumptions {
        SegmentAssumptions {
            id: 1,
            name: "test".into(),
            pd: PdAssumptions {
                z_index: "Z".into(),
                rho: 0.0,
                calibrated: true,
                cure_state: 0,
                frequency: 12,
                time_in_watchlist: 1,
                transition_matrix: array![[1.0 - annual_pd, annual_pd], [0.0, 1.0]],
                method: PdMethod::ZShift,
            },
            ead: EadAssumptions {
                model: EadModel::Ccf,
                exposure_at_default: 1.0,
                ccf_method: CcfMethod::Method1,
                ccf: 1.0,
                fees_fixed: 0.0,
                fees_pct: 0.0,
                prepayment_pct: 0.0,
                default_penalty_pct: 0.0,
                default_penalty_amt: 0.0,
            },
            lgd: LgdAssumptions {
                model: LgdModel::Constant,
                loss_given_default: 0.45,
                growth_rate: 0.0,
                index: "HPI".into(),
                probability_of_cure: 0.0,
                loss_given_cure: 0.0,
                forced_sale_discount: 0.0,
                sale_cost: 0.0,
                time_to_sale: 12,
                loss_given_write_off: 1.0,
                floor: 0.0,
            },
            eir: EirAssumptions {
                base_rate: "BASE_RATE".into(),
            },
            stage_map: StageMap::default_for(2),
        }
    }

    #[test]
    fn test_validation_bounds() {
        let mut segment = two_state_segment(0.02);
        assert!(segment.validate().is_ok());

        segment.pd.rho = 1.0;
        assert!(segment.validate().is_err());
        segment.pd.rho = 0.1;

        segment.lgd.floor = 1.5;
        assert!(segment.validate().is_err());
        segment.lgd.floor = 0.0;

        segment.pd.frequency = 6;
        assert!(segment.validate().is_err());
    }

    #[test]
    fn test_enum_parsing() {
        assert_eq!(EadModel::parse("bullet").unwrap(), EadModel::Bullet);
        assert_eq!(CcfMethod::parse("M2").unwrap(), CcfMethod::Method2);
        assert_eq!(CcfMethod::parse("Method 3").unwrap(), CcfMethod::Method3);
        assert_eq!(
            LgdModel::parse("CONSTANT-GROWTH").unwrap(),
            LgdModel::ConstantGrowth
        );
        assert_eq!(PdMethod::parse("METHOD-2").unwrap(), PdMethod::DefaultBarrier);
        assert!(EadModel::parse("revolver").is_err());
    }
}
