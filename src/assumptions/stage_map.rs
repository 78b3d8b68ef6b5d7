//! IFRS 9 stage map
//!
//! For each origination rating the map assigns every current rating to one
//! of four buckets: Stage 1, Stage 2, Stage 3 or write-off treatment. The
//! stage-probability engine sums cumulative transition probabilities over
//! these buckets.

use crate::error::{EngineError, Result};
use std::collections::BTreeMap;

/// Number of stage buckets (S1, S2, S3, WO)
pub const STAGES: usize = 4;

/// Per-origination-rating assignment of current ratings to stages.
///
/// Ratings are 0-based indices into the (un-augmented) rating universe.
#[derive(Debug, Clone)]
pub struct StageMap {
    n_ratings: usize,
    map: BTreeMap<usize, [Vec<usize>; 4]>,
}

impl StageMap {
    /// Build from explicit per-rating stage assignments.
    ///
    /// `assignments[origination][current]` holds the 1-based stage number.
    pub fn new(assignments: &BTreeMap<usize, Vec<u8>>, n_ratings: usize) -> Result<Self> {
        let mut map = BTreeMap::new();
        for (&origination, stages) in assignments {
            if origination >= n_ratings {
                return Err(EngineError::invalid_config(
                    "stage map",
                    format!("origination rating {} outside universe of {n_ratings}", origination + 1),
                ));
            }
            if stages.len() != n_ratings {
                return Err(EngineError::invalid_config(
                    "stage map",
                    format!(
                        "origination rating {} assigns {} ratings, expected {n_ratings}",
                        origination + 1,
                        stages.len()
                    ),
                ));
            }
            let mut sets: [Vec<usize>; 4] = Default::default();
            for (current, &stage) in stages.iter().enumerate() {
                match stage {
                    1..=4 => sets[stage as usize - 1].push(current),
                    other => {
                        return Err(EngineError::invalid_config(
                            "stage map",
                            format!(
                                "rating ({}, {}) maps to stage {other}, expected 1-4",
                                origination + 1,
                                current + 1
                            ),
                        ))
                    }
                }
            }
            map.insert(origination, sets);
        }
        Ok(Self { n_ratings, map })
    }

    pub fn n_ratings(&self) -> usize {
        self.n_ratings
    }

    /// The four disjoint rating sets for an origination rating.
    pub fn stages(&self, origination_rating: usize) -> Result<&[Vec<usize>; 4]> {
        self.map.get(&origination_rating).ok_or_else(|| {
            EngineError::invalid_config(
                "stage map",
                format!("no entry for origination rating {}", origination_rating + 1),
            )
        })
    }

    /// A map where every origination rating stages ratings `0..n-1` as
    /// S1 except the worst, which is S3. Used for single-segment setups
    /// without an explicit staging table.
    pub fn default_for(n_ratings: usize) -> Self {
        let mut assignments = BTreeMap::new();
        for origination in 0..n_ratings {
            let stages = (0..n_ratings)
                .map(|r| if r + 1 == n_ratings { 3 } else { 1 })
                .collect();
            assignments.insert(origination, stages);
        }
        // Assignments built above are structurally valid.
        Self::new(&assignments, n_ratings).unwrap_or(Self {
            n_ratings,
            map: BTreeMap::new(),
        })
    }
}
