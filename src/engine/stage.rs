//! Stage probabilities
//!
//! Distributes an account over the four credit states {S1, S2, S3, WO}
//! through time by summing cumulative transition probabilities over the
//! stage-map buckets for the account's origination rating. A watchlist
//! flag pins the account to one stage for the watchlist period.

use crate::account::Account;
use crate::assumptions::{StageMap, STAGES};
use crate::error::Result;
use crate::matrix::TransitionMatrix;

/// Stage-probability engine for one (segment, scenario) pair
#[derive(Debug, Clone)]
pub struct StageProbability {
    time_in_watchlist: u32,
}

impl StageProbability {
    pub fn new(time_in_watchlist: u32) -> Self {
        Self { time_in_watchlist }
    }

    /// Per-horizon stage distribution `[S1, S2, S3, WO]`.
    pub fn vector(
        &self,
        transition: &TransitionMatrix,
        stage_map: &StageMap,
        account: &Account,
    ) -> Result<Vec<[f64; STAGES]>> {
        let life = account.remaining_life as usize;
        let sets = stage_map.stages(account.origination_rating)?;
        let write_off = transition.write_off_state();

        let mut out = Vec::with_capacity(life);
        for t in 0..life {
            let row = transition.cumulative(t).row(account.current_rating);
            let mut stages = [0.0; STAGES];
            for (s, set) in sets.iter().enumerate() {
                stages[s] = set.iter().map(|&j| row[j]).sum();
            }
            // Ratings staged as write-off treatment join the WO state itself
            stages[3] += row[write_off];
            out.push(stages);
        }

        if let Some(watchlist) = account.watchlist {
            let pinned = watchlist as usize - 1;
            let horizon = (self.time_in_watchlist as usize).min(life);
            for stages in out.iter_mut().take(horizon) {
                *stages = [0.0; STAGES];
                stages[pinned] = 1.0;
            }
        }
        Ok(out)
    }
}
