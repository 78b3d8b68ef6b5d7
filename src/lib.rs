//! ECL Engine - High-performance IFRS 9 expected credit loss projection
//!
//! This library provides:
//! - Transition-matrix regularisation and TTC to PiT conditioning under a
//!   single-factor Merton-Vasicek credit-cycle index
//! - Marginal PD, EAD, LGD and effective-interest-rate term structures
//! - Four-state (S1/S2/S3/write-off) stage probabilities with watchlist
//!   overrides
//! - Per-account ECL curves, scenario fan-out and the probability-weighted
//!   composite scenario
//! - Summary and parameter aggregation with configurable group-by keys

pub mod account;
pub mod assumptions;
pub mod climate;
pub mod dates;
pub mod engine;
pub mod error;
pub mod executor;
pub mod forecast;
pub mod license;
pub mod matrix;
pub mod montecarlo;
pub mod results;
pub mod scenario;

// Re-export commonly used types
pub use account::{Account, AccountData, AccountType};
pub use assumptions::{Assumptions, SegmentAssumptions, StageMap};
pub use engine::EclModel;
pub use error::EngineError;
pub use executor::{Executor, Method};
pub use forecast::{forecast, DynamicRange, ForecastType};
pub use license::License;
pub use matrix::TransitionMatrix;
pub use results::{EclRow, Results};
pub use scenario::{Scenario, Scenarios};
