//! Transition-matrix machinery
//!
//! Regularisation of observed TTC matrices into monthly generators, the
//! write-off augmentation, and the scenario-conditional (PiT) matrix series
//! with cached cumulative products.

pub mod funcs;
pub mod regularise;
mod transition;

pub use regularise::{augment_write_off, monthly_matrix, standardise};
pub use transition::TransitionMatrix;
