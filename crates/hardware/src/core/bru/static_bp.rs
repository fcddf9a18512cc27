//! Always-not-taken branch predictor.
//!
//! Predicts every branch as not taken. Useful as a baseline when isolating
//! the cost of control speculation.

use super::BranchPredictor;
use crate::isa::BranchPrediction;

/// Predictor that never predicts taken and keeps no state.
pub struct AlwaysNotTakenPredictor;

impl BranchPredictor for AlwaysNotTakenPredictor {
    /// Always predicts not taken.
    fn predict(&mut self, _address: u64) -> BranchPrediction {
        BranchPrediction::not_taken()
    }

    /// As this model is static, this does nothing.
    fn update(&mut self, _address: u64, _taken: bool, _target: u64) {}

    /// No speculative state to repair.
    fn flush(&mut self, _address: u64) {}
}
