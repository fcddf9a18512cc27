//! Branch predictor contract.

use crate::isa::BranchPrediction;

/// A branch direction and target predictor.
pub trait BranchPredictor {
    /// Predicts the outcome of the branch at `address`.
    fn predict(&mut self, address: u64) -> BranchPrediction;

    /// Trains the predictor with a resolved branch outcome.
    ///
    /// Called at commit for executed branches, and from decode when an
    /// early misprediction is discovered on a non-branch.
    fn update(&mut self, address: u64, taken: bool, target: u64);

    /// Notifies the predictor of a pipeline flush redirecting fetch to
    /// `address`, so speculative internal state can be repaired.
    fn flush(&mut self, address: u64);
}
