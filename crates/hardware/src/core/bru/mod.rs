//! Branch prediction unit implementations.
//!
//! This module contains the branch predictor contract, an always-not-taken
//! predictor, a bimodal predictor backed by a branch target buffer, and a
//! static-dispatch wrapper selected from configuration.

pub use self::branch_predictor::BranchPredictor;

/// Bimodal predictor (two-bit counters plus BTB).
pub mod bimodal;
/// Branch predictor trait.
pub mod branch_predictor;
/// Branch target buffer storing predicted targets.
pub mod btb;
/// Always-not-taken predictor.
pub mod static_bp;

use self::{bimodal::BimodalPredictor, static_bp::AlwaysNotTakenPredictor};
use crate::config::{Config, PredictorKind};
use crate::isa::BranchPrediction;

/// Enum wrapper for static dispatch of branch predictors.
/// This avoids vtable lookups in the critical fetch loop.
pub enum BranchPredictorWrapper {
    AlwaysNotTaken(AlwaysNotTakenPredictor),
    Bimodal(BimodalPredictor),
}

impl BranchPredictorWrapper {
    /// Creates the configured branch predictor.
    pub fn new(config: &Config) -> Self {
        let bits = config.branch_predictor.btb_bits;
        match config.branch_predictor.kind {
            PredictorKind::AlwaysNotTaken => Self::AlwaysNotTaken(AlwaysNotTakenPredictor),
            PredictorKind::Bimodal => Self::Bimodal(BimodalPredictor::new(bits)),
        }
    }
}

impl BranchPredictor for BranchPredictorWrapper {
    #[inline(always)]
    fn predict(&mut self, address: u64) -> BranchPrediction {
        match self {
            Self::AlwaysNotTaken(bp) => bp.predict(address),
            Self::Bimodal(bp) => bp.predict(address),
        }
    }

    #[inline(always)]
    fn update(&mut self, address: u64, taken: bool, target: u64) {
        match self {
            Self::AlwaysNotTaken(bp) => bp.update(address, taken, target),
            Self::Bimodal(bp) => bp.update(address, taken, target),
        }
    }

    #[inline(always)]
    fn flush(&mut self, address: u64) {
        match self {
            Self::AlwaysNotTaken(bp) => bp.flush(address),
            Self::Bimodal(bp) => bp.flush(address),
        }
    }
}
