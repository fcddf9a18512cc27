//! Bimodal branch predictor.
//!
//! Two-bit saturating direction counters indexed like the BTB, with the
//! BTB supplying targets. A branch predicts taken when its counter is in a
//! taken state *and* a target is known; direction counters train on every
//! resolved branch, targets only on taken ones.

use super::BranchPredictor;
use super::btb::Btb;
use crate::isa::BranchPrediction;

/// Bimodal predictor: two-bit counters plus a branch target buffer.
pub struct BimodalPredictor {
    btb: Btb,
    counters: Vec<u8>,
    index_mask: u64,
}

impl BimodalPredictor {
    /// Creates a bimodal predictor with `2^bits` counters and BTB entries.
    pub fn new(bits: usize) -> Self {
        Self {
            btb: Btb::new(bits),
            // Initialize to weakly not-taken.
            counters: vec![1; 1 << bits],
            index_mask: (1 << bits) as u64 - 1,
        }
    }

    #[inline]
    fn index(&self, pc: u64) -> usize {
        ((pc >> 2) & self.index_mask) as usize
    }
}

impl BranchPredictor for BimodalPredictor {
    fn predict(&mut self, address: u64) -> BranchPrediction {
        let counter = self.counters[self.index(address)];
        match self.btb.lookup(address) {
            Some(target) if counter >= 2 => BranchPrediction {
                taken: true,
                target,
            },
            _ => BranchPrediction::not_taken(),
        }
    }

    fn update(&mut self, address: u64, taken: bool, target: u64) {
        let index = self.index(address);
        let counter = &mut self.counters[index];
        if taken {
            *counter = (*counter + 1).min(3);
            self.btb.update(address, target);
        } else {
            *counter = counter.saturating_sub(1);
        }
    }

    fn flush(&mut self, _address: u64) {}
}
