//! Decode unit.
//!
//! Splits predecoded macro-ops into uops through a small internal deque,
//! assigns emission order, and performs the early misprediction check: a
//! uop whose next address is already deterministic (a non-branch, or a
//! direct unconditional branch) that disagrees with the fetch-time
//! prediction raises a flush with the correct target. At most one flush is
//! raised per cycle, from the first violating uop.

use std::collections::VecDeque;

use crate::core::bru::{BranchPredictor, BranchPredictorWrapper};
use crate::core::pipeline::buffer::PipelineBuffer;
use crate::core::uop::{MacroOp, UopArena, UopId};
use crate::isa::BranchPrediction;
use crate::stats::{SharedStats, StatId};

/// The decode stage.
pub struct DecodeUnit {
    /// Uops split from macro-ops, awaiting output capacity.
    micro_ops: VecDeque<UopId>,
    next_sequence_id: u64,
    should_flush: bool,
    flush_address: u64,
    stats: SharedStats,
    early_flushes: StatId,
}

impl DecodeUnit {
    /// Creates a decode unit.
    pub fn new(stats: SharedStats) -> Self {
        let early_flushes = stats.borrow_mut().register_stat("decode.earlyFlushes");
        Self {
            micro_ops: VecDeque::new(),
            next_sequence_id: 0,
            should_flush: false,
            flush_address: 0,
            stats,
            early_flushes,
        }
    }

    /// Returns true if decode discovered a misprediction this cycle.
    pub fn should_flush(&self) -> bool {
        self.should_flush
    }

    /// Returns the address fetch should be redirected to on flush.
    pub fn flush_address(&self) -> u64 {
        self.flush_address
    }

    /// Drops every uop held in the internal deque.
    pub fn purge_flushed(&mut self, arena: &mut UopArena) {
        for id in self.micro_ops.drain(..) {
            arena.release(id);
        }
    }

    /// Ticks the decode unit: expand macro-ops, drain uops to the output,
    /// and check for early mispredictions.
    pub fn tick(
        &mut self,
        input: &mut PipelineBuffer<MacroOp>,
        output: &mut PipelineBuffer<Option<UopId>>,
        predictor: &mut BranchPredictorWrapper,
        arena: &mut UopArena,
    ) {
        self.should_flush = false;

        if output.is_stalled() {
            input.stall(true);
            return;
        }

        if self.micro_ops.is_empty() {
            for slot in input.head_slots_mut() {
                let macro_op = std::mem::take(slot);
                for id in macro_op {
                    arena.get_mut(id).sequence_id = self.next_sequence_id;
                    self.next_sequence_id += 1;
                    self.micro_ops.push_back(id);
                }
            }
        }

        for slot in 0..output.width() {
            let Some(id) = self.micro_ops.pop_front() else {
                break;
            };
            output.tail_slots_mut()[slot] = Some(id);

            let (mispredicted, correct_address, is_branch, address) = {
                let uop = arena.get(id);
                let (mispredicted, correct_address) =
                    uop.op.check_early_branch_misprediction(uop.prediction);
                (mispredicted, correct_address, uop.op.is_branch(), uop.op.address())
            };
            if mispredicted {
                self.should_flush = true;
                self.flush_address = correct_address;
                if is_branch {
                    // The prediction is corrected here, so the branch does
                    // not re-resolve as mispredicted at execute.
                    arena.get_mut(id).prediction = BranchPrediction {
                        taken: true,
                        target: correct_address,
                    };
                } else {
                    // A non-branch was predicted taken; train the predictor
                    // towards fall-through.
                    predictor.update(address, false, correct_address);
                }
                self.stats.borrow_mut().increment(self.early_flushes, 1);
                tracing::debug!(address, target = correct_address, "early branch misprediction");
                self.purge_flushed(arena);
                break;
            }
        }

        input.stall(!self.micro_ops.is_empty());
    }
}
