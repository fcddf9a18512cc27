//! Writeback unit.
//!
//! Drains the execution units' and load/store queue's completion slots,
//! writes each uop's results into the physical register file, and then
//! forwards the registers through the dispatch/issue unit so the
//! scoreboard and any waiting dependents observe them in the same cycle.
//! Plain uops become commit-ready here; micro-ops are marked waiting and
//! promoted as a group by the reorder buffer.

use crate::common::reg::RegisterFileSet;
use crate::core::pipeline::buffer::PipelineBuffer;
use crate::core::pipeline::dispatch::DispatchIssueUnit;
use crate::core::uop::{UopArena, UopId};
use crate::stats::{SharedStats, StatId};

/// The writeback stage.
pub struct WritebackUnit {
    stats: SharedStats,
    instructions_written: StatId,
}

impl WritebackUnit {
    /// Creates a writeback unit.
    pub fn new(stats: SharedStats) -> Self {
        let instructions_written = stats
            .borrow_mut()
            .register_stat("writeback.instructionsWritten");
        Self {
            stats,
            instructions_written,
        }
    }

    /// Ticks the writeback unit over every completion slot buffer.
    pub fn tick(
        &mut self,
        completion_slots: &mut [PipelineBuffer<Option<UopId>>],
        arena: &mut UopArena,
        register_files: &mut RegisterFileSet,
        dispatch: &mut DispatchIssueUnit,
    ) {
        for buffer in completion_slots {
            for slot in buffer.head_slots_mut() {
                let Some(id) = slot.take() else {
                    continue;
                };
                if arena.is_flushed(id) {
                    continue;
                }

                let uop = arena.get(id);
                let destinations = uop.op.destination_registers().to_vec();
                let results = uop.op.results().to_vec();
                debug_assert_eq!(destinations.len(), results.len());

                for (reg, value) in destinations.iter().zip(&results) {
                    register_files.set(*reg, value.clone());
                }
                dispatch.forward_operands(&destinations, &results, arena);

                let uop = arena.get_mut(id);
                if uop.op.is_micro_op() {
                    uop.waiting_commit = true;
                } else {
                    uop.can_commit = true;
                }
                self.stats
                    .borrow_mut()
                    .increment(self.instructions_written, 1);
            }
        }
    }
}
