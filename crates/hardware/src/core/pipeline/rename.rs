//! Rename unit.
//!
//! Allocates physical destination registers from the free list, rewrites
//! each uop's source and destination tags in place, records the rename in
//! the alias table history, and inserts the uop at the reorder buffer
//! tail. Loads and stores additionally reserve their load/store queue
//! slot here. The input stalls whenever the ROB, a queue, or the free
//! list cannot accept the next uop.

use crate::core::pipeline::buffer::PipelineBuffer;
use crate::core::pipeline::lsq::LoadStoreQueue;
use crate::core::pipeline::rob::ReorderBuffer;
use crate::core::rat::RegisterAliasTable;
use crate::core::uop::{UopArena, UopId};
use crate::stats::{SharedStats, StatId};

/// The rename stage.
pub struct RenameUnit {
    stats: SharedStats,
    allocation_stalls: StatId,
    rob_stalls: StatId,
    load_queue_stalls: StatId,
    store_queue_stalls: StatId,
}

impl RenameUnit {
    /// Creates a rename unit.
    pub fn new(stats: SharedStats) -> Self {
        let mut registry = stats.borrow_mut();
        let allocation_stalls = registry.register_stat("rename.allocationStalls");
        let rob_stalls = registry.register_stat("rename.robStalls");
        let load_queue_stalls = registry.register_stat("rename.lqStalls");
        let store_queue_stalls = registry.register_stat("rename.sqStalls");
        drop(registry);
        Self {
            stats,
            allocation_stalls,
            rob_stalls,
            load_queue_stalls,
            store_queue_stalls,
        }
    }

    /// Ticks the rename unit over the input width.
    pub fn tick(
        &mut self,
        input: &mut PipelineBuffer<Option<UopId>>,
        output: &mut PipelineBuffer<Option<UopId>>,
        rat: &mut RegisterAliasTable,
        rob: &mut ReorderBuffer,
        lsq: &mut LoadStoreQueue,
        arena: &mut UopArena,
    ) {
        if output.is_stalled() {
            input.stall(true);
            return;
        }
        input.stall(false);

        for slot in 0..input.width() {
            let Some(id) = input.head_slots()[slot] else {
                continue;
            };

            if rob.is_full() {
                input.stall(true);
                self.stats.borrow_mut().increment(self.rob_stalls, 1);
                return;
            }

            let uop = arena.get(id);
            if uop.op.is_load() && !lsq.can_add_load() {
                input.stall(true);
                self.stats.borrow_mut().increment(self.load_queue_stalls, 1);
                return;
            }
            if uop.op.is_store() && !lsq.can_add_store() {
                input.stall(true);
                self.stats
                    .borrow_mut()
                    .increment(self.store_queue_stalls, 1);
                return;
            }

            // The free list must cover every renameable destination.
            let destinations = uop.op.destination_registers().to_vec();
            let mut needed = std::collections::HashMap::new();
            for reg in destinations.iter().filter(|r| !r.is_zero()) {
                *needed.entry(reg.reg_type).or_insert(0usize) += 1;
            }
            if needed
                .iter()
                .any(|(&reg_type, &count)| !rat.can_allocate(reg_type, count))
            {
                input.stall(true);
                self.stats.borrow_mut().increment(self.allocation_stalls, 1);
                return;
            }

            let is_load = uop.op.is_load();
            let is_store = uop.op.is_store();

            // Sources are rewritten through the current mapping before the
            // destinations repoint it, so a uop reading its own
            // destination sees the previous producer.
            let sources: Vec<_> = uop
                .op
                .source_registers()
                .iter()
                .map(|&reg| rat.mapping(reg))
                .collect();
            let renamed: Vec<_> = destinations
                .iter()
                .map(|&reg| {
                    if reg.is_zero() {
                        reg
                    } else {
                        rat.allocate(reg)
                    }
                })
                .collect();

            arena.get_mut(id).op.rename(&renamed, &sources);

            rob.reserve(id);
            if is_load {
                lsq.add_load(id);
            }
            if is_store {
                lsq.add_store(id);
            }

            output.tail_slots_mut()[slot] = Some(id);
            input.head_slots_mut()[slot] = None;
        }
    }
}
