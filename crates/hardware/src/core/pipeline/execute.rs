//! Execution units.
//!
//! One unit per issue port. Each holds a short latency pipeline; a uop
//! spends `latency - 1` cycles in transit and executes on emergence.
//! Loads generate their addresses here and hand off to the load/store
//! queue, which completes them when data arrives; stores generate
//! addresses, compute their data, and pass through. Branches resolve
//! here: a misprediction flags the core to flush everything younger.

use std::collections::VecDeque;

use crate::core::pipeline::buffer::PipelineBuffer;
use crate::core::pipeline::lsq::LoadStoreQueue;
use crate::core::uop::{UopArena, UopId};

/// A single execution unit fed by one issue port.
pub struct ExecuteUnit {
    port: u16,
    /// Uops in transit, with the cycle they emerge.
    pipeline: VecDeque<(UopId, u64)>,
    should_flush: bool,
    flush_after: (u64, u64),
    flush_address: u64,
}

impl ExecuteUnit {
    /// Creates an execution unit for `port`.
    pub fn new(port: u16) -> Self {
        Self {
            port,
            pipeline: VecDeque::new(),
            should_flush: false,
            flush_after: (0, 0),
            flush_address: 0,
        }
    }

    /// Returns the issue port this unit executes for.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns true if a branch misprediction was detected this cycle.
    pub fn should_flush(&self) -> bool {
        self.should_flush
    }

    /// Returns the identity of the mispredicted uop; everything strictly
    /// younger must flush.
    pub fn flush_after(&self) -> (u64, u64) {
        self.flush_after
    }

    /// Returns the resolved address fetch should redirect to.
    pub fn flush_address(&self) -> u64 {
        self.flush_address
    }

    /// Drops flushed uops from the latency pipeline.
    pub fn purge_flushed(&mut self, arena: &UopArena) {
        self.pipeline.retain(|&(id, _)| !arena.is_flushed(id));
    }

    /// Ticks the unit: accept one uop from the issue port, advance the
    /// latency pipeline, and process the uop emerging this cycle.
    pub fn tick(
        &mut self,
        input: &mut PipelineBuffer<Option<UopId>>,
        completion: &mut PipelineBuffer<Option<UopId>>,
        arena: &mut UopArena,
        lsq: &mut LoadStoreQueue,
        cycle: u64,
    ) {
        self.should_flush = false;

        if let Some(id) = input.head_slots_mut()[0].take() {
            // A uop squashed between issue and execute is dropped here.
            if !arena.is_flushed(id) {
                let latency = u64::from(arena.get(id).op.latency().max(1));
                self.pipeline.push_back((id, cycle + latency - 1));
            }
        }

        let Some(&(id, ready_at)) = self.pipeline.front() else {
            return;
        };
        if ready_at > cycle {
            return;
        }
        self.pipeline.pop_front();

        if arena.is_flushed(id) {
            return;
        }

        let op = &arena.get(id).op;
        let (is_load, is_store) = (op.is_load(), op.is_store());

        if is_load {
            // Loads execute in the LSQ once their data returns.
            arena.get_mut(id).op.generate_addresses();
            lsq.start_load(id, arena, cycle);
            return;
        }

        if is_store {
            let uop = arena.get_mut(id);
            uop.op.generate_addresses();
            uop.op.execute();
            uop.executed = true;
            lsq.supply_store_data(id, arena);
            completion.tail_slots_mut()[0] = Some(id);
            return;
        }

        let uop = arena.get_mut(id);
        uop.op.execute();
        uop.executed = true;

        if uop.op.is_branch() && uop.was_branch_mispredicted() {
            self.should_flush = true;
            self.flush_after = uop.ids();
            self.flush_address = uop.op.branch_address();
            tracing::debug!(
                address = uop.op.address(),
                target = self.flush_address,
                "branch mispredicted at execute"
            );
        }

        completion.tail_slots_mut()[0] = Some(id);
    }
}
