//! Fetch unit.
//!
//! Requests aligned blocks of instruction memory at the program counter,
//! predecodes them into macro-ops through the ISA, and applies branch
//! predictions. A predicted-taken branch redirects the PC and ends the
//! fetch group for the cycle. An instruction memory fault emits a uop
//! carrying a decode exception and halts fetching until the PC is
//! redirected.

use crate::core::bru::{BranchPredictor, BranchPredictorWrapper};
use crate::core::pipeline::buffer::PipelineBuffer;
use crate::core::uop::{MacroOp, Uop, UopArena};
use crate::isa::{Architecture, BranchPrediction};
use crate::memory::{MemoryAccessTarget, MemoryInterface};

/// An outstanding instruction memory request.
struct PendingFetch {
    request_id: u64,
    block_address: u64,
}

/// The fetch stage.
pub struct FetchUnit {
    pc: u64,
    block_size: usize,
    /// The most recently fetched block, `(address, bytes)`.
    block: Option<(u64, Vec<u8>)>,
    pending: Option<PendingFetch>,
    next_request_id: u64,
    next_instruction_id: u64,
    /// Set after emitting a fault uop; fetch stops until redirected.
    halted: bool,
    fault_pending: bool,
}

impl FetchUnit {
    /// Creates a fetch unit starting at `entry_point`.
    pub fn new(entry_point: u64, block_size: usize) -> Self {
        debug_assert!(block_size.is_power_of_two());
        Self {
            pc: entry_point,
            block_size,
            block: None,
            pending: None,
            next_request_id: 0,
            next_instruction_id: 0,
            halted: false,
            fault_pending: false,
        }
    }

    /// Returns the current program counter.
    pub fn program_counter(&self) -> u64 {
        self.pc
    }

    /// Redirects fetch after a flush or exception return.
    pub fn update_pc(&mut self, address: u64) {
        self.pc = address;
        self.halted = false;
        self.fault_pending = false;
        // Any in-flight block request is stale; its response is dropped by
        // the id check when it arrives.
        self.pending = None;
    }

    fn block_base(&self, address: u64) -> u64 {
        address & !(self.block_size as u64 - 1)
    }

    fn drain_responses(&mut self, instruction_memory: &mut dyn MemoryInterface) {
        for result in instruction_memory.completed_reads() {
            let Some(pending) = &self.pending else {
                continue;
            };
            if result.request_id != pending.request_id {
                continue;
            }
            if result.value.is_valid() {
                self.block = Some((pending.block_address, result.value.as_bytes().to_vec()));
            } else {
                self.fault_pending = true;
            }
            self.pending = None;
        }
        instruction_memory.clear_completed_reads();
    }

    fn request_block(&mut self, instruction_memory: &mut dyn MemoryInterface) {
        if self.pending.is_some() {
            return;
        }
        let block_address = self.block_base(self.pc);
        let request_id = self.next_request_id;
        self.next_request_id += 1;
        instruction_memory.request_read(
            MemoryAccessTarget::new(block_address, self.block_size as u16),
            request_id,
        );
        self.pending = Some(PendingFetch {
            request_id,
            block_address,
        });
    }

    /// Ticks the fetch unit: fill output tail slots with predecoded
    /// macro-ops while capacity remains and no exception has been raised.
    pub fn tick(
        &mut self,
        output: &mut PipelineBuffer<MacroOp>,
        instruction_memory: &mut dyn MemoryInterface,
        predictor: &mut BranchPredictorWrapper,
        arena: &mut UopArena,
        architecture: &dyn Architecture,
    ) {
        self.drain_responses(instruction_memory);

        if output.is_stalled() || self.halted {
            return;
        }

        for slot in 0..output.width() {
            if self.fault_pending {
                let op = architecture.fetch_fault(self.pc);
                let id = arena.insert(Uop::new(
                    op,
                    self.next_instruction_id,
                    BranchPrediction::not_taken(),
                ));
                self.next_instruction_id += 1;
                output.tail_slots_mut()[slot] = vec![id];
                self.halted = true;
                tracing::debug!(pc = self.pc, "instruction fetch fault");
                return;
            }

            let Some((block_address, bytes)) = &self.block else {
                self.request_block(instruction_memory);
                return;
            };
            if self.block_base(self.pc) != *block_address {
                self.block = None;
                self.request_block(instruction_memory);
                return;
            }

            let offset = (self.pc - block_address) as usize;
            let predecoded = architecture.predecode(&bytes[offset..], self.pc);
            if predecoded.bytes_consumed == 0 {
                // The instruction straddles the block end; refetch.
                self.block = None;
                self.request_block(instruction_memory);
                return;
            }

            let is_branch = predecoded.uops.first().is_some_and(|op| op.is_branch());
            let prediction = if is_branch {
                predictor.predict(self.pc)
            } else {
                BranchPrediction::not_taken()
            };

            let instruction_id = self.next_instruction_id;
            self.next_instruction_id += 1;
            let macro_op: MacroOp = predecoded
                .uops
                .into_iter()
                .map(|op| arena.insert(Uop::new(op, instruction_id, prediction)))
                .collect();
            output.tail_slots_mut()[slot] = macro_op;

            if prediction.taken {
                // Taken branches end the fetch group.
                self.pc = prediction.target;
                return;
            }
            self.pc += predecoded.bytes_consumed as u64;
        }
    }
}
