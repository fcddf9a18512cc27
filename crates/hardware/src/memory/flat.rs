//! Flat memory interface: every access completes immediately.
//!
//! Used for instruction fetch and for timing-insensitive runs. Reads are
//! available in `completed_reads` in the same cycle they are requested.

use crate::common::value::RegisterValue;
use crate::memory::{
    MemoryAccessTarget, MemoryInterface, MemoryReadResult, ProcessMemory,
};

/// Immediate-completion memory interface backed by the process image.
pub struct FlatMemoryInterface {
    memory: ProcessMemory,
    completed_reads: Vec<MemoryReadResult>,
}

impl FlatMemoryInterface {
    /// Creates a flat interface over the given process image.
    pub fn new(memory: ProcessMemory) -> Self {
        Self {
            memory,
            completed_reads: Vec::new(),
        }
    }
}

impl MemoryInterface for FlatMemoryInterface {
    fn request_read(&mut self, target: MemoryAccessTarget, request_id: u64) {
        let memory = self.memory.borrow();
        let value = match memory.get(target.address as usize..target.end() as usize) {
            Some(bytes) => RegisterValue::new(bytes.to_vec()),
            None => RegisterValue::invalid(),
        };
        self.completed_reads.push(MemoryReadResult {
            target,
            value,
            request_id,
        });
    }

    fn request_write(&mut self, target: MemoryAccessTarget, data: RegisterValue) {
        let mut memory = self.memory.borrow_mut();
        let range = target.address as usize..target.end() as usize;
        if let Some(slice) = memory.get_mut(range) {
            slice.copy_from_slice(&data.as_bytes()[..target.size as usize]);
        } else {
            tracing::warn!(address = target.address, size = target.size, "write outside process image dropped");
        }
    }

    fn completed_reads(&self) -> &[MemoryReadResult] {
        &self.completed_reads
    }

    fn clear_completed_reads(&mut self) {
        self.completed_reads.clear();
    }

    fn has_pending_requests(&self) -> bool {
        false
    }

    fn tick(&mut self) {}
}
