//! Fixed-latency memory interface.
//!
//! Every in-range access completes a fixed number of cycles after it is
//! requested, in request order. Out-of-range reads complete immediately
//! with an invalid value.

use std::collections::VecDeque;

use crate::common::value::RegisterValue;
use crate::memory::{
    MemoryAccessTarget, MemoryInterface, MemoryReadResult, ProcessMemory,
};

enum PendingAccess {
    Read {
        target: MemoryAccessTarget,
        request_id: u64,
    },
    Write {
        target: MemoryAccessTarget,
        data: RegisterValue,
    },
}

/// Memory interface with a fixed per-access latency.
pub struct FixedLatencyMemoryInterface {
    memory: ProcessMemory,
    latency: u64,
    cycle: u64,
    pending: VecDeque<(u64, PendingAccess)>,
    completed_reads: Vec<MemoryReadResult>,
}

impl FixedLatencyMemoryInterface {
    /// Creates a fixed-latency interface over the given process image.
    pub fn new(memory: ProcessMemory, latency: u64) -> Self {
        Self {
            memory,
            latency,
            cycle: 0,
            pending: VecDeque::new(),
            completed_reads: Vec::new(),
        }
    }
}

impl MemoryInterface for FixedLatencyMemoryInterface {
    fn request_read(&mut self, target: MemoryAccessTarget, request_id: u64) {
        if target.end() as usize > self.memory.borrow().len() {
            self.completed_reads.push(MemoryReadResult {
                target,
                value: RegisterValue::invalid(),
                request_id,
            });
            return;
        }
        self.pending.push_back((
            self.cycle + self.latency,
            PendingAccess::Read { target, request_id },
        ));
    }

    fn request_write(&mut self, target: MemoryAccessTarget, data: RegisterValue) {
        self.pending.push_back((
            self.cycle + self.latency,
            PendingAccess::Write { target, data },
        ));
    }

    fn completed_reads(&self) -> &[MemoryReadResult] {
        &self.completed_reads
    }

    fn clear_completed_reads(&mut self) {
        self.completed_reads.clear();
    }

    fn has_pending_requests(&self) -> bool {
        !self.pending.is_empty()
    }

    fn tick(&mut self) {
        self.cycle += 1;
        while let Some((due, _)) = self.pending.front() {
            if *due > self.cycle {
                break;
            }
            let (_, access) = self.pending.pop_front().expect("checked front");
            let mut memory = self.memory.borrow_mut();
            match access {
                PendingAccess::Read { target, request_id } => {
                    let range = target.address as usize..target.end() as usize;
                    let value = match memory.get(range) {
                        Some(bytes) => RegisterValue::new(bytes.to_vec()),
                        None => RegisterValue::invalid(),
                    };
                    self.completed_reads.push(MemoryReadResult {
                        target,
                        value,
                        request_id,
                    });
                }
                PendingAccess::Write { target, data } => {
                    let range = target.address as usize..target.end() as usize;
                    if let Some(slice) = memory.get_mut(range) {
                        slice.copy_from_slice(&data.as_bytes()[..target.size as usize]);
                    } else {
                        tracing::warn!(
                            address = target.address,
                            size = target.size,
                            "write outside process image dropped"
                        );
                    }
                }
            }
        }
    }
}
