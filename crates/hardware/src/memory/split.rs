//! Split-transaction memory interface.
//!
//! Adapts the core's byte-addressable contract onto a lower timing model
//! that services cache-line-sized transfers. An access that straddles a
//! cache line is issued as two child requests; a join record is kept under
//! each child id, and the two responses are merged — keyed by each child's
//! target address, so either arrival order produces the same bytes. Write
//! children complete independently and keep no join state.

use std::collections::HashMap;

use crate::common::value::RegisterValue;
use crate::memory::{
    LowerMemoryModel, MemoryAccessTarget, MemoryCommand, MemoryInterface, MemoryPacket,
    MemoryReadResult,
};

/// Join record for one child of an in-flight read.
struct ReadRecord {
    /// The original full-width target.
    target: MemoryAccessTarget,
    /// The requester-supplied identifier for the completed read.
    request_id: u64,
    /// Address of this child's half of the access.
    child_address: u64,
    /// Child id of the partner half, if the access was split.
    partner_id: Option<u64>,
    /// Bytes of the partner's half, stashed when it resolved first.
    split_data: Option<Vec<u8>>,
    /// Whether the partner's response has already been handled.
    partner_handled: bool,
}

/// Split-transaction interface over a lower timing model.
pub struct SplitMemoryInterface {
    lower: Box<dyn LowerMemoryModel>,
    memory_size: u64,
    cache_line_width: u64,
    next_child_id: u64,
    pending_reads: HashMap<u64, ReadRecord>,
    pending_writes: std::collections::HashSet<u64>,
    completed_reads: Vec<MemoryReadResult>,
}

impl SplitMemoryInterface {
    /// Creates a split interface.
    ///
    /// `memory_size` bounds the guest-visible address space; reads beyond
    /// it complete immediately with an invalid value.
    pub fn new(lower: Box<dyn LowerMemoryModel>, memory_size: u64, cache_line_width: u64) -> Self {
        debug_assert!(cache_line_width.is_power_of_two());
        Self {
            lower,
            memory_size,
            cache_line_width,
            next_child_id: 0,
            pending_reads: HashMap::new(),
            pending_writes: std::collections::HashSet::new(),
            completed_reads: Vec::new(),
        }
    }

    fn send_child(&mut self, command: MemoryCommand, address: u64, size: u16, payload: Option<Vec<u8>>) -> u64 {
        let id = self.next_child_id;
        self.next_child_id += 1;
        self.lower.send(MemoryPacket {
            command,
            address,
            size,
            id,
            payload,
        });
        id
    }

    /// Splits `target` at the cache line boundary it straddles, if any.
    fn split_sizes(&self, target: &MemoryAccessTarget) -> Option<(u16, u16)> {
        let offset = target.address % self.cache_line_width;
        if offset + u64::from(target.size) > self.cache_line_width {
            let first = (self.cache_line_width - offset) as u16;
            Some((first, target.size - first))
        } else {
            None
        }
    }

    /// Handles a response from the lower model.
    ///
    /// May also be invoked by an external driver between cycles; responses
    /// become visible to the core on its next tick.
    pub fn handle_response(&mut self, read: bool, id: u64, data: Vec<u8>) {
        if !read {
            self.pending_writes.remove(&id);
            return;
        }

        let Some(record) = self.pending_reads.get_mut(&id) else {
            tracing::warn!(id, "read response with no pending record dropped");
            return;
        };

        let Some(partner_id) = record.partner_id else {
            let result = MemoryReadResult {
                target: record.target,
                value: RegisterValue::new(data),
                request_id: record.request_id,
            };
            self.completed_reads.push(result);
            self.pending_reads.remove(&id);
            return;
        };

        if record.partner_handled {
            // Both halves have resolved; the lower-address child holds the
            // low bytes of the merged value.
            let low_first = record.child_address == record.target.address;
            let partner_data = record.split_data.take().unwrap_or_default();
            let mut merged = Vec::with_capacity(record.target.size as usize);
            if low_first {
                merged.extend_from_slice(&data);
                merged.extend_from_slice(&partner_data);
            } else {
                merged.extend_from_slice(&partner_data);
                merged.extend_from_slice(&data);
            }
            let result = MemoryReadResult {
                target: record.target,
                value: RegisterValue::new(merged),
                request_id: record.request_id,
            };
            self.completed_reads.push(result);
            self.pending_reads.remove(&id);
            self.pending_reads.remove(&partner_id);
        } else if let Some(partner) = self.pending_reads.get_mut(&partner_id) {
            partner.split_data = Some(data);
            partner.partner_handled = true;
        }
    }
}

impl MemoryInterface for SplitMemoryInterface {
    fn request_read(&mut self, target: MemoryAccessTarget, request_id: u64) {
        if target.end() > self.memory_size {
            // Out of range; signal a fault with an invalid value.
            self.completed_reads.push(MemoryReadResult {
                target,
                value: RegisterValue::invalid(),
                request_id,
            });
            return;
        }

        match self.split_sizes(&target) {
            Some((first_size, second_size)) => {
                let second_address = target.address + u64::from(first_size);
                let id1 = self.send_child(MemoryCommand::Read, target.address, first_size, None);
                let id2 = self.send_child(MemoryCommand::Read, second_address, second_size, None);
                self.pending_reads.insert(
                    id1,
                    ReadRecord {
                        target,
                        request_id,
                        child_address: target.address,
                        partner_id: Some(id2),
                        split_data: None,
                        partner_handled: false,
                    },
                );
                self.pending_reads.insert(
                    id2,
                    ReadRecord {
                        target,
                        request_id,
                        child_address: second_address,
                        partner_id: Some(id1),
                        split_data: None,
                        partner_handled: false,
                    },
                );
            }
            None => {
                let id = self.send_child(MemoryCommand::Read, target.address, target.size, None);
                self.pending_reads.insert(
                    id,
                    ReadRecord {
                        target,
                        request_id,
                        child_address: target.address,
                        partner_id: None,
                        split_data: None,
                        partner_handled: false,
                    },
                );
            }
        }
    }

    fn request_write(&mut self, target: MemoryAccessTarget, data: RegisterValue) {
        if target.end() > self.memory_size {
            tracing::warn!(
                address = target.address,
                size = target.size,
                "write outside guest memory dropped"
            );
            return;
        }

        let bytes = data.as_bytes();
        match self.split_sizes(&target) {
            Some((first_size, second_size)) => {
                let second_address = target.address + u64::from(first_size);
                let id1 = self.send_child(
                    MemoryCommand::Write,
                    target.address,
                    first_size,
                    Some(bytes[..first_size as usize].to_vec()),
                );
                let id2 = self.send_child(
                    MemoryCommand::Write,
                    second_address,
                    second_size,
                    Some(bytes[first_size as usize..target.size as usize].to_vec()),
                );
                self.pending_writes.insert(id1);
                self.pending_writes.insert(id2);
            }
            None => {
                let id = self.send_child(
                    MemoryCommand::Write,
                    target.address,
                    target.size,
                    Some(bytes[..target.size as usize].to_vec()),
                );
                self.pending_writes.insert(id);
            }
        }
    }

    fn completed_reads(&self) -> &[MemoryReadResult] {
        &self.completed_reads
    }

    fn clear_completed_reads(&mut self) {
        self.completed_reads.clear();
    }

    fn has_pending_requests(&self) -> bool {
        !self.pending_reads.is_empty()
            || !self.pending_writes.is_empty()
            || self.lower.has_pending()
    }

    fn tick(&mut self) {
        for response in self.lower.tick() {
            match response.command {
                MemoryCommand::ReadResp => {
                    self.handle_response(true, response.id, response.payload.unwrap_or_default());
                }
                MemoryCommand::WriteResp => {
                    self.handle_response(false, response.id, Vec::new());
                }
                MemoryCommand::Read | MemoryCommand::Write => {}
            }
        }
    }
}
