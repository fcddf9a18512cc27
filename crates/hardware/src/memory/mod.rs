//! Memory interfaces used by the fetch unit and the load/store queue.
//!
//! This module provides:
//! 1. **`MemoryInterface`:** The request/complete contract the core sees —
//!    byte-addressable reads and writes, drained completed reads, and a
//!    per-cycle `tick`.
//! 2. **Implementations:** `FlatMemoryInterface` (immediate),
//!    `FixedLatencyMemoryInterface`, and `SplitMemoryInterface` (a
//!    split-transaction adapter over a lower timing model that divides
//!    cache-line-straddling accesses into two child requests).
//! 3. **Lower-model protocol:** `MemoryPacket` request/response objects and
//!    the `LowerMemoryModel` trait, plus `SimpleLowerModel` for standalone
//!    runs.

use std::cell::RefCell;
use std::rc::Rc;

use crate::common::value::RegisterValue;

/// Immediate-completion interface backed by the process image.
pub mod flat;
/// Fixed-latency interface backed by the process image.
pub mod fixed;
/// Split-transaction adapter over a lower timing model.
pub mod split;

pub use fixed::FixedLatencyMemoryInterface;
pub use flat::FlatMemoryInterface;
pub use split::SplitMemoryInterface;

/// Shared handle to the guest process image.
///
/// The image backs every memory interface of a core; the simulator is
/// single-threaded, so interior mutability is sufficient.
pub type ProcessMemory = Rc<RefCell<Vec<u8>>>;

/// Creates a zero-filled process image of the given size.
pub fn new_process_memory(size: usize) -> ProcessMemory {
    Rc::new(RefCell::new(vec![0; size]))
}

/// A byte range a uop wishes to access.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoryAccessTarget {
    /// Start address of the access.
    pub address: u64,
    /// Access size in bytes.
    pub size: u16,
}

impl MemoryAccessTarget {
    /// Creates an access target.
    pub fn new(address: u64, size: u16) -> Self {
        Self { address, size }
    }

    /// Returns the first address past the end of the access.
    #[inline]
    pub fn end(&self) -> u64 {
        self.address + u64::from(self.size)
    }

    /// Returns true if this access overlaps `other`.
    pub fn overlaps(&self, other: &MemoryAccessTarget) -> bool {
        self.address < other.end() && other.address < self.end()
    }

    /// Returns true if this access fully contains `other`.
    pub fn contains(&self, other: &MemoryAccessTarget) -> bool {
        self.address <= other.address && other.end() <= self.end()
    }
}

/// A completed read, drained by the core each cycle.
#[derive(Clone, Debug)]
pub struct MemoryReadResult {
    /// The target of the originating request.
    pub target: MemoryAccessTarget,
    /// The data read; invalid (width 0) on an out-of-range access.
    pub value: RegisterValue,
    /// The requester-supplied identifier.
    pub request_id: u64,
}

/// The memory contract the core sees.
///
/// Reads complete asynchronously through `completed_reads`; writes succeed
/// silently. Responses handled between cycles become visible to the next
/// `tick`.
pub trait MemoryInterface {
    /// Enqueues a read of `target`, completing later with `request_id`.
    ///
    /// An out-of-range access immediately enqueues a completed read whose
    /// value is invalid.
    fn request_read(&mut self, target: MemoryAccessTarget, request_id: u64);

    /// Enqueues a write of `data` to `target`. No completion is reported.
    fn request_write(&mut self, target: MemoryAccessTarget, data: RegisterValue);

    /// Returns all reads completed since the last clear.
    fn completed_reads(&self) -> &[MemoryReadResult];

    /// Clears the completed-read queue.
    fn clear_completed_reads(&mut self);

    /// Returns true while any request is in flight.
    fn has_pending_requests(&self) -> bool;

    /// Advances internal timing by one cycle.
    fn tick(&mut self);
}

/// Command carried by a lower-model packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemoryCommand {
    /// Read request, downstream.
    Read,
    /// Write request, downstream.
    Write,
    /// Read response, upstream.
    ReadResp,
    /// Write response, upstream.
    WriteResp,
}

/// Request/response object exchanged with a lower memory model.
#[derive(Clone, Debug)]
pub struct MemoryPacket {
    /// Packet direction and kind.
    pub command: MemoryCommand,
    /// Access start address.
    pub address: u64,
    /// Access size in bytes.
    pub size: u16,
    /// Identifier correlating responses with requests.
    pub id: u64,
    /// Write payload or read response data.
    pub payload: Option<Vec<u8>>,
}

/// A lower timing model below the split interface.
///
/// Responses arrive asynchronously carrying the same `id` as the request.
pub trait LowerMemoryModel {
    /// Accepts a request packet.
    fn send(&mut self, packet: MemoryPacket);

    /// Advances one cycle and returns any responses that resolved.
    fn tick(&mut self) -> Vec<MemoryPacket>;

    /// Returns true while any request is being serviced.
    fn has_pending(&self) -> bool;
}

/// Fixed-latency lower model backed by the process image.
///
/// Services every request `latency` cycles after acceptance, in order.
pub struct SimpleLowerModel {
    memory: ProcessMemory,
    latency: u64,
    cycle: u64,
    in_flight: std::collections::VecDeque<(u64, MemoryPacket)>,
}

impl SimpleLowerModel {
    /// Creates a lower model over the given image with a fixed latency.
    pub fn new(memory: ProcessMemory, latency: u64) -> Self {
        Self {
            memory,
            latency,
            cycle: 0,
            in_flight: std::collections::VecDeque::new(),
        }
    }
}

impl LowerMemoryModel for SimpleLowerModel {
    fn send(&mut self, packet: MemoryPacket) {
        self.in_flight.push_back((self.cycle + self.latency, packet));
    }

    fn tick(&mut self) -> Vec<MemoryPacket> {
        self.cycle += 1;
        let mut responses = Vec::new();
        while let Some((due, _)) = self.in_flight.front() {
            if *due > self.cycle {
                break;
            }
            let (_, packet) = self.in_flight.pop_front().expect("checked front");
            let mut memory = self.memory.borrow_mut();
            let start = packet.address as usize;
            let end = start + packet.size as usize;
            match packet.command {
                MemoryCommand::Read => {
                    let data = memory.get(start..end).map(<[u8]>::to_vec).unwrap_or_default();
                    responses.push(MemoryPacket {
                        command: MemoryCommand::ReadResp,
                        address: packet.address,
                        size: packet.size,
                        id: packet.id,
                        payload: Some(data),
                    });
                }
                MemoryCommand::Write => {
                    if let (Some(slice), Some(payload)) =
                        (memory.get_mut(start..end), packet.payload.as_deref())
                    {
                        slice.copy_from_slice(payload);
                    }
                    responses.push(MemoryPacket {
                        command: MemoryCommand::WriteResp,
                        address: packet.address,
                        size: packet.size,
                        id: packet.id,
                        payload: None,
                    });
                }
                MemoryCommand::ReadResp | MemoryCommand::WriteResp => {}
            }
        }
        responses
    }

    fn has_pending(&self) -> bool {
        !self.in_flight.is_empty()
    }
}
