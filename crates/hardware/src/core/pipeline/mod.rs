//! Pipeline stages and inter-stage plumbing of the out-of-order core.

/// Two-deep inter-stage buffer with stall bit.
pub mod buffer;
/// Decode: macro-op expansion and early misprediction checks.
pub mod decode;
/// Dispatch/issue: reservation stations, scoreboard, dependency matrix.
pub mod dispatch;
/// Execution units, one per issue port.
pub mod execute;
/// Fetch: block fetch, predecode, prediction application.
pub mod fetch;
/// Load/store queue: request issue, forwarding, violation detection.
pub mod lsq;
/// Issue port allocation policies.
pub mod port_allocator;
/// Rename: free-list allocation and alias table maintenance.
pub mod rename;
/// Reorder buffer: in-order commit and flush coordination.
pub mod rob;
/// Writeback: register file update and operand forwarding.
pub mod writeback;
