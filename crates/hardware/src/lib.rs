//! Cycle-accurate out-of-order CPU core simulator library.
//!
//! This crate implements a superscalar, out-of-order pipeline model for
//! microarchitectural research, with the following:
//! 1. **Core:** Fetch, decode, rename, dispatch/issue, execute, load/store
//!    queue, writeback, and in-order commit through a reorder buffer.
//! 2. **Renaming:** Physical register files, a register alias table with
//!    free list and rollback history, and a per-register scoreboard.
//! 3. **Memory:** Flat, fixed-latency, and split-transaction memory
//!    interfaces with cache-line-split request handling.
//! 4. **ISA:** A capability contract for guest instructions, with a bundled
//!    RV64IM implementation and a minimal guest syscall layer.
//! 5. **Simulation:** `Simulator` (owns the core and memory), ELF loader,
//!    configuration, and a statistics registry.

/// Common types (registers, register values, exceptions, setup errors).
pub mod common;
/// Simulator configuration (defaults, enums, hierarchical config structures).
pub mod config;
/// The out-of-order core: pipeline units, renaming machinery, predictors.
pub mod core;
/// Instruction set contract and the bundled RV64IM implementation.
pub mod isa;
/// Memory interfaces (flat, fixed-latency, split-transaction).
pub mod memory;
/// Simulation: `Simulator`, ELF loader, and guest process setup.
pub mod sim;
/// Statistics registry shared by all pipeline units.
pub mod stats;

/// Root configuration type; use `Config::default()` or deserialize from JSON.
pub use crate::config::Config;
/// The out-of-order core; construct with `Core::new`.
pub use crate::core::Core;
/// Top-level simulator; owns the core and its memory interfaces.
pub use crate::sim::simulator::Simulator;
