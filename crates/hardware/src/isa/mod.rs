//! Instruction set contract between the core and a guest ISA.
//!
//! The core never sees concrete instruction semantics; it drives uops
//! exclusively through the capability traits defined here:
//! 1. **`Instruction`:** A decoded micro-operation — registers, renaming,
//!    operand supply, execution, memory address generation, and branch
//!    resolution.
//! 2. **`Architecture`:** Predecode of raw bytes into macro-ops, register
//!    file structure, initial process state, and exception handling.
//! 3. **`ExceptionHandler`:** A small state machine ticked until done,
//!    producing a [`ProcessStateChange`] applied at commit.
//!
//! The bundled RV64IM implementation lives in [`rv64`].

use crate::common::error::InstructionException;
use crate::common::reg::{Register, RegisterFileSet, RegisterFileStructure};
use crate::common::value::RegisterValue;
use crate::core::rat::RegisterAliasTable;
use crate::memory::MemoryAccessTarget;

/// Bundled RV64IM guest ISA.
pub mod rv64;

/// Register file selectors used by `Register::reg_type`.
pub mod register_type {
    /// General-purpose registers.
    pub const GENERAL: u8 = 0;
    /// Vector registers.
    pub const VECTOR: u8 = 1;
    /// Predicate registers.
    pub const PREDICATE: u8 = 2;
    /// System registers.
    pub const SYSTEM: u8 = 3;
}

/// A branch prediction attached to a uop at fetch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BranchPrediction {
    /// Whether the branch was predicted taken.
    pub taken: bool,
    /// Predicted target address, meaningful when `taken`.
    pub target: u64,
}

impl BranchPrediction {
    /// The not-taken prediction.
    pub fn not_taken() -> Self {
        Self {
            taken: false,
            target: 0,
        }
    }
}

/// Result of predecoding one architectural instruction.
pub struct PredecodedMacroOp {
    /// Bytes consumed from the fetch stream; zero means more bytes are
    /// needed before this address can be predecoded.
    pub bytes_consumed: usize,
    /// The uops of the macro-op, in program order.
    pub uops: Vec<Box<dyn Instruction>>,
}

/// A decoded micro-operation: the unit flowing through the pipeline.
///
/// Implementations are ISA-specific. Identity, prediction, and lifecycle
/// state (flushed, executed, commit-ready) are owned by the core's uop
/// arena, not by implementations of this trait.
pub trait Instruction {
    /// Returns the address of the instruction this uop came from.
    fn address(&self) -> u64;

    /// Returns the first exception recorded on this uop, if any.
    fn exception(&self) -> Option<InstructionException>;

    /// Returns the source registers this uop reads.
    fn source_registers(&self) -> &[Register];

    /// Returns the destination registers this uop writes.
    fn destination_registers(&self) -> &[Register];

    /// Replaces destination and source registers with physical tags.
    ///
    /// Called exactly once, at rename. Zero registers are passed through
    /// unchanged.
    fn rename(&mut self, destinations: &[Register], sources: &[Register]);

    /// Supplies a value for the source operand at `index`.
    fn supply_operand(&mut self, index: usize, value: RegisterValue);

    /// Returns true if the operand at `index` has been supplied.
    fn is_operand_ready(&self, index: usize) -> bool;

    /// Returns true once every operand value has been supplied.
    fn can_execute(&self) -> bool;

    /// Executes the uop over its supplied operands (and memory data, for
    /// loads). Records results, branch outcome, and any exception.
    fn execute(&mut self);

    /// Returns the results to write, parallel to `destination_registers`.
    fn results(&self) -> &[RegisterValue];

    /// Computes the memory addresses this uop accesses, from its operands.
    fn generate_addresses(&mut self);

    /// Returns previously generated memory access targets.
    fn generated_addresses(&self) -> &[MemoryAccessTarget];

    /// Supplies memory data for the generated target at `address`.
    ///
    /// An invalid value records a page-fault exception on the uop.
    fn supply_data(&mut self, address: u64, data: RegisterValue);

    /// Returns true once data for every generated address has arrived.
    fn has_all_data(&self) -> bool;

    /// Returns the data to store, parallel to `generated_addresses`.
    fn data(&self) -> &[RegisterValue];

    /// Checks for a misprediction discoverable at decode.
    ///
    /// Returns `(mispredicted, correct_address)`; meaningful for uops with
    /// a deterministic next address (non-branches and direct unconditional
    /// branches).
    fn check_early_branch_misprediction(&self, prediction: BranchPrediction) -> (bool, u64);

    /// Returns the resolved branch direction; valid after execution.
    fn branch_taken(&self) -> bool;

    /// Returns the resolved next instruction address; valid after execution.
    fn branch_address(&self) -> u64;

    /// Returns true if this uop performs a memory read.
    fn is_load(&self) -> bool;

    /// Returns true if this uop performs a memory write.
    fn is_store(&self) -> bool;

    /// Returns true if this uop resolves a branch.
    fn is_branch(&self) -> bool;

    /// Returns true if this uop is part of a multi-uop macro-op.
    fn is_micro_op(&self) -> bool {
        false
    }

    /// Returns true if this uop ends its macro-op group.
    fn is_last_micro_op(&self) -> bool {
        true
    }

    /// Returns the issue ports able to execute this uop.
    fn supported_ports(&self) -> &[u16];

    /// Returns the execution latency in cycles.
    fn latency(&self) -> u16 {
        1
    }

    /// Returns the load/store queue processing latency in cycles.
    fn lsq_latency(&self) -> u16 {
        1
    }
}

/// Architectural state changes produced by an exception handler.
///
/// Registers are architectural; the core maps them through the alias table
/// when applying the change.
#[derive(Clone, Debug, Default)]
pub struct ProcessStateChange {
    /// Architectural register writes to apply.
    pub register_writes: Vec<(Register, RegisterValue)>,
    /// Memory writes to apply.
    pub memory_writes: Vec<(MemoryAccessTarget, RegisterValue)>,
}

/// Outcome of exception handling.
#[derive(Clone, Debug)]
pub struct ExceptionResult {
    /// True if the exception is unrecoverable; the core halts.
    pub fatal: bool,
    /// Guest exit code, if the guest requested termination.
    pub exit: Option<u64>,
    /// Address at which to resume fetching.
    pub instruction_address: u64,
    /// Architectural state changes to apply before resuming.
    pub state_change: ProcessStateChange,
}

/// An in-progress exception handling operation.
///
/// Ticked by the core once per cycle until done; exception handling is a
/// state machine, never stack unwinding.
pub trait ExceptionHandler {
    /// Advances the handler one cycle. Returns true when complete.
    fn tick(&mut self) -> bool;

    /// Returns the outcome. Only valid after `tick` has returned true.
    fn result(&self) -> ExceptionResult;
}

/// Read-only view of committed architectural state, for exception handling.
pub struct ExceptionContext<'a> {
    rat: &'a RegisterAliasTable,
    register_files: &'a RegisterFileSet,
    memory: &'a [u8],
}

impl<'a> ExceptionContext<'a> {
    /// Creates a context over the core's committed state.
    pub fn new(
        rat: &'a RegisterAliasTable,
        register_files: &'a RegisterFileSet,
        memory: &'a [u8],
    ) -> Self {
        Self {
            rat,
            register_files,
            memory,
        }
    }

    /// Reads an architectural register through the current alias mapping.
    pub fn read_register(&self, reg: Register) -> RegisterValue {
        if reg.is_zero() {
            return self.register_files.get(reg);
        }
        self.register_files.get(self.rat.mapping(reg))
    }

    /// Reads guest memory, truncated at the image boundary.
    pub fn read_memory(&self, address: u64, length: usize) -> &[u8] {
        let start = (address as usize).min(self.memory.len());
        let end = (start + length).min(self.memory.len());
        &self.memory[start..end]
    }
}

/// Description of a loaded guest process, for initial state setup.
#[derive(Clone, Copy, Debug)]
pub struct ProcessInfo {
    /// Program entry point.
    pub entry_point: u64,
    /// Initial stack pointer.
    pub stack_pointer: u64,
    /// Start of the heap region (initial program break).
    pub heap_start: u64,
    /// Total process image size in bytes.
    pub image_size: u64,
}

/// A guest instruction set: predecode, state setup, exception handling.
pub trait Architecture {
    /// Predecodes the instruction at `address` from `bytes` into a
    /// macro-op. Undecodable encodings yield a uop carrying a decode
    /// exception; `bytes_consumed == 0` asks fetch for more bytes.
    fn predecode(&self, bytes: &[u8], address: u64) -> PredecodedMacroOp;

    /// Produces the uop emitted when instruction memory faults at
    /// `address`.
    fn fetch_fault(&self, address: u64) -> Box<dyn Instruction>;

    /// Returns the physical register file shapes, indexed by register type.
    fn register_file_structure(&self) -> Vec<RegisterFileStructure>;

    /// Returns the architectural register counts, indexed by register type.
    fn architectural_register_counts(&self) -> Vec<usize>;

    /// Creates a handler for the exception recorded on `uop`.
    fn handle_exception(
        &self,
        uop: &dyn Instruction,
        context: &ExceptionContext<'_>,
    ) -> Box<dyn ExceptionHandler>;

    /// Returns the state changes establishing the initial process state.
    fn initial_process_state(&self, process: &ProcessInfo) -> ProcessStateChange;
}
