//! The out-of-order core.
//!
//! Owns every pipeline component and drives them one simulated cycle at a
//! time. Components tick in reverse program-flow order — commit first,
//! fetch last, memory interfaces after everything — so values propagate
//! exactly one stage per cycle through the inter-stage buffers, and
//! results forwarded during a tick are visible to every later component
//! in the same cycle.

use crate::common::error::ConfigError;
use crate::common::reg::RegisterFileSet;
use crate::config::{Config, SimulationMode};
use crate::isa::{Architecture, ExceptionContext, ExceptionHandler, ProcessInfo};
use crate::memory::{MemoryInterface, ProcessMemory};
use crate::stats::{SharedStats, StatId};

/// Branch prediction unit implementations.
pub mod bru;
/// Pipeline stages and inter-stage buffers.
pub mod pipeline;
/// Register alias table.
pub mod rat;
/// In-flight uop arena.
pub mod uop;

use bru::{BranchPredictor, BranchPredictorWrapper};
use pipeline::buffer::PipelineBuffer;
use pipeline::decode::DecodeUnit;
use pipeline::dispatch::DispatchIssueUnit;
use pipeline::execute::ExecuteUnit;
use pipeline::fetch::FetchUnit;
use pipeline::lsq::LoadStoreQueue;
use pipeline::rename::RenameUnit;
use pipeline::rob::ReorderBuffer;
use pipeline::writeback::WritebackUnit;
use rat::RegisterAliasTable;
use uop::{MacroOp, UopArena, UopId};

/// The out-of-order core: all pipeline state plus its memory interfaces.
pub struct Core {
    arena: UopArena,
    register_files: RegisterFileSet,
    rat: RegisterAliasTable,
    predictor: BranchPredictorWrapper,
    architecture: Box<dyn Architecture>,

    fetch: FetchUnit,
    decode: DecodeUnit,
    rename: RenameUnit,
    dispatch: DispatchIssueUnit,
    execution_units: Vec<ExecuteUnit>,
    lsq: LoadStoreQueue,
    writeback: WritebackUnit,
    rob: ReorderBuffer,

    fetch_to_decode: PipelineBuffer<MacroOp>,
    decode_to_rename: PipelineBuffer<Option<UopId>>,
    rename_to_dispatch: PipelineBuffer<Option<UopId>>,
    issue_ports: Vec<PipelineBuffer<Option<UopId>>>,
    /// One buffer per execution unit plus a wider one for the LSQ.
    completion_slots: Vec<PipelineBuffer<Option<UopId>>>,

    instruction_memory: Box<dyn MemoryInterface>,
    data_memory: Box<dyn MemoryInterface>,
    process_memory: ProcessMemory,

    exception_handler: Option<Box<dyn ExceptionHandler>>,
    commit_width: usize,
    cycle: u64,
    halted: bool,
    exit_code: Option<u64>,
    stats: SharedStats,
    cycles_stat: StatId,
    flushes_stat: StatId,
}

impl Core {
    /// Creates a core over the given architecture and memory interfaces.
    ///
    /// Fails before any tick on an invalid configuration or a simulation
    /// mode this core does not implement.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &Config,
        architecture: Box<dyn Architecture>,
        instruction_memory: Box<dyn MemoryInterface>,
        data_memory: Box<dyn MemoryInterface>,
        process_memory: ProcessMemory,
        process: ProcessInfo,
        stats: SharedStats,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        if config.core.simulation_mode != SimulationMode::OutOfOrder {
            return Err(ConfigError::UnsupportedMode(format!(
                "{:?}",
                config.core.simulation_mode
            )));
        }

        let structure = architecture.register_file_structure();
        let physical_counts: Vec<usize> = structure.iter().map(|s| s.quantity).collect();
        let architectural_counts = architecture.architectural_register_counts();

        let register_files = RegisterFileSet::new(&structure);
        let rat = RegisterAliasTable::new(&architectural_counts, &physical_counts);

        let width = config.pipeline_widths.front_end;
        let port_count = config.ports.len();
        let issue_ports = (0..port_count).map(|_| PipelineBuffer::new(1)).collect();
        let mut completion_slots: Vec<PipelineBuffer<Option<UopId>>> =
            (0..port_count).map(|_| PipelineBuffer::new(1)).collect();
        completion_slots.push(PipelineBuffer::new(config.pipeline_widths.lsq_completion));

        let mut registry = stats.borrow_mut();
        let cycles_stat = registry.register_stat("core.cycles");
        let flushes_stat = registry.register_stat("core.flushes");
        drop(registry);

        let mut core = Self {
            arena: UopArena::new(),
            register_files,
            rat,
            predictor: BranchPredictorWrapper::new(config),
            architecture,
            fetch: FetchUnit::new(process.entry_point, config.fetch.block_size),
            decode: DecodeUnit::new(stats.clone()),
            rename: RenameUnit::new(stats.clone()),
            dispatch: DispatchIssueUnit::new(config, &physical_counts, stats.clone()),
            execution_units: (0..port_count as u16).map(ExecuteUnit::new).collect(),
            lsq: LoadStoreQueue::new(config, stats.clone()),
            writeback: WritebackUnit::new(stats.clone()),
            rob: ReorderBuffer::new(config.queues.rob, stats.clone()),
            fetch_to_decode: PipelineBuffer::new(width),
            decode_to_rename: PipelineBuffer::new(width),
            rename_to_dispatch: PipelineBuffer::new(width),
            issue_ports,
            completion_slots,
            instruction_memory,
            data_memory,
            process_memory,
            exception_handler: None,
            commit_width: config.pipeline_widths.commit,
            cycle: 0,
            halted: false,
            exit_code: None,
            stats,
            cycles_stat,
            flushes_stat,
        };

        let initial_state = core.architecture.initial_process_state(&process);
        core.apply_state_change(&initial_state);
        Ok(core)
    }

    /// Returns true once the guest has exited or faulted fatally.
    pub fn has_halted(&self) -> bool {
        self.halted
    }

    /// Returns the guest exit code, if the guest exited.
    pub fn exit_code(&self) -> Option<u64> {
        self.exit_code
    }

    /// Returns the current fetch program counter.
    pub fn program_counter(&self) -> u64 {
        self.fetch.program_counter()
    }

    /// Returns the data memory interface.
    pub fn data_memory(&self) -> &dyn MemoryInterface {
        self.data_memory.as_ref()
    }

    /// Returns the shared statistics registry.
    pub fn stats(&self) -> SharedStats {
        self.stats.clone()
    }

    /// Advances the core by one cycle.
    pub fn tick(&mut self) {
        if self.halted {
            // Only in-flight memory drains after a halt.
            self.instruction_memory.tick();
            self.data_memory.tick();
            return;
        }

        self.cycle += 1;
        self.stats.borrow_mut().increment(self.cycles_stat, 1);

        if self.exception_handler.is_some() {
            self.tick_exception_handler();
            self.instruction_memory.tick();
            self.data_memory.tick();
            return;
        }

        // Commit first: retire from the ROB head in program order.
        self.rob.commit(
            self.commit_width,
            &mut self.arena,
            &mut self.rat,
            &mut self.lsq,
            &mut self.predictor,
            self.data_memory.as_mut(),
        );
        if let Some(id) = self.rob.take_exception() {
            self.start_exception_handler(id);
            self.instruction_memory.tick();
            self.data_memory.tick();
            return;
        }

        self.writeback.tick(
            &mut self.completion_slots,
            &mut self.arena,
            &mut self.register_files,
            &mut self.dispatch,
        );

        for (port, unit) in self.execution_units.iter_mut().enumerate() {
            unit.tick(
                &mut self.issue_ports[port],
                &mut self.completion_slots[port],
                &mut self.arena,
                &mut self.lsq,
                self.cycle,
            );
        }

        let lsq_slot = self.completion_slots.len() - 1;
        self.lsq.tick(
            &mut self.arena,
            self.data_memory.as_mut(),
            &mut self.completion_slots[lsq_slot],
            self.cycle,
        );

        self.dispatch.issue(&self.arena, &mut self.issue_ports);
        self.dispatch.tick(
            &mut self.rename_to_dispatch,
            &mut self.arena,
            &self.register_files,
        );

        self.rename.tick(
            &mut self.decode_to_rename,
            &mut self.rename_to_dispatch,
            &mut self.rat,
            &mut self.rob,
            &mut self.lsq,
            &mut self.arena,
        );

        self.decode.tick(
            &mut self.fetch_to_decode,
            &mut self.decode_to_rename,
            &mut self.predictor,
            &mut self.arena,
        );

        self.fetch.tick(
            &mut self.fetch_to_decode,
            self.instruction_memory.as_mut(),
            &mut self.predictor,
            &mut self.arena,
            self.architecture.as_ref(),
        );

        self.handle_flush();

        self.fetch_to_decode.tick();
        self.decode_to_rename.tick();
        self.rename_to_dispatch.tick();
        for buffer in &mut self.issue_ports {
            buffer.tick();
        }
        for buffer in &mut self.completion_slots {
            buffer.tick();
        }

        self.instruction_memory.tick();
        self.data_memory.tick();
    }

    /// Resolves at most one flush per cycle, oldest trigger first.
    fn handle_flush(&mut self) {
        // Candidate triggers: a memory-order violation found at commit, or
        // a branch misprediction resolved at execute. The oldest wins;
        // `None` (flush everything) is oldest of all.
        let mut candidate: Option<(Option<(u64, u64)>, u64)> = self.lsq.take_flush();
        for unit in &self.execution_units {
            if !unit.should_flush() {
                continue;
            }
            let after = Some(unit.flush_after());
            let newer = match &candidate {
                Some((existing, _)) => match (existing, &after) {
                    (None, _) => true,
                    (Some(a), Some(b)) => b >= a,
                    (Some(_), None) => false,
                },
                None => false,
            };
            if !newer {
                candidate = Some((after, unit.flush_address()));
            }
        }

        if let Some((after, address)) = candidate {
            self.flush_pipeline(after, address);
            self.stats.borrow_mut().increment(self.flushes_stat, 1);
        } else if self.decode.should_flush() {
            // Early misprediction from decode: the wrong-path uops are
            // confined to fetch and decode.
            self.fetch.update_pc(self.decode.flush_address());
            Self::release_macro_buffer(&mut self.fetch_to_decode, &mut self.arena);
            self.stats.borrow_mut().increment(self.flushes_stat, 1);
        }
    }

    /// Flushes everything strictly younger than `after`, redirecting fetch
    /// to `address`. `None` flushes every in-flight uop.
    fn flush_pipeline(&mut self, after: Option<(u64, u64)>, address: u64) {
        let flushed = self.rob.flush(after, &mut self.arena, &mut self.rat);

        self.fetch.update_pc(address);
        Self::release_macro_buffer(&mut self.fetch_to_decode, &mut self.arena);
        self.decode.purge_flushed(&mut self.arena);
        Self::release_uop_buffer(&mut self.decode_to_rename, &mut self.arena);
        Self::purge_uop_buffer(&mut self.rename_to_dispatch, &self.arena);
        for buffer in &mut self.issue_ports {
            Self::purge_uop_buffer(buffer, &self.arena);
        }
        for buffer in &mut self.completion_slots {
            Self::purge_uop_buffer(buffer, &self.arena);
        }
        for unit in &mut self.execution_units {
            unit.purge_flushed(&self.arena);
        }
        self.dispatch.purge_flushed(&self.arena);
        self.lsq.purge_flushed(&self.arena);
        self.predictor.flush(address);

        for id in flushed {
            self.arena.release(id);
        }
        tracing::debug!(target = address, "pipeline flush");
    }

    /// Empties a macro-op buffer, destroying its uops. Used for wrong-path
    /// uops that never reached rename.
    fn release_macro_buffer(buffer: &mut PipelineBuffer<MacroOp>, arena: &mut UopArena) {
        for slot in buffer.head_slots_mut() {
            for id in std::mem::take(slot) {
                arena.release(id);
            }
        }
        for slot in buffer.tail_slots_mut() {
            for id in std::mem::take(slot) {
                arena.release(id);
            }
        }
        buffer.empty();
    }

    /// Empties a uop buffer, destroying its uops. Used for wrong-path uops
    /// that never reached rename.
    fn release_uop_buffer(buffer: &mut PipelineBuffer<Option<UopId>>, arena: &mut UopArena) {
        for slot in buffer.head_slots_mut() {
            if let Some(id) = slot.take() {
                arena.release(id);
            }
        }
        for slot in buffer.tail_slots_mut() {
            if let Some(id) = slot.take() {
                arena.release(id);
            }
        }
        buffer.empty();
    }

    /// Drops flushed handles from a uop buffer whose lifecycle owner is
    /// the reorder buffer.
    fn purge_uop_buffer(buffer: &mut PipelineBuffer<Option<UopId>>, arena: &UopArena) {
        for slot in buffer.head_slots_mut() {
            if slot.is_some_and(|id| arena.is_flushed(id)) {
                *slot = None;
            }
        }
        for slot in buffer.tail_slots_mut() {
            if slot.is_some_and(|id| arena.is_flushed(id)) {
                *slot = None;
            }
        }
        buffer.stall(false);
    }

    /// Creates the ISA handler for the exception at the ROB head.
    fn start_exception_handler(&mut self, id: UopId) {
        let memory = self.process_memory.borrow();
        let context = ExceptionContext::new(&self.rat, &self.register_files, &memory);
        let handler = self
            .architecture
            .handle_exception(self.arena.get(id).op.as_ref(), &context);
        drop(memory);
        self.exception_handler = Some(handler);
        let uop = self.arena.get(id);
        tracing::debug!(
            address = uop.op.address(),
            exception = %uop.op.exception().expect("exception uop"),
            "exception raised at commit"
        );
    }

    /// Ticks the active exception handler; on completion, applies its
    /// state change, flushes the pipeline, and resumes (or halts).
    fn tick_exception_handler(&mut self) {
        let Some(handler) = self.exception_handler.as_mut() else {
            return;
        };
        if !handler.tick() {
            return;
        }
        let result = handler.result();
        self.exception_handler = None;

        if result.fatal {
            tracing::error!("fatal exception; halting core");
            self.halted = true;
            return;
        }

        // The faulting uop and everything younger leave the pipeline; its
        // architectural effects arrive through the state change below.
        self.flush_pipeline(None, result.instruction_address);
        self.apply_state_change(&result.state_change);
        self.rob.record_exception_commit();

        if let Some(code) = result.exit {
            self.exit_code = Some(code);
            self.halted = true;
        }
    }

    /// Applies architectural state changes through the alias table.
    fn apply_state_change(&mut self, change: &crate::isa::ProcessStateChange) {
        for (reg, value) in &change.register_writes {
            let physical = self.rat.mapping(*reg);
            self.register_files.set(physical, value.clone());
            self.dispatch.set_register_ready(physical);
        }
        for (target, data) in &change.memory_writes {
            self.data_memory.request_write(*target, data.clone());
        }
    }
}
