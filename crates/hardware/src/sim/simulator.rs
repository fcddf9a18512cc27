//! Top-level simulator.
//!
//! Owns the core, its memory interfaces, and the statistics registry, and
//! implements the driver contract: tick until the core halts and no data
//! memory request remains in flight. Memory interfaces are selected from
//! configuration; the instruction path always uses the flat interface.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use crate::config::{Config, MemoryInterfaceKind};
use crate::core::Core;
use crate::isa::ProcessInfo;
use crate::isa::rv64::Rv64Architecture;
use crate::memory::{
    FixedLatencyMemoryInterface, FlatMemoryInterface, MemoryInterface, ProcessMemory,
    SimpleLowerModel, SplitMemoryInterface,
};
use crate::sim::{SimulatorError, loader};
use crate::stats::{SharedStats, Statistics};

/// The top-level simulator: core, memory, and statistics.
pub struct Simulator {
    core: Core,
    stats: SharedStats,
    clock_frequency: f64,
}

impl Simulator {
    /// Creates a simulator running the ELF executable at `path`.
    pub fn from_elf(config: &Config, path: &Path) -> Result<Self, SimulatorError> {
        let (image, info) = loader::load_elf(path, config.memory.process_image_size)?;
        Self::build(config, image, info)
    }

    /// Creates a simulator over directly assembled instruction words.
    pub fn from_encodings(
        config: &Config,
        encodings: &[u32],
        load_address: u64,
    ) -> Result<Self, SimulatorError> {
        let (image, info) =
            loader::load_encodings(encodings, load_address, config.memory.process_image_size);
        Self::build(config, image, info)
    }

    fn build(config: &Config, image: Vec<u8>, info: ProcessInfo) -> Result<Self, SimulatorError> {
        let process_memory: ProcessMemory = Rc::new(RefCell::new(image));
        let stats = Statistics::new_shared();

        let instruction_memory = Box::new(FlatMemoryInterface::new(process_memory.clone()));
        let data_memory: Box<dyn MemoryInterface> = match config.memory.interface {
            MemoryInterfaceKind::Flat => {
                Box::new(FlatMemoryInterface::new(process_memory.clone()))
            }
            MemoryInterfaceKind::FixedLatency => Box::new(FixedLatencyMemoryInterface::new(
                process_memory.clone(),
                config.memory.access_latency,
            )),
            MemoryInterfaceKind::Split => Box::new(SplitMemoryInterface::new(
                Box::new(SimpleLowerModel::new(
                    process_memory.clone(),
                    config.memory.access_latency,
                )),
                info.image_size,
                config.memory.cache_line_width,
            )),
        };

        let architecture = Box::new(Rv64Architecture::new(config)?);
        let core = Core::new(
            config,
            architecture,
            instruction_memory,
            data_memory,
            process_memory,
            info,
            stats.clone(),
        )?;

        Ok(Self {
            core,
            stats,
            clock_frequency: config.core.clock_frequency,
        })
    }

    /// Returns the core.
    pub fn core(&self) -> &Core {
        &self.core
    }

    /// Returns the shared statistics registry.
    pub fn stats(&self) -> SharedStats {
        self.stats.clone()
    }

    /// Advances the simulation one cycle.
    pub fn tick(&mut self) {
        self.core.tick();
    }

    /// Runs until the guest halts and memory quiesces, or `max_cycles`
    /// elapse. Returns true if the guest halted.
    pub fn run_for(&mut self, max_cycles: u64) -> bool {
        for _ in 0..max_cycles {
            if self.core.has_halted() && !self.core.data_memory().has_pending_requests() {
                return true;
            }
            self.core.tick();
        }
        self.core.has_halted()
    }

    /// Runs to completion and returns the guest exit code.
    pub fn run(&mut self) -> Option<u64> {
        while !self.core.has_halted() || self.core.data_memory().has_pending_requests() {
            self.core.tick();
        }
        self.core.exit_code()
    }

    /// Prints the full statistics banner.
    pub fn print_stats(&self) {
        self.stats.borrow().print(self.clock_frequency);
    }

    /// Prints only the requested statistics sections; empty prints all.
    pub fn print_stats_sections(&self, sections: &[String]) {
        self.stats
            .borrow()
            .print_sections(self.clock_frequency, sections);
    }
}
