//! Configuration system for the simulator.
//!
//! This module defines all configuration structures and enums used to
//! parameterize the core. It provides:
//! 1. **Defaults:** Baseline hardware constants (widths, queue sizes,
//!    predictor and memory parameters).
//! 2. **Structures:** Hierarchical config for the core, ports, reservation
//!    stations, queues, registers, fetch, and memory.
//! 3. **Validation:** Topology checks that fail fatally before any tick.
//!
//! Configuration documents are JSON deserialized once into plain structs;
//! the field aliases mirror the document key names (`Core.Simulation-Mode`,
//! `Reservation-Stations[].Dispatch-Rate`, ...). Use `Config::default()`
//! when no document is supplied.

use serde::Deserialize;

use crate::common::error::ConfigError;

/// Default configuration constants for the simulator.
///
/// These values define the baseline core when not explicitly overridden in
/// a configuration document.
mod defaults {
    /// Core clock frequency in GHz.
    pub const CLOCK_FREQUENCY_GHZ: f64 = 2.5;

    /// Guest timer frequency in MHz.
    pub const TIMER_FREQUENCY_MHZ: f64 = 100.0;

    /// Branch target buffer index width in bits (2^12 = 4096 entries).
    pub const BTB_BITS: usize = 12;

    /// Front-end pipeline width (slots per inter-stage buffer).
    pub const FRONT_END_WIDTH: usize = 4;

    /// Instructions committed per cycle at most.
    pub const COMMIT_WIDTH: usize = 4;

    /// Load results the LSQ may hand to writeback per cycle.
    pub const LSQ_COMPLETION_SLOTS: usize = 2;

    /// Reorder buffer capacity.
    pub const ROB_SIZE: usize = 128;

    /// Load queue capacity.
    pub const LOAD_QUEUE_SIZE: usize = 32;

    /// Store queue capacity.
    pub const STORE_QUEUE_SIZE: usize = 24;

    /// Physical general-purpose register count.
    pub const GENERAL_PURPOSE_COUNT: usize = 96;

    /// Fetch block size in bytes.
    pub const FETCH_BLOCK_SIZE: usize = 16;

    /// Data memory access latency in cycles (fixed-latency interface).
    pub const ACCESS_LATENCY: u64 = 4;

    /// Cache line width in bytes; requests straddling a line split.
    pub const CACHE_LINE_WIDTH: u64 = 64;

    /// Guest process image size in bytes (32 MiB).
    pub const PROCESS_IMAGE_SIZE: usize = 32 * 1024 * 1024;
}

/// Core simulation mode.
///
/// Only the out-of-order core is implemented by this crate; the other
/// modes are recognized so documents written for sibling simulators parse,
/// and rejected at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimulationMode {
    /// Pure emulation, no timing model.
    Emulation,
    /// Scalar in-order pipeline.
    InOrderPipelined,
    /// Superscalar out-of-order pipeline.
    #[default]
    OutOfOrder,
}

/// Branch prediction algorithm selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum PredictorKind {
    /// Predict every branch not taken.
    AlwaysNotTaken,
    /// Two-bit saturating counters with a branch target buffer.
    #[default]
    Bimodal,
}

/// Data memory interface selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum MemoryInterfaceKind {
    /// Immediate completion, no timing.
    Flat,
    /// Every access completes after a fixed latency.
    #[default]
    FixedLatency,
    /// Split-transaction adapter over a lower timing model.
    Split,
}

/// `Core` section: mode and clocking.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CoreSection {
    /// Simulation mode; only `outoforder` is constructible.
    #[serde(alias = "Simulation-Mode")]
    pub simulation_mode: SimulationMode,
    /// Core clock frequency in GHz.
    #[serde(alias = "Clock-Frequency")]
    pub clock_frequency: f64,
    /// Guest timer frequency in MHz.
    #[serde(alias = "Timer-Frequency")]
    pub timer_frequency: f64,
}

impl Default for CoreSection {
    fn default() -> Self {
        Self {
            simulation_mode: SimulationMode::OutOfOrder,
            clock_frequency: defaults::CLOCK_FREQUENCY_GHZ,
            timer_frequency: defaults::TIMER_FREQUENCY_MHZ,
        }
    }
}

/// `Branch-Predictor` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BranchPredictorConfig {
    /// Prediction algorithm.
    #[serde(alias = "Type")]
    pub kind: PredictorKind,
    /// BTB index width in bits; the table holds `2^bits` entries.
    #[serde(alias = "BTB-bitlength")]
    pub btb_bits: usize,
}

impl Default for BranchPredictorConfig {
    fn default() -> Self {
        Self {
            kind: PredictorKind::Bimodal,
            btb_bits: defaults::BTB_BITS,
        }
    }
}

/// One entry of the `Ports` list: a named issue port and the instruction
/// groups it accepts.
#[derive(Debug, Clone, Deserialize)]
pub struct PortConfig {
    /// Port name, used to label per-port statistics.
    #[serde(alias = "Portname")]
    pub name: String,
    /// Instruction group ids this port can execute.
    #[serde(alias = "Instruction-Group-Support")]
    pub instruction_group_support: Vec<u16>,
}

/// One entry of the `Reservation-Stations` list.
#[derive(Debug, Clone, Deserialize)]
pub struct ReservationStationConfig {
    /// Station capacity in uops.
    #[serde(alias = "Size")]
    pub size: usize,
    /// Uops dispatchable into this station per cycle.
    #[serde(alias = "Dispatch-Rate")]
    pub dispatch_rate: usize,
    /// Issue port indices served by this station.
    #[serde(alias = "Ports")]
    pub ports: Vec<usize>,
}

/// `Pipeline-Widths` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineWidths {
    /// Slots per front-end inter-stage buffer.
    #[serde(alias = "FrontEnd")]
    pub front_end: usize,
    /// Commit width per cycle.
    #[serde(alias = "Commit")]
    pub commit: usize,
    /// LSQ completion slots per cycle.
    #[serde(alias = "LSQ-Completion")]
    pub lsq_completion: usize,
}

impl Default for PipelineWidths {
    fn default() -> Self {
        Self {
            front_end: defaults::FRONT_END_WIDTH,
            commit: defaults::COMMIT_WIDTH,
            lsq_completion: defaults::LSQ_COMPLETION_SLOTS,
        }
    }
}

/// `Queue-Sizes` section: ROB and load/store queue capacities.
///
/// When `combined` is set the load/store queue is a single shared structure
/// of that capacity; otherwise `load` and `store` size the split queues.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Reorder buffer capacity.
    #[serde(alias = "ROB")]
    pub rob: usize,
    /// Load queue capacity (split arrangement).
    #[serde(alias = "Load")]
    pub load: usize,
    /// Store queue capacity (split arrangement).
    #[serde(alias = "Store")]
    pub store: usize,
    /// Combined LSQ capacity; presence selects the combined arrangement.
    #[serde(alias = "Combined")]
    pub combined: Option<usize>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            rob: defaults::ROB_SIZE,
            load: defaults::LOAD_QUEUE_SIZE,
            store: defaults::STORE_QUEUE_SIZE,
            combined: None,
        }
    }
}

/// `Physical-Registers` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegisterConfig {
    /// Physical general-purpose register count.
    #[serde(alias = "GeneralPurpose-Count")]
    pub general_purpose_count: usize,
}

impl Default for RegisterConfig {
    fn default() -> Self {
        Self {
            general_purpose_count: defaults::GENERAL_PURPOSE_COUNT,
        }
    }
}

/// `Fetch` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Fetch block size in bytes; fetch requests are aligned to this.
    #[serde(alias = "Fetch-Block-Size")]
    pub block_size: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            block_size: defaults::FETCH_BLOCK_SIZE,
        }
    }
}

/// `Memory` section: data memory interface parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Data memory interface implementation.
    #[serde(alias = "Interface")]
    pub interface: MemoryInterfaceKind,
    /// Access latency in cycles (fixed-latency and split lower model).
    #[serde(alias = "Access-Latency")]
    pub access_latency: u64,
    /// Cache line width in bytes; accesses straddling a line split.
    #[serde(alias = "Cache-Line-Width")]
    pub cache_line_width: u64,
    /// Guest process image size in bytes.
    #[serde(alias = "Process-Image-Size")]
    pub process_image_size: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            interface: MemoryInterfaceKind::FixedLatency,
            access_latency: defaults::ACCESS_LATENCY,
            cache_line_width: defaults::CACHE_LINE_WIDTH,
            process_image_size: defaults::PROCESS_IMAGE_SIZE,
        }
    }
}

/// `CPU-Info` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CpuInfoConfig {
    /// `"T"` to generate a special file directory describing the core.
    ///
    /// Recognized for document compatibility; generation itself is handled
    /// outside the core.
    #[serde(alias = "Generate-Special-Dir")]
    pub generate_special_dir: String,
}

impl Default for CpuInfoConfig {
    fn default() -> Self {
        Self {
            generate_special_dir: "F".to_string(),
        }
    }
}

impl CpuInfoConfig {
    /// Returns true if special directory generation was requested.
    pub fn generate_special_dir(&self) -> bool {
        self.generate_special_dir == "T"
    }
}

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Core mode and clocking.
    #[serde(alias = "Core")]
    pub core: CoreSection,
    /// Branch predictor parameters.
    #[serde(alias = "Branch-Predictor")]
    pub branch_predictor: BranchPredictorConfig,
    /// Issue port descriptions.
    #[serde(alias = "Ports")]
    pub ports: Vec<PortConfig>,
    /// Reservation station descriptions.
    #[serde(alias = "Reservation-Stations")]
    pub reservation_stations: Vec<ReservationStationConfig>,
    /// Inter-stage buffer and commit widths.
    #[serde(alias = "Pipeline-Widths")]
    pub pipeline_widths: PipelineWidths,
    /// ROB and LSQ capacities.
    #[serde(alias = "Queue-Sizes")]
    pub queues: QueueConfig,
    /// Physical register counts.
    #[serde(alias = "Physical-Registers")]
    pub registers: RegisterConfig,
    /// Fetch parameters.
    #[serde(alias = "Fetch")]
    pub fetch: FetchConfig,
    /// Data memory interface parameters.
    #[serde(alias = "Memory")]
    pub memory: MemoryConfig,
    /// CPU-info generation flags.
    #[serde(alias = "CPU-Info")]
    pub cpu_info: CpuInfoConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            core: CoreSection::default(),
            branch_predictor: BranchPredictorConfig::default(),
            ports: vec![
                PortConfig {
                    name: "ALU0".to_string(),
                    instruction_group_support: vec![0, 1, 2, 5],
                },
                PortConfig {
                    name: "ALU1".to_string(),
                    instruction_group_support: vec![0, 5],
                },
                PortConfig {
                    name: "LSU".to_string(),
                    instruction_group_support: vec![3, 4],
                },
            ],
            reservation_stations: vec![
                ReservationStationConfig {
                    size: 16,
                    dispatch_rate: 4,
                    ports: vec![0, 1],
                },
                ReservationStationConfig {
                    size: 16,
                    dispatch_rate: 4,
                    ports: vec![2],
                },
            ],
            pipeline_widths: PipelineWidths::default(),
            queues: QueueConfig::default(),
            registers: RegisterConfig::default(),
            fetch: FetchConfig::default(),
            memory: MemoryConfig::default(),
            cpu_info: CpuInfoConfig::default(),
        }
    }
}

impl Config {
    /// Parses a configuration from a JSON document.
    pub fn from_json(document: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(document).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a configuration document from disk.
    pub fn from_json_file(path: &str) -> Result<Self, ConfigError> {
        let document =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Self::from_json(&document)
    }

    /// Checks structural invariants; any violation is fatal at setup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ports.is_empty() {
            return Err(ConfigError::PortTopology("no issue ports defined".into()));
        }

        // Every port must be served by exactly one reservation station port.
        let mut owners = vec![0usize; self.ports.len()];
        for (rs_index, rs) in self.reservation_stations.iter().enumerate() {
            if rs.size == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "Reservation-Stations.Size",
                    reason: format!("station {rs_index} has zero capacity"),
                });
            }
            if rs.dispatch_rate == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "Reservation-Stations.Dispatch-Rate",
                    reason: format!("station {rs_index} has zero dispatch rate"),
                });
            }
            for &port in &rs.ports {
                if port >= self.ports.len() {
                    return Err(ConfigError::PortTopology(format!(
                        "station {rs_index} references unknown port {port}"
                    )));
                }
                owners[port] += 1;
            }
        }
        for (port, count) in owners.iter().enumerate() {
            if *count != 1 {
                return Err(ConfigError::PortTopology(format!(
                    "port {port} ({}) is served by {count} reservation stations, expected 1",
                    self.ports[port].name
                )));
            }
        }

        if self.branch_predictor.btb_bits == 0 || self.branch_predictor.btb_bits > 30 {
            return Err(ConfigError::InvalidValue {
                key: "Branch-Predictor.BTB-bitlength",
                reason: format!("{} is outside 1..=30", self.branch_predictor.btb_bits),
            });
        }
        if !self.fetch.block_size.is_power_of_two() || self.fetch.block_size < 4 {
            return Err(ConfigError::InvalidValue {
                key: "Fetch.Fetch-Block-Size",
                reason: format!("{} is not a power of two >= 4", self.fetch.block_size),
            });
        }
        if !self.memory.cache_line_width.is_power_of_two() {
            return Err(ConfigError::InvalidValue {
                key: "Memory.Cache-Line-Width",
                reason: format!("{} is not a power of two", self.memory.cache_line_width),
            });
        }
        if self.pipeline_widths.front_end == 0
            || self.pipeline_widths.commit == 0
            || self.pipeline_widths.lsq_completion == 0
        {
            return Err(ConfigError::InvalidValue {
                key: "Pipeline-Widths",
                reason: "widths must be non-zero".into(),
            });
        }
        if self.queues.rob == 0 {
            return Err(ConfigError::InvalidValue {
                key: "Queue-Sizes.ROB",
                reason: "reorder buffer capacity must be non-zero".into(),
            });
        }
        if self.registers.general_purpose_count < 33 {
            return Err(ConfigError::InvalidValue {
                key: "Physical-Registers.GeneralPurpose-Count",
                reason: format!(
                    "{} physical registers cannot cover 32 architectural plus one rename",
                    self.registers.general_purpose_count
                ),
            });
        }
        Ok(())
    }
}
