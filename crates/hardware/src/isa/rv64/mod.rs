//! Bundled RV64IM guest ISA.
//!
//! Implements the core's capability contract for the RV64 base integer
//! set plus the M extension: predecode of raw bytes into single-uop
//! macro-ops, execution semantics, a minimal Linux syscall layer reached
//! through the exception-handler state machine, and the register file
//! structure the renaming machinery is built from.

use crate::common::error::ConfigError;
use crate::common::reg::{Register, RegisterFileStructure};
use crate::common::value::RegisterValue;
use crate::config::Config;
use crate::isa::{
    Architecture, ExceptionContext, ExceptionHandler, Instruction, PredecodedMacroOp,
    ProcessInfo, ProcessStateChange, register_type,
};

/// Instruction decoding (field extraction and the decoder).
pub mod decode;
/// The RV64 uop type and its execution semantics.
pub mod instruction;
/// Minimal Linux syscall emulation.
pub mod linux;
/// Opcode and function-field constants.
pub mod opcodes;

use instruction::Rv64Instruction;

/// Instruction group identifiers used by the port configuration.
pub mod groups {
    /// Single-cycle integer operations.
    pub const INT_SIMPLE: u16 = 0;
    /// Integer multiplies.
    pub const INT_MUL: u16 = 1;
    /// Integer divides and remainders.
    pub const INT_DIV: u16 = 2;
    /// Memory reads.
    pub const LOAD: u16 = 3;
    /// Memory writes.
    pub const STORE: u16 = 4;
    /// Control flow.
    pub const BRANCH: u16 = 5;

    /// Number of defined groups.
    pub const COUNT: usize = 6;
}

/// Execution latency in cycles for each instruction group.
const GROUP_LATENCY: [u16; groups::COUNT] = [1, 3, 18, 1, 1, 1];

/// Number of architectural general-purpose registers.
const ARCH_GENERAL_COUNT: usize = 32;

/// Stack pointer register index (x2).
const REG_SP: i16 = 2;

/// The RV64IM architecture.
pub struct Rv64Architecture {
    /// Issue ports supporting each instruction group.
    group_ports: Vec<Vec<u16>>,
    physical_general_count: usize,
}

impl Rv64Architecture {
    /// Builds the architecture from the configured port topology.
    ///
    /// Fails if any instruction group is left without an issue port.
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        let mut group_ports = vec![Vec::new(); groups::COUNT];
        for (port, port_config) in config.ports.iter().enumerate() {
            for &group in &port_config.instruction_group_support {
                if (group as usize) < groups::COUNT {
                    group_ports[group as usize].push(port as u16);
                }
            }
        }
        for (group, ports) in group_ports.iter().enumerate() {
            if ports.is_empty() {
                return Err(ConfigError::PortTopology(format!(
                    "instruction group {group} has no issue port"
                )));
            }
        }
        Ok(Self {
            group_ports,
            physical_general_count: config.registers.general_purpose_count,
        })
    }

    fn attach_port_info(&self, uop: &mut Rv64Instruction, group: u16) {
        let latency = GROUP_LATENCY[group as usize];
        uop.set_port_info(self.group_ports[group as usize].clone(), latency);
    }
}

impl Architecture for Rv64Architecture {
    fn predecode(&self, bytes: &[u8], address: u64) -> PredecodedMacroOp {
        if bytes.len() < 4 {
            return PredecodedMacroOp {
                bytes_consumed: 0,
                uops: Vec::new(),
            };
        }
        let encoding = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let mut uop = decode::decode(encoding, address);
        let group = uop.group();
        self.attach_port_info(&mut uop, group);
        PredecodedMacroOp {
            bytes_consumed: 4,
            uops: vec![Box::new(uop)],
        }
    }

    fn fetch_fault(&self, address: u64) -> Box<dyn Instruction> {
        let mut uop = Rv64Instruction::fetch_fault(address);
        self.attach_port_info(&mut uop, groups::INT_SIMPLE);
        Box::new(uop)
    }

    fn register_file_structure(&self) -> Vec<RegisterFileStructure> {
        vec![RegisterFileStructure {
            bytes: 8,
            quantity: self.physical_general_count,
        }]
    }

    fn architectural_register_counts(&self) -> Vec<usize> {
        vec![ARCH_GENERAL_COUNT]
    }

    fn handle_exception(
        &self,
        uop: &dyn Instruction,
        context: &ExceptionContext<'_>,
    ) -> Box<dyn ExceptionHandler> {
        linux::handler_for(uop, context)
    }

    fn initial_process_state(&self, process: &ProcessInfo) -> ProcessStateChange {
        ProcessStateChange {
            register_writes: vec![(
                Register::new(register_type::GENERAL, REG_SP),
                RegisterValue::from_u64_full(process.stack_pointer),
            )],
            memory_writes: Vec::new(),
        }
    }
}

