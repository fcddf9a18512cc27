//! RV64 uop implementation of the core's instruction contract.

use crate::common::error::InstructionException;
use crate::common::reg::Register;
use crate::common::value::RegisterValue;
use crate::isa::{BranchPrediction, Instruction};
use crate::memory::MemoryAccessTarget;

use super::groups;

/// Decoded RV64 operation selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Mnemonic {
    Lui,
    Auipc,
    Jal,
    Jalr,
    Beq,
    Bne,
    Blt,
    Bge,
    Bltu,
    Bgeu,
    Load { size: u16, signed: bool },
    Store { size: u16 },
    Addi,
    Slti,
    Sltiu,
    Xori,
    Ori,
    Andi,
    Slli,
    Srli,
    Srai,
    Add,
    Sub,
    Sll,
    Slt,
    Sltu,
    Xor,
    Srl,
    Sra,
    Or,
    And,
    Addiw,
    Slliw,
    Srliw,
    Sraiw,
    Addw,
    Subw,
    Sllw,
    Srlw,
    Sraw,
    Mul,
    Mulh,
    Mulhu,
    Mulhsu,
    Div,
    Divu,
    Rem,
    Remu,
    Mulw,
    Divw,
    Divuw,
    Remw,
    Remuw,
    /// FENCE/FENCE.I; architectural no-op on a single core.
    Fence,
    Ecall,
    Ebreak,
    /// CSR accesses decode but are not executable by this core.
    Csr,
    Illegal,
}

/// A decoded RV64 uop.
pub struct Rv64Instruction {
    address: u64,
    mnemonic: Mnemonic,
    group: u16,
    imm: i64,
    sources: Vec<Register>,
    destinations: Vec<Register>,
    operands: Vec<Option<RegisterValue>>,
    results: Vec<RegisterValue>,
    targets: Vec<MemoryAccessTarget>,
    /// Loads: data supplied per target.
    supplied_data: Vec<Option<RegisterValue>>,
    /// Stores: data produced at execute, parallel to `targets`.
    store_data: Vec<RegisterValue>,
    exception: Option<InstructionException>,
    branch_taken: bool,
    branch_address: u64,
    supported_ports: Vec<u16>,
    latency: u16,
}

impl Rv64Instruction {
    /// Creates a decoded uop. Ports and latency are attached afterwards by
    /// the architecture.
    pub fn new(
        address: u64,
        mnemonic: Mnemonic,
        group: u16,
        imm: i64,
        sources: Vec<Register>,
        destinations: Vec<Register>,
    ) -> Self {
        let operand_count = sources.len();
        let exception = match mnemonic {
            Mnemonic::Illegal => Some(InstructionException::DecodeFault),
            Mnemonic::Ecall => Some(InstructionException::Syscall),
            Mnemonic::Ebreak => Some(InstructionException::ExecutionNotImplemented),
            _ => None,
        };
        Self {
            address,
            mnemonic,
            group,
            imm,
            sources,
            destinations,
            operands: vec![None; operand_count],
            results: Vec::new(),
            targets: Vec::new(),
            supplied_data: Vec::new(),
            store_data: Vec::new(),
            exception,
            branch_taken: false,
            branch_address: 0,
            supported_ports: Vec::new(),
            latency: 1,
        }
    }

    /// Creates the uop emitted when instruction memory faults.
    pub fn fetch_fault(address: u64) -> Self {
        let mut uop = Self::new(address, Mnemonic::Illegal, groups::INT_SIMPLE, 0, vec![], vec![]);
        uop.exception = Some(InstructionException::PageFault);
        uop
    }

    /// Attaches the issue ports and latency chosen by the architecture.
    pub fn set_port_info(&mut self, ports: Vec<u16>, latency: u16) {
        self.supported_ports = ports;
        self.latency = latency;
    }

    /// Returns the decoded mnemonic.
    pub fn mnemonic(&self) -> Mnemonic {
        self.mnemonic
    }

    /// Returns the instruction group assigned at decode.
    pub fn group(&self) -> u16 {
        self.group
    }

    fn record_exception(&mut self, exception: InstructionException) {
        // The first exception sticks.
        if self.exception.is_none() {
            self.exception = Some(exception);
        }
    }

    #[inline]
    fn operand_u64(&self, index: usize) -> u64 {
        self.operands[index]
            .as_ref()
            .map_or(0, RegisterValue::as_u64)
    }

    fn resolve_branch(&mut self, taken: bool, target: u64) {
        self.branch_taken = taken;
        self.branch_address = if taken { target } else { self.address + 4 };
        if self.branch_address % 4 != 0 {
            self.record_exception(InstructionException::MisalignedAccess);
        }
    }
}

impl Instruction for Rv64Instruction {
    fn address(&self) -> u64 {
        self.address
    }

    fn exception(&self) -> Option<InstructionException> {
        self.exception
    }

    fn source_registers(&self) -> &[Register] {
        &self.sources
    }

    fn destination_registers(&self) -> &[Register] {
        &self.destinations
    }

    fn rename(&mut self, destinations: &[Register], sources: &[Register]) {
        debug_assert_eq!(destinations.len(), self.destinations.len());
        debug_assert_eq!(sources.len(), self.sources.len());
        self.destinations = destinations.to_vec();
        self.sources = sources.to_vec();
    }

    fn supply_operand(&mut self, index: usize, value: RegisterValue) {
        debug_assert!(self.operands[index].is_none());
        self.operands[index] = Some(value);
    }

    fn is_operand_ready(&self, index: usize) -> bool {
        self.operands[index].is_some()
    }

    fn can_execute(&self) -> bool {
        self.operands.iter().all(Option::is_some)
    }

    fn execute(&mut self) {
        use Mnemonic::*;

        if self.exception.is_some() {
            self.results = vec![RegisterValue::zeros(8); self.destinations.len()];
            return;
        }

        let rs1 = self.operand_u64(0);
        let rs2 = if self.operands.len() > 1 {
            self.operand_u64(1)
        } else {
            0
        };
        let imm = self.imm;

        let mut result: Option<u64> = None;
        match self.mnemonic {
            Lui => result = Some(imm as u64),
            Auipc => result = Some(self.address.wrapping_add(imm as u64)),
            Jal => {
                result = Some(self.address + 4);
                self.resolve_branch(true, self.address.wrapping_add(imm as u64));
            }
            Jalr => {
                result = Some(self.address + 4);
                self.resolve_branch(true, rs1.wrapping_add(imm as u64) & !1);
            }
            Beq => self.resolve_branch(rs1 == rs2, self.address.wrapping_add(imm as u64)),
            Bne => self.resolve_branch(rs1 != rs2, self.address.wrapping_add(imm as u64)),
            Blt => self.resolve_branch(
                (rs1 as i64) < (rs2 as i64),
                self.address.wrapping_add(imm as u64),
            ),
            Bge => self.resolve_branch(
                (rs1 as i64) >= (rs2 as i64),
                self.address.wrapping_add(imm as u64),
            ),
            Bltu => self.resolve_branch(rs1 < rs2, self.address.wrapping_add(imm as u64)),
            Bgeu => self.resolve_branch(rs1 >= rs2, self.address.wrapping_add(imm as u64)),
            Load { signed, .. } => {
                let value = self.supplied_data[0].clone().unwrap_or_default();
                let extended = if signed {
                    value.sign_extend(8)
                } else {
                    value.zero_extend(8)
                };
                result = Some(extended.as_u64());
            }
            Store { size } => {
                self.store_data = vec![RegisterValue::from_u64(rs2, size as usize)];
            }
            Addi => result = Some(rs1.wrapping_add(imm as u64)),
            Slti => result = Some(u64::from((rs1 as i64) < imm)),
            Sltiu => result = Some(u64::from(rs1 < imm as u64)),
            Xori => result = Some(rs1 ^ imm as u64),
            Ori => result = Some(rs1 | imm as u64),
            Andi => result = Some(rs1 & imm as u64),
            Slli => result = Some(rs1 << (imm & 0x3F)),
            Srli => result = Some(rs1 >> (imm & 0x3F)),
            Srai => result = Some(((rs1 as i64) >> (imm & 0x3F)) as u64),
            Add => result = Some(rs1.wrapping_add(rs2)),
            Sub => result = Some(rs1.wrapping_sub(rs2)),
            Sll => result = Some(rs1 << (rs2 & 0x3F)),
            Slt => result = Some(u64::from((rs1 as i64) < (rs2 as i64))),
            Sltu => result = Some(u64::from(rs1 < rs2)),
            Xor => result = Some(rs1 ^ rs2),
            Srl => result = Some(rs1 >> (rs2 & 0x3F)),
            Sra => result = Some(((rs1 as i64) >> (rs2 & 0x3F)) as u64),
            Or => result = Some(rs1 | rs2),
            And => result = Some(rs1 & rs2),
            Addiw => result = Some((rs1 as i32).wrapping_add(imm as i32) as i64 as u64),
            Slliw => result = Some(((rs1 as i32) << (imm & 0x1F)) as i64 as u64),
            Srliw => result = Some(((rs1 as u32) >> (imm & 0x1F)) as i32 as i64 as u64),
            Sraiw => result = Some(((rs1 as i32) >> (imm & 0x1F)) as i64 as u64),
            Addw => result = Some((rs1 as i32).wrapping_add(rs2 as i32) as i64 as u64),
            Subw => result = Some((rs1 as i32).wrapping_sub(rs2 as i32) as i64 as u64),
            Sllw => result = Some(((rs1 as i32) << (rs2 & 0x1F)) as i64 as u64),
            Srlw => result = Some(((rs1 as u32) >> (rs2 & 0x1F)) as i32 as i64 as u64),
            Sraw => result = Some(((rs1 as i32) >> (rs2 & 0x1F)) as i64 as u64),
            Mul => result = Some(rs1.wrapping_mul(rs2)),
            Mulh => result = Some(((rs1 as i64 as i128 * rs2 as i64 as i128) >> 64) as u64),
            Mulhu => result = Some(((rs1 as u128 * rs2 as u128) >> 64) as u64),
            Mulhsu => {
                result = Some((((rs1 as i64 as i128).wrapping_mul(rs2 as i128)) >> 64) as u64);
            }
            Div => {
                let (a, b) = (rs1 as i64, rs2 as i64);
                result = Some(if b == 0 {
                    u64::MAX
                } else {
                    a.wrapping_div(b) as u64
                });
            }
            Divu => result = Some(if rs2 == 0 { u64::MAX } else { rs1 / rs2 }),
            Rem => {
                let (a, b) = (rs1 as i64, rs2 as i64);
                result = Some(if b == 0 { a as u64 } else { a.wrapping_rem(b) as u64 });
            }
            Remu => result = Some(if rs2 == 0 { rs1 } else { rs1 % rs2 }),
            Mulw => result = Some((rs1 as i32).wrapping_mul(rs2 as i32) as i64 as u64),
            Divw => {
                let (a, b) = (rs1 as i32, rs2 as i32);
                result = Some(if b == 0 {
                    u64::MAX
                } else {
                    a.wrapping_div(b) as i64 as u64
                });
            }
            Divuw => {
                let (a, b) = (rs1 as u32, rs2 as u32);
                result = Some(if b == 0 { u64::MAX } else { (a / b) as i32 as i64 as u64 });
            }
            Remw => {
                let (a, b) = (rs1 as i32, rs2 as i32);
                result = Some(if b == 0 {
                    a as i64 as u64
                } else {
                    a.wrapping_rem(b) as i64 as u64
                });
            }
            Remuw => {
                let (a, b) = (rs1 as u32, rs2 as u32);
                result = Some(if b == 0 {
                    a as i32 as i64 as u64
                } else {
                    (a % b) as i32 as i64 as u64
                });
            }
            Fence => {}
            Csr => self.record_exception(InstructionException::ExecutionNotImplemented),
            Ecall | Ebreak | Illegal => {}
        }

        self.results = match result {
            Some(value) if !self.destinations.is_empty() => {
                vec![RegisterValue::from_u64_full(value)]
            }
            _ => vec![RegisterValue::zeros(8); self.destinations.len()],
        };
    }

    fn results(&self) -> &[RegisterValue] {
        &self.results
    }

    fn generate_addresses(&mut self) {
        let (size, base_index) = match self.mnemonic {
            Mnemonic::Load { size, .. } => (size, 0),
            Mnemonic::Store { size } => (size, 0),
            _ => return,
        };
        let base = self.operand_u64(base_index);
        let address = base.wrapping_add(self.imm as u64);
        self.targets = vec![MemoryAccessTarget::new(address, size)];
        self.supplied_data = vec![None; self.targets.len()];
    }

    fn generated_addresses(&self) -> &[MemoryAccessTarget] {
        &self.targets
    }

    fn supply_data(&mut self, address: u64, data: RegisterValue) {
        let Some(index) = self
            .targets
            .iter()
            .enumerate()
            .find(|(index, target)| {
                target.address == address && self.supplied_data[*index].is_none()
            })
            .map(|(index, _)| index)
        else {
            return;
        };
        if !data.is_valid() {
            self.record_exception(InstructionException::PageFault);
        }
        self.supplied_data[index] = Some(data);
    }

    fn has_all_data(&self) -> bool {
        !self.supplied_data.is_empty() && self.supplied_data.iter().all(Option::is_some)
    }

    fn data(&self) -> &[RegisterValue] {
        &self.store_data
    }

    fn check_early_branch_misprediction(&self, prediction: BranchPrediction) -> (bool, u64) {
        match self.mnemonic {
            // Direct unconditional branch: the target is known at decode.
            Mnemonic::Jal => {
                let target = self.address.wrapping_add(self.imm as u64);
                (
                    !(prediction.taken && prediction.target == target),
                    target,
                )
            }
            _ if !self.is_branch() => (prediction.taken, self.address + 4),
            _ => (false, 0),
        }
    }

    fn branch_taken(&self) -> bool {
        self.branch_taken
    }

    fn branch_address(&self) -> u64 {
        self.branch_address
    }

    fn is_load(&self) -> bool {
        matches!(self.mnemonic, Mnemonic::Load { .. })
    }

    fn is_store(&self) -> bool {
        matches!(self.mnemonic, Mnemonic::Store { .. })
    }

    fn is_branch(&self) -> bool {
        matches!(
            self.mnemonic,
            Mnemonic::Jal
                | Mnemonic::Jalr
                | Mnemonic::Beq
                | Mnemonic::Bne
                | Mnemonic::Blt
                | Mnemonic::Bge
                | Mnemonic::Bltu
                | Mnemonic::Bgeu
        )
    }

    fn supported_ports(&self) -> &[u16] {
        &self.supported_ports
    }

    fn latency(&self) -> u16 {
        self.latency
    }

    fn lsq_latency(&self) -> u16 {
        1
    }
}
