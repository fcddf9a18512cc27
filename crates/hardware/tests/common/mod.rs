//! Shared infrastructure for the simulator tests.

use std::cell::RefCell;
use std::rc::Rc;

use oosim_core::common::error::InstructionException;
use oosim_core::common::reg::Register;
use oosim_core::common::value::RegisterValue;
use oosim_core::config::{Config, MemoryInterfaceKind};
use oosim_core::isa::{BranchPrediction, Instruction};
use oosim_core::memory::{LowerMemoryModel, MemoryAccessTarget, MemoryCommand, MemoryPacket};

/// A configurable implementation of the instruction capability contract,
/// for driving individual pipeline units without an ISA.
pub struct StubInstruction {
    pub address: u64,
    pub branch: bool,
    pub load: bool,
    pub store: bool,
    pub sources: Vec<Register>,
    pub destinations: Vec<Register>,
    pub operands: Vec<Option<RegisterValue>>,
    pub results: Vec<RegisterValue>,
    pub targets: Vec<MemoryAccessTarget>,
    pub supplied_data: Vec<Option<RegisterValue>>,
    pub store_data: Vec<RegisterValue>,
    pub exception: Option<InstructionException>,
    pub early_misprediction: (bool, u64),
    pub branch_taken: bool,
    pub branch_address: u64,
    pub supported_ports: Vec<u16>,
    pub latency: u16,
    pub executed_count: u32,
    pub micro_op: bool,
    pub last_micro_op: bool,
}

impl StubInstruction {
    /// Creates a single-port, single-cycle stub with no registers.
    pub fn new(address: u64) -> Self {
        Self {
            address,
            branch: false,
            load: false,
            store: false,
            sources: Vec::new(),
            destinations: Vec::new(),
            operands: Vec::new(),
            results: Vec::new(),
            targets: Vec::new(),
            supplied_data: Vec::new(),
            store_data: Vec::new(),
            exception: None,
            early_misprediction: (false, 0),
            branch_taken: false,
            branch_address: 0,
            supported_ports: vec![0],
            latency: 1,
            executed_count: 0,
            micro_op: false,
            last_micro_op: true,
        }
    }

    pub fn as_micro_op(mut self, last: bool) -> Self {
        self.micro_op = true;
        self.last_micro_op = last;
        self
    }

    pub fn with_ports(mut self, ports: Vec<u16>) -> Self {
        self.supported_ports = ports;
        self
    }

    pub fn with_sources(mut self, sources: Vec<Register>) -> Self {
        self.operands = vec![None; sources.len()];
        self.sources = sources;
        self
    }

    pub fn with_destinations(mut self, destinations: Vec<Register>) -> Self {
        self.results = vec![RegisterValue::from_u64_full(0); destinations.len()];
        self.destinations = destinations;
        self
    }

    pub fn with_early_misprediction(mut self, mispredicted: bool, address: u64) -> Self {
        self.early_misprediction = (mispredicted, address);
        self
    }

    pub fn as_load(mut self, targets: Vec<MemoryAccessTarget>) -> Self {
        self.load = true;
        self.supplied_data = vec![None; targets.len()];
        self.targets = targets;
        self
    }

    pub fn as_store(
        mut self,
        targets: Vec<MemoryAccessTarget>,
        data: Vec<RegisterValue>,
    ) -> Self {
        self.store = true;
        self.targets = targets;
        self.store_data = data;
        self
    }
}

impl Instruction for StubInstruction {
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
        self.destinations = destinations.to_vec();
        self.sources = sources.to_vec();
    }

    fn supply_operand(&mut self, index: usize, value: RegisterValue) {
        self.operands[index] = Some(value);
    }

    fn is_operand_ready(&self, index: usize) -> bool {
        self.operands[index].is_some()
    }

    fn can_execute(&self) -> bool {
        self.operands.iter().all(Option::is_some)
    }

    fn execute(&mut self) {
        self.executed_count += 1;
    }

    fn results(&self) -> &[RegisterValue] {
        &self.results
    }

    fn generate_addresses(&mut self) {}

    fn generated_addresses(&self) -> &[MemoryAccessTarget] {
        &self.targets
    }

    fn supply_data(&mut self, address: u64, data: RegisterValue) {
        if let Some(index) = self
            .targets
            .iter()
            .position(|target| target.address == address)
        {
            self.supplied_data[index] = Some(data);
        }
    }

    fn has_all_data(&self) -> bool {
        !self.supplied_data.is_empty() && self.supplied_data.iter().all(Option::is_some)
    }

    fn data(&self) -> &[RegisterValue] {
        &self.store_data
    }

    fn check_early_branch_misprediction(&self, _prediction: BranchPrediction) -> (bool, u64) {
        self.early_misprediction
    }

    fn branch_taken(&self) -> bool {
        self.branch_taken
    }

    fn branch_address(&self) -> u64 {
        self.branch_address
    }

    fn is_load(&self) -> bool {
        self.load
    }

    fn is_store(&self) -> bool {
        self.store
    }

    fn is_branch(&self) -> bool {
        self.branch
    }

    fn is_micro_op(&self) -> bool {
        self.micro_op
    }

    fn is_last_micro_op(&self) -> bool {
        self.last_micro_op
    }

    fn supported_ports(&self) -> &[u16] {
        &self.supported_ports
    }

    fn latency(&self) -> u16 {
        self.latency
    }
}

/// A lower memory model that records every packet and never responds;
/// responses are injected by the test through `handle_response`.
pub struct RecordingLowerModel {
    pub sent: Rc<RefCell<Vec<MemoryPacket>>>,
}

impl RecordingLowerModel {
    pub fn new() -> (Self, Rc<RefCell<Vec<MemoryPacket>>>) {
        let sent = Rc::new(RefCell::new(Vec::new()));
        (Self { sent: sent.clone() }, sent)
    }
}

impl LowerMemoryModel for RecordingLowerModel {
    fn send(&mut self, packet: MemoryPacket) {
        self.sent.borrow_mut().push(packet);
    }

    fn tick(&mut self) -> Vec<MemoryPacket> {
        Vec::new()
    }

    fn has_pending(&self) -> bool {
        false
    }
}

/// A lower model over a byte buffer that answers all buffered requests on
/// the next tick, newest first, to exercise out-of-order arrival.
pub struct ReversingLowerModel {
    memory: Vec<u8>,
    queued: Vec<MemoryPacket>,
}

impl ReversingLowerModel {
    pub fn new(memory: Vec<u8>) -> Self {
        Self {
            memory,
            queued: Vec::new(),
        }
    }
}

impl LowerMemoryModel for ReversingLowerModel {
    fn send(&mut self, packet: MemoryPacket) {
        self.queued.push(packet);
    }

    fn tick(&mut self) -> Vec<MemoryPacket> {
        let mut responses = Vec::new();
        while let Some(packet) = self.queued.pop() {
            let start = packet.address as usize;
            let end = start + packet.size as usize;
            match packet.command {
                MemoryCommand::Read => responses.push(MemoryPacket {
                    command: MemoryCommand::ReadResp,
                    address: packet.address,
                    size: packet.size,
                    id: packet.id,
                    payload: Some(self.memory[start..end].to_vec()),
                }),
                MemoryCommand::Write => {
                    self.memory[start..end]
                        .copy_from_slice(packet.payload.as_deref().unwrap_or_default());
                    responses.push(MemoryPacket {
                        command: MemoryCommand::WriteResp,
                        address: packet.address,
                        size: packet.size,
                        id: packet.id,
                        payload: None,
                    });
                }
                _ => {}
            }
        }
        responses
    }

    fn has_pending(&self) -> bool {
        !self.queued.is_empty()
    }
}

/// Installs the tracing subscriber once, honoring `RUST_LOG`.
pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// A small configuration sized for fast tests: two ALU-ish ports sharing
/// one station plus a memory port, and a 1 MiB process image.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.memory.process_image_size = 1 << 20;
    config.memory.interface = MemoryInterfaceKind::Flat;
    config
}

/// RV64 instruction encoders for the end-to-end programs.
pub mod assemble {
    fn r_type(funct7: u32, rs2: u32, rs1: u32, funct3: u32, rd: u32, opcode: u32) -> u32 {
        (funct7 << 25) | (rs2 << 20) | (rs1 << 15) | (funct3 << 12) | (rd << 7) | opcode
    }

    fn i_type(imm: i32, rs1: u32, funct3: u32, rd: u32, opcode: u32) -> u32 {
        (((imm as u32) & 0xFFF) << 20) | (rs1 << 15) | (funct3 << 12) | (rd << 7) | opcode
    }

    fn s_type(imm: i32, rs2: u32, rs1: u32, funct3: u32) -> u32 {
        let imm = imm as u32;
        (((imm >> 5) & 0x7F) << 25)
            | (rs2 << 20)
            | (rs1 << 15)
            | (funct3 << 12)
            | ((imm & 0x1F) << 7)
            | 0x23
    }

    fn b_type(imm: i32, rs2: u32, rs1: u32, funct3: u32) -> u32 {
        let imm = imm as u32;
        (((imm >> 12) & 1) << 31)
            | (((imm >> 5) & 0x3F) << 25)
            | (rs2 << 20)
            | (rs1 << 15)
            | (funct3 << 12)
            | (((imm >> 1) & 0xF) << 8)
            | (((imm >> 11) & 1) << 7)
            | 0x63
    }

    pub fn addi(rd: u32, rs1: u32, imm: i32) -> u32 {
        i_type(imm, rs1, 0b000, rd, 0x13)
    }

    pub fn add(rd: u32, rs1: u32, rs2: u32) -> u32 {
        r_type(0, rs2, rs1, 0b000, rd, 0x33)
    }

    pub fn mul(rd: u32, rs1: u32, rs2: u32) -> u32 {
        r_type(1, rs2, rs1, 0b000, rd, 0x33)
    }

    pub fn lui(rd: u32, imm20: u32) -> u32 {
        (imm20 << 12) | (rd << 7) | 0x37
    }

    pub fn ld(rd: u32, rs1: u32, imm: i32) -> u32 {
        i_type(imm, rs1, 0b011, rd, 0x03)
    }

    pub fn lbu(rd: u32, rs1: u32, imm: i32) -> u32 {
        i_type(imm, rs1, 0b100, rd, 0x03)
    }

    pub fn lw(rd: u32, rs1: u32, imm: i32) -> u32 {
        i_type(imm, rs1, 0b010, rd, 0x03)
    }

    pub fn sd(rs2: u32, rs1: u32, imm: i32) -> u32 {
        s_type(imm, rs2, rs1, 0b011)
    }

    pub fn sw(rs2: u32, rs1: u32, imm: i32) -> u32 {
        s_type(imm, rs2, rs1, 0b010)
    }

    pub fn beq(rs1: u32, rs2: u32, imm: i32) -> u32 {
        b_type(imm, rs2, rs1, 0b000)
    }

    pub fn bne(rs1: u32, rs2: u32, imm: i32) -> u32 {
        b_type(imm, rs2, rs1, 0b001)
    }

    pub fn jal(rd: u32, imm: i32) -> u32 {
        let imm = imm as u32;
        (((imm >> 20) & 1) << 31)
            | (((imm >> 1) & 0x3FF) << 21)
            | (((imm >> 11) & 1) << 20)
            | (((imm >> 12) & 0xFF) << 12)
            | (rd << 7)
            | 0x6F
    }

    pub fn jalr(rd: u32, rs1: u32, imm: i32) -> u32 {
        i_type(imm, rs1, 0b000, rd, 0x67)
    }

    pub fn ecall() -> u32 {
        0x0000_0073
    }

    /// Exit sequence: `a0 = <register rs>`, `a7 = 93`, `ecall`.
    pub fn exit_with(rs: u32) -> Vec<u32> {
        vec![addi(10, rs, 0), addi(17, 0, 93), ecall()]
    }
}
