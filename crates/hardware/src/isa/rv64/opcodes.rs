//! RV64 base opcode and function-field constants.

/// LUI: load upper immediate.
pub const OP_LUI: u32 = 0b011_0111;
/// AUIPC: add upper immediate to PC.
pub const OP_AUIPC: u32 = 0b001_0111;
/// JAL: jump and link.
pub const OP_JAL: u32 = 0b110_1111;
/// JALR: jump and link register.
pub const OP_JALR: u32 = 0b110_0111;
/// Conditional branches (BEQ..BGEU).
pub const OP_BRANCH: u32 = 0b110_0011;
/// Loads (LB..LWU).
pub const OP_LOAD: u32 = 0b000_0011;
/// Stores (SB..SD).
pub const OP_STORE: u32 = 0b010_0011;
/// Integer register-immediate operations.
pub const OP_IMM: u32 = 0b001_0011;
/// Integer register-immediate operations on 32-bit words.
pub const OP_IMM_32: u32 = 0b001_1011;
/// Integer register-register operations.
pub const OP_REG: u32 = 0b011_0011;
/// Integer register-register operations on 32-bit words.
pub const OP_REG_32: u32 = 0b011_1011;
/// FENCE and FENCE.I.
pub const OP_MISC_MEM: u32 = 0b000_1111;
/// ECALL, EBREAK, and CSR operations.
pub const OP_SYSTEM: u32 = 0b111_0011;

/// funct7 selecting the M extension on OP_REG/OP_REG_32.
pub const FUNCT7_MULDIV: u32 = 0b000_0001;
/// funct7 selecting SUB/SRA variants.
pub const FUNCT7_ALT: u32 = 0b010_0000;
