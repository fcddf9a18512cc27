//! RV64 instruction decoding.
//!
//! Field extraction over raw 32-bit encodings plus the decoder producing
//! [`Rv64Instruction`] uops. Undecodable encodings yield a uop carrying a
//! decode exception rather than an error; faults are pipeline data.

use crate::common::reg::Register;
use crate::isa::register_type;

use super::groups;
use super::instruction::{Mnemonic, Rv64Instruction};
use super::opcodes::*;

/// Bit extraction over a raw RV64 instruction encoding.
pub trait InstructionBits {
    /// Extracts the opcode field (bits 0-6).
    fn opcode(&self) -> u32;
    /// Extracts the destination register field (bits 7-11).
    fn rd(&self) -> u32;
    /// Extracts the first source register field (bits 15-19).
    fn rs1(&self) -> u32;
    /// Extracts the second source register field (bits 20-24).
    fn rs2(&self) -> u32;
    /// Extracts the funct3 field (bits 12-14).
    fn funct3(&self) -> u32;
    /// Extracts the funct7 field (bits 25-31).
    fn funct7(&self) -> u32;
}

impl InstructionBits for u32 {
    #[inline(always)]
    fn opcode(&self) -> u32 {
        self & 0x7F
    }

    #[inline(always)]
    fn rd(&self) -> u32 {
        (self >> 7) & 0x1F
    }

    #[inline(always)]
    fn rs1(&self) -> u32 {
        (self >> 15) & 0x1F
    }

    #[inline(always)]
    fn rs2(&self) -> u32 {
        (self >> 20) & 0x1F
    }

    #[inline(always)]
    fn funct3(&self) -> u32 {
        (self >> 12) & 0x7
    }

    #[inline(always)]
    fn funct7(&self) -> u32 {
        (self >> 25) & 0x7F
    }
}

/// Sign-extended I-type immediate.
fn imm_i(encoding: u32) -> i64 {
    (encoding as i32 >> 20) as i64
}

/// Sign-extended S-type immediate.
fn imm_s(encoding: u32) -> i64 {
    let value = ((encoding >> 25) << 5) | encoding.rd();
    ((value << 20) as i32 >> 20) as i64
}

/// Sign-extended B-type immediate.
fn imm_b(encoding: u32) -> i64 {
    let value = (((encoding >> 31) & 1) << 12)
        | (((encoding >> 7) & 1) << 11)
        | (((encoding >> 25) & 0x3F) << 5)
        | (((encoding >> 8) & 0xF) << 1);
    ((value << 19) as i32 >> 19) as i64
}

/// U-type immediate (upper 20 bits, sign-extended through bit 31).
fn imm_u(encoding: u32) -> i64 {
    (encoding & 0xFFFF_F000) as i32 as i64
}

/// Sign-extended J-type immediate.
fn imm_j(encoding: u32) -> i64 {
    let value = (((encoding >> 31) & 1) << 20)
        | (((encoding >> 12) & 0xFF) << 12)
        | (((encoding >> 20) & 1) << 11)
        | (((encoding >> 21) & 0x3FF) << 1);
    ((value << 11) as i32 >> 11) as i64
}

/// Maps a source field to a register, folding `x0` to the zero register.
fn source(index: u32) -> Register {
    if index == 0 {
        Register::zero(register_type::GENERAL)
    } else {
        Register::new(register_type::GENERAL, index as i16)
    }
}

/// Maps a destination field to a register list; writes to `x0` vanish.
fn destination(index: u32) -> Vec<Register> {
    if index == 0 {
        Vec::new()
    } else {
        vec![Register::new(register_type::GENERAL, index as i16)]
    }
}

/// Decodes one 32-bit encoding at `address` into a uop.
pub fn decode(encoding: u32, address: u64) -> Rv64Instruction {
    let build = |mnemonic, group, imm, sources, destinations| {
        Rv64Instruction::new(address, mnemonic, group, imm, sources, destinations)
    };
    let illegal =
        || build(Mnemonic::Illegal, groups::INT_SIMPLE, 0, vec![], vec![]);

    match encoding.opcode() {
        OP_LUI => build(
            Mnemonic::Lui,
            groups::INT_SIMPLE,
            imm_u(encoding),
            vec![],
            destination(encoding.rd()),
        ),
        OP_AUIPC => build(
            Mnemonic::Auipc,
            groups::INT_SIMPLE,
            imm_u(encoding),
            vec![],
            destination(encoding.rd()),
        ),
        OP_JAL => build(
            Mnemonic::Jal,
            groups::BRANCH,
            imm_j(encoding),
            vec![],
            destination(encoding.rd()),
        ),
        OP_JALR => build(
            Mnemonic::Jalr,
            groups::BRANCH,
            imm_i(encoding),
            vec![source(encoding.rs1())],
            destination(encoding.rd()),
        ),
        OP_BRANCH => {
            let mnemonic = match encoding.funct3() {
                0b000 => Mnemonic::Beq,
                0b001 => Mnemonic::Bne,
                0b100 => Mnemonic::Blt,
                0b101 => Mnemonic::Bge,
                0b110 => Mnemonic::Bltu,
                0b111 => Mnemonic::Bgeu,
                _ => return illegal(),
            };
            build(
                mnemonic,
                groups::BRANCH,
                imm_b(encoding),
                vec![source(encoding.rs1()), source(encoding.rs2())],
                vec![],
            )
        }
        OP_LOAD => {
            let (size, signed) = match encoding.funct3() {
                0b000 => (1, true),
                0b001 => (2, true),
                0b010 => (4, true),
                0b011 => (8, true),
                0b100 => (1, false),
                0b101 => (2, false),
                0b110 => (4, false),
                _ => return illegal(),
            };
            build(
                Mnemonic::Load { size, signed },
                groups::LOAD,
                imm_i(encoding),
                vec![source(encoding.rs1())],
                destination(encoding.rd()),
            )
        }
        OP_STORE => {
            let size = match encoding.funct3() {
                0b000 => 1,
                0b001 => 2,
                0b010 => 4,
                0b011 => 8,
                _ => return illegal(),
            };
            build(
                Mnemonic::Store { size },
                groups::STORE,
                imm_s(encoding),
                vec![source(encoding.rs1()), source(encoding.rs2())],
                vec![],
            )
        }
        OP_IMM => {
            let mnemonic = match encoding.funct3() {
                0b000 => Mnemonic::Addi,
                0b010 => Mnemonic::Slti,
                0b011 => Mnemonic::Sltiu,
                0b100 => Mnemonic::Xori,
                0b110 => Mnemonic::Ori,
                0b111 => Mnemonic::Andi,
                0b001 => Mnemonic::Slli,
                0b101 if encoding.funct7() & !1 == FUNCT7_ALT => Mnemonic::Srai,
                0b101 => Mnemonic::Srli,
                _ => return illegal(),
            };
            // Shift amounts live in the low immediate bits.
            let imm = match mnemonic {
                Mnemonic::Slli | Mnemonic::Srli | Mnemonic::Srai => {
                    i64::from((encoding >> 20) & 0x3F)
                }
                _ => imm_i(encoding),
            };
            build(
                mnemonic,
                groups::INT_SIMPLE,
                imm,
                vec![source(encoding.rs1())],
                destination(encoding.rd()),
            )
        }
        OP_IMM_32 => {
            let mnemonic = match encoding.funct3() {
                0b000 => Mnemonic::Addiw,
                0b001 => Mnemonic::Slliw,
                0b101 if encoding.funct7() == FUNCT7_ALT => Mnemonic::Sraiw,
                0b101 => Mnemonic::Srliw,
                _ => return illegal(),
            };
            let imm = match mnemonic {
                Mnemonic::Addiw => imm_i(encoding),
                _ => i64::from((encoding >> 20) & 0x1F),
            };
            build(
                mnemonic,
                groups::INT_SIMPLE,
                imm,
                vec![source(encoding.rs1())],
                destination(encoding.rd()),
            )
        }
        OP_REG => {
            let (mnemonic, group) = match (encoding.funct3(), encoding.funct7()) {
                (0b000, 0) => (Mnemonic::Add, groups::INT_SIMPLE),
                (0b000, FUNCT7_ALT) => (Mnemonic::Sub, groups::INT_SIMPLE),
                (0b001, 0) => (Mnemonic::Sll, groups::INT_SIMPLE),
                (0b010, 0) => (Mnemonic::Slt, groups::INT_SIMPLE),
                (0b011, 0) => (Mnemonic::Sltu, groups::INT_SIMPLE),
                (0b100, 0) => (Mnemonic::Xor, groups::INT_SIMPLE),
                (0b101, 0) => (Mnemonic::Srl, groups::INT_SIMPLE),
                (0b101, FUNCT7_ALT) => (Mnemonic::Sra, groups::INT_SIMPLE),
                (0b110, 0) => (Mnemonic::Or, groups::INT_SIMPLE),
                (0b111, 0) => (Mnemonic::And, groups::INT_SIMPLE),
                (0b000, FUNCT7_MULDIV) => (Mnemonic::Mul, groups::INT_MUL),
                (0b001, FUNCT7_MULDIV) => (Mnemonic::Mulh, groups::INT_MUL),
                (0b010, FUNCT7_MULDIV) => (Mnemonic::Mulhsu, groups::INT_MUL),
                (0b011, FUNCT7_MULDIV) => (Mnemonic::Mulhu, groups::INT_MUL),
                (0b100, FUNCT7_MULDIV) => (Mnemonic::Div, groups::INT_DIV),
                (0b101, FUNCT7_MULDIV) => (Mnemonic::Divu, groups::INT_DIV),
                (0b110, FUNCT7_MULDIV) => (Mnemonic::Rem, groups::INT_DIV),
                (0b111, FUNCT7_MULDIV) => (Mnemonic::Remu, groups::INT_DIV),
                _ => return illegal(),
            };
            build(
                mnemonic,
                group,
                0,
                vec![source(encoding.rs1()), source(encoding.rs2())],
                destination(encoding.rd()),
            )
        }
        OP_REG_32 => {
            let (mnemonic, group) = match (encoding.funct3(), encoding.funct7()) {
                (0b000, 0) => (Mnemonic::Addw, groups::INT_SIMPLE),
                (0b000, FUNCT7_ALT) => (Mnemonic::Subw, groups::INT_SIMPLE),
                (0b001, 0) => (Mnemonic::Sllw, groups::INT_SIMPLE),
                (0b101, 0) => (Mnemonic::Srlw, groups::INT_SIMPLE),
                (0b101, FUNCT7_ALT) => (Mnemonic::Sraw, groups::INT_SIMPLE),
                (0b000, FUNCT7_MULDIV) => (Mnemonic::Mulw, groups::INT_MUL),
                (0b100, FUNCT7_MULDIV) => (Mnemonic::Divw, groups::INT_DIV),
                (0b101, FUNCT7_MULDIV) => (Mnemonic::Divuw, groups::INT_DIV),
                (0b110, FUNCT7_MULDIV) => (Mnemonic::Remw, groups::INT_DIV),
                (0b111, FUNCT7_MULDIV) => (Mnemonic::Remuw, groups::INT_DIV),
                _ => return illegal(),
            };
            build(
                mnemonic,
                group,
                0,
                vec![source(encoding.rs1()), source(encoding.rs2())],
                destination(encoding.rd()),
            )
        }
        OP_MISC_MEM => build(Mnemonic::Fence, groups::INT_SIMPLE, 0, vec![], vec![]),
        OP_SYSTEM => match (encoding.funct3(), encoding.rs2()) {
            (0b000, 0) => build(Mnemonic::Ecall, groups::INT_SIMPLE, 0, vec![], vec![]),
            (0b000, 1) => build(Mnemonic::Ebreak, groups::INT_SIMPLE, 0, vec![], vec![]),
            (0b000, _) => illegal(),
            _ => build(Mnemonic::Csr, groups::INT_SIMPLE, 0, vec![], vec![]),
        },
        _ => illegal(),
    }
}
