//! RV64 decode and execution semantics tests.

use rstest::rstest;

use oosim_core::common::error::InstructionException;
use oosim_core::common::value::RegisterValue;
use oosim_core::isa::rv64::decode::decode;
use oosim_core::isa::rv64::instruction::Rv64Instruction;
use oosim_core::isa::{BranchPrediction, Instruction};

use crate::common::assemble::*;

/// Supplies every operand and executes, returning the first result.
fn execute_with(mut uop: Rv64Instruction, operands: &[u64]) -> (u64, Rv64Instruction) {
    for (index, &value) in operands.iter().enumerate() {
        uop.supply_operand(index, RegisterValue::from_u64_full(value));
    }
    uop.execute();
    let result = uop.results().first().map_or(0, RegisterValue::as_u64);
    (result, uop)
}

#[rstest]
#[case::addi(addi(5, 6, -3), &[10], 7)]
#[case::add(add(5, 6, 7), &[10, 32], 42)]
#[case::mul(mul(5, 6, 7), &[6, 7], 42)]
#[case::lui(lui(5, 0x12345), &[], 0x1234_5000)]
fn alu_results(#[case] encoding: u32, #[case] operands: &[u64], #[case] expected: u64) {
    let uop = decode(encoding, 0x1000);
    let (result, _) = execute_with(uop, operands);
    assert_eq!(result, expected);
}

#[rstest]
#[case::load(ld(5, 6, 8), true, false, false)]
#[case::store(sd(5, 6, 8), false, true, false)]
#[case::branch(bne(5, 6, 8), false, false, true)]
#[case::jump(jal(1, 8), false, false, true)]
#[case::alu(add(5, 6, 7), false, false, false)]
fn capability_bits(
    #[case] encoding: u32,
    #[case] load: bool,
    #[case] store: bool,
    #[case] branch: bool,
) {
    let uop = decode(encoding, 0);
    assert_eq!(uop.is_load(), load);
    assert_eq!(uop.is_store(), store);
    assert_eq!(uop.is_branch(), branch);
}

#[test]
fn undecodable_encoding_carries_a_decode_fault() {
    let uop = decode(0xFFFF_FFFF, 0);
    assert_eq!(uop.exception(), Some(InstructionException::DecodeFault));
}

#[test]
fn ecall_carries_a_syscall_exception() {
    let uop = decode(ecall(), 0);
    assert_eq!(uop.exception(), Some(InstructionException::Syscall));
}

#[test]
fn taken_branch_resolves_to_its_target() {
    let uop = decode(beq(5, 6, 0x20), 0x1000);
    let (_, uop) = execute_with(uop, &[7, 7]);
    assert!(uop.branch_taken());
    assert_eq!(uop.branch_address(), 0x1020);
}

#[test]
fn untaken_branch_resolves_to_fall_through() {
    let uop = decode(beq(5, 6, 0x20), 0x1000);
    let (_, uop) = execute_with(uop, &[7, 8]);
    assert!(!uop.branch_taken());
    assert_eq!(uop.branch_address(), 0x1004);
}

#[test]
fn jalr_links_and_redirects() {
    let uop = decode(jalr(1, 5, 4), 0x1000);
    let (link, uop) = execute_with(uop, &[0x2000]);
    assert_eq!(link, 0x1004);
    assert!(uop.branch_taken());
    assert_eq!(uop.branch_address(), 0x2004);
}

#[test]
fn direct_jump_reports_early_misprediction_when_predicted_not_taken() {
    let uop = decode(jal(0, 0x40), 0x1000);
    let (mispredicted, correct) =
        uop.check_early_branch_misprediction(BranchPrediction::not_taken());
    assert!(mispredicted);
    assert_eq!(correct, 0x1040);

    let (mispredicted, _) = uop.check_early_branch_misprediction(BranchPrediction {
        taken: true,
        target: 0x1040,
    });
    assert!(!mispredicted);
}

#[test]
fn non_branch_predicted_taken_is_an_early_misprediction() {
    let uop = decode(add(5, 6, 7), 0x1000);
    let (mispredicted, correct) = uop.check_early_branch_misprediction(BranchPrediction {
        taken: true,
        target: 0x2000,
    });
    assert!(mispredicted);
    assert_eq!(correct, 0x1004);
}

#[test]
fn load_address_generation_and_sign_extension() {
    let mut uop = decode(lw(5, 6, -4), 0x1000);
    uop.supply_operand(0, RegisterValue::from_u64_full(0x104));
    uop.generate_addresses();
    let targets = uop.generated_addresses();
    assert_eq!(targets.len(), 1);
    assert_eq!((targets[0].address, targets[0].size), (0x100, 4));

    uop.supply_data(0x100, RegisterValue::from_u64(0xFFFF_FFFF, 4));
    assert!(uop.has_all_data());
    uop.execute();
    assert_eq!(uop.results()[0].as_u64(), u64::MAX, "lw sign-extends");
}

#[test]
fn invalid_memory_data_records_a_page_fault() {
    let mut uop = decode(ld(5, 6, 0), 0x1000);
    uop.supply_operand(0, RegisterValue::from_u64_full(0x100));
    uop.generate_addresses();
    uop.supply_data(0x100, RegisterValue::invalid());
    uop.execute();
    assert_eq!(uop.exception(), Some(InstructionException::PageFault));
}

#[test]
fn store_produces_truncated_data() {
    let mut uop = decode(sw(7, 6, 0x10), 0x1000);
    uop.supply_operand(0, RegisterValue::from_u64_full(0x200));
    uop.supply_operand(1, RegisterValue::from_u64_full(0x1122_3344_5566_7788));
    uop.generate_addresses();
    uop.execute();
    assert_eq!(uop.data().len(), 1);
    assert_eq!(uop.data()[0].as_bytes(), &[0x88, 0x77, 0x66, 0x55]);
}

#[rstest]
#[case::division_by_zero(0, u64::MAX)]
#[case::exact(4, 5)]
fn division_by_zero_yields_all_ones(#[case] divisor: u64, #[case] expected: u64) {
    let uop = decode(div(5, 6, 7), 0x0);
    let (result, _) = execute_with(uop, &[20, divisor]);
    assert_eq!(result, expected);
}

fn div(rd: u32, rs1: u32, rs2: u32) -> u32 {
    (1 << 25) | (rs2 << 20) | (rs1 << 15) | (0b100 << 12) | (rd << 7) | 0x33
}
