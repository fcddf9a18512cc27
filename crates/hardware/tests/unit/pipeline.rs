//! Full-core runs of assembled RV64 programs.
//!
//! Each program ends with an `exit` syscall; the guest exit code carries
//! the computed result out of the simulation.

use pretty_assertions::assert_eq;

use oosim_core::Simulator;
use oosim_core::config::{Config, MemoryInterfaceKind, PredictorKind};

use crate::common::assemble::*;
use crate::common::test_config;

const LOAD_ADDRESS: u64 = 0x1000;

fn run(config: &Config, program: Vec<u32>) -> (Option<u64>, Simulator) {
    crate::common::init_tracing();
    let mut simulator =
        Simulator::from_encodings(config, &program, LOAD_ADDRESS).expect("construction");
    assert!(simulator.run_for(100_000), "program did not halt");
    (simulator.core().exit_code(), simulator)
}

/// Sums 1..=10 in a countdown loop.
fn sum_loop_program() -> Vec<u32> {
    let mut program = vec![
        addi(5, 0, 0),  // x5 = sum
        addi(6, 0, 10), // x6 = i
        // loop:
        add(5, 5, 6),
        addi(6, 6, -1),
        bne(6, 0, -8),
    ];
    program.extend(exit_with(5));
    program
}

#[test]
fn arithmetic_loop_retires_in_program_order() {
    let (exit_code, simulator) = run(&test_config(), sum_loop_program());
    assert_eq!(exit_code, Some(55));

    let stats = simulator.stats();
    let stats = stats.borrow();
    // 2 setup + 10 iterations of 3 + 3 exit instructions.
    assert_eq!(stats.value_of("rob.instructionsCommitted"), 35);
    assert_eq!(stats.value_of("branch.retired"), 10);
}

#[test]
fn arithmetic_loop_works_without_prediction() {
    let mut config = test_config();
    config.branch_predictor.kind = PredictorKind::AlwaysNotTaken;

    let (exit_code, simulator) = run(&config, sum_loop_program());
    assert_eq!(exit_code, Some(55));

    // Nine taken branches, each resolved as a misprediction at execute.
    let stats = simulator.stats();
    let stats = stats.borrow();
    assert_eq!(stats.value_of("branch.mispredicted"), 9);
    assert!(stats.value_of("core.flushes") >= 9);
}

#[test]
fn taken_branch_squashes_wrong_path() {
    let mut program = vec![
        addi(5, 0, 1),
        beq(0, 0, 8),   // always taken; cold predictor says not taken
        addi(5, 0, 99), // wrong path, must not commit
    ];
    program.extend(exit_with(5));

    let (exit_code, simulator) = run(&test_config(), program);
    assert_eq!(exit_code, Some(1));

    let stats = simulator.stats();
    let stats = stats.borrow();
    assert!(stats.value_of("branch.mispredicted") >= 1);
    // The squashed addi never retires: setup + branch + 3 exit uops.
    assert_eq!(stats.value_of("rob.instructionsCommitted"), 5);
}

#[test]
fn direct_jump_flushes_early_from_decode() {
    let mut program = vec![
        addi(5, 0, 5),
        jal(0, 8),      // skips the next instruction
        addi(5, 0, 99), // never executed
    ];
    program.extend(exit_with(5));

    let (exit_code, simulator) = run(&test_config(), program);
    assert_eq!(exit_code, Some(5));

    let stats = simulator.stats();
    let stats = stats.borrow();
    assert!(stats.value_of("decode.earlyFlushes") >= 1);
}

#[test]
fn store_load_round_trip_through_fixed_latency_memory() {
    let mut config = test_config();
    config.memory.interface = MemoryInterfaceKind::FixedLatency;
    config.memory.access_latency = 6;

    let mut program = vec![
        addi(5, 0, 42),
        sd(5, 0, 0x200), // mem[0x200] = 42
        ld(6, 0, 0x200), // x6 = mem[0x200]
    ];
    program.extend(exit_with(6));

    let (exit_code, _) = run(&config, program);
    assert_eq!(exit_code, Some(42));
}

#[test]
fn store_load_round_trip_through_split_memory() {
    let mut config = test_config();
    config.memory.interface = MemoryInterfaceKind::Split;
    config.memory.access_latency = 3;

    // 60 + 8 straddles the 64-byte line: both the store and the load are
    // split into two child transactions and merged.
    let mut program = vec![
        addi(5, 0, 127),
        sd(5, 0, 60),
        ld(6, 0, 60),
    ];
    program.extend(exit_with(6));

    let (exit_code, _) = run(&config, program);
    assert_eq!(exit_code, Some(127));
}

#[test]
fn dependent_multiplies_respect_latency() {
    let mut program = vec![
        addi(5, 0, 3),
        addi(6, 0, 4),
        mul(7, 5, 6),  // 12
        addi(8, 0, 5),
        mul(7, 7, 8),  // 60
    ];
    program.extend(exit_with(7));

    let (exit_code, _) = run(&test_config(), program);
    assert_eq!(exit_code, Some(60));
}

#[test]
fn uname_fills_the_guest_buffer() {
    let mut program = vec![
        addi(10, 0, 0x200), // a0 = utsname buffer
        addi(17, 0, 160),   // a7 = uname
        ecall(),
        lbu(6, 0, 0x200), // first byte of sysname, 'L'
    ];
    program.extend(exit_with(6));

    let (exit_code, _) = run(&test_config(), program);
    assert_eq!(exit_code, Some(u64::from(b'L')));
}

#[test]
fn load_outside_process_image_halts_fatally() {
    let program = vec![
        lui(5, 0x400), // x5 = 4 MiB, beyond the 1 MiB image
        ld(6, 5, 0),
        ecall(),
    ];

    let mut simulator =
        Simulator::from_encodings(&test_config(), &program, LOAD_ADDRESS).expect("construction");
    assert!(simulator.run_for(100_000), "core did not halt");
    assert_eq!(simulator.core().exit_code(), None, "fault, not an exit");
}

#[test]
fn statistics_surface_exposes_required_counters() {
    let (_, simulator) = run(&test_config(), sum_loop_program());
    let stats = simulator.stats();
    let stats = stats.borrow();
    let map = stats.get_stats();

    for name in [
        "dispatch.rsStalls",
        "issue.frontendStalls",
        "issue.backendStalls",
        "issue.portBusyStalls",
    ] {
        assert!(map.contains_key(name), "missing counter {name}");
    }
    for port in ["ALU0", "ALU1", "LSU"] {
        for prefix in [
            "issue.possibleIssues",
            "issue.actualIssues",
            "issue.frontendSlotStalls",
            "issue.backendSlotStalls",
            "issue.portBusySlotStalls",
        ] {
            let name = format!("{prefix}.{port}");
            assert!(map.contains_key(&name), "missing counter {name}");
        }
    }
}
