//! Reorder buffer tests.

use oosim_core::common::reg::Register;
use oosim_core::core::bru::BranchPredictorWrapper;
use oosim_core::core::pipeline::lsq::LoadStoreQueue;
use oosim_core::core::pipeline::rob::ReorderBuffer;
use oosim_core::core::rat::RegisterAliasTable;
use oosim_core::core::uop::{Uop, UopArena, UopId};
use oosim_core::isa::BranchPrediction;
use oosim_core::memory::{FlatMemoryInterface, new_process_memory};
use oosim_core::stats::{SharedStats, Statistics};

use crate::common::{StubInstruction, test_config};

struct Harness {
    rob: ReorderBuffer,
    arena: UopArena,
    rat: RegisterAliasTable,
    lsq: LoadStoreQueue,
    predictor: BranchPredictorWrapper,
    memory: FlatMemoryInterface,
    stats: SharedStats,
}

fn harness() -> Harness {
    let config = test_config();
    let stats = Statistics::new_shared();
    Harness {
        rob: ReorderBuffer::new(8, stats.clone()),
        arena: UopArena::new(),
        rat: RegisterAliasTable::new(&[4], &[8]),
        lsq: LoadStoreQueue::new(&config, stats.clone()),
        predictor: BranchPredictorWrapper::new(&config),
        memory: FlatMemoryInterface::new(new_process_memory(1024)),
        stats,
    }
}

fn insert(h: &mut Harness, stub: StubInstruction, ids: (u64, u64)) -> UopId {
    let id = h
        .arena
        .insert(Uop::new(Box::new(stub), ids.0, BranchPrediction::not_taken()));
    h.arena.get_mut(id).sequence_id = ids.1;
    h.rob.reserve(id);
    id
}

fn commit(h: &mut Harness, width: usize) {
    h.rob.commit(
        width,
        &mut h.arena,
        &mut h.rat,
        &mut h.lsq,
        &mut h.predictor,
        &mut h.memory,
    );
}

#[test]
fn head_commits_only_when_ready() {
    let mut h = harness();
    let first = insert(&mut h, StubInstruction::new(0), (0, 0));
    let second = insert(&mut h, StubInstruction::new(4), (1, 1));

    // The younger uop is ready first; program order still gates commit.
    h.arena.get_mut(second).can_commit = true;
    commit(&mut h, 4);
    assert_eq!(h.rob.len(), 2);
    assert_eq!(h.stats.borrow().value_of("rob.instructionsCommitted"), 0);

    h.arena.get_mut(first).can_commit = true;
    commit(&mut h, 4);
    assert!(h.rob.is_empty());
    assert_eq!(h.stats.borrow().value_of("rob.instructionsCommitted"), 2);
}

#[test]
fn commit_width_bounds_retirement() {
    let mut h = harness();
    for i in 0..4 {
        let id = insert(&mut h, StubInstruction::new(i * 4), (i, i));
        h.arena.get_mut(id).can_commit = true;
    }

    commit(&mut h, 2);
    assert_eq!(h.rob.len(), 2);
    commit(&mut h, 2);
    assert!(h.rob.is_empty());
}

#[test]
fn micro_op_group_commits_atomically() {
    let mut h = harness();
    let first = insert(&mut h, StubInstruction::new(0).as_micro_op(false), (0, 0));
    let last = insert(&mut h, StubInstruction::new(0).as_micro_op(true), (0, 1));

    // Only the first micro-op has written back; the group must wait.
    h.arena.get_mut(first).waiting_commit = true;
    commit(&mut h, 4);
    assert_eq!(h.rob.len(), 2);

    h.arena.get_mut(last).waiting_commit = true;
    commit(&mut h, 4);
    assert!(h.rob.is_empty());
    // One architectural instruction retired, counted at its last micro-op.
    assert_eq!(h.stats.borrow().value_of("rob.instructionsCommitted"), 1);
}

#[test]
fn exception_at_head_halts_commit() {
    let mut h = harness();
    let mut stub = StubInstruction::new(0);
    stub.exception = Some(oosim_core::common::error::InstructionException::Syscall);
    let faulting = insert(&mut h, stub, (0, 0));
    h.arena.get_mut(faulting).can_commit = true;

    let behind = insert(&mut h, StubInstruction::new(4), (1, 1));
    h.arena.get_mut(behind).can_commit = true;

    commit(&mut h, 4);
    assert_eq!(h.rob.take_exception(), Some(faulting));
    assert_eq!(h.rob.len(), 2, "nothing retired past the exception");
}

#[test]
fn flush_rolls_back_renames_and_restores_free_list() {
    let mut h = harness();
    let arch = Register::new(0, 2);
    let free_before = h.rat.free_tags(0);
    let mapping_before = h.rat.mapping(arch);

    let survivor = insert(&mut h, StubInstruction::new(0), (0, 0));
    let doomed_stub = StubInstruction::new(4).with_destinations(vec![arch]);
    let doomed = insert(&mut h, doomed_stub, (1, 1));
    let physical = h.rat.allocate(arch);
    h.arena.get_mut(doomed).op.rename(&[physical], &[]);

    let flushed = h.rob.flush(Some((0, 0)), &mut h.arena, &mut h.rat);
    assert_eq!(flushed, vec![doomed]);
    assert!(h.arena.is_flushed(doomed));
    assert!(!h.arena.is_flushed(survivor));
    assert_eq!(h.rob.len(), 1);

    // Rename then flush restores the alias table exactly.
    assert_eq!(h.rat.mapping(arch), mapping_before);
    assert_eq!(h.rat.free_tags(0), free_before);
}

#[test]
fn flush_of_everything_empties_the_buffer() {
    let mut h = harness();
    for i in 0..3 {
        insert(&mut h, StubInstruction::new(i * 4), (i, i));
    }
    let flushed = h.rob.flush(None, &mut h.arena, &mut h.rat);
    assert_eq!(flushed.len(), 3);
    assert!(h.rob.is_empty());
}
