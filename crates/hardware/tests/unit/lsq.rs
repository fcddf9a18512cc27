//! Load/store queue tests.

use oosim_core::common::value::RegisterValue;
use oosim_core::core::pipeline::buffer::PipelineBuffer;
use oosim_core::core::pipeline::lsq::LoadStoreQueue;
use oosim_core::core::uop::{Uop, UopArena, UopId};
use oosim_core::isa::BranchPrediction;
use oosim_core::memory::{
    FlatMemoryInterface, MemoryAccessTarget, MemoryInterface, new_process_memory,
};
use oosim_core::stats::{SharedStats, Statistics};

use crate::common::{StubInstruction, test_config};

struct Harness {
    lsq: LoadStoreQueue,
    arena: UopArena,
    memory: FlatMemoryInterface,
    completion: PipelineBuffer<Option<UopId>>,
    stats: SharedStats,
}

fn harness() -> Harness {
    let stats = Statistics::new_shared();
    Harness {
        lsq: LoadStoreQueue::new(&test_config(), stats.clone()),
        arena: UopArena::new(),
        memory: FlatMemoryInterface::new(new_process_memory(1024)),
        completion: PipelineBuffer::new(2),
        stats,
    }
}

fn insert(h: &mut Harness, stub: StubInstruction, ids: (u64, u64)) -> UopId {
    let id = h
        .arena
        .insert(Uop::new(Box::new(stub), ids.0, BranchPrediction::not_taken()));
    h.arena.get_mut(id).sequence_id = ids.1;
    id
}

#[test]
fn load_reads_memory_through_the_interface() {
    let mut h = harness();
    let backing = new_process_memory(1024);
    backing.borrow_mut()[200..204].copy_from_slice(&[1, 2, 3, 4]);
    h.memory = FlatMemoryInterface::new(backing);

    let load = insert(
        &mut h,
        StubInstruction::new(0x10).as_load(vec![MemoryAccessTarget::new(200, 4)]),
        (0, 0),
    );
    h.lsq.add_load(load);
    h.lsq.start_load(load, &h.arena, 0);

    // Cycle 0: the request is issued; cycle 1: the response is consumed.
    h.lsq.tick(&mut h.arena, &mut h.memory, &mut h.completion, 0);
    assert!(!h.arena.get(load).executed);
    h.lsq.tick(&mut h.arena, &mut h.memory, &mut h.completion, 1);

    assert!(h.arena.get(load).executed);
    assert_eq!(h.completion.tail_slots()[0], Some(load));
}

#[test]
fn covered_load_forwards_from_older_store() {
    let mut h = harness();

    let store = insert(
        &mut h,
        StubInstruction::new(0x10).as_store(
            vec![MemoryAccessTarget::new(100, 8)],
            vec![RegisterValue::new(vec![1, 2, 3, 4, 5, 6, 7, 8])],
        ),
        (0, 0),
    );
    h.arena.get_mut(store).executed = true;
    h.lsq.add_store(store);

    let load = insert(
        &mut h,
        StubInstruction::new(0x14).as_load(vec![MemoryAccessTarget::new(102, 4)]),
        (1, 1),
    );
    h.lsq.add_load(load);
    h.lsq.start_load(load, &h.arena, 0);
    h.lsq.tick(&mut h.arena, &mut h.memory, &mut h.completion, 0);

    // The store fully covers the load, so no memory request is needed and
    // the load completes in the same cycle.
    assert!(h.arena.get(load).executed);
    assert_eq!(h.completion.tail_slots()[0], Some(load));
    assert_eq!(h.stats.borrow().value_of("lsq.forwardedLoads"), 1);
}

#[test]
fn partially_covered_load_goes_to_memory() {
    let mut h = harness();

    let store = insert(
        &mut h,
        StubInstruction::new(0x10).as_store(
            vec![MemoryAccessTarget::new(100, 2)],
            vec![RegisterValue::new(vec![9, 9])],
        ),
        (0, 0),
    );
    h.arena.get_mut(store).executed = true;
    h.lsq.add_store(store);

    let load = insert(
        &mut h,
        StubInstruction::new(0x14).as_load(vec![MemoryAccessTarget::new(100, 4)]),
        (1, 1),
    );
    h.lsq.add_load(load);
    h.lsq.start_load(load, &h.arena, 0);
    h.lsq.tick(&mut h.arena, &mut h.memory, &mut h.completion, 0);

    assert_eq!(h.stats.borrow().value_of("lsq.forwardedLoads"), 0);
    assert!(!h.arena.get(load).executed, "waiting on the memory response");
}

#[test]
fn store_commit_over_executed_younger_load_is_a_violation() {
    let mut h = harness();

    let store = insert(
        &mut h,
        StubInstruction::new(0x10).as_store(
            vec![MemoryAccessTarget::new(100, 4)],
            vec![RegisterValue::new(vec![1, 2, 3, 4])],
        ),
        (0, 0),
    );
    h.arena.get_mut(store).executed = true;
    h.lsq.add_store(store);

    let load = insert(
        &mut h,
        StubInstruction::new(0x40).as_load(vec![MemoryAccessTarget::new(102, 2)]),
        (1, 1),
    );
    h.arena.get_mut(load).executed = true;
    h.lsq.add_load(load);

    let violation = h.lsq.commit_store(store, &h.arena, &mut h.memory);
    assert!(violation);

    let (after, address) = h.lsq.take_flush().expect("flush raised");
    assert_eq!(after, Some((1, 0)), "flush includes the load itself");
    assert_eq!(address, 0x40, "refetch from the load");
    assert_eq!(h.stats.borrow().value_of("lsq.loadViolations"), 1);
    assert!(h.lsq.take_flush().is_none(), "flush is consumed");
}

#[test]
fn store_commit_with_no_overlap_is_clean() {
    let mut h = harness();

    let store = insert(
        &mut h,
        StubInstruction::new(0x10).as_store(
            vec![MemoryAccessTarget::new(100, 4)],
            vec![RegisterValue::new(vec![1, 2, 3, 4])],
        ),
        (0, 0),
    );
    h.arena.get_mut(store).executed = true;
    h.lsq.add_store(store);

    let load = insert(
        &mut h,
        StubInstruction::new(0x40).as_load(vec![MemoryAccessTarget::new(200, 4)]),
        (1, 1),
    );
    h.arena.get_mut(load).executed = true;
    h.lsq.add_load(load);

    assert!(!h.lsq.commit_store(store, &h.arena, &mut h.memory));
    assert!(h.lsq.take_flush().is_none());
    // The store's write reached the memory interface.
    h.memory.request_read(MemoryAccessTarget::new(100, 4), 9);
    assert_eq!(h.memory.completed_reads()[0].value.as_bytes(), &[1, 2, 3, 4]);
}

#[test]
fn purge_discards_flushed_queue_entries() {
    let mut h = harness();

    let load = insert(
        &mut h,
        StubInstruction::new(0x10).as_load(vec![MemoryAccessTarget::new(100, 4)]),
        (0, 0),
    );
    h.lsq.add_load(load);
    h.lsq.start_load(load, &h.arena, 0);

    h.arena.set_flushed(load);
    h.lsq.purge_flushed(&h.arena);
    assert_eq!(h.lsq.occupancy(), (0, 0));

    // The pending request was dropped with it; ticking does nothing.
    h.lsq.tick(&mut h.arena, &mut h.memory, &mut h.completion, 5);
    assert!(h.completion.tail_slots().iter().all(Option::is_none));
}
