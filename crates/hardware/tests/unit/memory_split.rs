//! Split-transaction memory interface tests.

use proptest::prelude::*;

use oosim_core::common::value::RegisterValue;
use oosim_core::memory::{
    MemoryAccessTarget, MemoryCommand, MemoryInterface, SplitMemoryInterface,
};

use crate::common::{RecordingLowerModel, ReversingLowerModel};

const LINE: u64 = 64;

fn interface() -> (
    SplitMemoryInterface,
    std::rc::Rc<std::cell::RefCell<Vec<oosim_core::memory::MemoryPacket>>>,
) {
    let (lower, sent) = RecordingLowerModel::new();
    (
        SplitMemoryInterface::new(Box::new(lower), 1 << 20, LINE),
        sent,
    )
}

#[test]
fn straddling_read_splits_into_two_children() {
    let (mut memory, sent) = interface();
    memory.request_read(MemoryAccessTarget::new(62, 4), 7);

    let sent = sent.borrow();
    assert_eq!(sent.len(), 2);
    assert_eq!((sent[0].address, sent[0].size), (62, 2));
    assert_eq!((sent[1].address, sent[1].size), (64, 2));
    assert!(sent.iter().all(|p| p.command == MemoryCommand::Read));
}

#[test]
fn split_read_merges_in_arrival_order() {
    let (mut memory, sent) = interface();
    memory.request_read(MemoryAccessTarget::new(62, 4), 7);
    let (id1, id2) = {
        let sent = sent.borrow();
        (sent[0].id, sent[1].id)
    };

    memory.handle_response(true, id1, vec![0xAA, 0xBB]);
    assert!(memory.completed_reads().is_empty(), "half is not a result");
    memory.handle_response(true, id2, vec![0xCC, 0xDD]);

    let reads = memory.completed_reads();
    assert_eq!(reads.len(), 1);
    assert_eq!(reads[0].request_id, 7);
    assert_eq!(reads[0].target, MemoryAccessTarget::new(62, 4));
    assert_eq!(reads[0].value.as_bytes(), &[0xAA, 0xBB, 0xCC, 0xDD]);
    assert!(!memory.has_pending_requests());
}

#[test]
fn split_read_merges_identically_in_reverse_arrival_order() {
    let (mut memory, sent) = interface();
    memory.request_read(MemoryAccessTarget::new(62, 4), 7);
    let (id1, id2) = {
        let sent = sent.borrow();
        (sent[0].id, sent[1].id)
    };

    memory.handle_response(true, id2, vec![0xCC, 0xDD]);
    memory.handle_response(true, id1, vec![0xAA, 0xBB]);

    let reads = memory.completed_reads();
    assert_eq!(reads.len(), 1);
    assert_eq!(reads[0].value.as_bytes(), &[0xAA, 0xBB, 0xCC, 0xDD]);
}

#[test]
fn aligned_read_is_not_split() {
    let (mut memory, sent) = interface();
    memory.request_read(MemoryAccessTarget::new(8, 8), 1);

    assert_eq!(sent.borrow().len(), 1);
    memory.handle_response(true, sent.borrow()[0].id, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    assert_eq!(memory.completed_reads()[0].value.as_u64(), 0x0807_0605_0403_0201);
}

#[test]
fn out_of_range_read_completes_invalid_immediately() {
    let (mut memory, sent) = interface();
    memory.request_read(MemoryAccessTarget::new((1 << 20) - 2, 4), 3);

    assert!(sent.borrow().is_empty(), "nothing sent downstream");
    let reads = memory.completed_reads();
    assert_eq!(reads.len(), 1);
    assert!(!reads[0].value.is_valid());
    assert!(!memory.has_pending_requests());
}

#[test]
fn split_write_keeps_no_join_state() {
    let (mut memory, sent) = interface();
    memory.request_write(
        MemoryAccessTarget::new(62, 4),
        RegisterValue::new(vec![0x11, 0x22, 0x33, 0x44]),
    );

    {
        let sent = sent.borrow();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].payload.as_deref(), Some(&[0x11, 0x22][..]));
        assert_eq!(sent[1].payload.as_deref(), Some(&[0x33, 0x44][..]));
    }

    // Each write child completes independently.
    let (id1, id2) = {
        let sent = sent.borrow();
        (sent[0].id, sent[1].id)
    };
    assert!(memory.has_pending_requests());
    memory.handle_response(false, id2, Vec::new());
    assert!(memory.has_pending_requests());
    memory.handle_response(false, id1, Vec::new());
    assert!(!memory.has_pending_requests());
    assert!(memory.completed_reads().is_empty());
}

proptest! {
    /// Any access merged from split halves equals a direct read of the
    /// same bytes, for either arrival order.
    #[test]
    fn merged_split_read_matches_backing_memory(
        address in 0u64..512,
        size in 1u16..=16,
    ) {
        let backing: Vec<u8> = (0..1024u32).map(|i| (i % 251) as u8).collect();
        let expected =
            backing[address as usize..address as usize + size as usize].to_vec();

        let mut memory = SplitMemoryInterface::new(
            Box::new(ReversingLowerModel::new(backing)),
            1024,
            LINE,
        );
        memory.request_read(MemoryAccessTarget::new(address, size), 5);
        // The reversing model answers newest-first, so split halves
        // always arrive out of order.
        memory.tick();

        let reads = memory.completed_reads();
        prop_assert_eq!(reads.len(), 1);
        prop_assert_eq!(reads[0].value.as_bytes(), &expected[..]);
        prop_assert!(!memory.has_pending_requests());
    }
}
