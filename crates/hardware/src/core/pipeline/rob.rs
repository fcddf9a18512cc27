//! Reorder buffer.
//!
//! FIFO of in-flight uops in dispatch order, enforcing program-order
//! retirement:
//! 1. **Reserve:** Rename inserts uops at the tail; a full ROB stalls it.
//! 2. **Commit:** The head retires while commit-ready, up to the commit
//!    width; stores write and are checked for order violations, branches
//!    train the predictor, rename history tags are freed.
//! 3. **Micro-ops:** A macro-op group commits atomically once every
//!    member has executed.
//! 4. **Exceptions:** A head uop carrying an exception halts commit and is
//!    surfaced for the ISA's exception handler.
//! 5. **Flush:** Marks every uop younger than a trigger as flushed and
//!    rolls the alias table back, youngest first.

use std::collections::VecDeque;

use crate::core::bru::{BranchPredictor, BranchPredictorWrapper};
use crate::core::pipeline::lsq::LoadStoreQueue;
use crate::core::rat::RegisterAliasTable;
use crate::core::uop::{UopArena, UopId};
use crate::memory::MemoryInterface;
use crate::stats::{SharedStats, StatId};

/// The reorder buffer.
pub struct ReorderBuffer {
    buffer: VecDeque<UopId>,
    capacity: usize,
    /// Exception at the head, awaiting the ISA handler.
    exception_uop: Option<UopId>,
    stats: SharedStats,
    instructions_committed: StatId,
    exceptions: StatId,
    branches_retired: StatId,
    branches_mispredicted: StatId,
}

impl ReorderBuffer {
    /// Creates a reorder buffer with the given capacity.
    pub fn new(capacity: usize, stats: SharedStats) -> Self {
        let mut registry = stats.borrow_mut();
        let instructions_committed = registry.register_stat("rob.instructionsCommitted");
        let exceptions = registry.register_stat("rob.exceptions");
        let branches_retired = registry.register_stat("branch.retired");
        let branches_mispredicted = registry.register_stat("branch.mispredicted");
        drop(registry);
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
            exception_uop: None,
            stats,
            instructions_committed,
            exceptions,
            branches_retired,
            branches_mispredicted,
        }
    }

    /// Returns true when no rename slot is available.
    pub fn is_full(&self) -> bool {
        self.buffer.len() == self.capacity
    }

    /// Returns the number of occupied entries.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true if no uops are in flight.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Inserts a renamed uop at the tail.
    pub fn reserve(&mut self, id: UopId) {
        debug_assert!(!self.is_full());
        self.buffer.push_back(id);
    }

    /// Takes the uop whose exception halted commit, if any.
    pub fn take_exception(&mut self) -> Option<UopId> {
        self.exception_uop.take()
    }

    /// Counts a uop retired through the exception handler.
    pub fn record_exception_commit(&mut self) {
        let mut stats = self.stats.borrow_mut();
        stats.increment(self.instructions_committed, 1);
        stats.increment(self.exceptions, 1);
    }

    /// Promotes a fully executed micro-op group at the head to
    /// commit-ready. Micro-ops retire atomically, so the group head waits
    /// until its last member has executed.
    fn commit_micro_ops(&mut self, arena: &mut UopArena) {
        let Some(&head) = self.buffer.front() else {
            return;
        };
        let head_uop = arena.get(head);
        if !head_uop.op.is_micro_op() || head_uop.can_commit || !head_uop.waiting_commit {
            return;
        }

        let mut group = Vec::new();
        for &id in &self.buffer {
            let uop = arena.get(id);
            if !uop.waiting_commit {
                return;
            }
            group.push(id);
            if uop.op.is_last_micro_op() {
                break;
            }
        }
        let Some(&last) = group.last() else {
            return;
        };
        if !arena.get(last).op.is_last_micro_op() {
            return;
        }
        for id in group {
            arena.get_mut(id).can_commit = true;
        }
    }

    /// Commits from the head while commit-ready, up to `width` uops.
    ///
    /// Stops early at an exception (surfaced via `take_exception`) or a
    /// store-order violation (surfaced via the LSQ's flush state).
    pub fn commit(
        &mut self,
        width: usize,
        arena: &mut UopArena,
        rat: &mut RegisterAliasTable,
        lsq: &mut LoadStoreQueue,
        predictor: &mut BranchPredictorWrapper,
        data_memory: &mut dyn MemoryInterface,
    ) {
        self.commit_micro_ops(arena);

        let mut committed = 0;
        while committed < width {
            let Some(&id) = self.buffer.front() else {
                break;
            };
            let uop = arena.get(id);
            if !uop.can_commit {
                break;
            }
            if uop.op.exception().is_some() {
                self.exception_uop = Some(id);
                break;
            }

            self.buffer.pop_front();
            let destinations = uop.op.destination_registers().to_vec();

            if uop.op.is_branch() {
                let mut stats = self.stats.borrow_mut();
                stats.increment(self.branches_retired, 1);
                if uop.was_branch_mispredicted() {
                    stats.increment(self.branches_mispredicted, 1);
                }
                drop(stats);
                predictor.update(
                    uop.op.address(),
                    uop.op.branch_taken(),
                    uop.op.branch_address(),
                );
            }

            if uop.op.is_load() {
                lsq.commit_load(id);
            }
            let violation = if uop.op.is_store() {
                lsq.commit_store(id, arena, data_memory)
            } else {
                false
            };

            let uop = arena.get(id);
            for reg in destinations.iter().filter(|reg| !reg.is_zero()) {
                rat.commit(*reg);
            }
            if uop.op.is_last_micro_op() {
                self.stats
                    .borrow_mut()
                    .increment(self.instructions_committed, 1);
            }
            tracing::trace!(address = uop.op.address(), "commit");

            arena.release(id);
            committed += 1;
            if violation {
                break;
            }
        }
    }

    /// Marks every uop strictly younger than `after` as flushed, rolls the
    /// alias table back youngest-first, and removes the uops from the
    /// buffer. `None` flushes everything. Returns the flushed handles; the
    /// caller releases them after purging the other containers.
    pub fn flush(
        &mut self,
        after: Option<(u64, u64)>,
        arena: &mut UopArena,
        rat: &mut RegisterAliasTable,
    ) -> Vec<UopId> {
        let mut flushed = Vec::new();
        while let Some(&id) = self.buffer.back() {
            let uop = arena.get(id);
            let younger = match after {
                None => true,
                Some(ids) => uop.ids() > ids,
            };
            if !younger {
                break;
            }
            self.buffer.pop_back();

            let destinations = uop.op.destination_registers().to_vec();
            for reg in destinations.iter().rev().filter(|reg| !reg.is_zero()) {
                rat.rewind(*reg);
            }
            arena.set_flushed(id);
            flushed.push(id);
        }
        flushed
    }
}
