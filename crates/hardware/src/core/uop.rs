//! In-flight uop storage.
//!
//! A uop lives in many containers at once while in flight (reorder buffer,
//! reservation station ready queues, dependency matrix, execution unit
//! pipelines, completion slots, load/store queues). Rather than shared
//! ownership, uops are arena-allocated and every container holds an
//! integer handle; flushing is a bit flip on the arena slot. The reorder
//! buffer owns the lifecycle of renamed uops; pre-rename uops are released
//! by whichever front-end structure drops them.

use crate::isa::{BranchPrediction, Instruction};

/// Handle to an in-flight uop in the [`UopArena`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UopId(u32);

/// A macro-op: the uop handles predecoded from one architectural
/// instruction. An empty vector marks an empty pipeline slot.
pub type MacroOp = Vec<UopId>;

/// An in-flight uop: the ISA operation plus core-owned identity and
/// lifecycle state.
pub struct Uop {
    /// The ISA-specific operation.
    pub op: Box<dyn Instruction>,
    /// Architectural program order of the parent instruction.
    pub instruction_id: u64,
    /// Emission order among uops; assigned at decode.
    pub sequence_id: u64,
    /// The branch prediction made at fetch.
    pub prediction: BranchPrediction,
    /// Set once the uop has executed.
    pub executed: bool,
    /// Set once the uop may commit.
    pub can_commit: bool,
    /// Set on executed micro-ops awaiting group commit.
    pub waiting_commit: bool,
    /// Set when the uop has been flushed.
    pub flushed: bool,
}

impl Uop {
    /// Creates a fresh uop around an ISA operation.
    pub fn new(op: Box<dyn Instruction>, instruction_id: u64, prediction: BranchPrediction) -> Self {
        Self {
            op,
            instruction_id,
            sequence_id: 0,
            prediction,
            executed: false,
            can_commit: false,
            waiting_commit: false,
            flushed: false,
        }
    }

    /// Returns the uop's program-order identity.
    #[inline]
    pub fn ids(&self) -> (u64, u64) {
        (self.instruction_id, self.sequence_id)
    }

    /// Returns true if this uop is older than the given identity.
    #[inline]
    pub fn is_older_than(&self, ids: (u64, u64)) -> bool {
        self.ids() < ids
    }

    /// Checks the resolved branch outcome against the fetch-time prediction.
    ///
    /// Valid only after execution: mispredicted if the taken state was
    /// wrongly predicted, or taken with the wrong target.
    pub fn was_branch_mispredicted(&self) -> bool {
        debug_assert!(self.executed);
        let taken = self.op.branch_taken();
        taken != self.prediction.taken
            || (taken && self.prediction.target != self.op.branch_address())
    }
}

/// Returns the identity immediately preceding `ids` in program order, or
/// `None` if `ids` is the very first uop. Flushing "after" the returned
/// identity flushes the uop with `ids` itself and everything younger.
pub fn ids_before(ids: (u64, u64)) -> Option<(u64, u64)> {
    match ids {
        (0, 0) => None,
        (instruction_id, 0) => Some((instruction_id - 1, u64::MAX)),
        (instruction_id, sequence_id) => Some((instruction_id, sequence_id - 1)),
    }
}

/// Slab of in-flight uops addressed by [`UopId`].
#[derive(Default)]
pub struct UopArena {
    slots: Vec<Option<Uop>>,
    free: Vec<u32>,
}

impl UopArena {
    /// Creates an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a uop and returns its handle.
    pub fn insert(&mut self, uop: Uop) -> UopId {
        match self.free.pop() {
            Some(index) => {
                self.slots[index as usize] = Some(uop);
                UopId(index)
            }
            None => {
                self.slots.push(Some(uop));
                UopId((self.slots.len() - 1) as u32)
            }
        }
    }

    /// Returns a reference to the uop behind `id`.
    ///
    /// # Panics
    ///
    /// Panics if the handle is stale; handles must not outlive release.
    pub fn get(&self, id: UopId) -> &Uop {
        self.slots[id.0 as usize].as_ref().expect("stale uop handle")
    }

    /// Returns a mutable reference to the uop behind `id`.
    pub fn get_mut(&mut self, id: UopId) -> &mut Uop {
        self.slots[id.0 as usize].as_mut().expect("stale uop handle")
    }

    /// Marks the uop flushed.
    #[inline]
    pub fn set_flushed(&mut self, id: UopId) {
        self.get_mut(id).flushed = true;
    }

    /// Returns true if the uop has been flushed.
    #[inline]
    pub fn is_flushed(&self, id: UopId) -> bool {
        self.get(id).flushed
    }

    /// Destroys the uop and recycles its slot.
    pub fn release(&mut self, id: UopId) {
        debug_assert!(self.slots[id.0 as usize].is_some(), "double release");
        self.slots[id.0 as usize] = None;
        self.free.push(id.0);
    }

    /// Returns the number of live uops.
    pub fn in_flight(&self) -> usize {
        self.slots.len() - self.free.len()
    }
}
