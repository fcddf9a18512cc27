//! Register alias table.
//!
//! Maps each architectural register to its current physical tag, with a
//! free list per register type and the rollback history needed to undo
//! speculative renames:
//! 1. **Allocate:** At rename, pop a free tag, remember the previous
//!    mapping under the new tag, repoint the mapping.
//! 2. **Commit:** Free the *previous* tag of a retiring destination.
//! 3. **Rewind:** On flush, restore the previous mapping and free the
//!    speculatively allocated tag.
//!
//! At any time a physical tag is exactly one of: free, mapped, or a
//! "previous" entry awaiting commit.

use crate::common::reg::Register;

/// Architectural-to-physical register mapping with rollback history.
pub struct RegisterAliasTable {
    /// Current mapping, `[type][architectural] -> physical`.
    mapping: Vec<Vec<i16>>,
    /// Rollback history, `[type][physical] -> previously mapped physical`.
    history: Vec<Vec<i16>>,
    /// Allocation owner, `[type][physical] -> architectural destination`.
    destination: Vec<Vec<i16>>,
    /// Free physical tags per type.
    free: Vec<std::collections::VecDeque<i16>>,
}

impl RegisterAliasTable {
    /// Creates an alias table.
    ///
    /// Architectural register `i` starts mapped to physical tag `i`; the
    /// remaining physical tags form the free list.
    pub fn new(architectural_counts: &[usize], physical_counts: &[usize]) -> Self {
        debug_assert_eq!(architectural_counts.len(), physical_counts.len());
        let mut mapping = Vec::new();
        let mut history = Vec::new();
        let mut destination = Vec::new();
        let mut free = Vec::new();

        for (&arch, &phys) in architectural_counts.iter().zip(physical_counts) {
            debug_assert!(phys > arch);
            mapping.push((0..arch as i16).collect());
            history.push(vec![-1; phys]);
            destination.push(vec![-1; phys]);
            free.push((arch as i16..phys as i16).collect());
        }

        Self {
            mapping,
            history,
            destination,
            free,
        }
    }

    /// Returns the physical register currently mapped for `reg`.
    pub fn mapping(&self, reg: Register) -> Register {
        if reg.is_zero() {
            return reg;
        }
        Register::new(reg.reg_type, self.mapping[reg.reg_type as usize][reg.index()])
    }

    /// Returns true if `count` destinations of this type can be renamed.
    pub fn can_allocate(&self, reg_type: u8, count: usize) -> bool {
        self.free[reg_type as usize].len() >= count
    }

    /// Returns the number of free tags for a register type.
    pub fn free_tags(&self, reg_type: u8) -> usize {
        self.free[reg_type as usize].len()
    }

    /// Allocates a physical tag for an architectural destination.
    ///
    /// The caller must have checked `can_allocate`. Zero registers must not
    /// be allocated.
    pub fn allocate(&mut self, reg: Register) -> Register {
        debug_assert!(!reg.is_zero());
        let type_index = reg.reg_type as usize;
        let tag = self.free[type_index]
            .pop_front()
            .expect("allocation from empty free list");

        self.history[type_index][tag as usize] = self.mapping[type_index][reg.index()];
        self.destination[type_index][tag as usize] = reg.tag;
        self.mapping[type_index][reg.index()] = tag;

        Register::new(reg.reg_type, tag)
    }

    /// Retires a renamed destination, freeing the tag it superseded.
    pub fn commit(&mut self, reg: Register) {
        debug_assert!(!reg.is_zero());
        let type_index = reg.reg_type as usize;
        let previous = self.history[type_index][reg.index()];
        if previous >= 0 {
            self.free[type_index].push_back(previous);
        }
        self.history[type_index][reg.index()] = -1;
    }

    /// Rolls back a speculative rename, restoring the previous mapping and
    /// freeing the allocated tag. Rewinds must run youngest-first.
    pub fn rewind(&mut self, reg: Register) {
        debug_assert!(!reg.is_zero());
        let type_index = reg.reg_type as usize;
        let arch = self.destination[type_index][reg.index()];
        debug_assert!(arch >= 0, "rewind of an unallocated tag");

        self.mapping[type_index][arch as usize] = self.history[type_index][reg.index()];
        self.history[type_index][reg.index()] = -1;
        self.destination[type_index][reg.index()] = -1;
        self.free[type_index].push_back(reg.tag);
    }
}
