//! Load/store queue.
//!
//! Tracks in-flight memory uops in program order, in either a combined or
//! a split load/store arrangement. Loads issue memory requests once their
//! addresses are known, reading forwarded data directly from an older
//! in-flight store when the store fully covers the load. Stores write at
//! commit; a store committing over a load that already executed
//! speculatively is a memory-order violation, flushing the load and
//! everything younger.

use std::collections::{HashMap, VecDeque};

use crate::common::value::RegisterValue;
use crate::config::Config;
use crate::core::pipeline::buffer::PipelineBuffer;
use crate::core::uop::{UopArena, UopId, ids_before};
use crate::memory::{MemoryAccessTarget, MemoryInterface};
use crate::stats::{SharedStats, StatId};

/// The load/store queue.
pub struct LoadStoreQueue {
    load_queue: VecDeque<UopId>,
    store_queue: VecDeque<UopId>,
    /// Shared capacity when the queue is combined.
    combined_capacity: Option<usize>,
    max_loads: usize,
    max_stores: usize,
    /// Loads whose addresses are known, awaiting request issue.
    pending_requests: VecDeque<(u64, UopId)>,
    /// Outstanding read request id to load uop.
    outstanding: HashMap<u64, UopId>,
    next_request_id: u64,
    /// Executed loads awaiting a completion slot.
    completed_loads: VecDeque<UopId>,
    should_flush: bool,
    flush_after: Option<(u64, u64)>,
    flush_address: u64,
    stats: SharedStats,
    load_violations: StatId,
    forwarded_loads: StatId,
}

impl LoadStoreQueue {
    /// Creates a load/store queue from configuration.
    pub fn new(config: &Config, stats: SharedStats) -> Self {
        let mut registry = stats.borrow_mut();
        let load_violations = registry.register_stat("lsq.loadViolations");
        let forwarded_loads = registry.register_stat("lsq.forwardedLoads");
        drop(registry);
        Self {
            load_queue: VecDeque::new(),
            store_queue: VecDeque::new(),
            combined_capacity: config.queues.combined,
            max_loads: config.queues.load,
            max_stores: config.queues.store,
            pending_requests: VecDeque::new(),
            outstanding: HashMap::new(),
            next_request_id: 0,
            completed_loads: VecDeque::new(),
            should_flush: false,
            flush_after: None,
            flush_address: 0,
            stats,
            load_violations,
            forwarded_loads,
        }
    }

    fn total_occupancy(&self) -> usize {
        self.load_queue.len() + self.store_queue.len()
    }

    /// Returns true if a load slot is available.
    pub fn can_add_load(&self) -> bool {
        match self.combined_capacity {
            Some(capacity) => self.total_occupancy() < capacity,
            None => self.load_queue.len() < self.max_loads,
        }
    }

    /// Returns true if a store slot is available.
    pub fn can_add_store(&self) -> bool {
        match self.combined_capacity {
            Some(capacity) => self.total_occupancy() < capacity,
            None => self.store_queue.len() < self.max_stores,
        }
    }

    /// Reserves a load queue slot; called at rename.
    pub fn add_load(&mut self, id: UopId) {
        debug_assert!(self.can_add_load());
        self.load_queue.push_back(id);
    }

    /// Reserves a store queue slot; called at rename.
    pub fn add_store(&mut self, id: UopId) {
        debug_assert!(self.can_add_store());
        self.store_queue.push_back(id);
    }

    /// Begins a load whose addresses were just generated.
    pub fn start_load(&mut self, id: UopId, arena: &UopArena, cycle: u64) {
        let latency = u64::from(arena.get(id).op.lsq_latency().max(1));
        self.pending_requests.push_back((cycle + latency - 1, id));
    }

    /// Notes that a store's addresses and data are now available for
    /// store-to-load forwarding.
    pub fn supply_store_data(&mut self, id: UopId, arena: &UopArena) {
        debug_assert!(self.store_queue.contains(&id));
        debug_assert!(arena.get(id).executed);
    }

    /// Takes the pending violation flush, if a store commit raised one.
    pub fn take_flush(&mut self) -> Option<(Option<(u64, u64)>, u64)> {
        if !self.should_flush {
            return None;
        }
        self.should_flush = false;
        Some((self.flush_after, self.flush_address))
    }

    /// Finds forwardable data for `target` from the youngest older store.
    fn forward_from_stores(
        &self,
        load_ids: (u64, u64),
        target: &MemoryAccessTarget,
        arena: &UopArena,
    ) -> Option<RegisterValue> {
        for &store in self.store_queue.iter().rev() {
            let uop = arena.get(store);
            if uop.ids() >= load_ids || !uop.executed {
                continue;
            }
            for (store_target, data) in uop
                .op
                .generated_addresses()
                .iter()
                .zip(uop.op.data())
            {
                if store_target.contains(target) {
                    let offset = (target.address - store_target.address) as usize;
                    let bytes =
                        data.as_bytes()[offset..offset + target.size as usize].to_vec();
                    return Some(RegisterValue::new(bytes));
                }
            }
        }
        None
    }

    fn finish_load(&mut self, id: UopId, arena: &mut UopArena) {
        let uop = arena.get_mut(id);
        uop.op.execute();
        uop.executed = true;
        self.completed_loads.push_back(id);
    }

    /// Ticks the queue: route completed memory responses to their loads,
    /// issue requests for loads whose addresses are ready, and move
    /// executed loads into the completion slots.
    pub fn tick(
        &mut self,
        arena: &mut UopArena,
        data_memory: &mut dyn MemoryInterface,
        completion: &mut PipelineBuffer<Option<UopId>>,
        cycle: u64,
    ) {
        // Responses handled between cycles are visible now.
        let results = data_memory.completed_reads().to_vec();
        data_memory.clear_completed_reads();
        for result in results {
            let Some(id) = self.outstanding.remove(&result.request_id) else {
                continue;
            };
            if arena.is_flushed(id) {
                // The load was squashed while its request was in flight.
                continue;
            }
            arena
                .get_mut(id)
                .op
                .supply_data(result.target.address, result.value);
            if arena.get(id).op.has_all_data() {
                self.finish_load(id, arena);
            }
        }

        // Issue requests for loads whose addresses became ready.
        while let Some(&(due, _)) = self.pending_requests.front() {
            if due > cycle {
                break;
            }
            let (_, id) = self.pending_requests.pop_front().expect("checked front");
            if arena.is_flushed(id) {
                continue;
            }
            let load_ids = arena.get(id).ids();
            let targets = arena.get(id).op.generated_addresses().to_vec();
            for target in targets {
                if let Some(data) = self.forward_from_stores(load_ids, &target, arena) {
                    arena.get_mut(id).op.supply_data(target.address, data);
                    self.stats.borrow_mut().increment(self.forwarded_loads, 1);
                } else {
                    let request_id = self.next_request_id;
                    self.next_request_id += 1;
                    self.outstanding.insert(request_id, id);
                    data_memory.request_read(target, request_id);
                }
            }
            if arena.get(id).op.has_all_data() {
                self.finish_load(id, arena);
            }
        }

        // Hand executed loads to writeback, bounded by the slot width.
        for slot in completion.tail_slots_mut() {
            if slot.is_some() {
                continue;
            }
            match self.completed_loads.pop_front() {
                Some(id) => *slot = Some(id),
                None => break,
            }
        }
    }

    /// Retires a load, releasing its queue slot.
    pub fn commit_load(&mut self, id: UopId) {
        if let Some(position) = self.load_queue.iter().position(|&other| other == id) {
            self.load_queue.remove(position);
        }
    }

    /// Retires a store: performs its writes and checks for a memory-order
    /// violation against younger loads that already executed. Returns true
    /// if a violation was found; the flush is retrieved via `take_flush`.
    pub fn commit_store(
        &mut self,
        id: UopId,
        arena: &UopArena,
        data_memory: &mut dyn MemoryInterface,
    ) -> bool {
        let front = self.store_queue.pop_front();
        debug_assert_eq!(front, Some(id), "stores must commit in order");

        let store = arena.get(id);
        let targets = store.op.generated_addresses().to_vec();
        for (target, data) in targets.iter().zip(store.op.data()) {
            data_memory.request_write(*target, data.clone());
        }

        // A younger load that executed before this store wrote has read
        // stale data if their ranges overlap; the oldest such load and
        // everything after it must refetch.
        let store_ids = store.ids();
        let mut violation: Option<UopId> = None;
        for &load in &self.load_queue {
            let uop = arena.get(load);
            if uop.ids() <= store_ids || !uop.executed || uop.flushed {
                continue;
            }
            let overlaps = uop
                .op
                .generated_addresses()
                .iter()
                .any(|load_target| targets.iter().any(|t| t.overlaps(load_target)));
            if overlaps && violation.is_none_or(|v| uop.ids() < arena.get(v).ids()) {
                violation = Some(load);
            }
        }

        if let Some(load) = violation {
            let uop = arena.get(load);
            self.should_flush = true;
            self.flush_after = ids_before(uop.ids());
            self.flush_address = uop.op.address();
            self.stats.borrow_mut().increment(self.load_violations, 1);
            tracing::debug!(
                store = store.op.address(),
                load = uop.op.address(),
                "memory order violation"
            );
            return true;
        }
        false
    }

    /// Drops every flushed uop from the queues and request tracking.
    pub fn purge_flushed(&mut self, arena: &UopArena) {
        self.load_queue.retain(|&id| !arena.is_flushed(id));
        self.store_queue.retain(|&id| !arena.is_flushed(id));
        self.pending_requests.retain(|&(_, id)| !arena.is_flushed(id));
        self.completed_loads.retain(|&id| !arena.is_flushed(id));
        // In-flight requests for flushed loads are discarded on arrival.
        self.outstanding.retain(|_, &mut id| !arena.is_flushed(id));
    }

    /// Returns the load and store queue occupancies.
    pub fn occupancy(&self) -> (usize, usize) {
        (self.load_queue.len(), self.store_queue.len())
    }
}
