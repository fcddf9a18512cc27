//! Dispatch/issue unit.
//!
//! Reads instruction operands, performs scoreboarding, and issues
//! instructions to the execution ports once ready. Dispatch binds each
//! uop to an issue port through the port allocator and places it in the
//! reservation station serving that port; operands missing a producer are
//! parked in the dependency matrix and supplied by `forward_operands`
//! when results write back.

use std::collections::{HashSet, VecDeque};

use crate::common::reg::{Register, RegisterFileSet};
use crate::common::value::RegisterValue;
use crate::config::Config;
use crate::core::pipeline::buffer::PipelineBuffer;
use crate::core::pipeline::port_allocator::{BalancedPortAllocator, PortAllocator};
use crate::core::uop::{UopArena, UopId};
use crate::stats::{SharedStats, StatId};

/// A uop waiting in the dependency matrix for one operand.
struct DependencyEntry {
    /// The waiting uop.
    uop: UopId,
    /// The issue port the uop was dispatched to.
    port: u16,
    /// The operand index awaiting a value.
    operand_index: usize,
}

/// A reservation station issue port.
struct ReservationStationPort {
    /// Issue port this station port maps to.
    issue_port: u16,
    /// Uops whose operands are all supplied, in ready order.
    ready: VecDeque<UopId>,
    /// Ready and pending uops bound to this port.
    current_size: usize,
}

/// A reservation station.
struct ReservationStation {
    capacity: usize,
    /// Uops dispatchable into this station per cycle.
    dispatch_rate: usize,
    /// Occupied entries.
    current_size: usize,
    ports: Vec<ReservationStationPort>,
}

/// Per-issue-port statistic ids.
struct PortStats {
    possible_issues: StatId,
    actual_issues: StatId,
    frontend_slot_stalls: StatId,
    backend_slot_stalls: StatId,
    port_busy_slot_stalls: StatId,
}

/// The dispatch/issue stage of the out-of-order engine.
pub struct DispatchIssueUnit {
    /// Per-physical-register readiness, `[type][tag]`.
    scoreboard: Vec<Vec<bool>>,
    /// Waiting uops per physical register, `[type][tag]`.
    dependency_matrix: Vec<Vec<Vec<DependencyEntry>>>,
    reservation_stations: Vec<ReservationStation>,
    /// Issue port index to `(station, station port)` translation.
    port_mapping: Vec<(usize, usize)>,
    port_allocator: Box<dyn PortAllocator>,
    stats: SharedStats,
    rs_stalls: StatId,
    frontend_stalls: StatId,
    backend_stalls: StatId,
    port_busy_stalls: StatId,
    port_stats: Vec<PortStats>,
}

impl DispatchIssueUnit {
    /// Creates a dispatch/issue unit from the configured topology and the
    /// physical register structure the scoreboard must reflect.
    pub fn new(config: &Config, physical_counts: &[usize], stats: SharedStats) -> Self {
        let scoreboard = physical_counts.iter().map(|&n| vec![true; n]).collect();
        let dependency_matrix = physical_counts
            .iter()
            .map(|&n| (0..n).map(|_| Vec::new()).collect())
            .collect();

        let mut port_mapping = vec![(0, 0); config.ports.len()];
        let mut reservation_stations = Vec::new();
        for rs_config in &config.reservation_stations {
            let rs_index = reservation_stations.len();
            let mut ports = Vec::new();
            for (station_port, &issue_port) in rs_config.ports.iter().enumerate() {
                port_mapping[issue_port] = (rs_index, station_port);
                ports.push(ReservationStationPort {
                    issue_port: issue_port as u16,
                    ready: VecDeque::new(),
                    current_size: 0,
                });
            }
            reservation_stations.push(ReservationStation {
                capacity: rs_config.size,
                dispatch_rate: rs_config.dispatch_rate,
                current_size: 0,
                ports,
            });
        }

        let mut registry = stats.borrow_mut();
        let rs_stalls = registry.register_stat("dispatch.rsStalls");
        let frontend_stalls = registry.register_stat("issue.frontendStalls");
        let backend_stalls = registry.register_stat("issue.backendStalls");
        let port_busy_stalls = registry.register_stat("issue.portBusyStalls");
        let port_stats = config
            .ports
            .iter()
            .map(|port| PortStats {
                possible_issues: registry
                    .register_stat(&format!("issue.possibleIssues.{}", port.name)),
                actual_issues: registry.register_stat(&format!("issue.actualIssues.{}", port.name)),
                frontend_slot_stalls: registry
                    .register_stat(&format!("issue.frontendSlotStalls.{}", port.name)),
                backend_slot_stalls: registry
                    .register_stat(&format!("issue.backendSlotStalls.{}", port.name)),
                port_busy_slot_stalls: registry
                    .register_stat(&format!("issue.portBusySlotStalls.{}", port.name)),
            })
            .collect();
        drop(registry);

        Self {
            scoreboard,
            dependency_matrix,
            reservation_stations,
            port_mapping,
            port_allocator: Box::new(BalancedPortAllocator::new(config.ports.len())),
            stats,
            rs_stalls,
            frontend_stalls,
            backend_stalls,
            port_busy_stalls,
            port_stats,
        }
    }

    /// Ticks the dispatch half: read available operands, set scoreboard
    /// flags for destinations, and bind uops to reservation stations.
    pub fn tick(
        &mut self,
        input: &mut PipelineBuffer<Option<UopId>>,
        arena: &mut UopArena,
        register_files: &RegisterFileSet,
    ) {
        input.stall(false);
        let mut dispatches = vec![0usize; self.reservation_stations.len()];

        for slot in 0..input.width() {
            let Some(id) = input.head_slots()[slot] else {
                continue;
            };

            if arena.get(id).op.exception().is_some() {
                // Exception; mark as ready to commit and remove from the
                // pipeline. Commit surfaces it.
                arena.get_mut(id).can_commit = true;
                input.head_slots_mut()[slot] = None;
                continue;
            }

            let supported_ports = arena.get(id).op.supported_ports().to_vec();
            let port = self.port_allocator.allocate(&supported_ports);
            let (rs_index, rs_port) = self.port_mapping[port as usize];
            let station = &self.reservation_stations[rs_index];

            if station.current_size == station.capacity
                || dispatches[rs_index] == station.dispatch_rate
            {
                self.port_allocator.deallocate(port);
                input.stall(true);
                self.stats.borrow_mut().increment(self.rs_stalls, 1);
                return;
            }

            // Register read: supply every operand whose producer has
            // retired or written back; park the rest in the matrix.
            let mut ready = true;
            let uop = arena.get_mut(id);
            let sources = uop.op.source_registers().to_vec();
            for (index, reg) in sources.iter().enumerate() {
                if uop.op.is_operand_ready(index) {
                    continue;
                }
                if reg.is_zero() {
                    uop.op.supply_operand(index, register_files.get(*reg));
                } else if self.scoreboard[reg.reg_type as usize][reg.index()] {
                    uop.op.supply_operand(index, register_files.get(*reg));
                } else {
                    self.dependency_matrix[reg.reg_type as usize][reg.index()].push(
                        DependencyEntry {
                            uop: id,
                            port,
                            operand_index: index,
                        },
                    );
                    ready = false;
                }
            }

            let destinations = uop.op.destination_registers().to_vec();
            for reg in destinations.iter().filter(|reg| !reg.is_zero()) {
                self.scoreboard[reg.reg_type as usize][reg.index()] = false;
            }

            dispatches[rs_index] += 1;
            let station = &mut self.reservation_stations[rs_index];
            station.current_size += 1;
            station.ports[rs_port].current_size += 1;
            if ready {
                station.ports[rs_port].ready.push_back(id);
            }
            input.head_slots_mut()[slot] = None;
        }
    }

    /// Issues the oldest ready uop on each unblocked port.
    pub fn issue(
        &mut self,
        arena: &UopArena,
        issue_ports: &mut [PipelineBuffer<Option<UopId>>],
    ) {
        let mut issued = 0;
        let mut stats = self.stats.borrow_mut();

        for port in 0..issue_ports.len() {
            let (rs_index, rs_port) = self.port_mapping[port];
            let station = &mut self.reservation_stations[rs_index];

            if issue_ports[port].is_stalled() {
                if !station.ports[rs_port].ready.is_empty() {
                    stats.increment(self.port_busy_stalls, 1);
                    stats.increment(self.port_stats[port].port_busy_slot_stalls, 1);
                    stats.increment(self.port_stats[port].backend_slot_stalls, 1);
                }
                continue;
            }

            if let Some(id) = station.ports[rs_port].ready.pop_front() {
                for &possible in arena.get(id).op.supported_ports() {
                    stats.increment(self.port_stats[possible as usize].possible_issues, 1);
                }
                stats.increment(self.port_stats[port].actual_issues, 1);

                issue_ports[port].tail_slots_mut()[0] = Some(id);
                self.port_allocator.issued(port as u16);
                issued += 1;

                debug_assert!(station.current_size > 0);
                station.current_size -= 1;
                debug_assert!(station.ports[rs_port].current_size > 0);
                station.ports[rs_port].current_size -= 1;
            } else if station.ports[rs_port].current_size != 0 {
                stats.increment(self.port_stats[port].backend_slot_stalls, 1);
            } else {
                stats.increment(self.port_stats[port].frontend_slot_stalls, 1);
            }
        }

        if issued == 0 {
            if self
                .reservation_stations
                .iter()
                .any(|rs| rs.current_size != 0)
            {
                stats.increment(self.backend_stalls, 1);
            } else {
                stats.increment(self.frontend_stalls, 1);
            }
        }
    }

    /// Forwards result values: set scoreboard bits, supply each dependent
    /// in the matrix, and move newly executable uops to their ready queue.
    pub fn forward_operands(
        &mut self,
        registers: &[Register],
        values: &[RegisterValue],
        arena: &mut UopArena,
    ) {
        debug_assert_eq!(registers.len(), values.len());

        for (reg, value) in registers.iter().zip(values) {
            if reg.is_zero() {
                continue;
            }
            self.scoreboard[reg.reg_type as usize][reg.index()] = true;

            let dependents =
                std::mem::take(&mut self.dependency_matrix[reg.reg_type as usize][reg.index()]);
            for entry in dependents {
                let uop = arena.get_mut(entry.uop);
                uop.op.supply_operand(entry.operand_index, value.clone());
                if uop.op.can_execute() {
                    let (rs_index, rs_port) = self.port_mapping[entry.port as usize];
                    self.reservation_stations[rs_index].ports[rs_port]
                        .ready
                        .push_back(entry.uop);
                }
            }
        }
    }

    /// Sets the scoreboard entry for `reg` as ready.
    pub fn set_register_ready(&mut self, reg: Register) {
        if !reg.is_zero() {
            self.scoreboard[reg.reg_type as usize][reg.index()] = true;
        }
    }

    /// Returns the scoreboard bit for a physical register.
    pub fn is_register_ready(&self, reg: Register) -> bool {
        reg.is_zero() || self.scoreboard[reg.reg_type as usize][reg.index()]
    }

    /// Clears every reservation station and dependency matrix entry whose
    /// uop has been flushed, returning their ports to the allocator.
    pub fn purge_flushed(&mut self, arena: &UopArena) {
        // Ready queues first.
        for station in &mut self.reservation_stations {
            let mut dropped = 0;
            for port in &mut station.ports {
                let mut kept = VecDeque::with_capacity(port.ready.len());
                while let Some(id) = port.ready.pop_front() {
                    if arena.is_flushed(id) {
                        self.port_allocator.deallocate(port.issue_port);
                        debug_assert!(port.current_size > 0);
                        port.current_size -= 1;
                        dropped += 1;
                    } else {
                        kept.push_back(id);
                    }
                }
                port.ready = kept;
            }
            debug_assert!(station.current_size >= dropped);
            station.current_size -= dropped;
        }

        // Dependency matrix: a uop may wait on several operands, so charge
        // each flushed uop's port and occupancy at most once.
        let mut flushed: Vec<HashSet<UopId>> =
            vec![HashSet::new(); self.reservation_stations.len()];
        for register_type in &mut self.dependency_matrix {
            for dependents in register_type.iter_mut() {
                dependents.retain(|entry| {
                    if !arena.is_flushed(entry.uop) {
                        return true;
                    }
                    let (rs_index, rs_port) = self.port_mapping[entry.port as usize];
                    if flushed[rs_index].insert(entry.uop) {
                        self.port_allocator.deallocate(entry.port);
                        let port = &mut self.reservation_stations[rs_index].ports[rs_port];
                        debug_assert!(port.current_size > 0);
                        port.current_size -= 1;
                    }
                    false
                });
            }
        }
        for (rs_index, uops) in flushed.iter().enumerate() {
            debug_assert!(self.reservation_stations[rs_index].current_size >= uops.len());
            self.reservation_stations[rs_index].current_size -= uops.len();
        }
    }

    /// Returns `(occupancy, capacity)` for each reservation station.
    pub fn reservation_station_sizes(&self) -> Vec<(usize, usize)> {
        self.reservation_stations
            .iter()
            .map(|rs| (rs.current_size, rs.capacity))
            .collect()
    }
}
