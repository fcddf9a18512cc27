//! Simulation statistics registry.
//!
//! Pipeline units register named counters at construction and increment
//! them by id during ticks; the registry is the single surface for all
//! counters. It provides:
//! 1. **Registration:** `register_stat` returns a cheap integer id.
//! 2. **Collection:** `get_stats` returns every counter as strings.
//! 3. **Reporting:** A human-readable banner with derived metrics (IPC,
//!    host-side MIPS) for the CLI.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Instant;

/// Handle to a registered counter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatId(usize);

/// Named counter registry shared by every pipeline unit.
pub struct Statistics {
    names: Vec<String>,
    values: Vec<u64>,
    start_time: Instant,
}

/// Shared handle to the statistics registry.
///
/// The simulator is single-threaded and cooperative, so `Rc<RefCell<_>>` is
/// the ownership model for all cross-unit state.
pub type SharedStats = Rc<RefCell<Statistics>>;

impl Default for Statistics {
    fn default() -> Self {
        Self::new()
    }
}

impl Statistics {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            names: Vec::new(),
            values: Vec::new(),
            start_time: Instant::now(),
        }
    }

    /// Creates an empty registry behind a shared handle.
    pub fn new_shared() -> SharedStats {
        Rc::new(RefCell::new(Self::new()))
    }

    /// Registers a named counter and returns its id.
    ///
    /// Registering the same name twice returns the existing id, so units
    /// sharing a counter (e.g. per-port groups) stay consistent.
    pub fn register_stat(&mut self, name: &str) -> StatId {
        if let Some(pos) = self.names.iter().position(|n| n == name) {
            return StatId(pos);
        }
        self.names.push(name.to_string());
        self.values.push(0);
        StatId(self.names.len() - 1)
    }

    /// Increments a counter by `amount`.
    #[inline]
    pub fn increment(&mut self, id: StatId, amount: u64) {
        self.values[id.0] += amount;
    }

    /// Returns a counter's current value.
    #[inline]
    pub fn value(&self, id: StatId) -> u64 {
        self.values[id.0]
    }

    /// Looks up a counter's value by name, or zero if never registered.
    pub fn value_of(&self, name: &str) -> u64 {
        self.names
            .iter()
            .position(|n| n == name)
            .map_or(0, |pos| self.values[pos])
    }

    /// Returns every counter as a name → value string map.
    pub fn get_stats(&self) -> BTreeMap<String, String> {
        self.names
            .iter()
            .cloned()
            .zip(self.values.iter().map(u64::to_string))
            .collect()
    }

    /// Prints only the requested statistics sections to stdout.
    ///
    /// A section is `"summary"` (the derived-metrics banner) or a counter
    /// prefix — the part of a counter name before its first `.`, e.g.
    /// `"issue"` or `"dispatch"`. Pass an empty slice to print everything.
    /// Derived metrics divide by `max(x, 1)` so an empty run never panics.
    pub fn print_sections(&self, clock_frequency_ghz: f64, sections: &[String]) {
        let want = |section: &str| sections.is_empty() || sections.iter().any(|s| s == section);

        println!("\n==========================================================");
        println!("OUT-OF-ORDER CORE SIMULATION STATISTICS");
        println!("==========================================================");
        if want("summary") {
            let seconds = self.start_time.elapsed().as_secs_f64().max(1e-9);
            let cycles = self.value_of("core.cycles").max(1);
            let retired = self.value_of("rob.instructionsCommitted");

            let ipc = retired as f64 / cycles as f64;
            let sim_seconds = cycles as f64 / (clock_frequency_ghz * 1e9);
            let mips = (retired as f64 / seconds) / 1_000_000.0;

            println!("host_seconds             {:.4} s", seconds);
            println!("sim_seconds              {:.6} s", sim_seconds);
            println!("sim_cycles               {}", cycles);
            println!("sim_insts                {}", retired);
            println!("sim_ipc                  {:.4}", ipc);
            println!("sim_mips                 {:.2}", mips);
            println!("----------------------------------------------------------");
        }
        for (name, value) in self.get_stats() {
            let prefix = name.split('.').next().unwrap_or("");
            if want(prefix) {
                println!("  {:<40} {}", name, value);
            }
        }
        println!("==========================================================");
    }

    /// Prints the full banner: every section.
    ///
    /// Equivalent to `print_sections(clock_frequency_ghz, &[])`.
    pub fn print(&self, clock_frequency_ghz: f64) {
        self.print_sections(clock_frequency_ghz, &[]);
    }
}
