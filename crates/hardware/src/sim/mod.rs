//! Simulation layer: executable loading and the top-level driver.

/// ELF loading into a flat process image.
pub mod loader;
/// The top-level simulator owning a core and its memory.
pub mod simulator;

use thiserror::Error;

use crate::common::error::{ConfigError, LoadError};

/// Failure while constructing a simulation.
#[derive(Debug, Error)]
pub enum SimulatorError {
    /// The configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The guest executable could not be loaded.
    #[error(transparent)]
    Load(#[from] LoadError),
}
