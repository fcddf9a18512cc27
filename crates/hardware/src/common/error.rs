//! Instruction exceptions and fatal setup errors.
//!
//! Errors split into two families:
//! 1. **`InstructionException`:** In-pipeline faults attached to a uop and
//!    surfaced at the reorder buffer head; never unwound, always data.
//! 2. **`ConfigError` / `LoadError`:** Construction-time failures raised
//!    before the first tick; these are fatal.

use std::fmt;

use thiserror::Error;

/// Exception attached to a uop during decode, execution, or memory access.
///
/// The first exception recorded on a uop sticks; later ones are dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstructionException {
    /// The instruction encoding could not be decoded.
    DecodeFault,
    /// The instruction decoded but its execution is not implemented.
    ExecutionNotImplemented,
    /// A memory access violated the ISA's alignment rules.
    MisalignedAccess,
    /// A memory access fell outside the guest process image.
    PageFault,
    /// A supervisor call into the guest OS layer.
    Syscall,
}

impl fmt::Display for InstructionException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DecodeFault => write!(f, "decode fault"),
            Self::ExecutionNotImplemented => write!(f, "execution not implemented"),
            Self::MisalignedAccess => write!(f, "misaligned access"),
            Self::PageFault => write!(f, "page fault"),
            Self::Syscall => write!(f, "supervisor call"),
        }
    }
}

/// Configuration or construction failure, raised before the first tick.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration document could not be read or parsed.
    #[error("failed to parse configuration: {0}")]
    Parse(String),

    /// A recognized key carried an unusable value.
    #[error("invalid configuration value for {key}: {reason}")]
    InvalidValue {
        /// The offending configuration key.
        key: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// The requested simulation mode has no core implementation here.
    #[error("unsupported simulation mode: {0}")]
    UnsupportedMode(String),

    /// The port / reservation-station topology is inconsistent.
    #[error("invalid port topology: {0}")]
    PortTopology(String),
}

/// Failure while loading a guest executable into the process image.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The executable could not be read from disk.
    #[error("failed to read executable: {0}")]
    Io(#[from] std::io::Error),

    /// The executable is not a parseable ELF object.
    #[error("failed to parse executable: {0}")]
    Object(#[from] object::Error),

    /// A loadable segment falls outside the configured process image.
    #[error("segment at {address:#x} (+{size:#x}) exceeds process image of {image_size:#x} bytes")]
    SegmentOutOfRange {
        /// Segment virtual address.
        address: u64,
        /// Segment size in bytes.
        size: u64,
        /// Configured process image size.
        image_size: u64,
    },
}
