use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for the simulator
#[derive(Error, Debug)]
pub enum SimulatorError {
    #[error("Failed to load trace: {0}")]
    TraceError(#[from] TraceError),

    #[error("Memory error: {0}")]
    MemoryError(#[from] MemoryError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),
}

/// Errors related to trace files
#[derive(Error, Debug)]
pub enum TraceError {
    #[error("Failed to read trace file '{0}': {1}")]
    FileReadError(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse trace file '{0}': {1}")]
    ParseError(PathBuf, String),
}

/// Errors related to memory operations
#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("Memory access error at address {address:#x}: {kind}")]
    AccessError { address: u32, kind: MemoryErrorKind },

    #[error("No such core: {0}")]
    InvalidCore(usize),

    #[error("Core {core} stalled for {cycles} cycles on address {address:#04x}")]
    Stalled { core: usize, address: u8, cycles: u64 },

    #[error("Cache inconsistency detected at level {0}: {1}")]
    CacheInconsistency(usize, String),
}

/// Specific kinds of memory errors
#[derive(Error, Debug)]
pub enum MemoryErrorKind {
    #[error("Attempted to access memory outside the 8-bit address space")]
    OutOfBounds,

    #[error("Data value does not fit in one byte: {0:#x}")]
    InvalidData(u32),
}

/// Type alias for Result with SimulatorError
pub type SimulatorResult<T> = Result<T, SimulatorError>;
