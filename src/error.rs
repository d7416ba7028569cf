//! Crate-wide error type.

use thiserror::Error;

/// The flat error taxonomy the simulator surfaces across every public operation.
///
/// `Miss` is never represented here — a cache/TLB miss is an ordinary `Ok`
/// result (see [`crate::cache::CacheLookup`]), not a failure.
#[derive(Debug, Error)]
pub enum SimError {
    /// Null/invalid input, misaligned address, out-of-range index, or a field
    /// that overflows its declared bit width.
    #[error("bad parameter: {0}")]
    BadParameter(String),

    /// The requested replacement policy is not implemented (only LRU is).
    #[error("replacement policy not implemented: {0}")]
    Policy(String),

    /// File open/read/seek failure in the loader.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Allocation failure, short read, or an out-of-bounds memory access.
    #[error("memory error: {0}")]
    Mem(String),
}

pub type Result<T> = std::result::Result<T, SimError>;

impl SimError {
    pub fn bad_parameter(msg: impl Into<String>) -> Self {
        SimError::BadParameter(msg.into())
    }

    pub fn mem(msg: impl Into<String>) -> Self {
        SimError::Mem(msg.into())
    }
}
