use thiserror::Error;

/// Why a range descriptor line could not be turned into a network.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("missing '/' separator in range descriptor: {0:?}")]
    MissingSeparator(String),

    #[error("invalid base address {addr:?}: {reason}")]
    InvalidAddress { addr: String, reason: String },

    #[error("invalid host count {0:?}")]
    InvalidCount(String),

    /// Registry blocks are always a power of two; anything else is rejected rather than rounded.
    #[error("host count {0} is not a power of two in 1..=2^32")]
    NotPowerOfTwo(u64),
}
