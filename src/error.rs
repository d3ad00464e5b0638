//! Error types for the codec boundary
//!
//! Malformed input (wrong-length hashes, bad addresses, amounts that do not fit
//! in 256 bits) is rejected here and never coerced. Transport failures are not
//! errors at this level; they surface as [`crate::endpoints::Lookup::Unreachable`].

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    // ========================================================================
    // Encoding Errors
    // ========================================================================
    #[error("Invalid hex for {what}: {reason}")]
    InvalidHex { what: &'static str, reason: String },

    #[error("Invalid length for {what}: expected {expected} bytes, got {actual}")]
    InvalidLength {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Chain identifier {0} does not fit in 4 bytes")]
    ChainIdOverflow(u64),

    #[error("Account word has non-zero padding in its 12 high bytes")]
    NonZeroPadding,

    // ========================================================================
    // Address Errors
    // ========================================================================
    #[error("Invalid bech32 address: {0}")]
    InvalidBech32(String),

    #[error("Invalid EVM address: {0}")]
    InvalidEvmAddress(String),

    // ========================================================================
    // Value Errors
    // ========================================================================
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Unknown ledger family: {0}")]
    InvalidFamily(String),
}
