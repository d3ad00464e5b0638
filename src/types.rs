//! Core types for cross-chain reconciliation
//!
//! Chain identifiers, transfer hashes, and the deposit / pending-withdraw records
//! observed on each ledger.

use alloy::primitives::U256;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CodecError;
use crate::hash::compute_transfer_hash;

// ============================================================================
// Chain ID (4 bytes)
// ============================================================================

/// Represents a 4-byte bridge chain ID
///
/// This is the identifier assigned in the bridge's chain registry, NOT the
/// ledger's native chain ID.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct ChainId(pub [u8; 4]);

impl ChainId {
    /// Create from u32
    pub fn from_u32(id: u32) -> Self {
        ChainId(id.to_be_bytes())
    }

    /// Create from u64, failing when the value needs more than 4 bytes
    pub fn from_u64(id: u64) -> Result<Self, CodecError> {
        u32::try_from(id)
            .map(Self::from_u32)
            .map_err(|_| CodecError::ChainIdOverflow(id))
    }

    /// Convert to u32
    pub fn to_u32(&self) -> u32 {
        u32::from_be_bytes(self.0)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    /// Parse `0x` + 8 hex chars (prefix optional, either case)
    pub fn from_hex(text: &str) -> Result<Self, CodecError> {
        let stripped = text.strip_prefix("0x").unwrap_or(text);
        if stripped.len() != 8 {
            return Err(CodecError::InvalidLength {
                what: "chain id",
                expected: 4,
                actual: stripped.len() / 2,
            });
        }
        let bytes = hex::decode(stripped).map_err(|e| CodecError::InvalidHex {
            what: "chain id",
            reason: e.to_string(),
        })?;
        let mut out = [0u8; 4];
        out.copy_from_slice(&bytes);
        Ok(ChainId(out))
    }

    /// Lowercase `0x` + 8 hex chars
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for ChainId {
    type Err = CodecError;

    /// Accepts either the hex form or a plain decimal registry number
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.starts_with("0x") {
            return Self::from_hex(s);
        }
        match s.parse::<u64>() {
            Ok(n) => Self::from_u64(n),
            Err(_) => Self::from_hex(s),
        }
    }
}

impl From<u32> for ChainId {
    fn from(id: u32) -> Self {
        ChainId::from_u32(id)
    }
}

impl From<[u8; 4]> for ChainId {
    fn from(bytes: [u8; 4]) -> Self {
        ChainId(bytes)
    }
}

// ============================================================================
// Transfer Hash (32 bytes)
// ============================================================================

/// Canonical 32-byte transfer identifier, identical on every ledger
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct TransferHash(pub [u8; 32]);

impl TransferHash {
    /// Parse hash text. The `0x` prefix is optional; exactly 64 hex chars are required.
    pub fn from_hex(text: &str) -> Result<Self, CodecError> {
        let stripped = text.strip_prefix("0x").unwrap_or(text);
        if stripped.len() != 64 {
            return Err(CodecError::InvalidLength {
                what: "transfer hash",
                expected: 32,
                actual: stripped.len() / 2,
            });
        }
        let bytes = hex::decode(stripped).map_err(|e| CodecError::InvalidHex {
            what: "transfer hash",
            reason: e.to_string(),
        })?;
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        Ok(TransferHash(out))
    }

    /// Lowercase `0x` + 64 hex chars
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for TransferHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for TransferHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransferHash({})", self.to_hex())
    }
}

impl FromStr for TransferHash {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s.trim())
    }
}

impl From<[u8; 32]> for TransferHash {
    fn from(bytes: [u8; 32]) -> Self {
        TransferHash(bytes)
    }
}

// ============================================================================
// Ledger Family
// ============================================================================

/// Address and query conventions a ledger follows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerFamily {
    /// EVM-style: JSON-RPC, hex-checksum addresses, event logs
    Evm,
    /// Cosmos-style: LCD smart queries, bech32 addresses, nonce index
    Cosmos,
}

impl LedgerFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerFamily::Evm => "evm",
            LedgerFamily::Cosmos => "cosmos",
        }
    }
}

impl fmt::Display for LedgerFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LedgerFamily {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "evm" => Ok(LedgerFamily::Evm),
            "cosmos" | "terra" | "cosmwasm" => Ok(LedgerFamily::Cosmos),
            other => Err(CodecError::InvalidFamily(other.to_string())),
        }
    }
}

// ============================================================================
// Amounts
// ============================================================================

/// Parse a decimal amount or nonce into a 256-bit integer
pub fn parse_u256(text: &str) -> Result<U256, CodecError> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CodecError::InvalidAmount(format!(
            "expected decimal digits, got {:?}",
            text
        )));
    }
    U256::from_str_radix(text, 10)
        .map_err(|e| CodecError::InvalidAmount(format!("{}: {}", text, e)))
}

// ============================================================================
// Transfer Records
// ============================================================================

/// The seven fields the canonical transfer hash is computed from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferFields {
    pub src_chain: ChainId,
    pub dest_chain: ChainId,
    pub src_account: [u8; 32],
    pub dest_account: [u8; 32],
    pub token: [u8; 32],
    /// Amount in the destination ledger's decimals
    pub amount: U256,
    pub nonce: U256,
}

impl TransferFields {
    /// Build the tuple as the source ledger sees it: its own ID is the source.
    #[allow(clippy::too_many_arguments)]
    pub fn from_deposit_view(
        this_chain: ChainId,
        dest_chain: ChainId,
        src_account: [u8; 32],
        dest_account: [u8; 32],
        token: [u8; 32],
        amount: U256,
        nonce: U256,
    ) -> Self {
        Self {
            src_chain: this_chain,
            dest_chain,
            src_account,
            dest_account,
            token,
            amount,
            nonce,
        }
    }

    /// Build the tuple as the destination ledger sees it: its own ID is the destination.
    #[allow(clippy::too_many_arguments)]
    pub fn from_withdraw_view(
        src_chain: ChainId,
        this_chain: ChainId,
        src_account: [u8; 32],
        dest_account: [u8; 32],
        token: [u8; 32],
        amount: U256,
        nonce: U256,
    ) -> Self {
        Self {
            src_chain,
            dest_chain: this_chain,
            src_account,
            dest_account,
            token,
            amount,
            nonce,
        }
    }

    pub fn transfer_hash(&self) -> TransferHash {
        TransferHash(compute_transfer_hash(
            &self.src_chain,
            &self.dest_chain,
            &self.src_account,
            &self.dest_account,
            &self.token,
            self.amount,
            self.nonce,
        ))
    }
}

/// Deposit observed on the source ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositRecord {
    pub fields: TransferFields,
    /// Unix seconds; a zero timestamp means the record does not exist
    pub timestamp: u64,
}

/// Pending withdrawal observed on the destination ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingWithdrawRecord {
    pub fields: TransferFields,
    /// Unix seconds; a zero value means the record does not exist
    pub submitted_at: u64,
    pub approved_at: u64,
    pub approved: bool,
    pub cancelled: bool,
    pub executed: bool,
}

impl PendingWithdrawRecord {
    pub fn status(&self) -> WithdrawStatus {
        WithdrawStatus::from_flags(self.approved, self.cancelled, self.executed)
    }
}

/// Lifecycle of a pending withdrawal: `submitted → approved → {cancelled | executed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawStatus {
    Submitted,
    Approved,
    Cancelled,
    Executed,
}

impl WithdrawStatus {
    /// Most advanced state the flags describe. Executed wins over cancelled.
    pub fn from_flags(approved: bool, cancelled: bool, executed: bool) -> Self {
        if executed {
            WithdrawStatus::Executed
        } else if cancelled {
            WithdrawStatus::Cancelled
        } else if approved {
            WithdrawStatus::Approved
        } else {
            WithdrawStatus::Submitted
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawStatus::Submitted => "submitted",
            WithdrawStatus::Approved => "approved",
            WithdrawStatus::Cancelled => "cancelled",
            WithdrawStatus::Executed => "executed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WithdrawStatus::Cancelled | WithdrawStatus::Executed)
    }
}

impl fmt::Display for WithdrawStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
