//! XChain Reconciler: Transfer Verification for CL8Y Bridge
//!
//! Read-only engine that checks cross-chain transfers against the bridge
//! contracts on every configured ledger:
//!
//! - **Hash & Address Codec** - Canonical transfer hash, EVM and bech32 account words
//! - **Ledger Clients** - EVM (JSON-RPC) and Cosmos (LCD) bridge queries with endpoint fallback
//! - **Resolver** - Find a hash's deposit and pending withdraw across all ledgers
//! - **Fix Planner** - Detect withdraws submitted with the direction reversed and plan the correct one
//! - **Monitor** - Enumerate recent hashes on all ledgers and merge their status
//!
//! ## Usage
//!
//! ```ignore
//! use xchain_reconciler::{Reconciler, ReconcilerConfig, TransferHash};
//!
//! let reconciler = Reconciler::connect(ReconcilerConfig::load()?).await?;
//! let hash: TransferHash = "0xb6a5...8b1b".parse()?;
//! let (resolution, outcome) = reconciler.fix_planner().diagnose(&hash).await;
//! ```
//!
//! ## Feature Flags
//!
//! - `evm` - EVM ledger support (default)
//! - `cosmos` - CosmWasm ledger support (default)

// Core modules (always available)
pub mod address_codec;
pub mod config;
pub mod discovery;
pub mod endpoints;
pub mod error;
pub mod hash;
pub mod types;

// Ledger clients (adapters feature-gated inside)
pub mod ledger;

// Engine
pub mod fix;
pub mod monitor;
pub mod reconciler;
pub mod resolver;

// Re-export commonly used items at the crate root
pub use address_codec::{
    decode_bech32_address, encode_bech32_address, encode_evm_address, format_account,
    parse_account, parse_evm_address,
};

pub use hash::{
    address_to_word, bytes32_to_hex, compute_transfer_hash, cosmos_token_to_word, keccak256,
    token_to_word, word_to_address, TokenRef,
};

pub use config::{LedgerConfig, ReconcilerConfig};
pub use discovery::{verify_chain_ids, ChainIdCheck, ChainIdStatus};
pub use endpoints::{EndpointFailure, EndpointRegistry, Lookup};
pub use error::CodecError;
pub use fix::{FixOutcome, FixPlan, FixPlanner};
pub use ledger::{DepositEvent, Ledger, LedgerQuery, ListOptions, ScanWindow, WithdrawListing};
pub use monitor::{
    merge_observations, HashMonitor, MonitorEntry, MonitorOptions, MonitorReport, Observation,
};
pub use reconciler::Reconciler;
pub use resolver::{Located, Resolution, ResolutionWarning, TransferResolver};
pub use types::{
    ChainId, DepositRecord, LedgerFamily, PendingWithdrawRecord, TransferFields, TransferHash,
    WithdrawStatus,
};
