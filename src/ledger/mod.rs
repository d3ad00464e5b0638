//! Ledger query clients
//!
//! Every ledger family implements [`LedgerQuery`]. The family is chosen from
//! configuration in [`Ledger::connect`]; the rest of the engine only sees the
//! trait object.

#[cfg(feature = "cosmos")]
pub mod cosmos;
#[cfg(feature = "evm")]
pub mod evm;

use async_trait::async_trait;
use eyre::{eyre, Result};
use std::fmt;
use std::sync::Arc;

use crate::address_codec::format_account;
use crate::config::{LedgerConfig, ReconcilerConfig};
use crate::discovery::resolve_chain_id;
use crate::endpoints::{EndpointRegistry, Lookup};
use crate::error::CodecError;
use crate::types::{
    ChainId, DepositRecord, LedgerFamily, PendingWithdrawRecord, TransferFields, TransferHash,
};

// ============================================================================
// Query Types
// ============================================================================

/// Deposit found by a bounded scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositEvent {
    pub hash: TransferHash,
    pub fields: TransferFields,
    /// Unix seconds, when the source exposes it (nonce index)
    pub timestamp: Option<u64>,
    /// Block the event was emitted in, when scanned from logs
    pub block_number: Option<u64>,
}

impl DepositEvent {
    pub fn new(fields: TransferFields, timestamp: Option<u64>, block_number: Option<u64>) -> Self {
        Self {
            hash: fields.transfer_hash(),
            fields,
            timestamp,
            block_number,
        }
    }
}

/// One entry of a pending-withdraw listing
///
/// Cursor listings return the full record; plain hash lists do not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawListing {
    pub hash: TransferHash,
    pub record: Option<PendingWithdrawRecord>,
}

/// Bounded window for deposit scans
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanWindow {
    /// The most recent N blocks (event-sourced ledgers)
    RecentBlocks(u64),
    /// Up to `limit` nonces starting at `start`, never past the current nonce
    Nonces { start: u64, limit: u64 },
    /// The `limit` most recent nonces, ending at the current nonce
    LatestNonces(u64),
}

/// Limits for cursor-paginated listings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListOptions {
    pub page_size: u32,
    pub max_pages: u32,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            page_size: crate::config::MAX_PAGE_SIZE,
            max_pages: 20,
        }
    }
}

// ============================================================================
// Query Trait
// ============================================================================

/// Read-only view of one ledger's bridge contract
///
/// Calls never fail: transport errors that exhaust every endpoint come back as
/// [`Lookup::Unreachable`], and records with a zero defining timestamp come
/// back as [`Lookup::NotFound`].
#[async_trait]
pub trait LedgerQuery: Send + Sync {
    /// Chain ID the bridge contract reports for itself
    async fn this_chain_id(&self) -> Lookup<ChainId>;

    async fn get_deposit(&self, hash: &TransferHash) -> Lookup<DepositRecord>;

    async fn get_pending_withdraw(&self, hash: &TransferHash) -> Lookup<PendingWithdrawRecord>;

    async fn list_withdraw_hashes(&self, options: &ListOptions) -> Lookup<Vec<WithdrawListing>>;

    async fn scan_deposit_events(&self, window: ScanWindow) -> Lookup<Vec<DepositEvent>>;
}

// ============================================================================
// Ledger
// ============================================================================

/// A configured ledger and the client that queries it
#[derive(Clone)]
pub struct Ledger {
    pub name: String,
    pub family: LedgerFamily,
    pub chain_id: ChainId,
    pub bech32_prefix: Option<String>,
    pub deposit_scan_blocks: u64,
    pub max_deposit_nonces: u64,
    client: Arc<dyn LedgerQuery>,
}

impl fmt::Debug for Ledger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ledger")
            .field("name", &self.name)
            .field("family", &self.family)
            .field("chain_id", &self.chain_id)
            .field("bech32_prefix", &self.bech32_prefix)
            .finish_non_exhaustive()
    }
}

impl Ledger {
    /// Wrap an existing client
    pub fn new(
        name: &str,
        family: LedgerFamily,
        chain_id: ChainId,
        client: Arc<dyn LedgerQuery>,
    ) -> Self {
        Self {
            name: name.to_string(),
            family,
            chain_id,
            bech32_prefix: None,
            deposit_scan_blocks: 10_000,
            max_deposit_nonces: 500,
            client,
        }
    }

    pub fn with_bech32_prefix(mut self, prefix: &str) -> Self {
        self.bech32_prefix = Some(prefix.to_string());
        self
    }

    /// Build the family's adapter from configuration
    ///
    /// A missing chain ID is discovered from the bridge contract.
    pub async fn connect(
        config: &LedgerConfig,
        settings: &ReconcilerConfig,
        registry: &EndpointRegistry,
    ) -> Result<Self> {
        let (client, chain_id): (Arc<dyn LedgerQuery>, ChainId) = match config.family {
            #[cfg(feature = "evm")]
            LedgerFamily::Evm => {
                let handles = registry.evm_handles(&config.endpoints).await?;
                let adapter = evm::EvmLedger::new(
                    &config.name,
                    handles,
                    &config.bridge_address,
                    settings.request_timeout,
                    settings.max_block_range,
                )?;
                let chain_id = resolve_chain_id(config, &adapter).await?;
                let client: Arc<dyn LedgerQuery> = Arc::new(adapter.with_chain_id(chain_id));
                (client, chain_id)
            }
            #[cfg(feature = "cosmos")]
            LedgerFamily::Cosmos => {
                let handles = registry.lcd_handles(&config.endpoints).await?;
                let adapter = cosmos::CosmosLedger::new(
                    &config.name,
                    handles,
                    &config.bridge_address,
                    settings.request_timeout,
                );
                let chain_id = resolve_chain_id(config, &adapter).await?;
                let client: Arc<dyn LedgerQuery> = Arc::new(adapter.with_chain_id(chain_id));
                (client, chain_id)
            }
            #[allow(unreachable_patterns)]
            family => {
                return Err(eyre!(
                    "Ledger {} uses family {} but support for it is not compiled in",
                    config.name,
                    family
                ))
            }
        };

        tracing::info!(
            ledger = %config.name,
            family = %config.family,
            chain_id = %chain_id,
            endpoints = config.endpoints.len(),
            "Connected ledger"
        );

        Ok(Self {
            name: config.name.clone(),
            family: config.family,
            chain_id,
            bech32_prefix: config.bech32_prefix.clone(),
            deposit_scan_blocks: config.deposit_scan_blocks,
            max_deposit_nonces: config.max_deposit_nonces,
            client,
        })
    }

    pub fn client(&self) -> &dyn LedgerQuery {
        self.client.as_ref()
    }

    /// Shared handle for spawning tasks that outlive `&self`
    pub fn client_arc(&self) -> Arc<dyn LedgerQuery> {
        Arc::clone(&self.client)
    }

    /// Deposit scan window matching this ledger's family
    pub fn default_scan_window(&self) -> ScanWindow {
        match self.family {
            LedgerFamily::Evm => ScanWindow::RecentBlocks(self.deposit_scan_blocks),
            LedgerFamily::Cosmos => ScanWindow::LatestNonces(self.max_deposit_nonces),
        }
    }

    /// Render an account word in this ledger's address format
    pub fn format_account(&self, word: &[u8; 32]) -> Result<String, CodecError> {
        format_account(self.family, word, self.bech32_prefix.as_deref())
    }
}
