//! EVM ledger adapter
//!
//! Reads the bridge contract over JSON-RPC with alloy `sol!` bindings.
//! Deposits are found either by hash (`getDeposit`) or by scanning `Deposit`
//! logs over a recent block window in bounded chunks.
//!
//! The bridge stores the source ERC20 address of a deposit. The hashed token
//! word is the destination token, which comes from the token registry's
//! `getDestToken(token, destChain)` mapping and is cached per pair.

#![allow(clippy::too_many_arguments)]

use alloy::primitives::{Address, FixedBytes, B256, U256};
use alloy::providers::Provider;
use alloy::rpc::types::Filter;
use alloy::sol;
use alloy::sol_types::SolEvent;
use async_trait::async_trait;
use eyre::{eyre, Result, WrapErr};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::address_codec::parse_evm_address;
use crate::endpoints::{with_fallback, EvmHandle, Lookup};
use crate::hash::address_to_word;
use crate::ledger::{DepositEvent, LedgerQuery, ListOptions, ScanWindow, WithdrawListing};
use crate::types::{ChainId, DepositRecord, PendingWithdrawRecord, TransferFields, TransferHash};

sol! {
    /// Read-only slice of the bridge contract
    #[sol(rpc)]
    contract Bridge {
        /// Deposit record by transfer hash (zero struct if not found)
        function getDeposit(bytes32 depositHash) external view returns (
            bytes4 destChain,
            bytes32 srcAccount,
            bytes32 destAccount,
            address token,
            uint256 amount,
            uint64 nonce,
            uint256 fee,
            uint256 timestamp
        );

        /// Pending withdrawal by transfer hash (zero struct if not found)
        function getPendingWithdraw(bytes32 withdrawHash) external view returns (
            bytes4 srcChain,
            bytes32 srcAccount,
            bytes32 destAccount,
            address token,
            address recipient,
            uint256 amount,
            uint64 nonce,
            uint256 operatorGas,
            uint256 submittedAt,
            uint256 approvedAt,
            bool approved,
            bool cancelled,
            bool executed
        );

        /// This chain's registered 4-byte chain ID
        function getThisChainId() external view returns (bytes4);

        /// Every withdraw hash ever submitted on this chain
        function getPendingWithdrawHashes() external view returns (bytes32[] hashes);

        /// TokenRegistry contract address
        function tokenRegistry() external view returns (address);

        event Deposit(
            bytes4 indexed destChain,
            bytes32 indexed destAccount,
            bytes32 srcAccount,
            address token,
            uint256 amount,
            uint64 nonce,
            uint256 fee
        );
    }

    /// Cross-chain token mappings
    #[sol(rpc)]
    contract TokenRegistry {
        function getDestToken(address token, bytes4 destChain) external view returns (bytes32 destToken);
    }
}

/// A deposit as the bridge stores it, before the destination token is known
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDeposit {
    pub dest_chain: ChainId,
    pub src_account: [u8; 32],
    pub dest_account: [u8; 32],
    /// Source-chain ERC20
    pub token: Address,
    pub amount: U256,
    pub nonce: u64,
    /// Unix seconds, when known
    pub timestamp: Option<u64>,
    pub block_number: Option<u64>,
}

impl RawDeposit {
    /// Hash fields once the destination token word is known
    pub fn fields(&self, this_chain: ChainId, dest_token: [u8; 32]) -> TransferFields {
        TransferFields::from_deposit_view(
            this_chain,
            self.dest_chain,
            self.src_account,
            self.dest_account,
            dest_token,
            self.amount,
            U256::from(self.nonce),
        )
    }
}

/// Adapter for one EVM ledger
pub struct EvmLedger {
    name: String,
    handles: Vec<EvmHandle>,
    bridge: Address,
    chain_id: ChainId,
    request_timeout: Duration,
    max_block_range: u64,
    token_registry: RwLock<Option<Address>>,
    dest_tokens: RwLock<HashMap<(Address, ChainId), [u8; 32]>>,
    /// Block timestamps learned during the current scan
    block_times: RwLock<HashMap<u64, u64>>,
}

impl EvmLedger {
    pub fn new(
        name: &str,
        handles: Vec<EvmHandle>,
        bridge_address: &str,
        request_timeout: Duration,
        max_block_range: u64,
    ) -> Result<Self> {
        let bridge = Address::from(
            parse_evm_address(bridge_address)
                .wrap_err_with(|| format!("Invalid bridge address for ledger {}", name))?,
        );
        Ok(Self {
            name: name.to_string(),
            handles,
            bridge,
            chain_id: ChainId::default(),
            request_timeout,
            max_block_range: max_block_range.max(1),
            token_registry: RwLock::new(None),
            dest_tokens: RwLock::new(HashMap::new()),
            block_times: RwLock::new(HashMap::new()),
        })
    }

    /// Set the chain ID this ledger's records are attributed to
    pub fn with_chain_id(mut self, chain_id: ChainId) -> Self {
        self.chain_id = chain_id;
        self
    }

    async fn latest_block(&self) -> Lookup<u64> {
        with_fallback(
            &self.handles,
            self.request_timeout,
            "eth_blockNumber",
            |handle| async move {
                let block = handle
                    .provider
                    .get_block_number()
                    .await
                    .map_err(|e| eyre!("Failed to get block number: {}", e))?;
                Ok(Some(block))
            },
        )
        .await
    }

    async fn raw_deposit(&self, hash: &TransferHash) -> Lookup<RawDeposit> {
        let bridge = self.bridge;
        let hash = hash.0;
        with_fallback(
            &self.handles,
            self.request_timeout,
            "getDeposit",
            |handle| async move {
                let contract = Bridge::new(bridge, &handle.provider);
                let result = contract
                    .getDeposit(FixedBytes(hash))
                    .call()
                    .await
                    .map_err(|e| eyre!("Failed to get deposit: {}", e))?;
                Ok(raw_deposit_from_return(result))
            },
        )
        .await
    }

    async fn token_registry(&self) -> Lookup<Address> {
        if let Some(registry) = *self.token_registry.read().await {
            return Lookup::Found(registry);
        }

        let bridge = self.bridge;
        let lookup = with_fallback(
            &self.handles,
            self.request_timeout,
            "tokenRegistry",
            |handle| async move {
                let contract = Bridge::new(bridge, &handle.provider);
                let result = contract
                    .tokenRegistry()
                    .call()
                    .await
                    .map_err(|e| eyre!("Failed to get token registry: {}", e))?;
                let registry: Address = result._0;
                Ok((!registry.is_zero()).then_some(registry))
            },
        )
        .await;

        if let Lookup::Found(registry) = &lookup {
            *self.token_registry.write().await = Some(*registry);
        }
        lookup
    }

    /// Destination token word for a source ERC20 bridged to `dest_chain`
    async fn dest_token(&self, token: Address, dest_chain: ChainId) -> Lookup<[u8; 32]> {
        if let Some(word) = self.dest_tokens.read().await.get(&(token, dest_chain)) {
            return Lookup::Found(*word);
        }

        let mapped = match self.token_registry().await {
            Lookup::Found(registry) => {
                with_fallback(
                    &self.handles,
                    self.request_timeout,
                    "getDestToken",
                    |handle| async move {
                        let contract = TokenRegistry::new(registry, &handle.provider);
                        let result = contract
                            .getDestToken(token, FixedBytes(dest_chain.0))
                            .call()
                            .await
                            .map_err(|e| eyre!("Failed to get dest token: {}", e))?;
                        Ok(Some(result.destToken.0))
                    },
                )
                .await
            }
            Lookup::NotFound => Lookup::Found([0u8; 32]),
            Lookup::Unreachable(failures) => return Lookup::Unreachable(failures),
        };

        match mapped {
            Lookup::Found(mapped) => {
                if mapped == [0u8; 32] {
                    warn!(
                        ledger = %self.name,
                        %token,
                        dest_chain = %dest_chain,
                        "No destination token mapping, hashing the source token"
                    );
                }
                let word = dest_token_word(&token, mapped);
                self.dest_tokens
                    .write()
                    .await
                    .insert((token, dest_chain), word);
                Lookup::Found(word)
            }
            Lookup::NotFound => Lookup::NotFound,
            Lookup::Unreachable(failures) => Lookup::Unreachable(failures),
        }
    }

    /// Deposit timestamp for a scanned log, via `getDeposit` and cached per block
    async fn deposit_timestamp(&self, hash: &TransferHash, block: Option<u64>) -> Option<u64> {
        if let Some(block) = block {
            if let Some(ts) = self.block_times.read().await.get(&block) {
                return Some(*ts);
            }
        }
        let ts = self.raw_deposit(hash).await.into_option()?.timestamp?;
        if let Some(block) = block {
            self.block_times.write().await.insert(block, ts);
        }
        Some(ts)
    }

    async fn deposit_logs(&self, from_block: u64, to_block: u64) -> Lookup<Vec<RawDeposit>> {
        let bridge = self.bridge;
        with_fallback(
            &self.handles,
            self.request_timeout,
            "eth_getLogs",
            |handle| async move {
                let filter = Filter::new()
                    .address(bridge)
                    .event_signature(Bridge::Deposit::SIGNATURE_HASH)
                    .from_block(from_block)
                    .to_block(to_block);
                let logs = handle.provider.get_logs(&filter).await.wrap_err_with(|| {
                    format!("Failed to get logs from block {} to {}", from_block, to_block)
                })?;

                let deposits = logs
                    .iter()
                    .filter_map(|log| {
                        let parsed = parse_deposit_log(
                            log.topics(),
                            log.data().data.as_ref(),
                            log.block_number,
                            log.block_timestamp,
                        );
                        if parsed.is_none() {
                            warn!(tx = ?log.transaction_hash, "Skipping malformed Deposit log");
                        }
                        parsed
                    })
                    .collect::<Vec<_>>();
                Ok(Some(deposits))
            },
        )
        .await
    }

    /// Attach destination tokens and timestamps to scanned deposits
    async fn complete_deposits(&self, raws: Vec<RawDeposit>) -> Vec<DepositEvent> {
        let mut events = Vec::with_capacity(raws.len());
        for raw in raws {
            let dest_token = match self.dest_token(raw.token, raw.dest_chain).await {
                Lookup::Found(word) => word,
                Lookup::NotFound => address_to_word(&raw.token.0 .0),
                Lookup::Unreachable(_) => {
                    warn!(
                        ledger = %self.name,
                        nonce = raw.nonce,
                        "Skipping deposit, destination token lookup failed"
                    );
                    continue;
                }
            };
            let fields = raw.fields(self.chain_id, dest_token);
            let timestamp = match raw.timestamp {
                Some(ts) => Some(ts),
                None => {
                    self.deposit_timestamp(&fields.transfer_hash(), raw.block_number)
                        .await
                }
            };
            events.push(DepositEvent::new(fields, timestamp, raw.block_number));
        }
        events
    }
}

#[async_trait]
impl LedgerQuery for EvmLedger {
    async fn this_chain_id(&self) -> Lookup<ChainId> {
        let bridge = self.bridge;
        with_fallback(
            &self.handles,
            self.request_timeout,
            "getThisChainId",
            |handle| async move {
                let contract = Bridge::new(bridge, &handle.provider);
                let result = contract
                    .getThisChainId()
                    .call()
                    .await
                    .map_err(|e| eyre!("Failed to get this chain ID: {}", e))?;
                let reported: FixedBytes<4> = result._0;
                let id = ChainId(reported.0);
                Ok((id.to_u32() != 0).then_some(id))
            },
        )
        .await
    }

    async fn get_deposit(&self, hash: &TransferHash) -> Lookup<DepositRecord> {
        let raw = match self.raw_deposit(hash).await {
            Lookup::Found(raw) => raw,
            Lookup::NotFound => return Lookup::NotFound,
            Lookup::Unreachable(failures) => return Lookup::Unreachable(failures),
        };
        let dest_token = match self.dest_token(raw.token, raw.dest_chain).await {
            Lookup::Found(word) => word,
            Lookup::NotFound => address_to_word(&raw.token.0 .0),
            Lookup::Unreachable(failures) => return Lookup::Unreachable(failures),
        };
        Lookup::Found(DepositRecord {
            fields: raw.fields(self.chain_id, dest_token),
            timestamp: raw.timestamp.unwrap_or_default(),
        })
    }

    async fn get_pending_withdraw(&self, hash: &TransferHash) -> Lookup<PendingWithdrawRecord> {
        let bridge = self.bridge;
        let chain_id = self.chain_id;
        let hash = hash.0;
        with_fallback(
            &self.handles,
            self.request_timeout,
            "getPendingWithdraw",
            |handle| async move {
                let contract = Bridge::new(bridge, &handle.provider);
                let result = contract
                    .getPendingWithdraw(FixedBytes(hash))
                    .call()
                    .await
                    .map_err(|e| eyre!("Failed to get pending withdraw: {}", e))?;
                Ok(pending_withdraw_from_return(chain_id, result))
            },
        )
        .await
    }

    async fn list_withdraw_hashes(&self, options: &ListOptions) -> Lookup<Vec<WithdrawListing>> {
        let bridge = self.bridge;
        let cap = options.page_size as usize * options.max_pages as usize;
        let lookup = with_fallback(
            &self.handles,
            self.request_timeout,
            "getPendingWithdrawHashes",
            |handle| async move {
                let contract = Bridge::new(bridge, &handle.provider);
                let result = contract
                    .getPendingWithdrawHashes()
                    .call()
                    .await
                    .map_err(|e| eyre!("Failed to get pending withdraw hashes: {}", e))?;
                Ok(Some(result.hashes))
            },
        )
        .await;

        lookup.map(|hashes| {
            if hashes.len() > cap {
                warn!(
                    ledger = %self.name,
                    total = hashes.len(),
                    cap,
                    "Withdraw hash list exceeds cap, keeping the most recent"
                );
            }
            let skip = hashes.len().saturating_sub(cap);
            hashes
                .into_iter()
                .skip(skip)
                .map(|h| WithdrawListing {
                    hash: TransferHash(h.0),
                    record: None,
                })
                .collect()
        })
    }

    async fn scan_deposit_events(&self, window: ScanWindow) -> Lookup<Vec<DepositEvent>> {
        let blocks = match window {
            ScanWindow::RecentBlocks(blocks) => blocks,
            ScanWindow::Nonces { .. } | ScanWindow::LatestNonces(_) => {
                warn!(ledger = %self.name, "Nonce-window scans are not supported on EVM ledgers");
                return Lookup::Found(Vec::new());
            }
        };

        let latest = match self.latest_block().await {
            Lookup::Found(block) => block,
            Lookup::NotFound => return Lookup::Found(Vec::new()),
            Lookup::Unreachable(failures) => return Lookup::Unreachable(failures),
        };

        self.block_times.write().await.clear();
        let mut raws = Vec::new();
        for (from, to) in block_chunks(latest, blocks, self.max_block_range) {
            match self.deposit_logs(from, to).await {
                Lookup::Found(chunk) => raws.extend(chunk),
                Lookup::NotFound => {}
                Lookup::Unreachable(failures) => {
                    if raws.is_empty() {
                        return Lookup::Unreachable(failures);
                    }
                    warn!(
                        ledger = %self.name,
                        from,
                        to,
                        "Log scan interrupted, returning partial results"
                    );
                    break;
                }
            }
        }

        let events = self.complete_deposits(raws).await;
        debug!(ledger = %self.name, count = events.len(), latest, "Scanned deposit events");
        Lookup::Found(events)
    }
}

// ============================================================================
// Decoding
// ============================================================================

fn timestamp_secs(value: U256) -> u64 {
    value.saturating_to::<u64>()
}

/// Deposit from a `getDeposit` result; zero timestamp means absent
pub fn raw_deposit_from_return(result: Bridge::getDepositReturn) -> Option<RawDeposit> {
    if result.timestamp.is_zero() {
        return None;
    }
    Some(RawDeposit {
        dest_chain: ChainId(result.destChain.0),
        src_account: result.srcAccount.0,
        dest_account: result.destAccount.0,
        token: result.token,
        amount: result.amount,
        nonce: result.nonce,
        timestamp: Some(timestamp_secs(result.timestamp)),
        block_number: None,
    })
}

/// Token word to hash; an unmapped (zero) destination falls back to the source address
pub fn dest_token_word(token: &Address, mapped: [u8; 32]) -> [u8; 32] {
    if mapped == [0u8; 32] {
        address_to_word(&token.0 .0)
    } else {
        mapped
    }
}

/// Pending withdraw record from a `getPendingWithdraw` result; zero `submittedAt` means absent
///
/// The stored token is already the local ERC20 the withdraw pays out.
pub fn pending_withdraw_from_return(
    this_chain: ChainId,
    result: Bridge::getPendingWithdrawReturn,
) -> Option<PendingWithdrawRecord> {
    if result.submittedAt.is_zero() {
        return None;
    }
    Some(PendingWithdrawRecord {
        fields: TransferFields::from_withdraw_view(
            ChainId(result.srcChain.0),
            this_chain,
            result.srcAccount.0,
            result.destAccount.0,
            address_to_word(&result.token.0 .0),
            result.amount,
            U256::from(result.nonce),
        ),
        submitted_at: timestamp_secs(result.submittedAt),
        approved_at: timestamp_secs(result.approvedAt),
        approved: result.approved,
        cancelled: result.cancelled,
        executed: result.executed,
    })
}

/// Parse a Deposit event from raw log topics and data
///
/// Event: Deposit(bytes4 indexed destChain, bytes32 indexed destAccount,
///                bytes32 srcAccount, address token, uint256 amount,
///                uint64 nonce, uint256 fee)
pub fn parse_deposit_log(
    topics: &[B256],
    data: &[u8],
    block_number: Option<u64>,
    block_timestamp: Option<u64>,
) -> Option<RawDeposit> {
    if topics.len() < 3 || topics[0] != Bridge::Deposit::SIGNATURE_HASH {
        return None;
    }

    // topic[1] = destChain (bytes4, left-aligned in bytes32)
    let mut dest_chain = [0u8; 4];
    dest_chain.copy_from_slice(&topics[1][..4]);

    // Data fields:
    //   [0..32]    srcAccount (bytes32)
    //   [32..64]   token      (address, right-aligned)
    //   [64..96]   amount     (uint256)
    //   [96..128]  nonce      (uint64, right-aligned)
    //   [128..160] fee        (uint256)
    if data.len() < 160 {
        return None;
    }
    let src_account: [u8; 32] = data[0..32].try_into().ok()?;
    let token = Address::from_slice(&data[44..64]);
    let amount = U256::from_be_slice(&data[64..96]);
    let nonce = u64::from_be_bytes(data[120..128].try_into().ok()?);

    Some(RawDeposit {
        dest_chain: ChainId(dest_chain),
        src_account,
        dest_account: topics[2].0,
        token,
        amount,
        nonce,
        timestamp: block_timestamp,
        block_number,
    })
}

/// Split the last `blocks` blocks up to `latest` into inclusive ranges of at most `max_range`
pub fn block_chunks(latest: u64, blocks: u64, max_range: u64) -> Vec<(u64, u64)> {
    if blocks == 0 {
        return Vec::new();
    }
    let max_range = max_range.max(1);
    let start = latest.saturating_sub(blocks - 1);

    let mut chunks = Vec::new();
    let mut from = start;
    while from <= latest {
        let to = from.saturating_add(max_range - 1).min(latest);
        chunks.push((from, to));
        if to == u64::MAX {
            break;
        }
        from = to + 1;
    }
    chunks
}
