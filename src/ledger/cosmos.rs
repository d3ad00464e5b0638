//! Cosmos (CosmWasm) ledger adapter
//!
//! Queries the bridge contract through the LCD REST API:
//! `GET {lcd}/cosmwasm/wasm/v1/contract/{addr}/smart/{base64(json)}`.
//!
//! Binary fields come back base64 encoded, amounts as decimal strings and
//! deposit timestamps as cosmwasm `Timestamp` nanosecond strings.

use alloy::primitives::U256;
use async_trait::async_trait;
use base64::Engine;
use eyre::{eyre, Result, WrapErr};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::endpoints::{with_fallback, LcdHandle, Lookup};
use crate::hash::{address_to_word, chain_id_from_bytes, cosmos_token_to_word};
use crate::ledger::{DepositEvent, LedgerQuery, ListOptions, ScanWindow, WithdrawListing};
use crate::types::{
    parse_u256, ChainId, DepositRecord, PendingWithdrawRecord, TransferFields, TransferHash,
};

const NANOS_PER_SECOND: u64 = 1_000_000_000;

// ============================================================================
// Query Messages
// ============================================================================

/// Bridge contract queries used by the reconciler
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QueryMsg {
    ThisChainId {},
    CurrentNonce {},
    DepositHash {
        deposit_hash: String,
    },
    DepositByNonce {
        nonce: u64,
    },
    PendingWithdraw {
        withdraw_hash: String,
    },
    PendingWithdrawals {
        #[serde(skip_serializing_if = "Option::is_none")]
        start_after: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        limit: Option<u32>,
    },
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Deserialize, Debug, Clone)]
struct ThisChainIdResponse {
    chain_id: String,
}

#[derive(Deserialize, Debug, Clone)]
struct NonceResponse {
    #[serde(deserialize_with = "de_u64")]
    nonce: u64,
}

#[derive(Deserialize, Debug, Clone)]
struct DepositInfoResponse {
    dest_chain_key: String,
    src_account: String,
    dest_token_address: String,
    dest_account: String,
    #[serde(deserialize_with = "de_u256")]
    amount: U256,
    #[serde(deserialize_with = "de_u64")]
    nonce: u64,
    #[serde(deserialize_with = "de_u64")]
    deposited_at: u64,
}

/// Shared shape of `pending_withdraw` and one `pending_withdrawals` entry
#[derive(Deserialize, Debug, Clone)]
struct WithdrawResponse {
    /// Only present on listing entries
    #[serde(default)]
    withdraw_hash: Option<String>,
    /// Only present on single lookups
    #[serde(default = "default_exists")]
    exists: bool,
    src_chain: String,
    src_account: String,
    dest_account: String,
    token: String,
    #[serde(deserialize_with = "de_u256")]
    amount: U256,
    #[serde(deserialize_with = "de_u64")]
    nonce: u64,
    #[serde(deserialize_with = "de_u64")]
    submitted_at: u64,
    #[serde(default, deserialize_with = "de_u64")]
    approved_at: u64,
    #[serde(default)]
    approved: bool,
    #[serde(default)]
    cancelled: bool,
    #[serde(default)]
    executed: bool,
}

fn default_exists() -> bool {
    true
}

#[derive(Deserialize, Debug, Clone)]
struct PendingWithdrawalsResponse {
    withdrawals: Vec<WithdrawResponse>,
}

/// u64 given either as a JSON number or a decimal string
fn de_u64<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u64, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| serde::de::Error::custom(format!("not a u64: {}", n))),
        serde_json::Value::String(s) => s
            .parse::<u64>()
            .map_err(|e| serde::de::Error::custom(format!("invalid u64 {:?}: {}", s, e))),
        other => Err(serde::de::Error::custom(format!(
            "expected number or string, got {}",
            other
        ))),
    }
}

/// Uint128 / Uint256 decimal string
fn de_u256<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<U256, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => parse_u256(&s).map_err(serde::de::Error::custom),
        serde_json::Value::Number(n) => parse_u256(&n.to_string()).map_err(serde::de::Error::custom),
        other => Err(serde::de::Error::custom(format!(
            "expected decimal amount, got {}",
            other
        ))),
    }
}

// ============================================================================
// Field Decoding
// ============================================================================

fn decode_binary(value: &str, what: &str) -> Result<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(value)
        .map_err(|e| eyre!("Failed to decode {} as base64: {}", what, e))
}

/// 32-byte word from a Binary field; 20-byte accounts are left-padded
fn decode_word(value: &str, what: &str) -> Result<[u8; 32]> {
    let bytes = decode_binary(value, what)?;
    match bytes.len() {
        32 => {
            let mut word = [0u8; 32];
            word.copy_from_slice(&bytes);
            Ok(word)
        }
        20 => {
            let mut addr = [0u8; 20];
            addr.copy_from_slice(&bytes);
            Ok(address_to_word(&addr))
        }
        n => Err(eyre!("Expected 20 or 32 bytes for {}, got {}", what, n)),
    }
}

/// Chain ID from a Binary field: up to 4 bytes, or a left-aligned 32-byte key
fn decode_chain(value: &str, what: &str) -> Result<ChainId> {
    let bytes = decode_binary(value, what)?;
    if bytes.len() == 32 {
        if bytes[4..].iter().any(|&b| b != 0) {
            return Err(eyre!("{} is not a left-aligned 4-byte chain key", what));
        }
        return Ok(chain_id_from_bytes(&bytes[..4])?);
    }
    chain_id_from_bytes(&bytes).wrap_err_with(|| format!("Invalid {}", what))
}

fn deposit_record(this_chain: ChainId, resp: DepositInfoResponse) -> Result<Option<DepositRecord>> {
    if resp.deposited_at == 0 {
        return Ok(None);
    }
    let fields = TransferFields::from_deposit_view(
        this_chain,
        decode_chain(&resp.dest_chain_key, "dest_chain_key")?,
        decode_word(&resp.src_account, "src_account")?,
        decode_word(&resp.dest_account, "dest_account")?,
        decode_word(&resp.dest_token_address, "dest_token_address")?,
        resp.amount,
        U256::from(resp.nonce),
    );
    Ok(Some(DepositRecord {
        fields,
        timestamp: resp.deposited_at / NANOS_PER_SECOND,
    }))
}

fn withdraw_record(
    this_chain: ChainId,
    resp: &WithdrawResponse,
) -> Result<Option<PendingWithdrawRecord>> {
    if !resp.exists || resp.submitted_at == 0 {
        return Ok(None);
    }
    let fields = TransferFields::from_withdraw_view(
        decode_chain(&resp.src_chain, "src_chain")?,
        this_chain,
        decode_word(&resp.src_account, "src_account")?,
        decode_word(&resp.dest_account, "dest_account")?,
        cosmos_token_to_word(&resp.token),
        resp.amount,
        U256::from(resp.nonce),
    );
    Ok(Some(PendingWithdrawRecord {
        fields,
        submitted_at: resp.submitted_at,
        approved_at: resp.approved_at,
        approved: resp.approved,
        cancelled: resp.cancelled,
        executed: resp.executed,
    }))
}

/// One listing page plus the raw cursor of its last entry
fn withdraw_page(
    this_chain: ChainId,
    resp: PendingWithdrawalsResponse,
) -> Result<(Vec<WithdrawListing>, Option<String>)> {
    let mut listings = Vec::with_capacity(resp.withdrawals.len());
    let mut cursor = None;
    for entry in &resp.withdrawals {
        let raw_hash = entry
            .withdraw_hash
            .as_deref()
            .ok_or_else(|| eyre!("Listing entry is missing withdraw_hash"))?;
        listings.push(WithdrawListing {
            hash: TransferHash(decode_word(raw_hash, "withdraw_hash")?),
            record: withdraw_record(this_chain, entry)?,
        });
        cursor = Some(raw_hash.to_string());
    }
    Ok((listings, cursor))
}

/// Inclusive nonce range for a nonce-window scan
pub fn nonce_range(current_nonce: u64, start: u64, limit: u64) -> Option<(u64, u64)> {
    if limit == 0 {
        return None;
    }
    let end = current_nonce.min(start.saturating_add(limit - 1));
    (start <= end).then_some((start, end))
}

/// Inclusive range of the `limit` most recent nonces
pub fn latest_nonce_range(current_nonce: u64, limit: u64) -> Option<(u64, u64)> {
    if limit == 0 {
        return None;
    }
    Some((current_nonce.saturating_sub(limit - 1), current_nonce))
}

/// Extract `data` from an LCD smart query body; `null` means absent
fn parse_smart_response<R: DeserializeOwned>(body: serde_json::Value) -> Result<Option<R>> {
    match body.get("data") {
        None => Err(eyre!("Missing 'data' field in response")),
        Some(serde_json::Value::Null) => Ok(None),
        Some(data) => serde_json::from_value(data.clone())
            .map(Some)
            .map_err(|e| eyre!("Failed to parse response: {}", e)),
    }
}

/// Run one smart query against one LCD endpoint
async fn smart_query<R: DeserializeOwned>(
    handle: &LcdHandle,
    contract: &str,
    msg: &QueryMsg,
) -> Result<Option<R>> {
    let query_json = serde_json::to_string(msg)?;
    let query_b64 = base64::engine::general_purpose::STANDARD.encode(query_json);

    let url = format!(
        "{}/cosmwasm/wasm/v1/contract/{}/smart/{}",
        handle.base_url, contract, query_b64
    );

    let response = handle
        .client
        .get(&url)
        .send()
        .await
        .wrap_err("Failed to query contract")?;

    if !response.status().is_success() {
        return Err(eyre!(
            "Query failed: {} - {}",
            response.status(),
            response.text().await.unwrap_or_default()
        ));
    }

    let body: serde_json::Value = response
        .json()
        .await
        .wrap_err("Failed to read query response")?;
    parse_smart_response(body)
}

// ============================================================================
// Adapter
// ============================================================================

/// Adapter for one CosmWasm bridge ledger
pub struct CosmosLedger {
    name: String,
    handles: Vec<LcdHandle>,
    bridge_address: String,
    chain_id: ChainId,
    request_timeout: Duration,
}

impl CosmosLedger {
    pub fn new(
        name: &str,
        handles: Vec<LcdHandle>,
        bridge_address: &str,
        request_timeout: Duration,
    ) -> Self {
        Self {
            name: name.to_string(),
            handles,
            bridge_address: bridge_address.to_string(),
            chain_id: ChainId::default(),
            request_timeout,
        }
    }

    pub fn with_chain_id(mut self, chain_id: ChainId) -> Self {
        self.chain_id = chain_id;
        self
    }

    /// Smart query with fallback, converting the decoded response
    ///
    /// A conversion error counts against the endpoint that produced it.
    async fn query<R, T, F>(&self, operation: &str, msg: QueryMsg, convert: F) -> Lookup<T>
    where
        R: DeserializeOwned + Send,
        T: Send,
        F: Fn(R) -> Result<Option<T>> + Send + Sync,
    {
        let msg = &msg;
        let convert = &convert;
        let bridge = self.bridge_address.as_str();
        with_fallback(
            &self.handles,
            self.request_timeout,
            operation,
            |handle| async move {
                match smart_query::<R>(&handle, bridge, msg).await? {
                    Some(response) => convert(response),
                    None => Ok(None),
                }
            },
        )
        .await
    }

    async fn deposit_by_nonce(&self, nonce: u64) -> Lookup<DepositRecord> {
        let chain_id = self.chain_id;
        self.query(
            "deposit_by_nonce",
            QueryMsg::DepositByNonce { nonce },
            move |resp: DepositInfoResponse| deposit_record(chain_id, resp),
        )
        .await
    }
}

#[async_trait]
impl LedgerQuery for CosmosLedger {
    async fn this_chain_id(&self) -> Lookup<ChainId> {
        self.query(
            "this_chain_id",
            QueryMsg::ThisChainId {},
            |resp: ThisChainIdResponse| {
                let id = decode_chain(&resp.chain_id, "chain_id")?;
                Ok((id.to_u32() != 0).then_some(id))
            },
        )
        .await
    }

    async fn get_deposit(&self, hash: &TransferHash) -> Lookup<DepositRecord> {
        let chain_id = self.chain_id;
        self.query(
            "deposit_hash",
            QueryMsg::DepositHash {
                deposit_hash: base64::engine::general_purpose::STANDARD.encode(hash.0),
            },
            move |resp: DepositInfoResponse| deposit_record(chain_id, resp),
        )
        .await
    }

    async fn get_pending_withdraw(&self, hash: &TransferHash) -> Lookup<PendingWithdrawRecord> {
        let chain_id = self.chain_id;
        self.query(
            "pending_withdraw",
            QueryMsg::PendingWithdraw {
                withdraw_hash: base64::engine::general_purpose::STANDARD.encode(hash.0),
            },
            move |resp: WithdrawResponse| withdraw_record(chain_id, &resp),
        )
        .await
    }

    async fn list_withdraw_hashes(&self, options: &ListOptions) -> Lookup<Vec<WithdrawListing>> {
        let chain_id = self.chain_id;
        let mut listings = Vec::new();
        let mut start_after: Option<String> = None;

        for page in 0..options.max_pages {
            let msg = QueryMsg::PendingWithdrawals {
                start_after: start_after.clone(),
                limit: Some(options.page_size),
            };
            let lookup = self
                .query("pending_withdrawals", msg, move |resp: PendingWithdrawalsResponse| {
                    withdraw_page(chain_id, resp).map(Some)
                })
                .await;

            match lookup {
                Lookup::Found((entries, cursor)) => {
                    let count = entries.len();
                    listings.extend(entries);
                    if count < options.page_size as usize || cursor.is_none() {
                        break;
                    }
                    start_after = cursor;
                }
                Lookup::NotFound => break,
                Lookup::Unreachable(failures) => {
                    if page == 0 {
                        return Lookup::Unreachable(failures);
                    }
                    warn!(
                        ledger = %self.name,
                        page,
                        collected = listings.len(),
                        "Withdraw listing interrupted, returning partial results"
                    );
                    break;
                }
            }
        }

        debug!(ledger = %self.name, count = listings.len(), "Listed pending withdrawals");
        Lookup::Found(listings)
    }

    async fn scan_deposit_events(&self, window: ScanWindow) -> Lookup<Vec<DepositEvent>> {
        if let ScanWindow::RecentBlocks(_) = window {
            warn!(ledger = %self.name, "Block-window scans are not supported on Cosmos ledgers");
            return Lookup::Found(Vec::new());
        }

        let current = match self
            .query("current_nonce", QueryMsg::CurrentNonce {}, |resp: NonceResponse| {
                Ok(Some(resp.nonce))
            })
            .await
        {
            Lookup::Found(nonce) => nonce,
            Lookup::NotFound => return Lookup::Found(Vec::new()),
            Lookup::Unreachable(failures) => return Lookup::Unreachable(failures),
        };

        let range = match window {
            ScanWindow::Nonces { start, limit } => nonce_range(current, start, limit),
            ScanWindow::LatestNonces(limit) => latest_nonce_range(current, limit),
            ScanWindow::RecentBlocks(_) => None,
        };
        let Some((first, last)) = range else {
            return Lookup::Found(Vec::new());
        };

        // Newest first, so an interrupted scan keeps the most recent deposits
        let mut events = Vec::new();
        for nonce in (first..=last).rev() {
            match self.deposit_by_nonce(nonce).await {
                Lookup::Found(record) => {
                    events.push(DepositEvent::new(record.fields, Some(record.timestamp), None))
                }
                Lookup::NotFound => {}
                Lookup::Unreachable(failures) => {
                    if nonce == last {
                        return Lookup::Unreachable(failures);
                    }
                    warn!(
                        ledger = %self.name,
                        nonce,
                        collected = events.len(),
                        "Nonce scan interrupted, returning partial results"
                    );
                    break;
                }
            }
        }

        debug!(ledger = %self.name, count = events.len(), first, last, "Scanned deposits by nonce");
        Lookup::Found(events)
    }
}
