//! Shared fixtures for integration tests
//!
//! [`MockLedger`] is an in-memory [`LedgerQuery`] that can be told to fail
//! like a ledger whose endpoints are all down.

#![allow(dead_code)]

use alloy::primitives::U256;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use xchain_reconciler::{
    address_to_word, keccak256, ChainId, DepositEvent, DepositRecord, EndpointFailure, Ledger,
    LedgerFamily, LedgerQuery, ListOptions, Lookup, PendingWithdrawRecord, ScanWindow,
    TransferFields, TransferHash, WithdrawListing,
};

pub const EVM_CHAIN: u32 = 1;
pub const TERRA_CHAIN: u32 = 2;

/// Scenario transfer hash: 1 -> 2, 0xaa.. -> 0xbb.., uluna, 1_000_000, nonce 1
pub const SCENARIO_HASH: &str =
    "0xb6a53b3a1dc136f31f7149da4955fae3a775867d75e06440bd2a73a7f1cc8b1b";

/// Same transfer with chains and accounts swapped
pub const SWAPPED_HASH: &str =
    "0xbb1fd2731bdb9ce6fa5edb3c14815e33f97a1d12e0d1efe8eb99e24fbe4183b9";

/// Opt-in log output: `RUST_LOG=xchain_reconciler=debug cargo test`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn account(byte: u8) -> [u8; 32] {
    address_to_word(&[byte; 20])
}

pub fn uluna() -> [u8; 32] {
    keccak256(b"uluna")
}

pub fn hash(text: &str) -> TransferHash {
    TransferHash::from_hex(text).unwrap()
}

/// Fields of the scenario transfer, optionally with a different nonce
pub fn scenario_fields(nonce: u64) -> TransferFields {
    TransferFields {
        src_chain: ChainId::from_u32(EVM_CHAIN),
        dest_chain: ChainId::from_u32(TERRA_CHAIN),
        src_account: account(0xaa),
        dest_account: account(0xbb),
        token: uluna(),
        amount: U256::from(1_000_000u64),
        nonce: U256::from(nonce),
    }
}

/// Scenario transfer with chains and accounts swapped
pub fn swapped_fields() -> TransferFields {
    TransferFields {
        src_chain: ChainId::from_u32(TERRA_CHAIN),
        dest_chain: ChainId::from_u32(EVM_CHAIN),
        src_account: account(0xbb),
        dest_account: account(0xaa),
        token: uluna(),
        amount: U256::from(1_000_000u64),
        nonce: U256::from(1u64),
    }
}

pub fn deposit(fields: TransferFields, timestamp: u64) -> DepositRecord {
    DepositRecord { fields, timestamp }
}

pub fn withdraw(fields: TransferFields, submitted_at: u64) -> PendingWithdrawRecord {
    PendingWithdrawRecord {
        fields,
        submitted_at,
        approved_at: 0,
        approved: false,
        cancelled: false,
        executed: false,
    }
}

fn down() -> Vec<EndpointFailure> {
    vec![EndpointFailure {
        endpoint: "http://mock.invalid".to_string(),
        error: "connection refused".to_string(),
    }]
}

/// In-memory bridge contract
#[derive(Default)]
pub struct MockLedger {
    /// Value returned by `this_chain_id`
    pub reported_chain_id: Option<ChainId>,
    pub deposits: HashMap<TransferHash, DepositRecord>,
    pub withdraws: HashMap<TransferHash, PendingWithdrawRecord>,
    pub listings: Vec<WithdrawListing>,
    pub events: Vec<DepositEvent>,
    /// Every call fails
    pub unreachable: bool,
    /// Only `get_deposit` fails
    pub deposit_lookups_fail: bool,
    pub withdraw_lookups: AtomicUsize,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reporting(mut self, chain_id: u32) -> Self {
        self.reported_chain_id = Some(ChainId::from_u32(chain_id));
        self
    }

    /// Store a deposit under its own hash and expose it to scans
    pub fn with_deposit(mut self, record: DepositRecord) -> Self {
        let hash = record.fields.transfer_hash();
        self.events.push(DepositEvent::new(
            record.fields.clone(),
            Some(record.timestamp),
            None,
        ));
        self.deposits.insert(hash, record);
        self
    }

    /// Store a deposit under an arbitrary key
    pub fn with_deposit_at(mut self, hash: TransferHash, record: DepositRecord) -> Self {
        self.deposits.insert(hash, record);
        self
    }

    /// Store a withdraw and list it with its full record
    pub fn with_withdraw(mut self, record: PendingWithdrawRecord) -> Self {
        let hash = record.fields.transfer_hash();
        self.listings.push(WithdrawListing {
            hash,
            record: Some(record.clone()),
        });
        self.withdraws.insert(hash, record);
        self
    }

    /// Store a withdraw that the listing returns as a bare hash
    pub fn with_hash_only_withdraw(mut self, record: PendingWithdrawRecord) -> Self {
        let hash = record.fields.transfer_hash();
        self.listings.push(WithdrawListing { hash, record: None });
        self.withdraws.insert(hash, record);
        self
    }

    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    pub fn failing_deposit_lookups(mut self) -> Self {
        self.deposit_lookups_fail = true;
        self
    }

    pub fn into_ledger(self, name: &str, family: LedgerFamily, chain_id: u32) -> Ledger {
        let ledger = Ledger::new(name, family, ChainId::from_u32(chain_id), Arc::new(self));
        match family {
            LedgerFamily::Cosmos => ledger.with_bech32_prefix("terra"),
            LedgerFamily::Evm => ledger,
        }
    }

    /// Same as `into_ledger` but keeps a handle for inspecting call counts
    pub fn into_shared_ledger(
        self,
        name: &str,
        family: LedgerFamily,
        chain_id: u32,
    ) -> (Ledger, Arc<MockLedger>) {
        let shared = Arc::new(self);
        let mut ledger = Ledger::new(name, family, ChainId::from_u32(chain_id), shared.clone());
        if family == LedgerFamily::Cosmos {
            ledger = ledger.with_bech32_prefix("terra");
        }
        (ledger, shared)
    }
}

#[async_trait]
impl LedgerQuery for MockLedger {
    async fn this_chain_id(&self) -> Lookup<ChainId> {
        if self.unreachable {
            return Lookup::Unreachable(down());
        }
        match self.reported_chain_id {
            Some(id) => Lookup::Found(id),
            None => Lookup::NotFound,
        }
    }

    async fn get_deposit(&self, hash: &TransferHash) -> Lookup<DepositRecord> {
        if self.unreachable || self.deposit_lookups_fail {
            return Lookup::Unreachable(down());
        }
        match self.deposits.get(hash) {
            Some(record) => Lookup::Found(record.clone()),
            None => Lookup::NotFound,
        }
    }

    async fn get_pending_withdraw(&self, hash: &TransferHash) -> Lookup<PendingWithdrawRecord> {
        self.withdraw_lookups.fetch_add(1, Ordering::SeqCst);
        if self.unreachable {
            return Lookup::Unreachable(down());
        }
        match self.withdraws.get(hash) {
            Some(record) => Lookup::Found(record.clone()),
            None => Lookup::NotFound,
        }
    }

    async fn list_withdraw_hashes(&self, options: &ListOptions) -> Lookup<Vec<WithdrawListing>> {
        if self.unreachable {
            return Lookup::Unreachable(down());
        }
        let cap = options.page_size as usize * options.max_pages as usize;
        Lookup::Found(self.listings.iter().take(cap).cloned().collect())
    }

    async fn scan_deposit_events(&self, _window: ScanWindow) -> Lookup<Vec<DepositEvent>> {
        if self.unreachable {
            return Lookup::Unreachable(down());
        }
        Lookup::Found(self.events.clone())
    }
}
