//! Hash monitor
//!
//! Enumerates deposit and withdraw hashes on every ledger within bounded
//! windows, then merges them into one entry per hash. Each run starts from
//! scratch; nothing is carried between runs.

use std::cmp::Ordering;
use std::collections::HashMap;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::MAX_PAGE_SIZE;
use crate::endpoints::Lookup;
use crate::ledger::{Ledger, ListOptions, ScanWindow};
use crate::types::{LedgerFamily, PendingWithdrawRecord, TransferHash, WithdrawStatus};

/// Bounds for one monitor run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorOptions {
    /// Overrides each EVM ledger's configured block window
    pub evm_scan_blocks: Option<u64>,
    /// Overrides each Cosmos ledger's configured nonce cap
    pub cosmos_max_nonces: Option<u64>,
    pub page_size: u32,
    pub max_pages: u32,
    /// Hash-only listings looked up individually, per ledger
    pub max_withdraw_lookups: usize,
    pub include_deposits: bool,
    pub include_withdrawals: bool,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            evm_scan_blocks: None,
            cosmos_max_nonces: None,
            page_size: MAX_PAGE_SIZE,
            max_pages: 20,
            max_withdraw_lookups: 200,
            include_deposits: true,
            include_withdrawals: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservationKind {
    Deposit,
    Withdraw,
}

/// One sighting of a hash on one ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub hash: TransferHash,
    pub ledger: String,
    pub kind: ObservationKind,
    pub timestamp: Option<u64>,
    /// `None` when the source does not carry approval state
    pub approved: Option<bool>,
    pub cancelled: bool,
    pub executed: bool,
}

impl Observation {
    pub fn deposit(hash: TransferHash, ledger: &str, timestamp: Option<u64>) -> Self {
        Self {
            hash,
            ledger: ledger.to_string(),
            kind: ObservationKind::Deposit,
            timestamp,
            approved: None,
            cancelled: false,
            executed: false,
        }
    }

    /// Withdraw sighting; without a record only the hash is known
    pub fn withdraw(hash: TransferHash, ledger: &str, record: Option<&PendingWithdrawRecord>) -> Self {
        Self {
            hash,
            ledger: ledger.to_string(),
            kind: ObservationKind::Withdraw,
            timestamp: record.map(|r| r.submitted_at).filter(|&t| t != 0),
            approved: record.map(|r| r.approved),
            cancelled: record.is_some_and(|r| r.cancelled),
            executed: record.is_some_and(|r| r.executed),
        }
    }
}

/// Merged view of one hash across all ledgers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorEntry {
    pub hash: TransferHash,
    pub timestamp: Option<u64>,
    pub deposit_ledger: Option<String>,
    pub withdraw_ledger: Option<String>,
    pub approved: bool,
    pub cancelled: bool,
    pub executed: bool,
}

impl MonitorEntry {
    fn new(hash: TransferHash) -> Self {
        Self {
            hash,
            timestamp: None,
            deposit_ledger: None,
            withdraw_ledger: None,
            approved: false,
            cancelled: false,
            executed: false,
        }
    }

    /// Most advanced withdraw state seen; `None` if only a deposit is known
    pub fn status(&self) -> Option<WithdrawStatus> {
        if self.withdraw_ledger.is_none() && !(self.approved || self.cancelled || self.executed) {
            return None;
        }
        Some(WithdrawStatus::from_flags(
            self.approved,
            self.cancelled,
            self.executed,
        ))
    }

    /// A deposit was seen but no withdraw yet
    pub fn is_awaiting_withdraw(&self) -> bool {
        self.deposit_ledger.is_some() && self.withdraw_ledger.is_none()
    }

    /// A withdraw was seen with no matching deposit in the scanned windows
    pub fn is_unmatched_withdraw(&self) -> bool {
        self.withdraw_ledger.is_some() && self.deposit_ledger.is_none()
    }
}

/// Merge observations into one entry per hash
///
/// `executed` and `cancelled` stick once any source reports them, `approved`
/// takes the last reported value and `timestamp` keeps the first one seen.
/// Output is newest first, undated entries last, ties by hash.
pub fn merge_observations(observations: Vec<Observation>) -> Vec<MonitorEntry> {
    let mut merged: HashMap<TransferHash, MonitorEntry> = HashMap::new();

    for obs in observations {
        let entry = merged
            .entry(obs.hash)
            .or_insert_with(|| MonitorEntry::new(obs.hash));

        entry.executed |= obs.executed;
        entry.cancelled |= obs.cancelled;
        if let Some(approved) = obs.approved {
            entry.approved = approved;
        }
        if entry.timestamp.is_none() {
            entry.timestamp = obs.timestamp;
        }
        match obs.kind {
            ObservationKind::Deposit => {
                entry.deposit_ledger.get_or_insert(obs.ledger);
            }
            ObservationKind::Withdraw => {
                entry.withdraw_ledger.get_or_insert(obs.ledger);
            }
        }
    }

    let mut entries: Vec<MonitorEntry> = merged.into_values().collect();
    entries.sort_by(|a, b| {
        let by_time = match (a.timestamp, b.timestamp) {
            (Some(x), Some(y)) => y.cmp(&x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        by_time.then_with(|| a.hash.cmp(&b.hash))
    });
    entries
}

/// Result of one monitor run
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MonitorReport {
    pub entries: Vec<MonitorEntry>,
    /// Ledgers where a scan or listing came back unreachable
    pub failed_ledgers: Vec<String>,
}

impl MonitorReport {
    pub fn get(&self, hash: &TransferHash) -> Option<&MonitorEntry> {
        self.entries.iter().find(|e| &e.hash == hash)
    }
}

/// Bounded hash enumeration over a set of ledgers
pub struct HashMonitor {
    ledgers: Vec<Ledger>,
    options: MonitorOptions,
}

impl HashMonitor {
    pub fn new(ledgers: Vec<Ledger>, options: MonitorOptions) -> Self {
        Self { ledgers, options }
    }

    pub fn options(&self) -> &MonitorOptions {
        &self.options
    }

    /// Scan every ledger in parallel and merge what was seen
    pub async fn enumerate_all(&self) -> MonitorReport {
        let mut tasks = JoinSet::new();
        for (idx, ledger) in self.ledgers.iter().enumerate() {
            let ledger = ledger.clone();
            let options = self.options;
            tasks.spawn(async move { (idx, observe_ledger(&ledger, &options).await) });
        }

        let mut results: Vec<Option<(Vec<Observation>, bool)>> =
            (0..self.ledgers.len()).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, result)) => results[idx] = Some(result),
                Err(e) => tracing::error!(error = %e, "Monitor task failed"),
            }
        }

        // Merge in configuration order so "last approved wins" is deterministic
        let mut observations = Vec::new();
        let mut failed_ledgers = Vec::new();
        for (ledger, result) in self.ledgers.iter().zip(results) {
            match result {
                Some((seen, failed)) => {
                    observations.extend(seen);
                    if failed {
                        failed_ledgers.push(ledger.name.clone());
                    }
                }
                None => failed_ledgers.push(ledger.name.clone()),
            }
        }

        let entries = merge_observations(observations);
        info!(
            entries = entries.len(),
            failed = failed_ledgers.len(),
            "Monitor run complete"
        );
        MonitorReport {
            entries,
            failed_ledgers,
        }
    }
}

/// Collect observations from one ledger; the flag reports any unreachable call
async fn observe_ledger(ledger: &Ledger, options: &MonitorOptions) -> (Vec<Observation>, bool) {
    let client = ledger.client();
    let mut observations = Vec::new();
    let mut failed = false;

    if options.include_deposits {
        let window = match ledger.family {
            LedgerFamily::Evm => ScanWindow::RecentBlocks(
                options.evm_scan_blocks.unwrap_or(ledger.deposit_scan_blocks),
            ),
            LedgerFamily::Cosmos => ScanWindow::LatestNonces(
                options.cosmos_max_nonces.unwrap_or(ledger.max_deposit_nonces),
            ),
        };
        match client.scan_deposit_events(window).await {
            Lookup::Found(events) => {
                debug!(ledger = %ledger.name, count = events.len(), "Deposits observed");
                observations.extend(
                    events
                        .into_iter()
                        .map(|e| Observation::deposit(e.hash, &ledger.name, e.timestamp)),
                );
            }
            Lookup::NotFound => {}
            Lookup::Unreachable(_) => {
                warn!(ledger = %ledger.name, "Deposit scan failed, ledger unreachable");
                failed = true;
            }
        }
    }

    if options.include_withdrawals {
        let list_options = ListOptions {
            page_size: options.page_size.clamp(1, MAX_PAGE_SIZE),
            max_pages: options.max_pages.max(1),
        };
        match client.list_withdraw_hashes(&list_options).await {
            Lookup::Found(listings) => {
                let mut lookups = 0usize;
                for listing in listings {
                    let observation = match listing.record {
                        Some(record) => {
                            Observation::withdraw(listing.hash, &ledger.name, Some(&record))
                        }
                        None if lookups < options.max_withdraw_lookups => {
                            lookups += 1;
                            match client.get_pending_withdraw(&listing.hash).await {
                                Lookup::Found(record) => {
                                    Observation::withdraw(listing.hash, &ledger.name, Some(&record))
                                }
                                Lookup::NotFound => {
                                    Observation::withdraw(listing.hash, &ledger.name, None)
                                }
                                Lookup::Unreachable(_) => {
                                    failed = true;
                                    Observation::withdraw(listing.hash, &ledger.name, None)
                                }
                            }
                        }
                        None => Observation::withdraw(listing.hash, &ledger.name, None),
                    };
                    observations.push(observation);
                }
            }
            Lookup::NotFound => {}
            Lookup::Unreachable(_) => {
                warn!(ledger = %ledger.name, "Withdraw listing failed, ledger unreachable");
                failed = true;
            }
        }
    }

    (observations, failed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(byte: u8) -> TransferHash {
        TransferHash([byte; 32])
    }

    fn withdraw_obs(byte: u8, ledger: &str, approved: bool, cancelled: bool, executed: bool) -> Observation {
        Observation {
            hash: hash(byte),
            ledger: ledger.to_string(),
            kind: ObservationKind::Withdraw,
            timestamp: Some(100),
            approved: Some(approved),
            cancelled,
            executed,
        }
    }

    #[test]
    fn test_merge_ors_terminal_flags() {
        let entries = merge_observations(vec![
            withdraw_obs(1, "a", true, false, true),
            withdraw_obs(1, "b", false, true, false),
        ]);
        assert_eq!(entries.len(), 1);
        assert!(entries[0].executed);
        assert!(entries[0].cancelled);
        // Last observed approval wins
        assert!(!entries[0].approved);
        assert_eq!(entries[0].withdraw_ledger.as_deref(), Some("a"));
        assert_eq!(entries[0].status(), Some(WithdrawStatus::Executed));
    }

    #[test]
    fn test_merge_keeps_first_timestamp() {
        let entries = merge_observations(vec![
            Observation::deposit(hash(1), "evm", None),
            Observation::deposit(hash(1), "evm", Some(5)),
            Observation::deposit(hash(1), "evm", Some(9)),
        ]);
        assert_eq!(entries[0].timestamp, Some(5));
        assert!(entries[0].is_awaiting_withdraw());
        assert_eq!(entries[0].status(), None);
    }

    #[test]
    fn test_merge_joins_deposit_and_withdraw() {
        let entries = merge_observations(vec![
            Observation::deposit(hash(7), "bsc", Some(10)),
            withdraw_obs(7, "terra", true, false, false),
        ]);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].deposit_ledger.as_deref(), Some("bsc"));
        assert_eq!(entries[0].withdraw_ledger.as_deref(), Some("terra"));
        assert_eq!(entries[0].timestamp, Some(10));
        assert_eq!(entries[0].status(), Some(WithdrawStatus::Approved));
    }

    #[test]
    fn test_sort_newest_first_then_hash() {
        let entries = merge_observations(vec![
            Observation::deposit(hash(3), "x", None),
            Observation::deposit(hash(2), "x", Some(50)),
            Observation::deposit(hash(9), "x", Some(100)),
            Observation::deposit(hash(1), "x", Some(50)),
            Observation::deposit(hash(0), "x", None),
        ]);
        let order: Vec<u8> = entries.iter().map(|e| e.hash.0[0]).collect();
        assert_eq!(order, vec![9, 1, 2, 0, 3]);
    }

    #[test]
    fn test_merge_is_order_independent_for_sticky_flags() {
        let a = withdraw_obs(4, "a", true, true, false);
        let b = withdraw_obs(4, "b", true, false, true);
        let forward = merge_observations(vec![a.clone(), b.clone()]);
        let reverse = merge_observations(vec![b, a]);
        assert_eq!(forward[0].executed, reverse[0].executed);
        assert_eq!(forward[0].cancelled, reverse[0].cancelled);
        assert_eq!(forward[0].approved, reverse[0].approved);
    }

    #[test]
    fn test_hash_only_withdraw_observation() {
        let obs = Observation::withdraw(hash(1), "bsc", None);
        assert_eq!(obs.approved, None);
        assert_eq!(obs.timestamp, None);

        let entries = merge_observations(vec![obs]);
        assert!(entries[0].is_unmatched_withdraw());
        assert_eq!(entries[0].status(), Some(WithdrawStatus::Submitted));
    }
}
