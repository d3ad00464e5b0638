//! Transfer resolution
//!
//! Looks a transfer hash up on every configured ledger at once and reports
//! where its deposit and pending withdrawal live. Unreachable ledgers are
//! reported alongside whatever the reachable ones returned.

use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::endpoints::Lookup;
use crate::error::CodecError;
use crate::ledger::Ledger;
use crate::types::{ChainId, DepositRecord, LedgerFamily, PendingWithdrawRecord, TransferHash};

/// A record together with the ledger it was found on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located<T> {
    pub ledger: String,
    pub chain_id: ChainId,
    pub family: LedgerFamily,
    pub record: T,
}

/// Inconsistency noticed while resolving a hash
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionWarning {
    /// More than one ledger claims the deposit; the first configured one is kept
    DuplicateDeposit { ledgers: Vec<String> },
    /// More than one ledger claims the withdrawal; the first configured one is kept
    DuplicateWithdraw { ledgers: Vec<String> },
    /// The ledger returned a record whose fields hash to something else
    HashMismatch {
        ledger: String,
        recomputed: TransferHash,
    },
}

/// Everything known about one transfer hash
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub hash: TransferHash,
    pub deposit: Option<Located<DepositRecord>>,
    pub withdraw: Option<Located<PendingWithdrawRecord>>,
    pub queried_ledgers: Vec<String>,
    /// Ledgers where at least one call exhausted every endpoint
    pub failed_ledgers: Vec<String>,
    pub warnings: Vec<ResolutionWarning>,
}

impl Resolution {
    /// True when every queried ledger answered
    pub fn is_complete(&self) -> bool {
        self.failed_ledgers.is_empty()
    }

    /// A pending withdraw with no deposit behind it
    pub fn is_unbacked_withdraw(&self) -> bool {
        self.deposit.is_none() && self.withdraw.is_some()
    }
}

type LedgerAnswer = (Lookup<DepositRecord>, Lookup<PendingWithdrawRecord>);

/// Resolves transfer hashes across a fixed set of ledgers
#[derive(Debug, Clone)]
pub struct TransferResolver {
    ledgers: Vec<Ledger>,
}

impl TransferResolver {
    pub fn new(ledgers: Vec<Ledger>) -> Self {
        Self { ledgers }
    }

    pub fn ledgers(&self) -> &[Ledger] {
        &self.ledgers
    }

    pub fn ledger_by_chain_id(&self, chain_id: &ChainId) -> Option<&Ledger> {
        self.ledgers.iter().find(|l| &l.chain_id == chain_id)
    }

    pub fn ledger_by_name(&self, name: &str) -> Option<&Ledger> {
        self.ledgers.iter().find(|l| l.name == name)
    }

    /// Parse hash text and resolve it
    pub async fn resolve_text(&self, text: &str) -> Result<Resolution, CodecError> {
        let hash = TransferHash::from_hex(text)?;
        Ok(self.resolve(&hash).await)
    }

    /// Query one ledger for a deposit; `None` if no ledger has that chain ID
    pub async fn find_deposit_on(
        &self,
        chain_id: &ChainId,
        hash: &TransferHash,
    ) -> Option<Lookup<DepositRecord>> {
        let ledger = self.ledger_by_chain_id(chain_id)?;
        Some(ledger.client().get_deposit(hash).await)
    }

    /// Look up `hash` as a deposit and as a pending withdraw on every ledger
    pub async fn resolve(&self, hash: &TransferHash) -> Resolution {
        let mut tasks = JoinSet::new();
        for (idx, ledger) in self.ledgers.iter().enumerate() {
            let client = ledger.client_arc();
            let hash = *hash;
            tasks.spawn(async move {
                let (deposit, withdraw) = tokio::join!(
                    client.get_deposit(&hash),
                    client.get_pending_withdraw(&hash)
                );
                (idx, (deposit, withdraw))
            });
        }

        let mut answers: Vec<Option<LedgerAnswer>> = (0..self.ledgers.len()).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, answer)) => answers[idx] = Some(answer),
                Err(e) => tracing::error!(hash = %hash, error = %e, "Resolve task failed"),
            }
        }

        let mut deposits = Vec::new();
        let mut withdraws = Vec::new();
        let mut queried_ledgers = Vec::with_capacity(self.ledgers.len());
        let mut failed_ledgers = Vec::new();
        let mut warnings = Vec::new();

        for (ledger, answer) in self.ledgers.iter().zip(answers) {
            queried_ledgers.push(ledger.name.clone());
            let Some((deposit, withdraw)) = answer else {
                failed_ledgers.push(ledger.name.clone());
                continue;
            };

            if deposit.is_unreachable() || withdraw.is_unreachable() {
                warn!(hash = %hash, ledger = %ledger.name, "Ledger unreachable during resolve");
                failed_ledgers.push(ledger.name.clone());
            }

            if let Lookup::Found(record) = deposit {
                check_hash(hash, ledger, record.fields.transfer_hash(), &mut warnings);
                deposits.push(locate(ledger, record));
            }
            if let Lookup::Found(record) = withdraw {
                check_hash(hash, ledger, record.fields.transfer_hash(), &mut warnings);
                withdraws.push(locate(ledger, record));
            }
        }

        if deposits.len() > 1 {
            let ledgers: Vec<String> = deposits.iter().map(|d| d.ledger.clone()).collect();
            warn!(hash = %hash, ledgers = ?ledgers, "Deposit claimed by multiple ledgers");
            warnings.push(ResolutionWarning::DuplicateDeposit { ledgers });
        }
        if withdraws.len() > 1 {
            let ledgers: Vec<String> = withdraws.iter().map(|w| w.ledger.clone()).collect();
            warn!(hash = %hash, ledgers = ?ledgers, "Withdraw claimed by multiple ledgers");
            warnings.push(ResolutionWarning::DuplicateWithdraw { ledgers });
        }

        let resolution = Resolution {
            hash: *hash,
            deposit: deposits.into_iter().next(),
            withdraw: withdraws.into_iter().next(),
            queried_ledgers,
            failed_ledgers,
            warnings,
        };

        debug!(
            hash = %hash,
            deposit = ?resolution.deposit.as_ref().map(|d| &d.ledger),
            withdraw = ?resolution.withdraw.as_ref().map(|w| &w.ledger),
            failed = resolution.failed_ledgers.len(),
            "Resolved transfer"
        );
        resolution
    }
}

fn locate<T>(ledger: &Ledger, record: T) -> Located<T> {
    Located {
        ledger: ledger.name.clone(),
        chain_id: ledger.chain_id,
        family: ledger.family,
        record,
    }
}

fn check_hash(
    queried: &TransferHash,
    ledger: &Ledger,
    recomputed: TransferHash,
    warnings: &mut Vec<ResolutionWarning>,
) {
    if &recomputed != queried {
        warn!(
            hash = %queried,
            recomputed = %recomputed,
            ledger = %ledger.name,
            "Record fields do not hash to the queried hash"
        );
        warnings.push(ResolutionWarning::HashMismatch {
            ledger: ledger.name.clone(),
            recomputed,
        });
    }
}
