//! Chain ID discovery
//!
//! A ledger's bridge chain ID can be configured or discovered from its bridge
//! contract (`getThisChainId` on EVM, `this_chain_id` on Cosmos). At startup the
//! configured IDs can also be cross-checked against what each contract reports,
//! which catches a config that points a ledger name at the wrong chain.
//!
//! ## Usage
//!
//! ```ignore
//! use xchain_reconciler::discovery::verify_chain_ids;
//!
//! for check in verify_chain_ids(reconciler.ledgers()).await {
//!     if !check.is_consistent() {
//!         eprintln!("{}: {:?}", check.ledger, check.status);
//!     }
//! }
//! ```

use eyre::{eyre, Result};
use tokio::task::JoinSet;

use crate::config::LedgerConfig;
use crate::endpoints::Lookup;
use crate::ledger::{Ledger, LedgerQuery};
use crate::types::ChainId;

/// Configured chain ID, or the one the bridge reports when none is configured
pub async fn resolve_chain_id(config: &LedgerConfig, client: &dyn LedgerQuery) -> Result<ChainId> {
    if let Some(id) = config.chain_id {
        return Ok(id);
    }

    match client.this_chain_id().await {
        Lookup::Found(id) => {
            tracing::info!(ledger = %config.name, chain_id = %id, "Discovered chain ID from bridge");
            Ok(id)
        }
        Lookup::NotFound => Err(eyre!(
            "Bridge on ledger {} did not report a chain ID",
            config.name
        )),
        Lookup::Unreachable(failures) => Err(eyre!(
            "Cannot discover chain ID for ledger {}: all {} endpoints failed",
            config.name,
            failures.len()
        )),
    }
}

/// Outcome of comparing a ledger's chain ID with its bridge
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainIdStatus {
    Match,
    Mismatch { reported: ChainId },
    Unreachable,
    NotReported,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainIdCheck {
    pub ledger: String,
    pub configured: ChainId,
    pub status: ChainIdStatus,
}

impl ChainIdCheck {
    /// True unless the bridge positively reported a different ID
    pub fn is_consistent(&self) -> bool {
        !matches!(self.status, ChainIdStatus::Mismatch { .. })
    }
}

/// Ask every ledger's bridge for its chain ID and compare with configuration
///
/// Ledgers are queried in parallel; results keep the input order.
pub async fn verify_chain_ids(ledgers: &[Ledger]) -> Vec<ChainIdCheck> {
    let mut tasks = JoinSet::new();
    for (idx, ledger) in ledgers.iter().enumerate() {
        let client = ledger.client_arc();
        tasks.spawn(async move { (idx, client.this_chain_id().await) });
    }

    let mut reported: Vec<Option<Lookup<ChainId>>> = vec![None; ledgers.len()];
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((idx, lookup)) => reported[idx] = Some(lookup),
            Err(e) => tracing::error!(error = %e, "Chain ID check task failed"),
        }
    }

    ledgers
        .iter()
        .zip(reported)
        .map(|(ledger, lookup)| {
            let status = match lookup {
                Some(Lookup::Found(id)) if id == ledger.chain_id => ChainIdStatus::Match,
                Some(Lookup::Found(id)) => {
                    tracing::error!(
                        ledger = %ledger.name,
                        configured = %ledger.chain_id,
                        reported = %id,
                        "Configured chain ID does not match bridge"
                    );
                    ChainIdStatus::Mismatch { reported: id }
                }
                Some(Lookup::NotFound) => ChainIdStatus::NotReported,
                Some(Lookup::Unreachable(_)) | None => {
                    tracing::warn!(ledger = %ledger.name, "Cannot verify chain ID, ledger unreachable");
                    ChainIdStatus::Unreachable
                }
            };
            ChainIdCheck {
                ledger: ledger.name.clone(),
                configured: ledger.chain_id,
                status,
            }
        })
        .collect()
}
