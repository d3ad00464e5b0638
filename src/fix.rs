//! Broken-transfer detection and fix planning
//!
//! A withdraw can be submitted on the wrong ledger with the transfer direction
//! reversed: the withdraw sits on W claiming to come from S, while the real
//! deposit was made on W towards S. Its hash then matches no deposit anywhere.
//!
//! The planner tests that hypothesis by recomputing the hash with chains and
//! accounts swapped back and asking W for a deposit under that hash. When W
//! has it, the result is a [`FixPlan`] describing the withdraw that should be
//! submitted on S instead. Nothing is ever submitted from here.

use alloy::primitives::U256;
use std::fmt;
use tracing::{debug, info, warn};

use crate::endpoints::Lookup;
use crate::hash::compute_transfer_hash;
use crate::resolver::{Resolution, TransferResolver};
use crate::types::{ChainId, LedgerFamily, TransferHash};

/// Corrected withdraw parameters for the destination ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixPlan {
    pub destination_family: LedgerFamily,
    /// Ledger the withdraw should have been submitted on (S)
    pub destination_chain: ChainId,
    pub destination_ledger: String,
    /// Ledger holding the deposit (W)
    pub src_chain: ChainId,
    pub src_account: [u8; 32],
    pub dest_account: [u8; 32],
    pub token: [u8; 32],
    pub amount: U256,
    pub nonce: U256,
    /// Hash of the real deposit
    pub transfer_hash: TransferHash,
    /// Hash of the misdirected withdraw
    pub broken_hash: TransferHash,
    /// `dest_account` rendered for the destination ledger
    pub recipient: Option<String>,
}

impl fmt::Display for FixPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "withdraw {} on {} ({}) from {} nonce {} amount {} to {}",
            self.transfer_hash,
            self.destination_ledger,
            self.destination_chain,
            self.src_chain,
            self.nonce,
            self.amount,
            self.recipient.as_deref().unwrap_or("<unknown recipient>")
        )
    }
}

/// What the planner concluded about a resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixOutcome {
    /// The resolution does not look like a misdirected withdraw
    NotApplicable { reason: String },
    /// It might be one, but the swapped-direction deposit could not be confirmed
    CannotDetermine {
        reason: String,
        candidate_hash: Option<TransferHash>,
    },
    Fix(FixPlan),
}

impl FixOutcome {
    pub fn plan(&self) -> Option<&FixPlan> {
        match self {
            FixOutcome::Fix(plan) => Some(plan),
            _ => None,
        }
    }

    fn not_applicable(reason: &str) -> Self {
        FixOutcome::NotApplicable {
            reason: reason.to_string(),
        }
    }
}

pub struct FixPlanner<'a> {
    resolver: &'a TransferResolver,
}

impl<'a> FixPlanner<'a> {
    pub fn new(resolver: &'a TransferResolver) -> Self {
        Self { resolver }
    }

    /// Resolve `hash` and plan a fix for it
    pub async fn diagnose(&self, hash: &TransferHash) -> (Resolution, FixOutcome) {
        let resolution = self.resolver.resolve(hash).await;
        let outcome = self.plan(&resolution).await;
        (resolution, outcome)
    }

    pub async fn plan(&self, resolution: &Resolution) -> FixOutcome {
        let Some(withdraw) = &resolution.withdraw else {
            return FixOutcome::not_applicable("no pending withdraw found for hash");
        };
        if withdraw.record.executed {
            return FixOutcome::not_applicable("withdraw already executed");
        }
        if resolution.deposit.is_some() {
            return FixOutcome::not_applicable("a deposit exists for this hash");
        }

        let w = withdraw.chain_id;
        let fields = &withdraw.record.fields;
        let s = fields.src_chain;
        if s == w {
            return FixOutcome::not_applicable("withdraw source chain is its own ledger");
        }

        let candidate = TransferHash(compute_transfer_hash(
            &w,
            &s,
            &fields.dest_account,
            &fields.src_account,
            &fields.token,
            fields.amount,
            fields.nonce,
        ));
        debug!(
            broken = %resolution.hash,
            candidate = %candidate,
            withdraw_ledger = %withdraw.ledger,
            "Testing reversed-direction hypothesis"
        );

        let Some(destination) = self.resolver.ledger_by_chain_id(&s) else {
            return FixOutcome::CannotDetermine {
                reason: format!("source chain {} is not configured", s),
                candidate_hash: Some(candidate),
            };
        };

        let deposit = match self.resolver.find_deposit_on(&w, &candidate).await {
            Some(Lookup::Found(deposit)) => deposit,
            Some(Lookup::NotFound) => {
                return FixOutcome::CannotDetermine {
                    reason: format!("no deposit for {} on {}", candidate, withdraw.ledger),
                    candidate_hash: Some(candidate),
                }
            }
            Some(Lookup::Unreachable(_)) => {
                return FixOutcome::CannotDetermine {
                    reason: format!("ledger {} is unreachable", withdraw.ledger),
                    candidate_hash: Some(candidate),
                }
            }
            None => {
                return FixOutcome::CannotDetermine {
                    reason: format!("withdraw chain {} is not configured", w),
                    candidate_hash: Some(candidate),
                }
            }
        };

        let recipient = match destination.format_account(&deposit.fields.dest_account) {
            Ok(address) => Some(address),
            Err(e) => {
                warn!(
                    hash = %candidate,
                    ledger = %destination.name,
                    error = %e,
                    "Cannot render recipient for destination ledger"
                );
                None
            }
        };

        let plan = FixPlan {
            destination_family: destination.family,
            destination_chain: s,
            destination_ledger: destination.name.clone(),
            src_chain: w,
            src_account: deposit.fields.src_account,
            dest_account: deposit.fields.dest_account,
            token: deposit.fields.token,
            amount: deposit.fields.amount,
            nonce: deposit.fields.nonce,
            transfer_hash: candidate,
            broken_hash: resolution.hash,
            recipient,
        };
        info!(
            broken = %plan.broken_hash,
            hash = %plan.transfer_hash,
            destination = %plan.destination_ledger,
            "Planned fix for misdirected withdraw"
        );
        FixOutcome::Fix(plan)
    }
}
