//! Engine entry point
//!
//! [`Reconciler::connect`] turns a validated [`ReconcilerConfig`] into live
//! ledger clients and hands out the resolver, fix planner and monitor that
//! work over them.

use eyre::{eyre, Result};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::ReconcilerConfig;
use crate::discovery::{verify_chain_ids, ChainIdCheck};
use crate::endpoints::EndpointRegistry;
use crate::fix::FixPlanner;
use crate::ledger::{Ledger, ListOptions};
use crate::monitor::{HashMonitor, MonitorOptions};
use crate::resolver::TransferResolver;

pub struct Reconciler {
    resolver: TransferResolver,
    registry: EndpointRegistry,
    list_options: ListOptions,
}

impl Reconciler {
    /// Connect every enabled ledger
    ///
    /// Chain IDs missing from configuration are discovered here. Ledgers that
    /// end up sharing an ID are kept and logged; the resolver reports the
    /// records they both claim.
    pub async fn connect(config: ReconcilerConfig) -> Result<Self> {
        config.validate()?;

        let registry = EndpointRegistry::new(config.request_timeout);
        let mut ledgers = Vec::new();
        for ledger_config in config.enabled_ledgers() {
            ledgers.push(Ledger::connect(ledger_config, &config, &registry).await?);
        }

        let list_options = ListOptions {
            page_size: config.page_size,
            max_pages: config.max_pages,
        };
        let reconciler = Self::build(ledgers, registry, list_options)?;
        info!(
            ledgers = reconciler.ledgers().len(),
            endpoints = reconciler.registry.len().await,
            "Reconciler connected"
        );
        Ok(reconciler)
    }

    /// Use already-built ledgers
    pub fn from_ledgers(ledgers: Vec<Ledger>, request_timeout: Duration) -> Result<Self> {
        Self::build(
            ledgers,
            EndpointRegistry::new(request_timeout),
            ListOptions::default(),
        )
    }

    fn build(
        ledgers: Vec<Ledger>,
        registry: EndpointRegistry,
        list_options: ListOptions,
    ) -> Result<Self> {
        if ledgers.is_empty() {
            return Err(eyre!("No ledgers connected"));
        }

        let mut by_chain: HashMap<_, &str> = HashMap::new();
        for ledger in &ledgers {
            if let Some(other) = by_chain.insert(ledger.chain_id, ledger.name.as_str()) {
                warn!(
                    first = other,
                    second = %ledger.name,
                    chain_id = %ledger.chain_id,
                    "Ledgers share a chain ID"
                );
            }
        }

        Ok(Self {
            resolver: TransferResolver::new(ledgers),
            registry,
            list_options,
        })
    }

    pub fn ledgers(&self) -> &[Ledger] {
        self.resolver.ledgers()
    }

    pub fn registry(&self) -> &EndpointRegistry {
        &self.registry
    }

    pub fn resolver(&self) -> &TransferResolver {
        &self.resolver
    }

    pub fn fix_planner(&self) -> FixPlanner<'_> {
        FixPlanner::new(&self.resolver)
    }

    /// Monitor options carrying the configured listing limits
    pub fn default_monitor_options(&self) -> MonitorOptions {
        MonitorOptions {
            page_size: self.list_options.page_size,
            max_pages: self.list_options.max_pages,
            ..MonitorOptions::default()
        }
    }

    pub fn monitor(&self, options: MonitorOptions) -> HashMonitor {
        HashMonitor::new(self.resolver.ledgers().to_vec(), options)
    }

    /// Compare every ledger's chain ID with what its bridge reports
    pub async fn verify_chain_ids(&self) -> Vec<ChainIdCheck> {
        verify_chain_ids(self.ledgers()).await
    }
}
