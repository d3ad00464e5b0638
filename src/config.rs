//! Reconciler configuration
//!
//! Ledgers are described by [`LedgerConfig`] values supplied by the embedding
//! application, or loaded from `RECONCILER_*` environment variables with
//! [`ReconcilerConfig::load`].

use eyre::{eyre, Result};
use std::collections::HashSet;
use std::env;
use std::fmt;
use std::time::Duration;

use crate::address_codec::{parse_evm_address, verify_bech32_checksum};
use crate::types::{ChainId, LedgerFamily};

/// Maximum page size the Cosmos bridge accepts for listing queries
pub const MAX_PAGE_SIZE: u32 = 50;

const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_MAX_PAGES: u32 = 20;
const DEFAULT_MAX_BLOCK_RANGE: u64 = 10_000;
const DEFAULT_DEPOSIT_SCAN_BLOCKS: u64 = 10_000;
const DEFAULT_MAX_DEPOSIT_NONCES: u64 = 500;

// ============================================================================
// URL Helpers
// ============================================================================

/// Parse a comma-separated endpoint string into individual trimmed URLs.
pub fn parse_endpoint_urls(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Validate an endpoint URL: http or https scheme with a host.
///
/// Plain http is allowed (local nodes) but logged.
pub fn validate_endpoint_url(url_str: &str, name: &str) -> Result<()> {
    let parsed =
        url::Url::parse(url_str).map_err(|e| eyre!("{} must be a valid URL: {}", name, e))?;

    let scheme = parsed.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(eyre!(
            "{} must use http:// or https:// scheme, got {}",
            name,
            scheme
        ));
    }

    if parsed.host_str().is_none() {
        return Err(eyre!("{} must have a host component", name));
    }

    if scheme == "http" {
        tracing::warn!(endpoint = name, "Endpoint uses unencrypted http://");
    }

    Ok(())
}

/// Scheme and host only; paths and query strings often carry API keys
pub fn redact_url(url_str: &str) -> String {
    match url::Url::parse(url_str) {
        Ok(parsed) => match (parsed.host_str(), parsed.port()) {
            (Some(host), Some(port)) => format!("{}://{}:{}", parsed.scheme(), host, port),
            (Some(host), None) => format!("{}://{}", parsed.scheme(), host),
            _ => "<redacted>".to_string(),
        },
        Err(_) => "<redacted>".to_string(),
    }
}

// ============================================================================
// Ledger Configuration
// ============================================================================

/// Configuration for a single ledger
#[derive(Clone)]
pub struct LedgerConfig {
    /// Human-readable name (e.g., "bsc", "terra-classic")
    pub name: String,
    pub family: LedgerFamily,
    /// Bridge chain ID; discovered from the bridge contract when `None`
    pub chain_id: Option<ChainId>,
    /// Redundant endpoints, tried in order (JSON-RPC for EVM, LCD for Cosmos)
    pub endpoints: Vec<String>,
    /// Bridge contract address in the family's native format
    pub bridge_address: String,
    /// Bech32 prefix for Cosmos ledgers (e.g., "terra")
    pub bech32_prefix: Option<String>,
    /// Most-recent block window for EVM deposit event scans
    pub deposit_scan_blocks: u64,
    /// Nonce cap for Cosmos deposit scans
    pub max_deposit_nonces: u64,
    pub enabled: bool,
}

impl LedgerConfig {
    /// EVM ledger with default scan settings
    pub fn evm(name: &str, endpoints: Vec<String>, bridge_address: &str) -> Self {
        Self {
            name: name.to_string(),
            family: LedgerFamily::Evm,
            chain_id: None,
            endpoints,
            bridge_address: bridge_address.to_string(),
            bech32_prefix: None,
            deposit_scan_blocks: DEFAULT_DEPOSIT_SCAN_BLOCKS,
            max_deposit_nonces: DEFAULT_MAX_DEPOSIT_NONCES,
            enabled: true,
        }
    }

    /// Cosmos ledger with default scan settings
    pub fn cosmos(name: &str, endpoints: Vec<String>, bridge_address: &str, prefix: &str) -> Self {
        Self {
            family: LedgerFamily::Cosmos,
            bech32_prefix: Some(prefix.to_string()),
            ..Self::evm(name, endpoints, bridge_address)
        }
    }

    pub fn with_chain_id(mut self, chain_id: ChainId) -> Self {
        self.chain_id = Some(chain_id);
        self
    }

    /// Validate the ledger configuration
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(eyre!("Ledger name must not be empty"));
        }
        if self.endpoints.is_empty() {
            return Err(eyre!("No endpoints configured for ledger {}", self.name));
        }
        for (i, endpoint) in self.endpoints.iter().enumerate() {
            validate_endpoint_url(endpoint, &format!("{} endpoint #{}", self.name, i + 1))?;
        }

        match self.family {
            LedgerFamily::Evm => {
                parse_evm_address(&self.bridge_address).map_err(|e| {
                    eyre!("Invalid bridge address for ledger {}: {}", self.name, e)
                })?;
            }
            LedgerFamily::Cosmos => {
                let prefix = self.bech32_prefix.as_deref().unwrap_or("");
                if prefix.is_empty() {
                    return Err(eyre!(
                        "Cosmos ledger {} requires a bech32 prefix",
                        self.name
                    ));
                }
                verify_bech32_checksum(&self.bridge_address).map_err(|e| {
                    eyre!("Invalid bridge address for ledger {}: {}", self.name, e)
                })?;
                if !self.bridge_address.starts_with(prefix) {
                    return Err(eyre!(
                        "Bridge address for ledger {} does not use prefix {}",
                        self.name,
                        prefix
                    ));
                }
            }
        }

        if self.deposit_scan_blocks == 0 || self.max_deposit_nonces == 0 {
            return Err(eyre!("Deposit scan window is zero for ledger {}", self.name));
        }

        Ok(())
    }
}

/// Custom Debug that redacts endpoint paths to prevent API key leakage.
impl fmt::Debug for LedgerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let endpoints: Vec<String> = self.endpoints.iter().map(|e| redact_url(e)).collect();
        f.debug_struct("LedgerConfig")
            .field("name", &self.name)
            .field("family", &self.family)
            .field("chain_id", &self.chain_id)
            .field("endpoints", &endpoints)
            .field("bridge_address", &self.bridge_address)
            .field("bech32_prefix", &self.bech32_prefix)
            .field("deposit_scan_blocks", &self.deposit_scan_blocks)
            .field("max_deposit_nonces", &self.max_deposit_nonces)
            .field("enabled", &self.enabled)
            .finish()
    }
}

// ============================================================================
// Reconciler Configuration
// ============================================================================

/// Configuration for the whole engine
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub ledgers: Vec<LedgerConfig>,
    /// Per-attempt timeout for a single endpoint call
    pub request_timeout: Duration,
    /// Page size for cursor-paginated listings (capped at 50)
    pub page_size: u32,
    /// Hard cap on pages fetched per listing walk
    pub max_pages: u32,
    /// Largest block span requested in one `eth_getLogs` call
    pub max_block_range: u64,
}

impl ReconcilerConfig {
    /// Create a validated config with default limits
    pub fn new(ledgers: Vec<LedgerConfig>) -> Result<Self> {
        let config = Self {
            ledgers,
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            page_size: MAX_PAGE_SIZE,
            max_pages: DEFAULT_MAX_PAGES,
            max_block_range: DEFAULT_MAX_BLOCK_RANGE,
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment (and `.env` when present)
    pub fn load() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("Loaded .env from {:?}", path);
        }
        load_from_env()
    }

    pub fn enabled_ledgers(&self) -> impl Iterator<Item = &LedgerConfig> {
        self.ledgers.iter().filter(|l| l.enabled)
    }

    pub fn get_ledger(&self, name: &str) -> Option<&LedgerConfig> {
        self.ledgers.iter().find(|l| l.name == name)
    }

    pub fn get_ledger_by_chain_id(&self, id: &ChainId) -> Option<&LedgerConfig> {
        self.ledgers.iter().find(|l| l.chain_id.as_ref() == Some(id))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.enabled_ledgers().next().is_none() {
            return Err(eyre!("At least one enabled ledger must be configured"));
        }

        let mut seen_names = HashSet::new();
        let mut seen_ids = HashSet::new();
        for ledger in &self.ledgers {
            if !seen_names.insert(ledger.name.as_str()) {
                return Err(eyre!("Duplicate ledger name: {}", ledger.name));
            }
            if let Some(id) = ledger.chain_id {
                if !seen_ids.insert(id) {
                    tracing::warn!(chain_id = %id, ledger = %ledger.name, "Duplicate chain ID");
                }
            }
            if ledger.enabled {
                ledger.validate()?;
            }
        }

        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(eyre!(
                "Page size must be between 1 and {}, got {}",
                MAX_PAGE_SIZE,
                self.page_size
            ));
        }
        if self.max_pages == 0 {
            return Err(eyre!("max_pages must be at least 1"));
        }
        if self.max_block_range == 0 {
            return Err(eyre!("max_block_range must be at least 1"));
        }
        if self.request_timeout.is_zero() {
            return Err(eyre!("Request timeout must be non-zero"));
        }

        Ok(())
    }
}

// ============================================================================
// Environment Variable Loading
// ============================================================================

fn env_parsed<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| eyre!("Invalid {}: {}", key, raw)),
        _ => Ok(None),
    }
}

/// Load reconciler config from environment variables.
///
/// Required:
/// - `RECONCILER_LEDGER_COUNT`: number of ledgers
/// - `RECONCILER_LEDGER_{N}_FAMILY`: `evm` or `cosmos`
/// - `RECONCILER_LEDGER_{N}_ENDPOINTS`: comma-separated endpoint URLs
/// - `RECONCILER_LEDGER_{N}_BRIDGE_ADDRESS`: bridge contract address
///
/// Optional:
/// - `RECONCILER_LEDGER_{N}_NAME` (default: "ledger_{N}")
/// - `RECONCILER_LEDGER_{N}_CHAIN_ID`: `0x`-hex or decimal; discovered when unset
/// - `RECONCILER_LEDGER_{N}_BECH32_PREFIX`: required for Cosmos ledgers
/// - `RECONCILER_LEDGER_{N}_SCAN_BLOCKS`, `RECONCILER_LEDGER_{N}_MAX_NONCES`
/// - `RECONCILER_LEDGER_{N}_ENABLED` (default: true)
/// - `RECONCILER_REQUEST_TIMEOUT_MS`, `RECONCILER_PAGE_SIZE`,
///   `RECONCILER_MAX_PAGES`, `RECONCILER_MAX_BLOCK_RANGE`
pub fn load_from_env() -> Result<ReconcilerConfig> {
    let count: usize = env_parsed("RECONCILER_LEDGER_COUNT")?
        .ok_or_else(|| eyre!("Missing RECONCILER_LEDGER_COUNT"))?;

    let mut ledgers = Vec::with_capacity(count);
    for i in 1..=count {
        let prefix = format!("RECONCILER_LEDGER_{}", i);

        let name = env::var(format!("{}_NAME", prefix)).unwrap_or_else(|_| format!("ledger_{}", i));

        let family: LedgerFamily = env::var(format!("{}_FAMILY", prefix))
            .map_err(|_| eyre!("Missing {}_FAMILY", prefix))?
            .parse()
            .map_err(|e| eyre!("Invalid {}_FAMILY: {}", prefix, e))?;

        let chain_id: Option<ChainId> = env_parsed(&format!("{}_CHAIN_ID", prefix))?;

        let endpoints = parse_endpoint_urls(
            &env::var(format!("{}_ENDPOINTS", prefix))
                .map_err(|_| eyre!("Missing {}_ENDPOINTS", prefix))?,
        );

        let bridge_address = env::var(format!("{}_BRIDGE_ADDRESS", prefix))
            .map_err(|_| eyre!("Missing {}_BRIDGE_ADDRESS", prefix))?;

        let bech32_prefix = env::var(format!("{}_BECH32_PREFIX", prefix))
            .ok()
            .filter(|p| !p.trim().is_empty());

        ledgers.push(LedgerConfig {
            name,
            family,
            chain_id,
            endpoints,
            bridge_address,
            bech32_prefix,
            deposit_scan_blocks: env_parsed(&format!("{}_SCAN_BLOCKS", prefix))?
                .unwrap_or(DEFAULT_DEPOSIT_SCAN_BLOCKS),
            max_deposit_nonces: env_parsed(&format!("{}_MAX_NONCES", prefix))?
                .unwrap_or(DEFAULT_MAX_DEPOSIT_NONCES),
            enabled: env_parsed(&format!("{}_ENABLED", prefix))?.unwrap_or(true),
        });
    }

    let config = ReconcilerConfig {
        ledgers,
        request_timeout: Duration::from_millis(
            env_parsed("RECONCILER_REQUEST_TIMEOUT_MS")?.unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS),
        ),
        page_size: env_parsed("RECONCILER_PAGE_SIZE")?.unwrap_or(MAX_PAGE_SIZE),
        max_pages: env_parsed("RECONCILER_MAX_PAGES")?.unwrap_or(DEFAULT_MAX_PAGES),
        max_block_range: env_parsed("RECONCILER_MAX_BLOCK_RANGE")?
            .unwrap_or(DEFAULT_MAX_BLOCK_RANGE),
    };
    config.validate()?;
    Ok(config)
}
