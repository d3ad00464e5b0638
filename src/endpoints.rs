//! Redundant endpoint handling
//!
//! [`EndpointRegistry`] owns one client handle per distinct endpoint URL. It is
//! created by the caller and passed to the ledger adapters; nothing here is
//! process-global.
//!
//! [`with_fallback`] runs one adapter call against an ordered list of
//! endpoints. Endpoints are tried one at a time with a fixed per-attempt
//! timeout. The first endpoint that answers without a transport error decides
//! the outcome, whether that answer is a record or a clean "not found".

use alloy::providers::{ProviderBuilder, RootProvider};
use alloy::transports::http::{Client, Http};
use eyre::{Result, WrapErr};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::redact_url;

/// HTTP JSON-RPC provider used for EVM ledgers
pub type EvmProvider = RootProvider<Http<Client>>;

// ============================================================================
// Lookup Outcome
// ============================================================================

/// Why a single endpoint attempt failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointFailure {
    /// Endpoint URL with path and query removed
    pub endpoint: String,
    pub error: String,
}

/// Outcome of one adapter call across all of a ledger's endpoints
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    /// An endpoint answered and the record does not exist
    NotFound,
    /// Every endpoint failed; callers above the adapter treat this as absence
    Unreachable(Vec<EndpointFailure>),
}

impl<T> Lookup<T> {
    /// Collapse to `Option`, treating an unreachable ledger as absence
    pub fn into_option(self) -> Option<T> {
        match self {
            Lookup::Found(value) => Some(value),
            Lookup::NotFound | Lookup::Unreachable(_) => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }

    pub fn is_unreachable(&self) -> bool {
        matches!(self, Lookup::Unreachable(_))
    }

    pub fn failures(&self) -> &[EndpointFailure] {
        match self {
            Lookup::Unreachable(failures) => failures,
            _ => &[],
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Lookup<U> {
        match self {
            Lookup::Found(value) => Lookup::Found(f(value)),
            Lookup::NotFound => Lookup::NotFound,
            Lookup::Unreachable(failures) => Lookup::Unreachable(failures),
        }
    }
}

impl<T> Lookup<Vec<T>> {
    /// Listing calls report emptiness as an empty vector
    pub fn into_vec(self) -> Vec<T> {
        self.into_option().unwrap_or_default()
    }
}

// ============================================================================
// Handles
// ============================================================================

/// Anything that can be tried as one endpoint
pub trait Endpoint {
    fn url(&self) -> &str;
}

impl Endpoint for String {
    fn url(&self) -> &str {
        self
    }
}

/// Shared JSON-RPC handle for one EVM endpoint
#[derive(Clone)]
pub struct EvmHandle {
    pub url: String,
    pub provider: EvmProvider,
}

impl Endpoint for EvmHandle {
    fn url(&self) -> &str {
        &self.url
    }
}

/// Shared HTTP handle for one Cosmos LCD endpoint
#[derive(Clone)]
pub struct LcdHandle {
    /// Base URL without trailing slash
    pub base_url: String,
    pub client: reqwest::Client,
}

impl Endpoint for LcdHandle {
    fn url(&self) -> &str {
        &self.base_url
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Read-through cache of endpoint handles, keyed by URL
///
/// Handles are created on first use and never mutated afterwards. Cloning a
/// handle shares the underlying connection pool.
pub struct EndpointRegistry {
    evm: RwLock<HashMap<String, EvmHandle>>,
    lcd: RwLock<HashMap<String, LcdHandle>>,
    request_timeout: Duration,
}

impl EndpointRegistry {
    pub fn new(request_timeout: Duration) -> Self {
        Self {
            evm: RwLock::new(HashMap::new()),
            lcd: RwLock::new(HashMap::new()),
            request_timeout,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Get or create the JSON-RPC handle for `url`
    pub async fn evm_handle(&self, url: &str) -> Result<EvmHandle> {
        if let Some(handle) = self.evm.read().await.get(url) {
            return Ok(handle.clone());
        }

        let mut cache = self.evm.write().await;
        if let Some(handle) = cache.get(url) {
            return Ok(handle.clone());
        }
        let parsed: url::Url = url
            .parse()
            .wrap_err_with(|| format!("Invalid RPC URL: {}", redact_url(url)))?;
        let handle = EvmHandle {
            url: url.to_string(),
            provider: ProviderBuilder::new().on_http(parsed),
        };
        debug!(endpoint = %redact_url(url), "Created EVM provider");
        cache.insert(url.to_string(), handle.clone());
        Ok(handle)
    }

    pub async fn evm_handles(&self, urls: &[String]) -> Result<Vec<EvmHandle>> {
        let mut handles = Vec::with_capacity(urls.len());
        for url in urls {
            handles.push(self.evm_handle(url).await?);
        }
        Ok(handles)
    }

    /// Get or create the LCD handle for `url`
    pub async fn lcd_handle(&self, url: &str) -> Result<LcdHandle> {
        let base_url = url.trim_end_matches('/').to_string();
        if let Some(handle) = self.lcd.read().await.get(&base_url) {
            return Ok(handle.clone());
        }

        let mut cache = self.lcd.write().await;
        if let Some(handle) = cache.get(&base_url) {
            return Ok(handle.clone());
        }
        let client = reqwest::Client::builder()
            .timeout(self.request_timeout)
            .build()
            .wrap_err("Failed to build HTTP client")?;
        let handle = LcdHandle {
            base_url: base_url.clone(),
            client,
        };
        debug!(endpoint = %redact_url(&base_url), "Created LCD client");
        cache.insert(base_url, handle.clone());
        Ok(handle)
    }

    pub async fn lcd_handles(&self, urls: &[String]) -> Result<Vec<LcdHandle>> {
        let mut handles = Vec::with_capacity(urls.len());
        for url in urls {
            handles.push(self.lcd_handle(url).await?);
        }
        Ok(handles)
    }

    /// Number of cached handles across both families
    pub async fn len(&self) -> usize {
        self.evm.read().await.len() + self.lcd.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop every cached handle. Handles already given out stay usable.
    pub async fn clear(&self) {
        self.evm.write().await.clear();
        self.lcd.write().await.clear();
    }
}

// ============================================================================
// Sequential Fallback
// ============================================================================

/// Try `call` against each endpoint in order until one answers
///
/// `Ok(Some(_))` is `Found`, `Ok(None)` is `NotFound`, and an error or timeout
/// moves on to the next endpoint. When all fail the result is `Unreachable`
/// with one diagnostic per attempt.
pub async fn with_fallback<H, T, F, Fut>(
    handles: &[H],
    timeout: Duration,
    operation: &str,
    mut call: F,
) -> Lookup<T>
where
    H: Endpoint + Clone,
    F: FnMut(H) -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let mut failures = Vec::with_capacity(handles.len());

    for handle in handles {
        let endpoint = redact_url(handle.url());
        match tokio::time::timeout(timeout, call(handle.clone())).await {
            Ok(Ok(Some(value))) => return Lookup::Found(value),
            Ok(Ok(None)) => {
                debug!(operation, endpoint = %endpoint, "Record not found");
                return Lookup::NotFound;
            }
            Ok(Err(e)) => {
                warn!(operation, endpoint = %endpoint, error = %e, "Endpoint call failed, trying next");
                failures.push(EndpointFailure {
                    endpoint,
                    error: format!("{:#}", e),
                });
            }
            Err(_) => {
                warn!(operation, endpoint = %endpoint, timeout_ms = timeout.as_millis() as u64, "Endpoint call timed out, trying next");
                failures.push(EndpointFailure {
                    endpoint,
                    error: format!("timed out after {}ms", timeout.as_millis()),
                });
            }
        }
    }

    Lookup::Unreachable(failures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use eyre::eyre;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn urls(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("http://node{}.example.com", i)).collect()
    }

    #[tokio::test]
    async fn test_first_endpoint_wins() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let result = with_fallback(&urls(3), Duration::from_secs(1), "test", |_url| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Some(7u32))
            }
        })
        .await;

        assert_eq!(result, Lookup::Found(7));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_falls_back_in_order() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let log = seen.clone();
        let result = with_fallback(&urls(3), Duration::from_secs(1), "test", |url| {
            let log = log.clone();
            async move {
                log.lock().unwrap().push(url.clone());
                if url.contains("node2") {
                    Ok(Some("ok"))
                } else {
                    Err(eyre!("connection refused"))
                }
            }
        })
        .await;

        assert_eq!(result, Lookup::Found("ok"));
        assert_eq!(*seen.lock().unwrap(), urls(3));
    }

    #[tokio::test]
    async fn test_not_found_stops_fallback() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let result: Lookup<u32> = with_fallback(&urls(3), Duration::from_secs(1), "test", |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            }
        })
        .await;

        assert_eq!(result, Lookup::NotFound);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_all_failed_is_unreachable() {
        let result: Lookup<u32> = with_fallback(&urls(2), Duration::from_secs(1), "test", |_| async {
            Err(eyre!("boom"))
        })
        .await;

        assert!(result.is_unreachable());
        assert_eq!(result.failures().len(), 2);
        assert_eq!(result.failures()[0].endpoint, "http://node0.example.com");
        assert!(result.failures()[1].error.contains("boom"));
        assert_eq!(result.into_option(), None);
    }

    #[tokio::test]
    async fn test_timeout_moves_to_next_endpoint() {
        let result = with_fallback(&urls(2), Duration::from_millis(50), "test", |url| async move {
            if url.contains("node0") {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            Ok(Some(1u8))
        })
        .await;

        assert_eq!(result, Lookup::Found(1));
    }

    #[tokio::test]
    async fn test_no_endpoints_is_unreachable() {
        let result: Lookup<u32> =
            with_fallback(&Vec::<String>::new(), Duration::from_secs(1), "test", |_| async {
                Ok(Some(1))
            })
            .await;
        assert_eq!(result, Lookup::Unreachable(vec![]));
    }

    #[test]
    fn test_lookup_helpers() {
        assert_eq!(Lookup::Found(2).map(|v| v * 2), Lookup::Found(4));
        assert_eq!(Lookup::<u32>::NotFound.into_option(), None);
        assert!(Lookup::Found(1).is_found());
        let empty: Lookup<Vec<u32>> = Lookup::Unreachable(vec![]);
        assert!(empty.into_vec().is_empty());
    }

    #[tokio::test]
    async fn test_registry_caches_by_url() {
        let registry = EndpointRegistry::new(Duration::from_secs(5));
        let a = registry.lcd_handle("https://lcd.example.com/").await.unwrap();
        let b = registry.lcd_handle("https://lcd.example.com").await.unwrap();
        assert_eq!(a.base_url, b.base_url);
        assert_eq!(registry.len().await, 1);

        registry.evm_handle("http://localhost:8545").await.unwrap();
        registry.evm_handle("http://localhost:8545").await.unwrap();
        registry.evm_handle("http://localhost:8546").await.unwrap();
        assert_eq!(registry.len().await, 3);

        registry.clear().await;
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_registry_rejects_invalid_rpc_url() {
        let registry = EndpointRegistry::new(Duration::from_secs(5));
        assert!(registry.evm_handle("not a url").await.is_err());
    }
}
