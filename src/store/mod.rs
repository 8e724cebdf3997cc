use async_trait::async_trait;
use log::warn;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

pub mod memory;

pub use memory::MemoryStore;

/// Stable key names of the external state store.
///
/// Market price, covariance and heartbeat live together in ONE versioned
/// record (`MARKET_SNAPSHOT`) so that readers can never observe a price
/// vector and a matrix from different update cycles. The standalone
/// heartbeat key is a mirror kept for external monitors.
pub mod keys {
    pub const MARKET_SNAPSHOT: &str = "market:snapshot";
    pub const STRESSED_MATRIX: &str = "risk:cov_matrix:stressed";
    pub const CASH: &str = "portfolio:cash";
    pub const HOLDINGS: &str = "portfolio:holdings";
    pub const HEARTBEAT: &str = "stream:heartbeat";
    pub const ERROR: &str = "stream:error";
    pub const STATUS: &str = "stream:status";
    pub const INSTRUMENTS: &str = "config:instruments";
}

#[derive(Error, Debug)]
pub enum StoreError {
    /// The backing store could not be reached. Transient; callers retry
    /// with a fixed backoff.
    #[error("state store unavailable: {0}")]
    Unavailable(String),

    /// A stored record failed structural validation (wrong instrument
    /// count, non-square matrix, unknown symbol). Indicates a consistency
    /// bug upstream; propagated as a hard error, never coerced.
    #[error("malformed stored state: {0}")]
    Malformed(String),
}

/// Key-value persistence for all shared state.
///
/// Every individual read/write is atomic. Each key carries a store-managed
/// version, monotonically increasing per key; `put_if_version` succeeds only
/// when the current version matches (0 for an absent key) and bumps it to
/// `expected + 1`, giving writers optimistic concurrency control.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    async fn get_versioned(&self, key: &str) -> Result<Option<(u64, Vec<u8>)>, StoreError>;

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError>;

    /// Compare-and-swap write. Returns false (leaving the stored value
    /// untouched) when the current version does not match `expected`.
    async fn put_if_version(
        &self,
        key: &str,
        expected: u64,
        value: Vec<u8>,
    ) -> Result<bool, StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(value).map_err(|e| StoreError::Malformed(e.to_string()))
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    serde_json::from_slice(bytes).map_err(|e| StoreError::Malformed(e.to_string()))
}

/// Retries a store operation a fixed number of times with a fixed delay.
///
/// Only `Unavailable` is retried; `Malformed` is a consistency bug and
/// returns immediately.
pub async fn with_retry<T, F, Fut>(
    attempts: u32,
    delay: Duration,
    mut op: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err @ StoreError::Malformed(_)) => return Err(err),
            Err(err) => {
                attempt += 1;
                if attempt >= attempts.max(1) {
                    return Err(err);
                }
                warn!("store operation failed (attempt {attempt}/{attempts}): {err}");
                tokio::time::sleep(delay).await;
            }
        }
    }
}
