//! Registration token gate.
//!
//! `GET /token` issues a random token that authorizes exactly one write.
//! Tokens live in a [`TokenStore`] under `register_token_<token>` and are
//! consumed with an atomic take, so concurrent requests presenting the same
//! token see exactly one success.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::future::Cache;
use rand::Rng;
use rand::distr::Alphanumeric;
use tracing::debug;

/// Length of an issued token.
pub const TOKEN_LENGTH: usize = 60;

const KEY_PREFIX: &str = "register_token_";

/// Upper bound on outstanding tokens kept in memory.
const MAX_OUTSTANDING_TOKENS: u64 = 100_000;

/// Key-value store with expiring entries and atomic take.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Store `key` for `ttl`.
    async fn put(&self, key: String, ttl: Duration);

    /// Remove `key`, returning whether it was present and unexpired.
    async fn take(&self, key: &str) -> bool;
}

/// In-process token store backed by a `moka` cache.
///
/// Each entry holds its own deadline; the cache-wide time-to-live only
/// bounds how long stale entries occupy memory.
pub struct MemoryTokenStore {
    entries: Cache<String, Instant>,
}

impl MemoryTokenStore {
    /// Create a store whose entries are purged after `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        let entries = Cache::builder()
            .max_capacity(MAX_OUTSTANDING_TOKENS)
            .time_to_live(ttl)
            .build();
        Self { entries }
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn put(&self, key: String, ttl: Duration) {
        self.entries.insert(key, Instant::now() + ttl).await;
    }

    async fn take(&self, key: &str) -> bool {
        self.entries
            .remove(key)
            .await
            .is_some_and(|deadline| Instant::now() < deadline)
    }
}

/// Issues and consumes single-use registration tokens.
#[derive(Clone)]
pub struct RegistrationGate {
    store: Arc<dyn TokenStore>,
    ttl: Duration,
}

impl RegistrationGate {
    /// Create a gate over `store` issuing tokens valid for `ttl`.
    #[must_use]
    pub fn new(store: Arc<dyn TokenStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Create a gate with an in-process store.
    #[must_use]
    pub fn in_memory(ttl: Duration) -> Self {
        Self::new(Arc::new(MemoryTokenStore::new(ttl)), ttl)
    }

    /// Generate and remember a new token.
    pub async fn issue(&self) -> String {
        let token: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LENGTH)
            .map(char::from)
            .collect();

        self.store.put(cache_key(&token), self.ttl).await;
        debug!(ttl_secs = self.ttl.as_secs(), "Registration token issued");
        token
    }

    /// Consume `token`. Succeeds at most once per issued token.
    pub async fn consume(&self, token: &str) -> bool {
        if token.is_empty() {
            return false;
        }
        self.store.take(&cache_key(token)).await
    }
}

fn cache_key(token: &str) -> String {
    format!("{KEY_PREFIX}{token}")
}
