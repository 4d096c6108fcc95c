use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::DecodingKey;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use super::{JwksError, KeyFetcher, KeyResolver, UnverifiedToken};

/// Cache key: key ids are only unique within one issuer.
type KeyRef = (String, String);

/// Default lifetime of a cached key (5 minutes).
pub const DEFAULT_KEY_TTL_SECONDS: u64 = 300;

#[derive(Clone)]
struct CachedKey {
    key: DecodingKey,
    cached_at: Instant,
}

/// Key cache with a fixed per-entry TTL in front of a [`KeyFetcher`].
///
/// Entries are never refreshed in place: an expired entry is refetched on
/// the next lookup and replaced wholesale. Expired entries are only removed
/// by [`PerKeyCache::cleanup`].
pub struct PerKeyCache<F> {
    fetcher: F,
    ttl: Duration,
    entries: RwLock<HashMap<KeyRef, CachedKey>>,
    // One gate per (issuer, kid) so that concurrent misses share a single fetch.
    inflight: Mutex<HashMap<KeyRef, Arc<Mutex<()>>>>,
}

impl<F: KeyFetcher> PerKeyCache<F> {
    pub fn new(fetcher: F, ttl: Duration) -> Self {
        Self {
            fetcher,
            ttl,
            entries: RwLock::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_default_ttl(fetcher: F) -> Self {
        Self::new(fetcher, Duration::from_secs(DEFAULT_KEY_TTL_SECONDS))
    }

    async fn fresh(&self, key_ref: &KeyRef) -> Option<DecodingKey> {
        let entries = self.entries.read().await;
        entries
            .get(key_ref)
            .filter(|e| e.cached_at.elapsed() < self.ttl)
            .map(|e| e.key.clone())
    }

    /// Remove all expired entries. Returns how many were removed.
    pub async fn cleanup(&self) -> usize {
        let removed = {
            let mut entries = self.entries.write().await;
            let before = entries.len();
            entries.retain(|_, e| e.cached_at.elapsed() < self.ttl);
            before - entries.len()
        };

        let mut inflight = self.inflight.lock().await;
        inflight.retain(|_, gate| gate.try_lock().is_err());

        if removed > 0 {
            debug!("Removed {} expired keys from cache", removed);
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl<F: KeyFetcher + 'static> PerKeyCache<F> {
    /// Run [`PerKeyCache::cleanup`] every `period` until the handle is aborted.
    pub fn spawn_cleanup(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                self.cleanup().await;
            }
        })
    }
}

#[async_trait]
impl<F: KeyFetcher> KeyResolver for PerKeyCache<F> {
    async fn get_key(&self, token: &UnverifiedToken) -> Result<DecodingKey, JwksError> {
        let kid = token.require_kid()?;
        let issuer = token.issuer()?;
        let key_ref = (issuer.to_string(), kid.to_string());

        if let Some(key) = self.fresh(&key_ref).await {
            return Ok(key);
        }

        let gate = {
            let mut inflight = self.inflight.lock().await;
            inflight.entry(key_ref.clone()).or_default().clone()
        };
        let _guard = gate.lock().await;

        // Another caller may have fetched the key while we waited.
        if let Some(key) = self.fresh(&key_ref).await {
            return Ok(key);
        }

        debug!("Key {} of issuer {} not cached, fetching", kid, issuer);
        let key = self.fetcher.fetch_key(token).await?;
        self.entries.write().await.insert(
            key_ref,
            CachedKey {
                key: key.clone(),
                cached_at: Instant::now(),
            },
        );
        Ok(key)
    }
}
