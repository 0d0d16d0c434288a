//! Idempotent replay.
//!
//! A bounded, process-local LRU sits in front of the store. Replay returns
//! the stored response for a key whose request hash matches; a mismatched
//! hash is a conflict. Disabling replay keeps writing history but always
//! recomputes.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::errors::StoreError;
use crate::domain::ports::{StoreResult, SupportabilityStore};

pub const DEFAULT_CACHE_MAX_SIZE: usize = 1000;

#[derive(Debug, Clone)]
pub enum IdempotencyCheck {
    /// Unknown key (or replay disabled): compute and store.
    Miss,
    /// Same key, same hash: return the stored response.
    Replay(serde_json::Value),
    /// Same key, different hash.
    Conflict,
}

#[derive(Clone)]
struct CachedResponse {
    request_hash: String,
    response: serde_json::Value,
}

pub struct IdempotencyService {
    cache: Mutex<LruCache<String, CachedResponse>>,
    replay_enabled: bool,
}

impl IdempotencyService {
    pub fn new(cache_max_size: usize, replay_enabled: bool) -> Self {
        let capacity = NonZeroUsize::new(cache_max_size.max(1)).expect("non-zero cache size");
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
            replay_enabled,
        }
    }

    /// Check a key against the cache and store. `replay_override` lets a
    /// policy pack force replay on or off for this request.
    pub async fn check(
        &self,
        store: &Arc<dyn SupportabilityStore>,
        key: &str,
        request_hash: &str,
        replay_override: Option<bool>,
    ) -> StoreResult<IdempotencyCheck> {
        let replay_enabled = replay_override.unwrap_or(self.replay_enabled);
        if !replay_enabled {
            return Ok(IdempotencyCheck::Miss);
        }

        if let Some(cached) = self.cache.lock().await.get(key) {
            if cached.request_hash == request_hash {
                debug!("Idempotency cache hit for key {key}");
                return Ok(IdempotencyCheck::Replay(cached.response.clone()));
            }
            return Ok(IdempotencyCheck::Conflict);
        }

        match store.get_idempotency_by_key(key).await? {
            None => Ok(IdempotencyCheck::Miss),
            Some(record) if record.request_hash != request_hash => {
                Ok(IdempotencyCheck::Conflict)
            }
            Some(record) => {
                let run = store.get_run(&record.run_id).await?.ok_or_else(|| {
                    StoreError::NotFound {
                        entity: "run",
                        id: record.run_id.clone(),
                    }
                })?;
                self.record(key, request_hash, &run.result_json).await;
                Ok(IdempotencyCheck::Replay(run.result_json))
            }
        }
    }

    /// Remember a computed response. Eviction only touches the cache;
    /// history rows in the store are never removed by it.
    pub async fn record(&self, key: &str, request_hash: &str, response: &serde_json::Value) {
        self.cache.lock().await.put(
            key.to_string(),
            CachedResponse {
                request_hash: request_hash.to_string(),
                response: response.clone(),
            },
        );
    }
}
