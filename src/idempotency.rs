//! At-most-once request cache, centralized per spec §9's redesign flag
//! ("Idempotency cache implemented ad-hoc. Centralize in one component with
//! `with_cache(key, producer)`"). Grounded on the teacher's `lru`-backed
//! caching idiom (the same crate is pinned in `tos_common`'s dependency
//! table) combined with `tokio::sync::Mutex`-guarded single-leader
//! execution, as seen wrapping `EncryptedStorage` in `stateless_wallet.rs`.

use crate::{config::IDEMPOTENCY_CACHE_CAPACITY, error::EngineError};
use lru::LruCache;
use std::collections::HashMap;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::Mutex;

/// A post-broadcast result a cache entry remembers so a replayed request
/// never re-spends coins (spec §4.5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedOutput {
    pub tx_hash: crate::hash::Hash,
    pub output_index: u32,
}

/// The two value shapes spec §4.5 distinguishes: OPEN/UPDATE/TRANSFER/
/// FINALIZE cache a single builder result per key; BID/REVEAL/FINISH
/// accumulate a list under one key (typically the name) as multiple
/// entries land under the same auction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedValue {
    Single(CachedOutput),
    Multiple(Vec<CachedOutput>),
}

enum Slot {
    InFlight(Arc<tokio::sync::Notify>),
    Completed(CachedValue),
}

/// One bounded LRU cache for a single action (`open`, `bid`, `update`,
/// `transfer`, `finalize`, `reveal`, `finish`, `send_many`).
pub struct ActionCache {
    slots: Mutex<LruCache<String, Slot>>,
}

impl ActionCache {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(LruCache::new(
                NonZeroUsize::new(IDEMPOTENCY_CACHE_CAPACITY).expect("capacity is nonzero"),
            )),
        }
    }

    /// Runs `producer` to completion for `key`, unless a completed result
    /// already exists (immediate return, `from_cache = true`) or another
    /// caller is already producing one (wait for it, then return its
    /// result, also `from_cache = true` since this call built nothing).
    pub async fn with_cache<F, Fut>(
        &self,
        key: &str,
        producer: F,
    ) -> Result<(CachedValue, bool), EngineError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CachedValue, EngineError>>,
    {
        loop {
            let notify = {
                let mut slots = self.slots.lock().await;
                match slots.get(key) {
                    Some(Slot::Completed(value)) => return Ok((value.clone(), true)),
                    Some(Slot::InFlight(notify)) => Some(notify.clone()),
                    None => {
                        let notify = Arc::new(tokio::sync::Notify::new());
                        slots.put(key.to_string(), Slot::InFlight(notify));
                        None
                    }
                }
            };
            // leader path: the slot was just claimed above; the lock is
            // dropped before running the producer, which re-locks `slots`.
            let Some(notify) = notify else {
                return self.run_producer(key, producer).await;
            };
            // follower path: wait for the leader to finish, then re-check.
            notify.notified().await;
        }
    }

    async fn run_producer<F, Fut>(&self, key: &str, producer: F) -> Result<(CachedValue, bool), EngineError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CachedValue, EngineError>>,
    {
        let result = producer().await;
        let mut slots = self.slots.lock().await;
        let notify = match slots.pop(key) {
            Some(Slot::InFlight(notify)) => Some(notify),
            _ => None,
        };
        match &result {
            Ok(value) => {
                slots.put(key.to_string(), Slot::Completed(value.clone()));
            }
            Err(_) => {
                // crypto/internal errors leave no cache entry (spec §7);
                // the slot is simply dropped so a retry can lead again.
            }
        }
        drop(slots);
        if let Some(notify) = notify {
            notify.notify_waiters();
        }
        result.map(|v| (v, false))
    }

    /// Appends `output` to a `Multiple`-shaped entry, creating it if absent
    /// (BID/REVEAL/FINISH accumulation per spec §4.5).
    pub async fn append(&self, key: &str, output: CachedOutput) {
        let mut slots = self.slots.lock().await;
        match slots.get_mut(key) {
            Some(Slot::Completed(CachedValue::Multiple(list))) => list.push(output),
            _ => {
                slots.put(
                    key.to_string(),
                    Slot::Completed(CachedValue::Multiple(vec![output])),
                );
            }
        }
    }

    pub async fn clear_key(&self, key: &str) {
        self.slots.lock().await.pop(key);
    }

    pub async fn clear(&self) {
        self.slots.lock().await.clear();
    }
}

impl Default for ActionCache {
    fn default() -> Self {
        Self::new()
    }
}

/// The full set of per-action caches, addressed by action name the way the
/// dispatcher's callers name them (spec §4.5).
pub struct IdempotencyCache {
    actions: HashMap<&'static str, ActionCache>,
}

pub const ACTIONS: &[&str] = &[
    "open",
    "bid",
    "update",
    "transfer",
    "finalize",
    "reveal",
    "finish",
    "send_many",
];

impl IdempotencyCache {
    pub fn new() -> Self {
        let mut actions = HashMap::new();
        for name in ACTIONS {
            actions.insert(*name, ActionCache::new());
        }
        Self { actions }
    }

    pub fn action(&self, name: &str) -> Option<&ActionCache> {
        self.actions.get(name)
    }

    /// Drops a whole named cache across the wallet (spec §4.5 admin op).
    pub async fn clear_cache(&self, name: &str) {
        if let Some(cache) = self.actions.get(name) {
            cache.clear().await;
        }
    }

    /// Drops a single entry from a named cache (spec §4.5 admin op).
    pub async fn clear_cache_key(&self, name: &str, key: &str) {
        if let Some(cache) = self.actions.get(name) {
            cache.clear_key(key).await;
        }
    }
}

impl Default for IdempotencyCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sample_output(n: u8) -> CachedOutput {
        CachedOutput {
            tx_hash: crate::hash::Hash::hash(&[n]),
            output_index: 0,
        }
    }

    #[tokio::test]
    async fn replay_returns_cached_result_without_rerunning_producer() {
        let cache = ActionCache::new();
        let calls = AtomicUsize::new(0);

        let (first, from_cache) = cache
            .with_cache("k1", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(CachedValue::Single(sample_output(1)))
            })
            .await
            .unwrap();
        assert!(!from_cache);

        let (second, from_cache) = cache
            .with_cache("k1", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(CachedValue::Single(sample_output(2)))
            })
            .await
            .unwrap();

        assert!(from_cache);
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_producer_leaves_no_cache_entry() {
        let cache = ActionCache::new();
        let result = cache
            .with_cache("k2", || async {
                Err(EngineError::Internal("boom".into()))
            })
            .await;
        assert!(result.is_err());

        let (_value, from_cache) = cache
            .with_cache("k2", || async { Ok(CachedValue::Single(sample_output(9))) })
            .await
            .unwrap();
        assert!(!from_cache);
    }

    #[tokio::test]
    async fn clear_cache_key_drops_a_single_entry() {
        let cache = IdempotencyCache::new();
        cache
            .action("open")
            .unwrap()
            .with_cache("alice", || async { Ok(CachedValue::Single(sample_output(1))) })
            .await
            .unwrap();

        cache.clear_cache_key("open", "alice").await;

        let (_value, from_cache) = cache
            .action("open")
            .unwrap()
            .with_cache("alice", || async { Ok(CachedValue::Single(sample_output(2))) })
            .await
            .unwrap();
        assert!(!from_cache);
    }
}
