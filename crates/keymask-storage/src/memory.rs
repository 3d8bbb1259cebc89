//! In-memory mapping store.
//!
//! Both indices live behind one readers-writer lock so a reader can never
//! observe a half-removed entry. A background task sweeps expired entries on
//! a fixed interval until the store is closed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::watch;

use crate::{Mapping, MappingStore, StorageError};

/// How often the background sweep runs.
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

struct Maps {
    /// Keyed by placeholder.
    forward: HashMap<String, Mapping>,
    /// secret -> placeholder.
    reverse: HashMap<String, String>,
}

struct Inner {
    maps: RwLock<Maps>,
    ttl: Duration,
    closed: AtomicBool,
}

/// Single-process [`MappingStore`] backed by two hash maps.
pub struct MemoryStore {
    inner: Arc<Inner>,
    shutdown: watch::Sender<bool>,
}

impl MemoryStore {
    /// Creates a store and starts its sweep task. Must be called from within
    /// a tokio runtime.
    pub fn new(ttl: Duration) -> Self {
        Self::with_sweep_interval(ttl, DEFAULT_SWEEP_INTERVAL)
    }

    /// Creates a store with an explicit sweep interval.
    pub fn with_sweep_interval(ttl: Duration, sweep_interval: Duration) -> Self {
        let inner = Arc::new(Inner {
            maps: RwLock::new(Maps {
                forward: HashMap::new(),
                reverse: HashMap::new(),
            }),
            ttl,
            closed: AtomicBool::new(false),
        });

        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let sweep_inner = Arc::clone(&inner);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(sweep_interval);
            tick.tick().await; // the first tick fires immediately
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        let removed = sweep(&sweep_inner);
                        if removed > 0 {
                            tracing::debug!(removed, "mapping sweep evicted expired entries");
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
        });

        Self { inner, shutdown }
    }

    fn ensure_open(&self) -> Result<(), StorageError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(StorageError::Closed);
        }
        Ok(())
    }
}

/// Removes entries whose last use is older than the TTL. Shared between the
/// sweep task and explicit `cleanup` calls.
fn sweep(inner: &Inner) -> usize {
    let now = Utc::now();
    let mut maps = inner.maps.write();
    let ttl = chrono::Duration::from_std(inner.ttl).unwrap_or(chrono::Duration::MAX);

    let expired: Vec<String> = maps
        .forward
        .iter()
        .filter(|(_, mapping)| now - mapping.last_used_at > ttl)
        .map(|(placeholder, _)| placeholder.clone())
        .collect();

    for placeholder in &expired {
        if let Some(mapping) = maps.forward.remove(placeholder) {
            maps.reverse.remove(&mapping.secret);
        }
    }
    expired.len()
}

#[async_trait]
impl MappingStore for MemoryStore {
    async fn store(&self, placeholder: &str, secret: &str) -> Result<(), StorageError> {
        self.ensure_open()?;
        let now = Utc::now();
        let mut maps = self.inner.maps.write();

        if let Some(existing) = maps.forward.get_mut(placeholder) {
            if existing.secret != secret {
                return Err(StorageError::Collision {
                    placeholder: placeholder.to_string(),
                });
            }
            existing.last_used_at = now;
            return Ok(());
        }

        maps.forward.insert(
            placeholder.to_string(),
            Mapping {
                placeholder: placeholder.to_string(),
                secret: secret.to_string(),
                created_at: now,
                last_used_at: now,
            },
        );
        maps.reverse
            .insert(secret.to_string(), placeholder.to_string());
        Ok(())
    }

    async fn lookup(&self, placeholder: &str) -> Option<String> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return None;
        }
        let mut maps = self.inner.maps.write();
        let mapping = maps.forward.get_mut(placeholder)?;
        mapping.last_used_at = Utc::now();
        Some(mapping.secret.clone())
    }

    async fn lookup_by_secret(&self, secret: &str) -> Option<String> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return None;
        }
        let mut maps = self.inner.maps.write();
        let placeholder = maps.reverse.get(secret)?.clone();
        // A reverse entry without a forward twin is stale; report a miss.
        let mapping = maps.forward.get_mut(&placeholder)?;
        mapping.last_used_at = Utc::now();
        Some(placeholder)
    }

    async fn touch(&self, placeholder: &str) -> Result<(), StorageError> {
        self.ensure_open()?;
        let mut maps = self.inner.maps.write();
        if let Some(mapping) = maps.forward.get_mut(placeholder) {
            mapping.last_used_at = Utc::now();
        }
        Ok(())
    }

    async fn cleanup(&self) -> Result<usize, StorageError> {
        self.ensure_open()?;
        Ok(sweep(&self.inner))
    }

    async fn size(&self) -> usize {
        self.inner.maps.read().forward.len()
    }

    async fn close(&self) -> Result<(), StorageError> {
        self.inner.closed.store(true, Ordering::SeqCst);
        let _ = self.shutdown.send(true);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryStore {
        MemoryStore::new(Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn store_and_lookup_both_directions() {
        let s = store();
        s.store("__SECRET_abc12345__", "hunter2").await.unwrap();

        assert_eq!(
            s.lookup("__SECRET_abc12345__").await.as_deref(),
            Some("hunter2")
        );
        assert_eq!(
            s.lookup_by_secret("hunter2").await.as_deref(),
            Some("__SECRET_abc12345__")
        );
        assert_eq!(s.size().await, 1);
    }

    #[tokio::test]
    async fn reverse_and_forward_stay_consistent() {
        let s = store();
        s.store("__SECRET_aaaa1111__", "one").await.unwrap();
        s.store("__SECRET_bbbb2222__", "two").await.unwrap();

        let ph = s.lookup_by_secret("two").await.expect("reverse hit");
        let secret = s.lookup(&ph).await.expect("forward hit");
        assert_eq!(secret, "two");
    }

    #[tokio::test]
    async fn storing_same_pair_twice_is_idempotent() {
        let s = store();
        s.store("__SECRET_abc12345__", "x").await.unwrap();
        s.store("__SECRET_abc12345__", "x").await.unwrap();
        assert_eq!(s.size().await, 1);
    }

    #[tokio::test]
    async fn collision_is_rejected_and_keeps_original() {
        let s = store();
        s.store("__SECRET_abc12345__", "original").await.unwrap();

        let err = s
            .store("__SECRET_abc12345__", "imposter")
            .await
            .expect_err("collision");
        assert!(matches!(err, StorageError::Collision { .. }));
        assert_eq!(
            s.lookup("__SECRET_abc12345__").await.as_deref(),
            Some("original")
        );
    }

    #[tokio::test]
    async fn cleanup_evicts_idle_entries() {
        let s = MemoryStore::with_sweep_interval(
            Duration::from_millis(30),
            Duration::from_secs(3600), // sweep manually in this test
        );
        s.store("__SECRET_abc12345__", "short-lived").await.unwrap();

        tokio::time::sleep(Duration::from_millis(60)).await;
        let removed = s.cleanup().await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(s.size().await, 0);
        assert!(s.lookup("__SECRET_abc12345__").await.is_none());
        assert!(s.lookup_by_secret("short-lived").await.is_none());
    }

    #[tokio::test]
    async fn lookups_keep_entries_alive() {
        let s = MemoryStore::with_sweep_interval(
            Duration::from_millis(80),
            Duration::from_secs(3600),
        );
        s.store("__SECRET_abc12345__", "busy").await.unwrap();

        for _ in 0..4 {
            tokio::time::sleep(Duration::from_millis(40)).await;
            assert!(s.lookup("__SECRET_abc12345__").await.is_some());
        }
        // Refreshed within the TTL each time, so nothing expires.
        assert_eq!(s.cleanup().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn background_sweep_runs_without_explicit_cleanup() {
        let s = MemoryStore::with_sweep_interval(
            Duration::from_millis(30),
            Duration::from_millis(20),
        );
        s.store("__SECRET_abc12345__", "doomed").await.unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(s.size().await, 0);
    }

    #[tokio::test]
    async fn close_is_idempotent_and_blocks_writes() {
        let s = store();
        s.store("__SECRET_abc12345__", "x").await.unwrap();

        s.close().await.unwrap();
        s.close().await.unwrap();

        assert!(matches!(
            s.store("__SECRET_ffff0000__", "y").await,
            Err(StorageError::Closed)
        ));
        assert!(matches!(s.cleanup().await, Err(StorageError::Closed)));
        assert!(s.lookup("__SECRET_abc12345__").await.is_none());
    }

    #[tokio::test]
    async fn touch_refreshes_without_returning() {
        let s = MemoryStore::with_sweep_interval(
            Duration::from_millis(50),
            Duration::from_secs(3600),
        );
        s.store("__SECRET_abc12345__", "kept").await.unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        s.touch("__SECRET_abc12345__").await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        // 60ms since store but only 30ms since touch.
        assert_eq!(s.cleanup().await.unwrap(), 0);
    }
}
