//! Mapping stores for the Keymask proxy.
//!
//! A mapping binds a placeholder to the secret it stands for, in both
//! directions, with time-to-live semantics: every successful lookup refreshes
//! the entry, and entries idle longer than the TTL are evicted.
//!
//! Two backends implement [`MappingStore`]: [`MemoryStore`] (single-process,
//! background sweep) and [`RedisStore`] (shared, native TTL).

mod memory;
mod redis;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// A placeholder/secret association with its bookkeeping timestamps.
#[derive(Debug, Clone)]
pub struct Mapping {
    pub placeholder: String,
    pub secret: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
}

/// Storage error type.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The store was closed; the operation will never succeed.
    #[error("mapping store is closed")]
    Closed,

    /// The placeholder is already bound to a different secret. With an
    /// 8-hex-char hash this happens around ~64k distinct secrets; the
    /// existing mapping is kept.
    #[error("placeholder collision on {placeholder}")]
    Collision { placeholder: String },

    /// Redis transport or protocol error.
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
}

/// Bidirectional placeholder/secret store with TTL.
///
/// Lookups refresh the entry's last-used time; `cleanup` removes entries
/// idle longer than the TTL. `close` is idempotent; mutating calls after
/// close fail with [`StorageError::Closed`], lookups simply miss.
#[async_trait]
pub trait MappingStore: Send + Sync {
    /// Idempotent upsert; also maintains the reverse (secret -> placeholder)
    /// index. Storing an existing placeholder with a different secret fails
    /// with [`StorageError::Collision`].
    async fn store(&self, placeholder: &str, secret: &str) -> Result<(), StorageError>;

    /// Secret for a placeholder; refreshes the entry on hit.
    async fn lookup(&self, placeholder: &str) -> Option<String>;

    /// Placeholder for a secret; refreshes the entry on hit.
    async fn lookup_by_secret(&self, secret: &str) -> Option<String>;

    /// Refreshes an entry without returning it.
    async fn touch(&self, placeholder: &str) -> Result<(), StorageError>;

    /// Removes expired entries; returns how many were evicted.
    async fn cleanup(&self) -> Result<usize, StorageError>;

    /// Approximate number of stored mappings.
    async fn size(&self) -> usize;

    /// Releases backend resources and stops background work.
    async fn close(&self) -> Result<(), StorageError>;
}
