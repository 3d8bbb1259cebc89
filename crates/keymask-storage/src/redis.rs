//! Redis-backed mapping store.
//!
//! Forward and reverse entries are separate keys with identical TTLs, which
//! Redis expires natively; `cleanup` is therefore a no-op. The reverse key is
//! written before the forward key: the two writes are not transactional, and
//! a reverse pointer whose forward twin is missing must read as a miss, never
//! the other way around.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use ::redis::aio::ConnectionManager;
use ::redis::AsyncCommands;

use crate::{MappingStore, StorageError};

/// Key namespace shared by every Keymask instance on the same Redis.
const DEFAULT_NAMESPACE: &str = "keymask:";

/// Shared [`MappingStore`] on Redis with native TTL expiry.
pub struct RedisStore {
    conn: ConnectionManager,
    ttl: Duration,
    namespace: String,
    closed: AtomicBool,
}

impl RedisStore {
    /// Connects and pings the server; fails fast on unreachable Redis.
    pub async fn connect(
        address: &str,
        password: &str,
        db: i64,
        ttl: Duration,
    ) -> Result<Self, StorageError> {
        let url = if password.is_empty() {
            format!("redis://{address}/{db}")
        } else {
            format!("redis://:{password}@{address}/{db}")
        };
        let client = ::redis::Client::open(url)?;
        let mut conn = ConnectionManager::new(client).await?;

        let _: String = ::redis::cmd("PING").query_async(&mut conn).await?;

        Ok(Self {
            conn,
            ttl,
            namespace: DEFAULT_NAMESPACE.to_string(),
            closed: AtomicBool::new(false),
        })
    }

    fn forward_key(&self, placeholder: &str) -> String {
        format!("{}p:{}", self.namespace, placeholder)
    }

    fn reverse_key(&self, secret: &str) -> String {
        format!("{}s:{}", self.namespace, secret)
    }

    fn ttl_secs(&self) -> u64 {
        self.ttl.as_secs().max(1)
    }

    fn ensure_open(&self) -> Result<(), StorageError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StorageError::Closed);
        }
        Ok(())
    }

    async fn refresh(&self, placeholder: &str, secret: &str) {
        let mut conn = self.conn.clone();
        let ttl = self.ttl_secs() as i64;
        let _: Result<bool, _> = conn.expire(self.forward_key(placeholder), ttl).await;
        let _: Result<bool, _> = conn.expire(self.reverse_key(secret), ttl).await;
    }
}

#[async_trait]
impl MappingStore for RedisStore {
    async fn store(&self, placeholder: &str, secret: &str) -> Result<(), StorageError> {
        self.ensure_open()?;
        let mut conn = self.conn.clone();

        let existing: Option<String> = conn.get(self.forward_key(placeholder)).await?;
        if let Some(existing) = existing {
            if existing != secret {
                return Err(StorageError::Collision {
                    placeholder: placeholder.to_string(),
                });
            }
        }

        // Reverse before forward: a dangling reverse pointer is harmless (it
        // reads as a miss), a dangling forward entry is not.
        let _: () = conn
            .set_ex(self.reverse_key(secret), placeholder, self.ttl_secs())
            .await?;
        let _: () = conn
            .set_ex(self.forward_key(placeholder), secret, self.ttl_secs())
            .await?;
        Ok(())
    }

    async fn lookup(&self, placeholder: &str) -> Option<String> {
        if self.closed.load(Ordering::SeqCst) {
            return None;
        }
        let mut conn = self.conn.clone();
        let secret: Option<String> = conn.get(self.forward_key(placeholder)).await.ok()?;
        let secret = secret?;
        self.refresh(placeholder, &secret).await;
        Some(secret)
    }

    async fn lookup_by_secret(&self, secret: &str) -> Option<String> {
        if self.closed.load(Ordering::SeqCst) {
            return None;
        }
        let mut conn = self.conn.clone();
        let placeholder: Option<String> = conn.get(self.reverse_key(secret)).await.ok()?;
        let placeholder = placeholder?;

        // Stale reverse pointer: forward entry already expired.
        let forward: Option<String> = conn.get(self.forward_key(&placeholder)).await.ok()?;
        forward?;

        self.refresh(&placeholder, secret).await;
        Some(placeholder)
    }

    async fn touch(&self, placeholder: &str) -> Result<(), StorageError> {
        self.ensure_open()?;
        let mut conn = self.conn.clone();
        let secret: Option<String> = conn.get(self.forward_key(placeholder)).await?;
        if let Some(secret) = secret {
            self.refresh(placeholder, &secret).await;
        }
        Ok(())
    }

    async fn cleanup(&self) -> Result<usize, StorageError> {
        // Redis expires keys natively.
        self.ensure_open()?;
        Ok(0)
    }

    async fn size(&self) -> usize {
        if self.closed.load(Ordering::SeqCst) {
            return 0;
        }
        let mut conn = self.conn.clone();
        let pattern = format!("{}p:*", self.namespace);
        let keys: Result<Vec<String>, _> =
            ::redis::cmd("KEYS").arg(pattern).query_async(&mut conn).await;
        keys.map(|k| k.len()).unwrap_or(0)
    }

    async fn close(&self) -> Result<(), StorageError> {
        // The connection manager has no explicit shutdown; refusing further
        // operations is what close guarantees.
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
