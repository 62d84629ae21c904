//! Shared session state: per-user version counters and revoked credential ids.
//!
//! Both live in an external store so every server instance sees the same
//! values. Mutations are single atomic store commands (INCR, SET NX), so no
//! in-process locking is involved.

use async_trait::async_trait;
use dashmap::DashMap;
use metrics::counter;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::error::{BastionError, ErrorCode, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// Store Trait
// ═══════════════════════════════════════════════════════════════════════════════

/// Storage for session invalidation state.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Current version for `user_id`; `0` when none was ever stored.
    async fn current_version(&self, user_id: i64) -> Result<u64>;

    /// Atomically increment the version for `user_id` and return the new value.
    async fn bump_version(&self, user_id: i64) -> Result<u64>;

    /// Record `jti` as revoked. `ttl = None` keeps the entry forever.
    /// An already revoked `jti` is left untouched.
    async fn revoke(&self, jti: &str, ttl: Option<Duration>) -> Result<()>;

    /// Whether `jti` is currently revoked.
    async fn is_revoked(&self, jti: &str) -> Result<bool>;

    /// Backend name for logs and metrics.
    fn name(&self) -> &'static str;
}

// ═══════════════════════════════════════════════════════════════════════════════
// Redis Store
// ═══════════════════════════════════════════════════════════════════════════════

/// Redis-backed session store.
///
/// Keys: `{prefix}:token_version:{user_id}` and `{prefix}:revoked_jti:{jti}`.
#[derive(Clone)]
pub struct RedisSessionStore {
    conn: ConnectionManager,
    key_prefix: String,
}

impl RedisSessionStore {
    /// Connect to Redis at `url`.
    pub async fn connect(url: &str, key_prefix: impl Into<String>) -> Result<Self> {
        let client = redis::Client::open(url).map_err(|e| {
            BastionError::with_internal(
                ErrorCode::CacheConnectionFailed,
                "Failed to create Redis client",
                e.to_string(),
            )
        })?;
        let conn = ConnectionManager::new(client).await?;
        info!(url = %url, "Session store connected to Redis");
        Ok(Self::new(conn, key_prefix))
    }

    pub fn new(conn: ConnectionManager, key_prefix: impl Into<String>) -> Self {
        Self {
            conn,
            key_prefix: key_prefix.into(),
        }
    }

    fn version_key(&self, user_id: i64) -> String {
        format!("{}:token_version:{}", self.key_prefix, user_id)
    }

    fn revoked_key(&self, jti: &str) -> String {
        format!("{}:revoked_jti:{}", self.key_prefix, jti)
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn current_version(&self, user_id: i64) -> Result<u64> {
        let mut conn = self.conn.clone();
        let version: Option<u64> = conn.get(self.version_key(user_id)).await?;
        Ok(version.unwrap_or(0))
    }

    async fn bump_version(&self, user_id: i64) -> Result<u64> {
        let mut conn = self.conn.clone();
        let version: u64 = conn.incr(self.version_key(user_id), 1u64).await?;
        Ok(version)
    }

    async fn revoke(&self, jti: &str, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(self.revoked_key(jti)).arg(1).arg("NX");
        if let Some(ttl) = ttl {
            cmd.arg("EX").arg(ttl.as_secs().max(1));
        }
        cmd.query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }

    async fn is_revoked(&self, jti: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(self.revoked_key(jti)).await?;
        Ok(exists)
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// In-Memory Store
// ═══════════════════════════════════════════════════════════════════════════════

/// Process-local session store for tests and single-instance setups.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    versions: DashMap<i64, u64>,
    revoked: DashMap<String, Option<Instant>>,
    unavailable: AtomicBool,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail as if the backing store were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(BastionError::with_internal(
                ErrorCode::CacheConnectionFailed,
                "Unable to connect to cache",
                "in-memory session store marked unavailable",
            ));
        }
        Ok(())
    }

    /// Number of revoked entries still held, expired ones included.
    pub fn revoked_len(&self) -> usize {
        self.revoked.len()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn current_version(&self, user_id: i64) -> Result<u64> {
        self.check_available()?;
        Ok(self.versions.get(&user_id).map(|v| *v).unwrap_or(0))
    }

    async fn bump_version(&self, user_id: i64) -> Result<u64> {
        self.check_available()?;
        let mut entry = self.versions.entry(user_id).or_insert(0);
        *entry += 1;
        Ok(*entry)
    }

    async fn revoke(&self, jti: &str, ttl: Option<Duration>) -> Result<()> {
        self.check_available()?;
        let now = Instant::now();
        let expires_at = ttl.map(|ttl| now + ttl);
        let mut entry = self.revoked.entry(jti.to_string()).or_insert(expires_at);
        if entry.is_some_and(|at| at <= now) {
            *entry = expires_at;
        }
        Ok(())
    }

    async fn is_revoked(&self, jti: &str) -> Result<bool> {
        self.check_available()?;
        let now = Instant::now();
        let revoked = match self.revoked.get(jti) {
            Some(entry) => entry.map_or(true, |at| at > now),
            None => false,
        };
        if !revoked && self.revoked.remove_if(jti, |_, at| at.is_some_and(|at| at <= now)).is_some() {
            debug!(jti = %jti, "Dropped expired revocation entry");
        }
        Ok(revoked)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

pub(crate) fn record_store_failure(store: &dyn SessionStore, operation: &'static str) {
    counter!(
        "bastion_session_store_failures_total",
        "backend" => store.name(),
        "operation" => operation,
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_version_defaults_to_zero_and_increments() {
        let store = InMemorySessionStore::new();
        assert_eq!(store.current_version(9).await.unwrap(), 0);
        assert_eq!(store.bump_version(9).await.unwrap(), 1);
        assert_eq!(store.bump_version(9).await.unwrap(), 2);
        assert_eq!(store.current_version(9).await.unwrap(), 2);
        assert_eq!(store.current_version(10).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent() {
        let store = InMemorySessionStore::new();
        store.revoke("a", None).await.unwrap();
        store.revoke("a", Some(Duration::from_secs(1))).await.unwrap();
        assert!(store.is_revoked("a").await.unwrap());
        assert_eq!(store.revoked_len(), 1);
    }

    #[tokio::test]
    async fn test_revocation_expires() {
        let store = InMemorySessionStore::new();
        store.revoke("short", Some(Duration::from_millis(20))).await.unwrap();
        assert!(store.is_revoked("short").await.unwrap());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(!store.is_revoked("short").await.unwrap());
        assert_eq!(store.revoked_len(), 0);
    }

    #[tokio::test]
    async fn test_unavailable_store_errors() {
        let store = InMemorySessionStore::new();
        store.set_unavailable(true);
        let err = store.current_version(1).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::CacheConnectionFailed);
    }

    #[tokio::test]
    async fn test_concurrent_bumps_are_not_lost() {
        let store = std::sync::Arc::new(InMemorySessionStore::new());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.bump_version(5).await.unwrap() })
            })
            .collect();
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(store.current_version(5).await.unwrap(), 16);
    }
}
