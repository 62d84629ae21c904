//! Per-tenant role -> permission cache.
//!
//! Every tenant owns one keyed map (`{prefix}:{tenant_id}`, or `{prefix}`
//! with tenancy off) from role code to that role's permission set. A role
//! known to have no permissions is cached as a negative entry with a bounded
//! lifetime so repeated lookups for it do not reach the source.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use metrics::counter;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::info;

use crate::error::{BastionError, ErrorCode, Result};

/// Result of one cache lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedRole {
    /// Not cached; consult the source
    Miss,
    /// Cached as having no permissions
    Absent,
    /// Cached permission set
    Granted(HashSet<String>),
}

impl CachedRole {
    pub fn is_miss(&self) -> bool {
        matches!(self, Self::Miss)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Cache Trait
// ═══════════════════════════════════════════════════════════════════════════════

#[async_trait]
pub trait PermissionCache: Send + Sync {
    /// Look up `roles` in the map at `key`; one entry per role, same order.
    async fn get_roles(&self, key: &str, roles: &[String]) -> Result<Vec<CachedRole>>;

    /// Store the permissions of `role`.
    async fn put_role(&self, key: &str, role: &str, permissions: &HashSet<String>) -> Result<()>;

    /// Record that `role` has no permissions, for `ttl`.
    async fn put_absent(&self, key: &str, role: &str, ttl: Duration) -> Result<()>;

    /// Drop any entry for `role`.
    async fn remove_role(&self, key: &str, role: &str) -> Result<()>;

    /// Drop the whole map at `key`.
    async fn clear(&self, key: &str) -> Result<()>;

    /// Backend name for logs and metrics.
    fn name(&self) -> &'static str;
}

// ═══════════════════════════════════════════════════════════════════════════════
// Redis Cache
// ═══════════════════════════════════════════════════════════════════════════════

/// Redis hash per tenant: field = role code, value = JSON array of permissions.
///
/// Negative entries live in a companion hash `{key}:absent` whose values are
/// unix expiry timestamps, so clearing a tenant is two `DEL`s.
#[derive(Clone)]
pub struct RedisPermissionCache {
    conn: ConnectionManager,
}

impl RedisPermissionCache {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(|e| {
            BastionError::with_internal(
                ErrorCode::CacheConnectionFailed,
                "Failed to create Redis client",
                e.to_string(),
            )
        })?;
        let conn = ConnectionManager::new(client).await?;
        info!(url = %url, "Permission cache connected to Redis");
        Ok(Self::new(conn))
    }

    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    fn absent_key(key: &str) -> String {
        format!("{}:absent", key)
    }
}

#[async_trait]
impl PermissionCache for RedisPermissionCache {
    async fn get_roles(&self, key: &str, roles: &[String]) -> Result<Vec<CachedRole>> {
        if roles.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let (granted, absent): (Vec<Option<String>>, Vec<Option<i64>>) = redis::pipe()
            .cmd("HMGET")
            .arg(key)
            .arg(roles)
            .cmd("HMGET")
            .arg(Self::absent_key(key))
            .arg(roles)
            .query_async(&mut conn)
            .await?;

        let now = Utc::now().timestamp();
        granted
            .into_iter()
            .zip(absent)
            .map(|(granted, absent)| -> Result<CachedRole> {
                match (granted, absent) {
                    (Some(json), _) => {
                        let perms: HashSet<String> = serde_json::from_str(&json)?;
                        counter!("bastion_permission_cache_total", "result" => "hit").increment(1);
                        Ok(CachedRole::Granted(perms))
                    }
                    (None, Some(expires)) if expires > now => {
                        counter!("bastion_permission_cache_total", "result" => "absent").increment(1);
                        Ok(CachedRole::Absent)
                    }
                    _ => {
                        counter!("bastion_permission_cache_total", "result" => "miss").increment(1);
                        Ok(CachedRole::Miss)
                    }
                }
            })
            .collect()
    }

    async fn put_role(&self, key: &str, role: &str, permissions: &HashSet<String>) -> Result<()> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(permissions)?;
        redis::pipe()
            .atomic()
            .hset(key, role, json)
            .ignore()
            .hdel(Self::absent_key(key), role)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn put_absent(&self, key: &str, role: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        let expires = Utc::now().timestamp() + ttl.as_secs() as i64;
        redis::pipe()
            .atomic()
            .hdel(key, role)
            .ignore()
            .hset(Self::absent_key(key), role, expires)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn remove_role(&self, key: &str, role: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::pipe()
            .hdel(key, role)
            .ignore()
            .hdel(Self::absent_key(key), role)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn clear(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(vec![key.to_string(), Self::absent_key(key)]).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// In-Memory Cache
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
enum Entry {
    Granted(HashSet<String>),
    Absent(Instant),
}

/// Process-local cache for tests and single-instance setups.
#[derive(Debug, Default)]
pub struct InMemoryPermissionCache {
    maps: DashMap<String, HashMap<String, Entry>>,
    unavailable: AtomicBool,
}

impl InMemoryPermissionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail as if the backing store were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of role entries cached under `key`, negative ones included.
    pub fn len(&self, key: &str) -> usize {
        self.maps.get(key).map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self, key: &str) -> bool {
        self.len(key) == 0
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(BastionError::with_internal(
                ErrorCode::CacheConnectionFailed,
                "Unable to connect to cache",
                "in-memory permission cache marked unavailable",
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl PermissionCache for InMemoryPermissionCache {
    async fn get_roles(&self, key: &str, roles: &[String]) -> Result<Vec<CachedRole>> {
        self.check_available()?;
        let now = Instant::now();
        let map = self.maps.get(key);
        Ok(roles
            .iter()
            .map(|role| match map.as_ref().and_then(|m| m.get(role)) {
                Some(Entry::Granted(perms)) => CachedRole::Granted(perms.clone()),
                Some(Entry::Absent(until)) if *until > now => CachedRole::Absent,
                _ => CachedRole::Miss,
            })
            .collect())
    }

    async fn put_role(&self, key: &str, role: &str, permissions: &HashSet<String>) -> Result<()> {
        self.check_available()?;
        self.maps
            .entry(key.to_string())
            .or_default()
            .insert(role.to_string(), Entry::Granted(permissions.clone()));
        Ok(())
    }

    async fn put_absent(&self, key: &str, role: &str, ttl: Duration) -> Result<()> {
        self.check_available()?;
        self.maps
            .entry(key.to_string())
            .or_default()
            .insert(role.to_string(), Entry::Absent(Instant::now() + ttl));
        Ok(())
    }

    async fn remove_role(&self, key: &str, role: &str) -> Result<()> {
        self.check_available()?;
        if let Some(mut map) = self.maps.get_mut(key) {
            map.remove(role);
        }
        Ok(())
    }

    async fn clear(&self, key: &str) -> Result<()> {
        self.check_available()?;
        self.maps.remove(key);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
