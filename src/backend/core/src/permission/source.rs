//! Durable role -> permission mappings.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::Result;

/// Authoritative source of role permissions, consulted on cache misses.
#[async_trait]
pub trait PermissionSource: Send + Sync {
    /// Permissions granted to `role` in `tenant` (`None` when tenancy is off).
    /// An unknown role yields an empty set.
    async fn role_permissions(&self, tenant: Option<i64>, role: &str) -> Result<HashSet<String>>;

    /// Every role with at least one permission in `tenant`.
    async fn tenant_permissions(&self, tenant: Option<i64>) -> Result<HashMap<String, HashSet<String>>>;
}

/// Fixed mapping for tests and bootstrap configuration.
#[derive(Debug, Default)]
pub struct StaticPermissionSource {
    grants: DashMap<(Option<i64>, String), HashSet<String>>,
    loads: AtomicUsize,
}

impl StaticPermissionSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant `permissions` to `role` in `tenant`.
    pub fn grant<I, P>(self, tenant: Option<i64>, role: impl Into<String>, permissions: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.set(tenant, role, permissions);
        self
    }

    /// Replace the grants of `role` in `tenant`.
    pub fn set<I, P>(&self, tenant: Option<i64>, role: impl Into<String>, permissions: I)
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.grants
            .insert((tenant, role.into()), permissions.into_iter().map(Into::into).collect());
    }

    pub fn remove(&self, tenant: Option<i64>, role: &str) {
        self.grants.remove(&(tenant, role.to_string()));
    }

    /// Number of lookups served so far.
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PermissionSource for StaticPermissionSource {
    async fn role_permissions(&self, tenant: Option<i64>, role: &str) -> Result<HashSet<String>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .grants
            .get(&(tenant, role.to_string()))
            .map(|perms| perms.clone())
            .unwrap_or_default())
    }

    async fn tenant_permissions(&self, tenant: Option<i64>) -> Result<HashMap<String, HashSet<String>>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .grants
            .iter()
            .filter(|entry| entry.key().0 == tenant && !entry.value().is_empty())
            .map(|entry| (entry.key().1.clone(), entry.value().clone()))
            .collect())
    }
}
