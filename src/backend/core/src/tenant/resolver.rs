//! Tenant lookup and per-request tenant resolution.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

use super::models::Tenant;
use crate::auth::Principal;
use crate::error::Result;

/// Durable tenant lookup.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    async fn find_by_id(&self, tenant_id: i64) -> Result<Option<Tenant>>;

    /// Tenant whose `domain` equals `host` (already normalized).
    async fn find_by_domain(&self, host: &str) -> Result<Option<Tenant>>;
}

/// Fixed tenant list, for tests and static deployments.
#[derive(Debug, Default)]
pub struct StaticTenantDirectory {
    tenants: DashMap<i64, Tenant>,
}

impl StaticTenantDirectory {
    pub fn new(tenants: impl IntoIterator<Item = Tenant>) -> Self {
        let map = DashMap::new();
        for tenant in tenants {
            map.insert(tenant.id, tenant);
        }
        Self { tenants: map }
    }

    pub fn upsert(&self, tenant: Tenant) {
        self.tenants.insert(tenant.id, tenant);
    }
}

#[async_trait]
impl TenantDirectory for StaticTenantDirectory {
    async fn find_by_id(&self, tenant_id: i64) -> Result<Option<Tenant>> {
        Ok(self.tenants.get(&tenant_id).map(|t| t.clone()))
    }

    async fn find_by_domain(&self, host: &str) -> Result<Option<Tenant>> {
        Ok(self
            .tenants
            .iter()
            .find(|t| t.domain.as_deref().is_some_and(|d| d.eq_ignore_ascii_case(host)))
            .map(|t| t.clone()))
    }
}

/// Lower-cased host without port (`Acme.Example.com:8443` -> `acme.example.com`).
pub fn normalize_host(host: &str) -> Option<String> {
    let host = host.trim();
    let without_port = match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    };
    if without_port.is_empty() {
        None
    } else {
        Some(without_port.to_ascii_lowercase())
    }
}

/// Decides which tenant a request runs as.
///
/// Order: the authenticated principal's tenant, then an active tenant mapped
/// to the request host. There is no fallback to a default tenant.
#[derive(Clone)]
pub struct TenantResolver {
    directory: Arc<dyn TenantDirectory>,
}

impl TenantResolver {
    pub fn new(directory: Arc<dyn TenantDirectory>) -> Self {
        Self { directory }
    }

    pub fn directory(&self) -> &Arc<dyn TenantDirectory> {
        &self.directory
    }

    /// Active tenant bound to `host`, if any.
    pub async fn resolve_host(&self, host: &str) -> Result<Option<i64>> {
        let Some(host) = normalize_host(host) else {
            return Ok(None);
        };
        let tenant = self.directory.find_by_domain(&host).await?;
        Ok(tenant.filter(Tenant::is_active).map(|t| t.id))
    }

    pub async fn resolve(&self, principal: Option<&Principal>, host: Option<&str>) -> Result<Option<i64>> {
        if let Some(tenant_id) = principal.and_then(|p| p.tenant_id) {
            return Ok(Some(tenant_id));
        }
        if let Some(host) = host {
            if let Some(tenant_id) = self.resolve_host(host).await? {
                debug!(tenant_id, host = %host, "Tenant resolved from host");
                return Ok(Some(tenant_id));
            }
        }
        Ok(None)
    }
}
