//! Permission checks against cached role grants.
//!
//! Grants are read through the per-tenant cache and loaded from the
//! [`PermissionSource`] on a miss. Any cache failure denies the check.

use metrics::counter;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::cache::{CachedRole, PermissionCache};
use super::source::PermissionSource;
use super::wildcard::any_match;
use crate::auth::Principal;
use crate::config::PermissionConfig;
use crate::context::RequestContext;
use crate::error::{BastionError, Result};

/// Answers "does this principal hold that permission".
pub struct PermissionQuery {
    cache: Arc<dyn PermissionCache>,
    source: Arc<dyn PermissionSource>,
    root_role: String,
    key_prefix: String,
    per_tenant: bool,
    negative_ttl: Duration,
}

impl PermissionQuery {
    /// `per_tenant = false` keeps a single map for the whole deployment.
    pub fn new(
        cache: Arc<dyn PermissionCache>,
        source: Arc<dyn PermissionSource>,
        config: &PermissionConfig,
        per_tenant: bool,
    ) -> Self {
        Self {
            cache,
            source,
            root_role: config.root_role.clone(),
            key_prefix: config.cache_key_prefix.clone(),
            per_tenant,
            negative_ttl: Duration::from_secs(config.negative_ttl_secs),
        }
    }

    pub fn root_role(&self) -> &str {
        &self.root_role
    }

    /// Cache key of the map holding `tenant`'s role grants.
    pub fn cache_key(&self, tenant: Option<i64>) -> String {
        match tenant {
            Some(id) if self.per_tenant => format!("{}:{}", self.key_prefix, id),
            _ => self.key_prefix.clone(),
        }
    }

    fn tenant_scope(&self, tenant: Option<i64>) -> Option<i64> {
        tenant.filter(|_| self.per_tenant)
    }

    /// Tenant whose grants apply to `principal` in the current request.
    fn tenant_of(principal: &Principal) -> Option<i64> {
        RequestContext::tenant().or(principal.tenant_id)
    }

    /// Whether `principal` holds `required`.
    ///
    /// Root bypasses every check. A blank `required` is never granted.
    pub async fn has_permission(&self, principal: &Principal, required: &str) -> bool {
        if required.trim().is_empty() {
            return false;
        }
        if principal.has_role(&self.root_role) {
            counter!("bastion_permission_checks_total", "outcome" => "root").increment(1);
            return true;
        }

        let roles: Vec<String> = principal.roles.iter().cloned().collect();
        if roles.is_empty() {
            warn!(user_id = principal.user_id, permission = %required, "Permission denied: no roles");
            counter!("bastion_permission_checks_total", "outcome" => "denied").increment(1);
            return false;
        }

        let tenant = Self::tenant_of(principal);
        let granted = match self.role_permissions(tenant, &roles).await {
            Ok(granted) => granted,
            Err(e) => {
                error!(
                    user_id = principal.user_id,
                    permission = %required,
                    tenant_id = ?tenant,
                    error = %e,
                    "Permission lookup failed; denying"
                );
                counter!("bastion_permission_checks_total", "outcome" => "error").increment(1);
                return false;
            }
        };

        if any_match(&granted, required) {
            counter!("bastion_permission_checks_total", "outcome" => "granted").increment(1);
            true
        } else {
            warn!(
                user_id = principal.user_id,
                permission = %required,
                roles = ?roles,
                "Permission denied"
            );
            counter!("bastion_permission_checks_total", "outcome" => "denied").increment(1);
            false
        }
    }

    /// [`PermissionQuery::has_permission`] for the principal of the current
    /// request; no principal means no permission.
    pub async fn has_permission_current(&self, required: &str) -> bool {
        match RequestContext::principal() {
            Some(principal) => self.has_permission(&principal, required).await,
            None => false,
        }
    }

    /// `Err(PermissionDenied)` unless `principal` holds `required`.
    pub async fn check(&self, principal: &Principal, required: &str) -> Result<()> {
        if self.has_permission(principal, required).await {
            Ok(())
        } else {
            Err(BastionError::permission_denied(required))
        }
    }

    /// Union of the permissions held by `roles` in `tenant`.
    pub async fn role_permissions(&self, tenant: Option<i64>, roles: &[String]) -> Result<HashSet<String>> {
        let key = self.cache_key(tenant);
        let cached = self.cache.get_roles(&key, roles).await?;

        let mut granted = HashSet::new();
        for (role, entry) in roles.iter().zip(cached) {
            match entry {
                CachedRole::Granted(perms) => granted.extend(perms),
                CachedRole::Absent => {}
                CachedRole::Miss => granted.extend(self.load_role(&key, tenant, role).await?),
            }
        }
        Ok(granted)
    }

    async fn load_role(&self, key: &str, tenant: Option<i64>, role: &str) -> Result<HashSet<String>> {
        let perms = self.source.role_permissions(self.tenant_scope(tenant), role).await?;
        if perms.is_empty() {
            self.cache.put_absent(key, role, self.negative_ttl).await?;
        } else {
            self.cache.put_role(key, role, &perms).await?;
        }
        debug!(role = %role, key = %key, count = perms.len(), "Loaded role permissions");
        Ok(perms)
    }

    /// Rebuild `tenant`'s map from the source. Returns the number of roles cached.
    pub async fn refresh_tenant(&self, tenant: Option<i64>) -> Result<usize> {
        let key = self.cache_key(tenant);
        let grants = self.source.tenant_permissions(self.tenant_scope(tenant)).await?;
        self.cache.clear(&key).await?;
        for (role, perms) in &grants {
            self.cache.put_role(&key, role, perms).await?;
        }
        info!(key = %key, roles = grants.len(), "Role permission cache refreshed");
        Ok(grants.len())
    }

    /// Load every tenant's grants before serving traffic.
    pub async fn warm_up<I>(&self, tenants: I) -> Result<usize>
    where
        I: IntoIterator<Item = Option<i64>>,
    {
        let mut total = 0;
        for tenant in tenants {
            total += self.refresh_tenant(tenant).await?;
        }
        Ok(total)
    }

    /// Reload one role after its grants changed.
    pub async fn refresh_role(&self, tenant: Option<i64>, role: &str) -> Result<()> {
        let key = self.cache_key(tenant);
        self.cache.remove_role(&key, role).await?;
        self.load_role(&key, tenant, role).await?;
        Ok(())
    }

    /// Move cached grants after a role code changed.
    pub async fn rename_role(&self, tenant: Option<i64>, old_role: &str, new_role: &str) -> Result<()> {
        let key = self.cache_key(tenant);
        self.cache.remove_role(&key, old_role).await?;
        self.refresh_role(tenant, new_role).await
    }

    /// Drop a deleted role.
    pub async fn remove_role(&self, tenant: Option<i64>, role: &str) -> Result<()> {
        self.cache.remove_role(&self.cache_key(tenant), role).await
    }
}
