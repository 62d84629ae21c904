//! PostgreSQL-backed permission source and tenant directory.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool, QueryBuilder, Row};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::{info, warn};

use crate::config::DatabaseConfig;
use crate::error::Result;
use crate::permission::PermissionSource;
use crate::query::{sql, Column, Expr};
use crate::tenant::{PredicateInjector, Tenant, TenantDirectory, TenantStatus};

/// Database connection pool.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(&config.url)
            .await?;
        info!(max_connections = config.max_connections, "Database pool ready");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Round-trip a trivial statement.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Role Permissions
// ═══════════════════════════════════════════════════════════════════════════════

/// Role grants from `sys_role` -> `sys_role_menu` -> `sys_menu.perm`.
///
/// Only enabled, non-deleted roles and non-blank permission strings count.
#[derive(Clone)]
pub struct PgPermissionSource {
    pool: PgPool,
    tenancy: PredicateInjector,
}

impl PgPermissionSource {
    pub fn new(pool: PgPool, tenancy: PredicateInjector) -> Self {
        Self { pool, tenancy }
    }

    fn grants_query(&self, tenant: Option<i64>, role: Option<&str>) -> QueryBuilder<'static, sqlx::Postgres> {
        Self::build_grants_query(&self.tenancy, tenant, role)
    }

    fn build_grants_query(
        tenancy: &PredicateInjector,
        tenant: Option<i64>,
        role: Option<&str>,
    ) -> QueryBuilder<'static, sqlx::Postgres> {
        let mut builder = QueryBuilder::new(
            "SELECT r.\"code\", m.\"perm\" FROM \"sys_role\" r \
             JOIN \"sys_role_menu\" rm ON rm.\"role_id\" = r.\"id\" \
             JOIN \"sys_menu\" m ON m.\"id\" = rm.\"menu_id\"",
        );

        let mut filter = Expr::eq(Column::aliased(Some("r"), "status"), 1)
            .and(Expr::eq(Column::aliased(Some("r"), "is_deleted"), 0));
        if let Some(role) = role {
            filter = filter.and(Expr::eq(Column::aliased(Some("r"), "code"), role));
        }
        // The tenant comes from the cache key being loaded, not the request.
        let filter = match tenant {
            Some(tenant) => tenancy.apply_for_tenant("sys_role", Some("r"), tenant, Some(filter)),
            None => Some(filter),
        };
        sql::push_where(&mut builder, filter.as_ref());
        builder.push(" AND m.\"perm\" IS NOT NULL AND m.\"perm\" <> ''");
        builder
    }

    async fn load(&self, tenant: Option<i64>, role: Option<&str>) -> Result<HashMap<String, HashSet<String>>> {
        let rows = self.grants_query(tenant, role).build().fetch_all(&self.pool).await?;
        let mut grants: HashMap<String, HashSet<String>> = HashMap::new();
        for row in rows {
            let code: String = row.try_get("code")?;
            let perm: String = row.try_get("perm")?;
            grants.entry(code).or_default().insert(perm);
        }
        Ok(grants)
    }
}

#[async_trait]
impl PermissionSource for PgPermissionSource {
    async fn role_permissions(&self, tenant: Option<i64>, role: &str) -> Result<HashSet<String>> {
        Ok(self.load(tenant, Some(role)).await?.remove(role).unwrap_or_default())
    }

    async fn tenant_permissions(&self, tenant: Option<i64>) -> Result<HashMap<String, HashSet<String>>> {
        self.load(tenant, None).await
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tenants
// ═══════════════════════════════════════════════════════════════════════════════

/// Tenant records from `sys_tenant`.
#[derive(Clone)]
pub struct PgTenantDirectory {
    pool: PgPool,
}

impl PgTenantDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_one(&self, filter: Expr) -> Result<Option<Tenant>> {
        let mut builder = sql::select(
            "sys_tenant",
            &["id", "name", "code", "domain", "plan_id", "status", "expire_time"],
            Some(&filter.and(Expr::eq(Column::new("is_deleted"), 0))),
        );
        builder.push(" LIMIT 1");

        let Some(row) = builder.build().fetch_optional(&self.pool).await? else {
            return Ok(None);
        };
        let status: i16 = row.try_get("status")?;
        let status = TenantStatus::try_from(status).unwrap_or_else(|e| {
            warn!(error = %e, "Treating tenant with unknown status as disabled");
            TenantStatus::Disabled
        });
        Ok(Some(Tenant {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            code: row.try_get("code")?,
            domain: row.try_get("domain")?,
            plan_id: row.try_get("plan_id")?,
            status,
            expire_time: row.try_get::<Option<DateTime<Utc>>, _>("expire_time")?,
        }))
    }
}

#[async_trait]
impl TenantDirectory for PgTenantDirectory {
    async fn find_by_id(&self, id: i64) -> Result<Option<Tenant>> {
        self.find_one(Expr::eq(Column::new("id"), id)).await
    }

    async fn find_by_domain(&self, domain: &str) -> Result<Option<Tenant>> {
        self.find_one(Expr::eq(Column::new("domain"), domain)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenancy() -> PredicateInjector {
        PredicateInjector::builder().build()
    }

    #[test]
    fn test_grants_query_binds_filters() {
        let sql = PgPermissionSource::build_grants_query(&tenancy(), Some(3), Some("ADMIN")).sql().to_string();
        assert!(sql.contains("\"r\".\"code\" = $3"));
        assert!(sql.contains("\"r\".\"tenant_id\" = $4"));
        assert!(sql.ends_with("AND m.\"perm\" IS NOT NULL AND m.\"perm\" <> ''"));
    }

    #[test]
    fn test_grants_query_follows_injector_column() {
        let tenancy = PredicateInjector::builder().column("org_id").build();
        let sql = PgPermissionSource::build_grants_query(&tenancy, Some(3), None).sql().to_string();
        assert!(sql.contains("\"r\".\"org_id\" = $3"));
        assert!(!sql.contains("tenant_id"));
    }

    #[test]
    fn test_grants_query_without_tenant() {
        let sql = PgPermissionSource::build_grants_query(&tenancy(), None, None).sql().to_string();
        assert!(!sql.contains("tenant_id"));
        assert!(sql.contains("\"r\".\"status\" = $1 AND \"r\".\"is_deleted\" = $2"));
    }
}
