//! Tenant predicate injection.
//!
//! Every statement against a tenant-scoped table gets a
//! `<alias>.tenant_id = <current tenant>` conjunct. Exempt tables and scopes
//! with isolation bypassed pass through unchanged. A tenant-scoped statement
//! without a tenant in the request context is refused.

use metrics::counter;
use std::collections::HashSet;
use tracing::{debug, error};

use crate::config::TenantConfig;
use crate::context::RequestContext;
use crate::error::{BastionError, Result};
use crate::query::{Column, Expr};

/// Adds tenant-equality predicates to outgoing filters.
#[derive(Debug, Clone)]
pub struct PredicateInjector {
    enabled: bool,
    column: String,
    ignore_tables: HashSet<String>,
}

impl PredicateInjector {
    pub fn new(config: &TenantConfig) -> Self {
        Self {
            enabled: config.enabled,
            column: config.column.clone(),
            ignore_tables: config
                .ignore_tables
                .iter()
                .map(|t| t.to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn builder() -> PredicateInjectorBuilder {
        PredicateInjectorBuilder {
            injector: Self::new(&TenantConfig::default()),
        }
    }

    /// Tenant discriminator column name.
    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether `table` is exempt from tenant filtering (case-insensitive,
    /// schema prefix ignored).
    pub fn is_ignored_table(&self, table: &str) -> bool {
        let bare = table.rsplit('.').next().unwrap_or(table);
        self.ignore_tables.contains(&bare.to_ascii_lowercase())
    }

    /// Whether statements on `table` get a tenant predicate right now.
    pub fn applies_to(&self, table: &str) -> bool {
        self.enabled && !RequestContext::is_ignore_isolation() && !self.is_ignored_table(table)
    }

    /// Add the tenant predicate for `table` to `filter`.
    pub fn apply(&self, table: &str, filter: Option<Expr>) -> Result<Option<Expr>> {
        self.apply_aliased(table, None, filter)
    }

    /// Same as [`PredicateInjector::apply`] with the tenant column qualified
    /// by `alias`.
    pub fn apply_aliased(&self, table: &str, alias: Option<&str>, filter: Option<Expr>) -> Result<Option<Expr>> {
        if !self.applies_to(table) {
            return Ok(filter);
        }

        let Some(tenant_id) = RequestContext::tenant() else {
            counter!("bastion_tenant_context_missing_total", "table" => table.to_string()).increment(1);
            error!(table = %table, "Tenant-scoped statement without tenant context");
            return Err(BastionError::tenant_context_missing().with_context("table", table));
        };

        Ok(self.apply_for_tenant(table, alias, tenant_id, filter))
    }

    /// Add the predicate for an explicit `tenant_id`, independent of the
    /// request context. Used by maintenance paths that load several tenants.
    pub fn apply_for_tenant(&self, table: &str, alias: Option<&str>, tenant_id: i64, filter: Option<Expr>) -> Option<Expr> {
        if !self.enabled || self.is_ignored_table(table) {
            return filter;
        }
        let predicate = Expr::eq(Column::aliased(alias, self.column.clone()), tenant_id);
        debug!(table = %table, tenant_id, "Tenant predicate injected");
        Some(Expr::and_onto(filter, predicate))
    }
}

/// Builder for [`PredicateInjector`].
pub struct PredicateInjectorBuilder {
    injector: PredicateInjector,
}

impl PredicateInjectorBuilder {
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.injector.enabled = enabled;
        self
    }

    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.injector.column = column.into();
        self
    }

    pub fn ignore_table(mut self, table: impl Into<String>) -> Self {
        self.injector
            .ignore_tables
            .insert(table.into().to_ascii_lowercase());
        self
    }

    pub fn build(self) -> PredicateInjector {
        self.injector
    }
}
