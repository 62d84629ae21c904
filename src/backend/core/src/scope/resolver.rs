//! Department/ownership row filters derived from role data scopes.
//!
//! Multiple roles combine with union semantics: each role contributes one
//! sub-filter, the sub-filters are ORed together inside one parenthesized
//! group, and the group is ANDed onto the caller's base filter. One role with
//! [`DataScopeKind::All`] lifts the restriction entirely.
//!
//! Resolution is opt-in per statement: callers pass a [`DataPermission`]
//! describing the columns to filter on, or `None` for statements that are not
//! scope-checked.

use metrics::counter;
use tracing::{debug, warn};

use super::models::{DataScopeKind, RoleDataScope};
use crate::auth::Principal;
use crate::config::DataScopeConfig;
use crate::context::RequestContext;
use crate::error::Result;
use crate::query::{Column, Expr, Subquery};
use crate::tenant::PredicateInjector;

// ═══════════════════════════════════════════════════════════════════════════════
// Per-statement configuration
// ═══════════════════════════════════════════════════════════════════════════════

/// Columns a scope-checked statement is filtered on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPermission {
    pub dept_alias: Option<String>,
    pub dept_column: String,
    pub user_alias: Option<String>,
    pub user_column: String,
}

impl Default for DataPermission {
    fn default() -> Self {
        Self {
            dept_alias: None,
            dept_column: "dept_id".to_string(),
            user_alias: None,
            user_column: "create_by".to_string(),
        }
    }
}

impl DataPermission {
    /// Default columns qualified by one alias for both (`u.dept_id`, `u.create_by`).
    pub fn aliased(alias: impl Into<String>) -> Self {
        let alias = alias.into();
        Self {
            dept_alias: Some(alias.clone()),
            user_alias: Some(alias),
            ..Self::default()
        }
    }

    pub fn dept(mut self, alias: Option<&str>, column: impl Into<String>) -> Self {
        self.dept_alias = alias.map(str::to_string);
        self.dept_column = column.into();
        self
    }

    pub fn user(mut self, alias: Option<&str>, column: impl Into<String>) -> Self {
        self.user_alias = alias.map(str::to_string);
        self.user_column = column.into();
        self
    }

    pub fn dept_ref(&self) -> Column {
        Column::aliased(self.dept_alias.as_deref(), self.dept_column.clone())
    }

    pub fn user_ref(&self) -> Column {
        Column::aliased(self.user_alias.as_deref(), self.user_column.clone())
    }
}

/// Outcome of scope resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum ScopeFilter {
    /// The caller may see every row
    Unrestricted,
    /// Rows must satisfy this (parenthesized) expression
    Restricted(Expr),
}

impl ScopeFilter {
    /// AND onto `base`; `Unrestricted` leaves `base` as is.
    pub fn and_onto(self, base: Option<Expr>) -> Option<Expr> {
        match self {
            Self::Unrestricted => base,
            Self::Restricted(expr) => Some(Expr::and_onto(base, expr)),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Resolver
// ═══════════════════════════════════════════════════════════════════════════════

/// Builds data-scope filters.
#[derive(Debug, Clone)]
pub struct DataScopeResolver {
    dept_table: String,
    dept_id_column: String,
    tree_path_column: String,
    root_role: String,
    tenancy: Option<PredicateInjector>,
}

impl DataScopeResolver {
    pub fn new(config: &DataScopeConfig, root_role: impl Into<String>) -> Self {
        Self {
            dept_table: config.dept_table.clone(),
            dept_id_column: config.dept_id_column.clone(),
            tree_path_column: config.tree_path_column.clone(),
            root_role: root_role.into(),
            tenancy: None,
        }
    }

    /// Tenant-filter the department subtree lookup with `injector`.
    pub fn with_tenancy(mut self, injector: PredicateInjector) -> Self {
        self.tenancy = Some(injector);
        self
    }

    pub fn root_role(&self) -> &str {
        &self.root_role
    }

    /// Filter for a caller with `user_id`/`dept_id` holding `scopes`.
    ///
    /// An empty scope list matches nothing; the statement is never passed
    /// through unfiltered.
    pub fn resolve(
        &self,
        permission: &DataPermission,
        user_id: i64,
        dept_id: Option<i64>,
        scopes: &[RoleDataScope],
    ) -> ScopeFilter {
        if scopes.iter().any(RoleDataScope::is_all) {
            return ScopeFilter::Unrestricted;
        }

        let dept_col = permission.dept_ref();
        let user_col = permission.user_ref();
        let parts = scopes
            .iter()
            .map(|scope| self.role_filter(scope, &dept_col, &user_col, user_id, dept_id));

        let union = Expr::any_of(parts).unwrap_or(Expr::AlwaysFalse);
        ScopeFilter::Restricted(union.paren())
    }

    fn role_filter(
        &self,
        scope: &RoleDataScope,
        dept_col: &Column,
        user_col: &Column,
        user_id: i64,
        dept_id: Option<i64>,
    ) -> Expr {
        match scope.kind {
            // Handled by the caller; never reached.
            DataScopeKind::All => Expr::AlwaysFalse,
            DataScopeKind::Dept => match dept_id {
                Some(dept) => Expr::eq(dept_col.clone(), dept),
                None => Expr::AlwaysFalse,
            },
            DataScopeKind::SelfOnly => Expr::eq(user_col.clone(), user_id),
            DataScopeKind::DeptAndSub => match dept_id {
                Some(dept) => match self.subtree(dept) {
                    Ok(subtree) => Expr::in_subquery(dept_col.clone(), subtree),
                    Err(e) => {
                        warn!(dept_id = dept, error = %e, "Department subtree unavailable; scope matches nothing");
                        Expr::AlwaysFalse
                    }
                },
                None => Expr::AlwaysFalse,
            },
            DataScopeKind::Custom => match scope.custom_dept_ids() {
                [] => Expr::AlwaysFalse,
                ids => Expr::in_list(dept_col.clone(), ids.iter().copied()),
            },
        }
    }

    /// `SELECT id FROM sys_dept WHERE id = <dept> OR <dept> IN tree_path`
    fn subtree(&self, dept: i64) -> Result<Subquery> {
        let id = Column::new(self.dept_id_column.clone());
        let mut filter = Expr::eq(id.clone(), dept).or(Expr::find_in_set(dept, Column::new(self.tree_path_column.clone())));
        if let Some(tenancy) = &self.tenancy {
            if let Some(scoped) = tenancy.apply(&self.dept_table, Some(filter.clone()))? {
                filter = scoped;
            }
        }
        Ok(Subquery {
            table: self.dept_table.clone(),
            select: id,
            filter,
        })
    }

    /// Apply scope filtering for `principal` to `base`.
    ///
    /// `permission = None` marks a statement that is not scope-checked and is
    /// returned unmodified. Root callers and an absent principal (system work)
    /// are not filtered.
    pub fn apply(
        &self,
        base: Option<Expr>,
        permission: Option<&DataPermission>,
        principal: Option<&Principal>,
    ) -> Option<Expr> {
        let Some(permission) = permission else {
            return base;
        };
        let Some(principal) = principal else {
            counter!("bastion_data_scope_total", "outcome" => "system").increment(1);
            return base;
        };
        if principal.has_role(&self.root_role) {
            counter!("bastion_data_scope_total", "outcome" => "root").increment(1);
            return base;
        }

        let filter = self.resolve(permission, principal.user_id, principal.dept_id, &principal.data_scopes);
        let outcome = match &filter {
            ScopeFilter::Unrestricted => "unrestricted",
            ScopeFilter::Restricted(_) => "restricted",
        };
        counter!("bastion_data_scope_total", "outcome" => outcome).increment(1);
        debug!(
            user_id = principal.user_id,
            roles = principal.data_scopes.len(),
            outcome,
            "Data scope resolved"
        );
        filter.and_onto(base)
    }

    /// [`DataScopeResolver::apply`] for the principal of the current request.
    pub fn apply_current(&self, base: Option<Expr>, permission: Option<&DataPermission>) -> Option<Expr> {
        let principal = RequestContext::principal();
        self.apply(base, permission, principal.as_deref())
    }
}
