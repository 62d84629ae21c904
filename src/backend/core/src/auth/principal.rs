//! Authenticated identity.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::scope::RoleDataScope;

/// The caller behind a validated credential.
///
/// Built once per credential validation and never mutated while a request
/// is in flight; share it as `Arc<Principal>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: i64,
    pub username: String,
    pub dept_id: Option<i64>,
    pub tenant_id: Option<i64>,
    /// Role codes (`ADMIN`, `ROOT`, ...), without any authority prefix.
    pub roles: BTreeSet<String>,
    pub data_scopes: Vec<RoleDataScope>,
    pub can_switch_tenant: bool,
}

impl Principal {
    pub fn new(user_id: i64, username: impl Into<String>) -> Self {
        Self {
            user_id,
            username: username.into(),
            dept_id: None,
            tenant_id: None,
            roles: BTreeSet::new(),
            data_scopes: Vec::new(),
            can_switch_tenant: false,
        }
    }

    pub fn with_dept(mut self, dept_id: i64) -> Self {
        self.dept_id = Some(dept_id);
        self
    }

    pub fn with_tenant(mut self, tenant_id: i64) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into());
        self
    }

    /// Add a data scope; its role code is added to the role set as well.
    pub fn with_scope(mut self, scope: RoleDataScope) -> Self {
        self.roles.insert(scope.role_code.clone());
        self.data_scopes.push(scope);
        self
    }

    pub fn with_tenant_switching(mut self, allowed: bool) -> Self {
        self.can_switch_tenant = allowed;
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}
