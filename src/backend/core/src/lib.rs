#![allow(clippy::result_large_err)]
//! # Bastion Core
//!
//! Access-control core for multi-tenant back-office services.
//!
//! ## Architecture
//!
//! - **Context**: per-request tenant, isolation flag and principal in a
//!   task-local, propagated into spawned work
//! - **Tenant**: tenant predicates on every tenant-scoped statement, tenant
//!   and audit-timestamp auto-fill on writes, tenant resolution
//! - **Scope**: department/ownership row filters derived from role data scopes
//! - **Auth**: signed access/refresh credentials with per-user session
//!   versions and jti revocation
//! - **Permission**: `*`-wildcard permission checks over a per-tenant cache
//! - **Query**: the filter tree everything above produces, compiled to
//!   parameterized SQL or evaluated in memory
//! - **Telemetry**: structured logging and Prometheus metrics

pub mod api;
pub mod auth;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod permission;
pub mod query;
pub mod scope;
pub mod telemetry;
pub mod tenant;

pub use error::{BastionError, ErrorCode, ErrorDetails, ErrorSeverity, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::auth::{
        AuthLayer, Authenticator, Claims, CurrentPrincipal, InMemorySessionStore, Principal,
        RedisSessionStore, SessionStore, TokenConfig, TokenPair, TokenService, NEVER_EXPIRES,
    };
    pub use crate::config::Config;
    pub use crate::context::{self, RequestContext};
    pub use crate::error::{BastionError, ErrorCode, ErrorDetails, ErrorSeverity, Result};
    pub use crate::permission::{
        InMemoryPermissionCache, PermissionCache, PermissionQuery, PermissionSource,
        RedisPermissionCache, RequirePermissionLayer, StaticPermissionSource,
    };
    pub use crate::query::{Column, Dataset, Expr, Value};
    pub use crate::scope::{DataPermission, DataScopeKind, DataScopeResolver, RoleDataScope, ScopeFilter};
    pub use crate::tenant::{
        AutoFillService, PredicateInjector, Stamped, StaticTenantDirectory, Tenant, TenantDirectory,
        TenantResolver, TenantStatus,
    };
}
