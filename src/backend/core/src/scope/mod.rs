//! Role-derived data scope.

pub mod models;
pub mod resolver;

pub use models::{DataScopeKind, RoleDataScope};
pub use resolver::{DataPermission, DataScopeResolver, ScopeFilter};
