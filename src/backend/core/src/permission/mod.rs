//! Permission-string authorization.
//!
//! Roles grant permission strings such as `sys:user:add`; a grant may use `*`
//! wildcards. Grants are kept in a per-tenant cache in front of a durable
//! [`PermissionSource`].

pub mod cache;
pub mod middleware;
pub mod query;
pub mod source;
pub mod wildcard;

pub use cache::{CachedRole, InMemoryPermissionCache, PermissionCache, RedisPermissionCache};
pub use middleware::{RequirePermissionLayer, RequirePermissionService};
pub use query::PermissionQuery;
pub use source::{PermissionSource, StaticPermissionSource};
pub use wildcard::simple_match;
