//! Tenant isolation.
//!
//! - [`injector`]: read/write filters get a tenant-equality predicate
//! - [`autofill`]: inserted rows get the tenant id and audit timestamps
//! - [`resolver`]: which tenant a request runs as
//! - [`models`]: the tenant record and its lifecycle rules

pub mod autofill;
pub mod injector;
pub mod models;
pub mod resolver;

pub use autofill::{AutoFillService, Stamped};
pub use injector::{PredicateInjector, PredicateInjectorBuilder};
pub use models::{Tenant, TenantStatus};
pub use resolver::{normalize_host, StaticTenantDirectory, TenantDirectory, TenantResolver};
