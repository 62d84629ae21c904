//! Structured row filters.
//!
//! - [`expr`]: the tagged expression tree shared by tenant isolation and data scope
//! - [`sql`]: compilation to parameterized PostgreSQL via `sqlx::QueryBuilder`
//! - [`eval`]: in-memory evaluation against rows

pub mod eval;
pub mod expr;
pub mod sql;

pub use eval::{matches, row, Dataset, Row};
pub use expr::{Column, Expr, Subquery, Value};
