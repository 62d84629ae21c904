//! Filter expression tree.
//!
//! Row filters are built as data, never as SQL text. The storage layer turns
//! a tree into SQL with [`super::sql`] (every value bound as a parameter) or
//! evaluates it directly with [`super::eval`].

use serde::{Deserialize, Serialize};
use std::fmt;

// ═══════════════════════════════════════════════════════════════════════════════
// Values and Columns
// ═══════════════════════════════════════════════════════════════════════════════

/// A literal operand.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Text(String),
}

impl Value {
    /// Text form used by set-membership tests on comma-separated columns.
    pub fn as_text(&self) -> String {
        match self {
            Self::Int(v) => v.to_string(),
            Self::Text(v) => v.clone(),
        }
    }

    /// Compare across representations (`7` matches `"7"`).
    pub fn loosely_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Text(a), Self::Text(b)) => a == b,
            (a, b) => a.as_text() == b.as_text(),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{}", v),
            Self::Text(v) => write!(f, "'{}'", v.replace('\'', "''")),
        }
    }
}

/// A column reference, optionally qualified by a table alias.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Column {
    pub qualifier: Option<String>,
    pub name: String,
}

impl Column {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            qualifier: None,
            name: name.into(),
        }
    }

    /// Column qualified by `alias`. A blank alias yields an unqualified column.
    pub fn aliased(alias: Option<&str>, name: impl Into<String>) -> Self {
        Self {
            qualifier: alias
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(str::to_string),
            name: name.into(),
        }
    }

    /// Parse `"u.dept_id"` or `"dept_id"`.
    pub fn parse(reference: &str) -> Self {
        match reference.rsplit_once('.') {
            Some((alias, name)) => Self::aliased(Some(alias), name),
            None => Self::new(reference),
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.qualifier {
            Some(q) => write!(f, "{}.{}", q, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Expressions
// ═══════════════════════════════════════════════════════════════════════════════

/// `SELECT <select> FROM <table> WHERE <filter>`
#[derive(Debug, Clone, PartialEq)]
pub struct Subquery {
    pub table: String,
    pub select: Column,
    pub filter: Expr,
}

/// Boolean filter expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `column = value`
    Eq { column: Column, value: Value },
    /// `column IN (v1, v2, ...)`
    InList { column: Column, values: Vec<Value> },
    /// `column IN (SELECT ...)`
    InSubquery { column: Column, subquery: Box<Subquery> },
    /// `value` is one of the comma-separated entries of `column`
    FindInSet { value: Value, column: Column },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    /// Explicit grouping. Kept in the tree so the emitted SQL is parenthesized.
    Paren(Box<Expr>),
    /// Matches no row (`1 = 0`).
    AlwaysFalse,
}

impl Expr {
    pub fn eq(column: Column, value: impl Into<Value>) -> Self {
        Self::Eq {
            column,
            value: value.into(),
        }
    }

    pub fn in_list<I, V>(column: Column, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::InList {
            column,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn in_subquery(column: Column, subquery: Subquery) -> Self {
        Self::InSubquery {
            column,
            subquery: Box::new(subquery),
        }
    }

    pub fn find_in_set(value: impl Into<Value>, column: Column) -> Self {
        Self::FindInSet {
            value: value.into(),
            column,
        }
    }

    pub fn and(self, other: Expr) -> Self {
        Self::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Expr) -> Self {
        Self::Or(Box::new(self), Box::new(other))
    }

    pub fn paren(self) -> Self {
        match self {
            Self::Paren(_) => self,
            other => Self::Paren(Box::new(other)),
        }
    }

    /// AND `extra` onto an optional base filter.
    pub fn and_onto(base: Option<Expr>, extra: Expr) -> Expr {
        match base {
            Some(base) => base.and(extra),
            None => extra,
        }
    }

    /// Fold expressions with OR, left to right. `None` for an empty input.
    pub fn any_of<I>(exprs: I) -> Option<Expr>
    where
        I: IntoIterator<Item = Expr>,
    {
        exprs.into_iter().reduce(Expr::or)
    }

    /// Whether an `Eq` term on `column` with `value` appears anywhere in a
    /// top-level AND chain of this expression.
    pub fn has_conjunct_eq(&self, column: &Column, value: &Value) -> bool {
        match self {
            Self::Eq { column: c, value: v } => c == column && v.loosely_eq(value),
            Self::And(l, r) => l.has_conjunct_eq(column, value) || r.has_conjunct_eq(column, value),
            Self::Paren(inner) => inner.has_conjunct_eq(column, value),
            _ => false,
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eq { column, value } => write!(f, "{} = {}", column, value),
            Self::InList { column, values } => {
                write!(f, "{} IN (", column)?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, ")")
            }
            Self::InSubquery { column, subquery } => write!(
                f,
                "{} IN (SELECT {} FROM {} WHERE {})",
                column, subquery.select, subquery.table, subquery.filter
            ),
            Self::FindInSet { value, column } => write!(f, "FIND_IN_SET({}, {})", value, column),
            Self::And(l, r) => {
                fmt_conjunct(l, f)?;
                write!(f, " AND ")?;
                fmt_conjunct(r, f)
            }
            Self::Or(l, r) => write!(f, "{} OR {}", l, r),
            Self::Paren(inner) => write!(f, "({})", inner),
            Self::AlwaysFalse => write!(f, "1 = 0"),
        }
    }
}

/// A bare OR under an AND is grouped so precedence survives rendering.
fn fmt_conjunct(expr: &Expr, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match expr {
        Expr::Or(..) => write!(f, "({})", expr),
        other => write!(f, "{}", other),
    }
}
