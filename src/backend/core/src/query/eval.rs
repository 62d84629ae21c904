//! In-memory evaluation of filter trees.
//!
//! Used by tests and by stores that are not SQL backed. Semantics follow the
//! SQL rendering: a missing column is NULL and never matches.

use std::collections::HashMap;

use super::expr::{Column, Expr, Value};

/// One row, keyed by column name.
pub type Row = HashMap<String, Value>;

/// Named tables used to resolve subqueries.
#[derive(Debug, Default, Clone)]
pub struct Dataset {
    tables: HashMap<String, Vec<Row>>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, name: impl Into<String>, rows: Vec<Row>) -> Self {
        self.tables.insert(name.into(), rows);
        self
    }

    pub fn table(&self, name: &str) -> &[Row] {
        self.tables.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Rows of `table` that satisfy `filter` (all rows when `filter` is `None`).
    pub fn select<'a>(&'a self, table: &str, filter: Option<&'a Expr>) -> Vec<&'a Row> {
        self.table(table)
            .iter()
            .filter(|row| filter.map_or(true, |f| matches(f, row, self)))
            .collect()
    }
}

/// Build a row from `(column, value)` pairs.
pub fn row<I, K, V>(pairs: I) -> Row
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Look up a column, preferring the qualified key (`u.dept_id`) when present.
fn lookup<'r>(row: &'r Row, column: &Column) -> Option<&'r Value> {
    if column.qualifier.is_some() {
        if let Some(v) = row.get(&column.to_string()) {
            return Some(v);
        }
    }
    row.get(&column.name)
}

/// Whether `row` satisfies `expr`.
pub fn matches(expr: &Expr, row: &Row, data: &Dataset) -> bool {
    match expr {
        Expr::Eq { column, value } => lookup(row, column).is_some_and(|v| v.loosely_eq(value)),
        Expr::InList { column, values } => lookup(row, column)
            .is_some_and(|v| values.iter().any(|candidate| v.loosely_eq(candidate))),
        Expr::InSubquery { column, subquery } => {
            let Some(v) = lookup(row, column) else {
                return false;
            };
            data.table(&subquery.table)
                .iter()
                .filter(|inner| matches(&subquery.filter, inner, data))
                .filter_map(|inner| lookup(inner, &subquery.select))
                .any(|selected| selected.loosely_eq(v))
        }
        Expr::FindInSet { value, column } => {
            let needle = value.as_text();
            lookup(row, column).is_some_and(|v| {
                v.as_text().split(',').any(|entry| entry.trim() == needle)
            })
        }
        Expr::And(l, r) => matches(l, row, data) && matches(r, row, data),
        Expr::Or(l, r) => matches(l, row, data) || matches(r, row, data),
        Expr::Paren(inner) => matches(inner, row, data),
        Expr::AlwaysFalse => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_in_set_matches_whole_entries() {
        let data = Dataset::new();
        let r = row([("tree_path", "0,17,9")]);
        assert!(matches(&Expr::find_in_set(17, Column::new("tree_path")), &r, &data));
        assert!(!matches(&Expr::find_in_set(7, Column::new("tree_path")), &r, &data));
    }

    #[test]
    fn test_missing_column_never_matches() {
        let data = Dataset::new();
        let r = row([("id", 1i64)]);
        assert!(!matches(&Expr::eq(Column::new("dept_id"), 1), &r, &data));
        assert!(!matches(&Expr::in_list(Column::new("dept_id"), vec![1i64]), &r, &data));
    }

    #[test]
    fn test_qualified_lookup_falls_back_to_bare_name() {
        let data = Dataset::new();
        let r = row([("dept_id", 5i64)]);
        assert!(matches(&Expr::eq(Column::parse("u.dept_id"), 5), &r, &data));
    }

    #[test]
    fn test_select_with_filter() {
        let data = Dataset::new().with_table(
            "sys_user",
            vec![row([("id", 1i64), ("tenant_id", 1)]), row([("id", 2i64), ("tenant_id", 2)])],
        );
        let filter = Expr::eq(Column::new("tenant_id"), 2);
        let rows = data.select("sys_user", Some(&filter));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("id"), Some(&Value::Int(2)));
        assert_eq!(data.select("sys_user", None).len(), 2);
    }
}
