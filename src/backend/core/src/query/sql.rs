//! Compile filter trees to parameterized PostgreSQL.
//!
//! Identifiers are double-quoted and every literal goes through
//! [`QueryBuilder::push_bind`], so no caller- or config-supplied value is ever
//! spliced into statement text.

use sqlx::{Postgres, QueryBuilder};

use super::expr::{Column, Expr, Subquery, Value};

/// Quote an identifier (`dept_id` -> `"dept_id"`, embedded quotes doubled).
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote a possibly schema-qualified table name (`public.sys_user`).
pub fn quote_table(table: &str) -> String {
    table
        .split('.')
        .map(quote_ident)
        .collect::<Vec<_>>()
        .join(".")
}

fn push_column(builder: &mut QueryBuilder<'_, Postgres>, column: &Column) {
    if let Some(q) = &column.qualifier {
        builder.push(quote_ident(q));
        builder.push(".");
    }
    builder.push(quote_ident(&column.name));
}

fn push_value(builder: &mut QueryBuilder<'_, Postgres>, value: &Value) {
    match value {
        Value::Int(v) => {
            builder.push_bind(*v);
        }
        Value::Text(v) => {
            builder.push_bind(v.clone());
        }
    }
}

fn push_subquery(builder: &mut QueryBuilder<'_, Postgres>, subquery: &Subquery) {
    builder.push("SELECT ");
    push_column(builder, &subquery.select);
    builder.push(" FROM ");
    builder.push(quote_table(&subquery.table));
    builder.push(" WHERE ");
    push_filter(builder, &subquery.filter);
}

fn push_conjunct(builder: &mut QueryBuilder<'_, Postgres>, expr: &Expr) {
    if matches!(expr, Expr::Or(..)) {
        builder.push("(");
        push_filter(builder, expr);
        builder.push(")");
    } else {
        push_filter(builder, expr);
    }
}

/// Append `expr` to `builder` as a boolean SQL expression.
pub fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, expr: &Expr) {
    match expr {
        Expr::Eq { column, value } => {
            push_column(builder, column);
            builder.push(" = ");
            push_value(builder, value);
        }
        Expr::InList { column, values } => {
            if values.is_empty() {
                builder.push("1 = 0");
                return;
            }
            push_column(builder, column);
            builder.push(" IN (");
            let mut separated = builder.separated(", ");
            for value in values {
                match value {
                    Value::Int(v) => {
                        separated.push_bind(*v);
                    }
                    Value::Text(v) => {
                        separated.push_bind(v.clone());
                    }
                }
            }
            separated.push_unseparated(")");
        }
        Expr::InSubquery { column, subquery } => {
            push_column(builder, column);
            builder.push(" IN (");
            push_subquery(builder, subquery);
            builder.push(")");
        }
        Expr::FindInSet { value, column } => {
            builder.push_bind(value.as_text());
            builder.push(" = ANY(string_to_array(");
            push_column(builder, column);
            builder.push(", ','))");
        }
        Expr::And(l, r) => {
            push_conjunct(builder, l);
            builder.push(" AND ");
            push_conjunct(builder, r);
        }
        Expr::Or(l, r) => {
            push_filter(builder, l);
            builder.push(" OR ");
            push_filter(builder, r);
        }
        Expr::Paren(inner) => {
            builder.push("(");
            push_filter(builder, inner);
            builder.push(")");
        }
        Expr::AlwaysFalse => {
            builder.push("1 = 0");
        }
    }
}

/// Append ` WHERE <filter>` when a filter is present.
pub fn push_where(builder: &mut QueryBuilder<'_, Postgres>, filter: Option<&Expr>) {
    if let Some(filter) = filter {
        builder.push(" WHERE ");
        push_filter(builder, filter);
    }
}

/// `SELECT <columns> FROM <table> [WHERE <filter>]`
pub fn select<'args>(
    table: &str,
    columns: &[&str],
    filter: Option<&Expr>,
) -> QueryBuilder<'args, Postgres> {
    let projection = if columns.is_empty() {
        "*".to_string()
    } else {
        columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", ")
    };
    let mut builder = QueryBuilder::new(format!("SELECT {} FROM {}", projection, quote_table(table)));
    push_where(&mut builder, filter);
    builder
}
