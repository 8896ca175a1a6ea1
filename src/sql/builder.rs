//! Builds parameterized INSERT, SELECT, UPDATE, DELETE for one keyed table.

use crate::crud::entity::Criteria;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Table addressed by a store: schema, name, primary key column and optional
/// per-column casts applied to bound parameters (`$n::type`).
#[derive(Clone, Debug)]
pub struct TableRef {
    pub schema: String,
    pub table: String,
    pub key_column: String,
    casts: BTreeMap<String, String>,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, table: impl Into<String>, key_column: impl Into<String>) -> Self {
        TableRef {
            schema: schema.into(),
            table: table.into(),
            key_column: key_column.into(),
            casts: BTreeMap::new(),
        }
    }

    /// Parameters bound to `column` are cast to `pg_type`, e.g. `timestamptz`.
    pub fn cast(mut self, column: impl Into<String>, pg_type: impl Into<String>) -> Self {
        self.casts.insert(column.into(), pg_type.into());
        self
    }

    fn qualified(&self) -> String {
        format!("{}.{}", quoted(&self.schema), quoted(&self.table))
    }

    fn placeholder(&self, column: &str, n: u32) -> String {
        match self.casts.get(column) {
            Some(t) => format!("${}::{}", n, t),
            None => format!("${}", n),
        }
    }
}

/// Quote identifier for PostgreSQL.
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

#[derive(Debug)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push_param(&mut self, v: Value) -> u32 {
        let n = self.params.len() as u32 + 1;
        self.params.push(v);
        n
    }
}

/// INSERT from a serialized row. A null key column is left to the column default.
/// With `returning_key` the statement returns the key column.
pub fn insert(table: &TableRef, row: &Map<String, Value>, returning_key: bool) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    for (col, val) in row {
        if col == &table.key_column && val.is_null() {
            continue;
        }
        let n = q.push_param(val.clone());
        cols.push(quoted(col));
        placeholders.push(table.placeholder(col, n));
    }
    q.sql = if cols.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES", table.qualified())
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table.qualified(),
            cols.join(", "),
            placeholders.join(", ")
        )
    };
    if returning_key {
        q.sql.push_str(&format!(" RETURNING {}", quoted(&table.key_column)));
    }
    q
}

/// UPDATE every non-key column of `row` where the key matches. None when the row
/// has no key or nothing besides it.
pub fn update(table: &TableRef, row: &Map<String, Value>) -> Option<QueryBuf> {
    let key = row.get(&table.key_column).filter(|k| !k.is_null())?;
    let mut q = QueryBuf::new();
    let mut sets = Vec::new();
    for (col, val) in row {
        if col == &table.key_column {
            continue;
        }
        let n = q.push_param(val.clone());
        sets.push(format!("{} = {}", quoted(col), table.placeholder(col, n)));
    }
    if sets.is_empty() {
        return None;
    }
    let n = q.push_param(key.clone());
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} = {}",
        table.qualified(),
        sets.join(", "),
        quoted(&table.key_column),
        table.placeholder(&table.key_column, n)
    );
    Some(q)
}

pub fn delete_by_id(table: &TableRef, key: Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let n = q.push_param(key);
    q.sql = format!(
        "DELETE FROM {} WHERE {} = {}",
        table.qualified(),
        quoted(&table.key_column),
        table.placeholder(&table.key_column, n)
    );
    q
}

/// DELETE ... WHERE key IN (...). Caller skips the call for an empty key list.
pub fn delete_by_ids(table: &TableRef, keys: Vec<Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let placeholders: Vec<String> = keys
        .into_iter()
        .map(|k| {
            let n = q.push_param(k);
            table.placeholder(&table.key_column, n)
        })
        .collect();
    q.sql = format!(
        "DELETE FROM {} WHERE {} IN ({})",
        table.qualified(),
        quoted(&table.key_column),
        placeholders.join(", ")
    );
    q
}

pub fn select_by_id(table: &TableRef, key: Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let n = q.push_param(key);
    q.sql = format!(
        "SELECT * FROM {} WHERE {} = {}",
        table.qualified(),
        quoted(&table.key_column),
        table.placeholder(&table.key_column, n)
    );
    q
}

/// SELECT with exact-match filters, ordered by key.
pub fn select_where(table: &TableRef, criteria: &Criteria) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut where_parts = Vec::new();
    for (col, val) in criteria.iter() {
        if val.is_null() {
            where_parts.push(format!("{} IS NULL", quoted(col)));
            continue;
        }
        let n = q.push_param(val.clone());
        where_parts.push(format!("{} = {}", quoted(col), table.placeholder(col, n)));
    }
    let where_clause = if where_parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", where_parts.join(" AND "))
    };
    q.sql = format!(
        "SELECT * FROM {}{} ORDER BY {}",
        table.qualified(),
        where_clause,
        quoted(&table.key_column)
    );
    q
}
