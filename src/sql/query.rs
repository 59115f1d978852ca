//! SELECT query builder.
//!
//! A deliberately small algebra: enough surface for aggregation queries over
//! base tables, common table expressions, and nested subqueries. Queries
//! print deterministically, so identical shapes always produce identical SQL
//! text.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use super::expr::{col, SelectItem, SqlExpr};

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// A FROM-list entry: a named table or a nested subquery.
#[derive(Debug, Clone)]
pub enum TableSource {
    Table(String),
    Subquery(Box<SelectQuery>),
}

#[derive(Debug, Clone)]
pub struct TableRef {
    pub source: TableSource,
    pub alias: Option<String>,
}

impl TableRef {
    /// The table name this entry refers to, when it is a plain name.
    fn table_name(&self) -> Option<&str> {
        match &self.source {
            TableSource::Table(name) => Some(name),
            TableSource::Subquery(_) => None,
        }
    }
}

/// Buildable SELECT statement.
///
/// Every node carries a stable id assigned at construction; graph walks
/// memoize on it rather than on object identity. `Clone` allocates a fresh
/// id, so a cloned query is a distinct node.
#[derive(Debug)]
pub struct SelectQuery {
    node_id: u64,
    ctes: Vec<(String, SelectQuery)>,
    select: Vec<SelectItem>,
    from: Vec<TableRef>,
    filter: Vec<SqlExpr>,
    group_by: Vec<SqlExpr>,
    order_by: Vec<SqlExpr>,
    limit: Option<u64>,
}

impl Clone for SelectQuery {
    fn clone(&self) -> Self {
        SelectQuery {
            node_id: NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed),
            ctes: self.ctes.clone(),
            select: self.select.clone(),
            from: self.from.clone(),
            filter: self.filter.clone(),
            group_by: self.group_by.clone(),
            order_by: self.order_by.clone(),
            limit: self.limit,
        }
    }
}

impl Default for SelectQuery {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectQuery {
    pub fn new() -> Self {
        SelectQuery {
            node_id: NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed),
            ctes: Vec::new(),
            select: Vec::new(),
            from: Vec::new(),
            filter: Vec::new(),
            group_by: Vec::new(),
            order_by: Vec::new(),
            limit: None,
        }
    }

    pub fn node_id(&self) -> u64 {
        self.node_id
    }

    pub fn select(&self) -> &[SelectItem] {
        &self.select
    }

    /// Add select items, deduplicating by output name: re-adding an existing
    /// alias replaces the previous item in place.
    pub fn add_select<I, T>(&mut self, items: I) -> &mut Self
    where
        I: IntoIterator<Item = T>,
        T: Into<SelectItem>,
    {
        for item in items {
            let item = item.into();
            let existing = match item.output_name() {
                Some(name) => self
                    .select
                    .iter_mut()
                    .find(|s| s.output_name() == Some(name)),
                None => None,
            };
            match existing {
                Some(slot) => *slot = item,
                None => self.select.push(item),
            }
        }
        self
    }

    pub fn from(&self) -> &[TableRef] {
        &self.from
    }

    pub fn from_table(&mut self, name: impl Into<String>) -> &mut Self {
        self.from.push(TableRef { source: TableSource::Table(name.into()), alias: None });
        self
    }

    pub fn from_query(&mut self, query: SelectQuery, alias: impl Into<String>) -> &mut Self {
        self.from.push(TableRef {
            source: TableSource::Subquery(Box::new(query)),
            alias: Some(alias.into()),
        });
        self
    }

    pub fn with_cte(&mut self, name: impl Into<String>, query: SelectQuery) -> &mut Self {
        self.ctes.push((name.into(), query));
        self
    }

    pub fn filter(&self) -> &[SqlExpr] {
        &self.filter
    }

    pub fn add_filter<I>(&mut self, predicates: I) -> &mut Self
    where
        I: IntoIterator<Item = SqlExpr>,
    {
        self.filter.extend(predicates);
        self
    }

    pub fn group_by(&self) -> &[SqlExpr] {
        &self.group_by
    }

    pub fn add_group_by<I>(&mut self, keys: I) -> &mut Self
    where
        I: IntoIterator<Item = SqlExpr>,
    {
        self.group_by.extend(keys);
        self
    }

    pub fn order_by(&self) -> &[SqlExpr] {
        &self.order_by
    }

    pub fn add_order_by<I>(&mut self, keys: I) -> &mut Self
    where
        I: IntoIterator<Item = SqlExpr>,
    {
        self.order_by.extend(keys);
        self
    }

    /// Remove and return the ORDER BY list.
    pub fn take_order_by(&mut self) -> Vec<SqlExpr> {
        std::mem::take(&mut self.order_by)
    }

    pub fn limit(&mut self, n: u64) -> &mut Self {
        self.limit = Some(n);
        self
    }

    /// Ensure every subquery feeding this query also selects `cols`.
    ///
    /// Walks FROM-nested subqueries plus FROM names resolved against this
    /// query's WITH list, adding the columns to each subquery that has a
    /// non-empty FROM and an explicit select list. Nodes are visited at most
    /// once.
    pub fn push_down_select(&mut self, cols: &[String]) {
        let mut visited = HashSet::new();
        self.push_down_children(cols, &mut visited);
    }

    fn push_down_children(&mut self, cols: &[String], visited: &mut HashSet<u64>) {
        let referenced: Vec<String> = self
            .from
            .iter()
            .filter_map(|r| r.table_name().map(str::to_string))
            .collect();
        for entry in &mut self.from {
            if let TableSource::Subquery(q) = &mut entry.source {
                q.push_down_apply(cols, visited);
            }
        }
        for (name, query) in &mut self.ctes {
            if referenced.iter().any(|r| r == name) {
                query.push_down_apply(cols, visited);
            }
        }
    }

    fn push_down_apply(&mut self, cols: &[String], visited: &mut HashSet<u64>) {
        if !visited.insert(self.node_id) {
            return;
        }
        if !self.from.is_empty() && !self.select.is_empty() {
            self.add_select(cols.iter().map(|c| SelectItem::from(col(c.clone()))));
        }
        self.push_down_children(cols, visited);
    }
}

impl fmt::Display for SelectQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.ctes.is_empty() {
            write!(f, "WITH ")?;
            for (i, (name, query)) in self.ctes.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{name} AS ({query})")?;
            }
            write!(f, " ")?;
        }
        write!(f, "SELECT ")?;
        for (i, item) in self.select.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{item}")?;
        }
        if !self.from.is_empty() {
            write!(f, " FROM ")?;
            for (i, entry) in self.from.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                match &entry.source {
                    TableSource::Table(name) => write!(f, "{name}")?,
                    TableSource::Subquery(q) => write!(f, "({q})")?,
                }
                if let Some(alias) = &entry.alias {
                    write!(f, " AS {alias}")?;
                }
            }
        }
        if !self.filter.is_empty() {
            write!(f, " WHERE ")?;
            for (i, pred) in self.filter.iter().enumerate() {
                if i > 0 {
                    write!(f, " AND ")?;
                }
                write!(f, "{pred}")?;
            }
        }
        if !self.group_by.is_empty() {
            write!(f, " GROUP BY ")?;
            for (i, key) in self.group_by.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{key}")?;
            }
        }
        if !self.order_by.is_empty() {
            write!(f, " ORDER BY ")?;
            for (i, key) in self.order_by.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{key}")?;
            }
        }
        if let Some(limit) = self.limit {
            write!(f, " LIMIT {limit}")?;
        }
        Ok(())
    }
}

/// `CREATE TABLE IF NOT EXISTS <table> AS <query>` DDL text.
pub fn create_table_as(table: &str, query: &str) -> String {
    format!("CREATE TABLE IF NOT EXISTS {table} AS {query}")
}

/// `CREATE SCHEMA IF NOT EXISTS <schema>`.
pub fn create_schema(schema: &str) -> String {
    format!("CREATE SCHEMA IF NOT EXISTS {schema}")
}

/// `DROP SCHEMA IF EXISTS "<schema>" CASCADE`.
pub fn drop_schema_cascade(schema: &str) -> String {
    format!("DROP SCHEMA IF EXISTS \"{schema}\" CASCADE")
}
