//! SQL query builder for access-controlled searches.
//!
//! Translates a [`SearchQuery`] into the WHERE, ORDER BY and LIMIT clauses of
//! a statement over the `resources` table aliased as `r`. The caller's read
//! access filter is appended as one more condition, so paging and totals are
//! computed by the database over readable rows only.

use crate::error::{SearchError, StorageResult};
use crate::identity::Identity;
use crate::types::{SearchQuery, SortDirection};

use super::access_filter::AccessFilterCompiler;

/// Alias of the `resources` table in generated statements.
pub const RESOURCE_ALIAS: &str = "r";

/// A fragment of SQL with bound parameters.
///
/// Placeholders are numbered (`?1`, `?2`, ...) and the n-th entry of
/// `params` binds to `?n` of the full statement.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlFragment {
    /// The SQL clause.
    pub sql: String,
    /// Bound parameter values.
    pub params: Vec<SqlParam>,
}

/// A bound SQL parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    /// String parameter.
    String(String),
}

impl SqlParam {
    /// Creates a string parameter.
    pub fn string(s: impl Into<String>) -> Self {
        SqlParam::String(s.into())
    }
}

impl rusqlite::ToSql for SqlParam {
    fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
        use rusqlite::types::{ToSqlOutput, ValueRef};

        Ok(match self {
            SqlParam::String(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

impl SqlFragment {
    /// Creates a new SQL fragment.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Creates a fragment with parameters.
    pub fn with_params(sql: impl Into<String>, params: Vec<SqlParam>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// Combines with another fragment using AND.
    pub fn and(mut self, other: SqlFragment) -> Self {
        if !self.sql.is_empty() && !other.sql.is_empty() {
            self.sql = format!("({}) AND ({})", self.sql, other.sql);
        } else if !other.sql.is_empty() {
            self.sql = other.sql;
        }
        self.params.extend(other.params);
        self
    }

    /// Returns true if this fragment is empty.
    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }

    /// Returns the parameters as `ToSql` references for rusqlite.
    pub fn param_refs(&self) -> Vec<&dyn rusqlite::ToSql> {
        self.params.iter().map(|p| p as &dyn rusqlite::ToSql).collect()
    }
}

/// Builds SQL clauses from access-controlled search queries.
pub struct QueryBuilder<'a> {
    identity: &'a Identity,
}

impl<'a> QueryBuilder<'a> {
    /// Creates a builder for searches on behalf of `identity`.
    pub fn new(identity: &'a Identity) -> Self {
        Self { identity }
    }

    /// Builds the WHERE condition: resource type, liveness, `_id` and read access.
    pub fn build_where(&self, query: &SearchQuery) -> SqlFragment {
        let mut base = SqlFragment::with_params(
            format!(
                "{0}.resource_type = ?1 AND {0}.is_deleted = 0",
                RESOURCE_ALIAS
            ),
            vec![SqlParam::string(&query.resource_type)],
        );

        if !query.ids.is_empty() {
            let offset = base.params.len();
            let placeholders: Vec<String> = (1..=query.ids.len())
                .map(|i| format!("?{}", offset + i))
                .collect();
            base = base.and(SqlFragment::with_params(
                format!("{}.id IN ({})", RESOURCE_ALIAS, placeholders.join(", ")),
                query.ids.iter().map(SqlParam::string).collect(),
            ));
        }

        let access = AccessFilterCompiler::new(RESOURCE_ALIAS)
            .with_param_offset(base.params.len())
            .compile(self.identity);

        base.and(access)
    }

    /// Builds the ORDER BY clause.
    ///
    /// Defaults to most recently updated first. An `id` tie-breaker keeps
    /// pagination stable.
    pub fn build_order_by(&self, query: &SearchQuery) -> StorageResult<String> {
        if query.sort.is_empty() {
            return Ok(format!(
                "ORDER BY {0}.last_updated DESC, {0}.id ASC",
                RESOURCE_ALIAS
            ));
        }

        let mut clauses = Vec::with_capacity(query.sort.len() + 1);
        for sort in &query.sort {
            let column = match sort.parameter.as_str() {
                "_id" => "id",
                "_lastUpdated" => "last_updated",
                _ => {
                    return Err(SearchError::InvalidSort {
                        parameter: sort.parameter.clone(),
                    }
                    .into());
                }
            };
            let dir = match sort.direction {
                SortDirection::Ascending => "ASC",
                SortDirection::Descending => "DESC",
            };
            clauses.push(format!("{}.{} {}", RESOURCE_ALIAS, column, dir));
        }

        if !query.sort.iter().any(|s| s.parameter == "_id") {
            clauses.push(format!("{}.id ASC", RESOURCE_ALIAS));
        }

        Ok(format!("ORDER BY {}", clauses.join(", ")))
    }

    /// Builds a LIMIT clause.
    pub fn build_limit(count: u32, offset: u32) -> String {
        if offset > 0 {
            format!("LIMIT {} OFFSET {}", count, offset)
        } else {
            format!("LIMIT {}", count)
        }
    }
}
