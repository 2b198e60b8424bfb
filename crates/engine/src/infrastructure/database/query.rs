//! SQL text building with identifier whitelisting.
//!
//! Identifiers are validated before they are interpolated; values are always
//! returned as bind parameters.

use std::fmt;
use std::sync::LazyLock;

use regex_lite::Regex;
use rphud_domain::{CharacterId, PlayerId, SessionId};

use super::error::DbError;

/// Tables the query builders may touch.
pub const ALLOWED_TABLES: &[&str] = &["players", "launch_tokens", "sessions", "player_characters"];

static COLUMN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$").expect("valid regex")
});

const FORBIDDEN_PREFIXES: &[&str] = &["DELETE", "DROP", "TRUNCATE", "REPLACE"];
const ROW_PREFIXES: &[&str] = &["SELECT", "WITH", "PRAGMA", "VALUES"];

/// A bindable value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Int(i64),
    Real(f64),
    Text(String),
    /// Renders as `IN (...)` in filters.
    List(Vec<SqlValue>),
}

impl SqlValue {
    fn flatten_into(self, out: &mut Vec<SqlValue>) {
        match self {
            Self::List(items) => items.into_iter().for_each(|v| v.flatten_into(out)),
            other => out.push(other),
        }
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&String> for SqlValue {
    fn from(v: &String) -> Self {
        Self::Text(v.clone())
    }
}

impl From<PlayerId> for SqlValue {
    fn from(v: PlayerId) -> Self {
        Self::Int(v.get())
    }
}

impl From<CharacterId> for SqlValue {
    fn from(v: CharacterId) -> Self {
        Self::Int(v.get())
    }
}

impl From<SessionId> for SqlValue {
    fn from(v: SessionId) -> Self {
        Self::Int(v.get())
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

impl<T: Into<SqlValue>> From<Vec<T>> for SqlValue {
    fn from(v: Vec<T>) -> Self {
        Self::List(v.into_iter().map(Into::into).collect())
    }
}

/// Row-lock vocabulary accepted by `select`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockClause {
    ForUpdate,
    ForShare,
    LockInShareMode,
}

impl LockClause {
    pub fn parse(raw: &str) -> Result<Self, DbError> {
        let normalized = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        match normalized.to_ascii_uppercase().as_str() {
            "FOR UPDATE" => Ok(Self::ForUpdate),
            "FOR SHARE" => Ok(Self::ForShare),
            "LOCK IN SHARE MODE" => Ok(Self::LockInShareMode),
            _ => Err(DbError::InvalidLock(raw.to_string())),
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            Self::ForUpdate => "FOR UPDATE",
            Self::ForShare => "FOR SHARE",
            Self::LockInShareMode => "LOCK IN SHARE MODE",
        }
    }
}

impl fmt::Display for LockClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

impl Order {
    fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// SQL text plus its bind parameters, in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

/// Whether a manual statement produces rows or an affected count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManualKind {
    Rows,
    Affected,
}

pub fn validate_table(table: &str) -> Result<(), DbError> {
    if ALLOWED_TABLES.contains(&table) {
        Ok(())
    } else {
        Err(DbError::InvalidTable(table.to_string()))
    }
}

pub fn validate_column(column: &str) -> Result<(), DbError> {
    if COLUMN_RE.is_match(column) {
        Ok(())
    } else {
        Err(DbError::InvalidColumn(column.to_string()))
    }
}

fn pair<S: AsRef<str>>(
    columns: &[S],
    values: Vec<SqlValue>,
) -> Result<Vec<(String, SqlValue)>, DbError> {
    if columns.len() != values.len() {
        return Err(DbError::ColumnValueMismatch {
            columns: columns.len(),
            values: values.len(),
        });
    }
    Ok(columns
        .iter()
        .map(|c| c.as_ref().to_string())
        .zip(values)
        .collect())
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Renders the `WHERE` clause. Filters are joined with `AND`.
fn push_where(
    sql: &mut String,
    params: &mut Vec<SqlValue>,
    filters: &[(String, SqlValue)],
    exclusions: &[(String, SqlValue)],
) -> Result<(), DbError> {
    let mut conditions = Vec::with_capacity(filters.len() + exclusions.len());
    for (negate, (column, value)) in filters
        .iter()
        .map(|f| (false, f))
        .chain(exclusions.iter().map(|e| (true, e)))
    {
        validate_column(column)?;
        let condition = match value {
            SqlValue::Null if negate => format!("{column} IS NOT NULL"),
            SqlValue::Null => format!("{column} IS NULL"),
            SqlValue::List(items) => {
                let mut flat = Vec::new();
                items.iter().cloned().for_each(|v| v.flatten_into(&mut flat));
                if flat.is_empty() {
                    // Nothing is IN an empty set.
                    if negate {
                        "1 = 1".to_string()
                    } else {
                        "1 = 0".to_string()
                    }
                } else {
                    let op = if negate { "NOT IN" } else { "IN" };
                    let rendered = format!("{column} {op} ({})", placeholders(flat.len()));
                    params.extend(flat);
                    rendered
                }
            }
            other => {
                params.push(other.clone());
                if negate {
                    format!("{column} <> ?")
                } else {
                    format!("{column} = ?")
                }
            }
        };
        conditions.push(condition);
    }

    if !conditions.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }
    Ok(())
}

/// `SELECT` builder.
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    table: String,
    columns: Vec<String>,
    filters: Vec<(String, SqlValue)>,
    exclusions: Vec<(String, SqlValue)>,
    order_by: Vec<(String, Order)>,
    limit: Option<u64>,
    lock: Option<LockClause>,
}

impl Select {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: vec!["*".to_string()],
            filters: Vec::new(),
            exclusions: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            lock: None,
        }
    }

    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn filter(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.filters.push((column.into(), value.into()));
        self
    }

    pub fn exclude(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.exclusions.push((column.into(), value.into()));
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, order: Order) -> Self {
        self.order_by.push((column.into(), order));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn lock(mut self, lock: LockClause) -> Self {
        self.lock = Some(lock);
        self
    }

    pub(crate) fn with_filters(mut self, filters: Vec<(String, SqlValue)>) -> Self {
        self.filters = filters;
        self
    }

    pub fn lock_clause(&self) -> Option<LockClause> {
        self.lock
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Renders the statement.
    ///
    /// The lock clause is not rendered: SQLite has no row-lock syntax and the
    /// exclusion comes from the enclosing `BEGIN IMMEDIATE` transaction.
    pub fn build(&self) -> Result<Statement, DbError> {
        validate_table(&self.table)?;
        if self.columns.is_empty() {
            return Err(DbError::InvalidColumn(String::new()));
        }
        for column in &self.columns {
            if column != "*" {
                validate_column(column)?;
            }
        }

        let mut sql = format!("SELECT {} FROM {}", self.columns.join(", "), self.table);
        let mut params = Vec::new();
        push_where(&mut sql, &mut params, &self.filters, &self.exclusions)?;

        if !self.order_by.is_empty() {
            let mut terms = Vec::with_capacity(self.order_by.len());
            for (column, order) in &self.order_by {
                validate_column(column)?;
                terms.push(format!("{column} {}", order.as_sql()));
            }
            sql.push_str(" ORDER BY ");
            sql.push_str(&terms.join(", "));
        }

        if let Some(limit) = self.limit {
            sql.push_str(" LIMIT ?");
            params.push(SqlValue::Int(i64::try_from(limit).unwrap_or(i64::MAX)));
        }

        Ok(Statement { sql, params })
    }
}

/// `UPDATE` builder. At least one filter is required.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    table: String,
    assignments: Vec<(String, SqlValue)>,
    filters: Vec<(String, SqlValue)>,
    exclusions: Vec<(String, SqlValue)>,
}

impl Update {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            assignments: Vec::new(),
            filters: Vec::new(),
            exclusions: Vec::new(),
        }
    }

    pub fn set(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.assignments.push((column.into(), value.into()));
        self
    }

    pub fn filter(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.filters.push((column.into(), value.into()));
        self
    }

    pub fn exclude(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.exclusions.push((column.into(), value.into()));
        self
    }

    pub(crate) fn with_parts(
        mut self,
        assignments: Vec<(String, SqlValue)>,
        filters: Vec<(String, SqlValue)>,
        exclusions: Vec<(String, SqlValue)>,
    ) -> Self {
        self.assignments = assignments;
        self.filters = filters;
        self.exclusions = exclusions;
        self
    }

    pub fn build(&self) -> Result<Statement, DbError> {
        validate_table(&self.table)?;
        if self.assignments.is_empty() {
            return Err(DbError::ColumnValueMismatch {
                columns: 0,
                values: 0,
            });
        }
        if self.filters.is_empty() && self.exclusions.is_empty() {
            return Err(DbError::ForbiddenStatement(format!(
                "UPDATE {} without WHERE",
                self.table
            )));
        }

        let mut params = Vec::with_capacity(self.assignments.len());
        let mut sets = Vec::with_capacity(self.assignments.len());
        for (column, value) in &self.assignments {
            validate_column(column)?;
            if matches!(value, SqlValue::List(_)) {
                return Err(DbError::InvalidColumn(format!("{column} (list value)")));
            }
            sets.push(format!("{column} = ?"));
            params.push(value.clone());
        }

        let mut sql = format!("UPDATE {} SET {}", self.table, sets.join(", "));
        push_where(&mut sql, &mut params, &self.filters, &self.exclusions)?;
        Ok(Statement { sql, params })
    }
}

pub fn build_insert<S: AsRef<str>>(
    table: &str,
    columns: &[S],
    values: Vec<SqlValue>,
) -> Result<Statement, DbError> {
    validate_table(table)?;
    let pairs = pair(columns, values)?;
    if pairs.is_empty() {
        return Err(DbError::ForbiddenStatement(format!(
            "INSERT INTO {table} without columns"
        )));
    }

    let mut names = Vec::with_capacity(pairs.len());
    let mut params = Vec::with_capacity(pairs.len());
    for (column, value) in pairs {
        validate_column(&column)?;
        if matches!(value, SqlValue::List(_)) {
            return Err(DbError::InvalidColumn(format!("{column} (list value)")));
        }
        names.push(column);
        params.push(value);
    }

    let sql = format!(
        "INSERT INTO {table} ({}) VALUES ({})",
        names.join(", "),
        placeholders(names.len())
    );
    Ok(Statement { sql, params })
}

/// Pairs positional column and value lists, checking their lengths.
pub fn pair_columns<S: AsRef<str>>(
    columns: &[S],
    values: Vec<SqlValue>,
) -> Result<Vec<(String, SqlValue)>, DbError> {
    pair(columns, values)
}

/// Classifies a manual statement, rejecting destructive ones.
pub fn classify_manual(sql: &str) -> Result<ManualKind, DbError> {
    let head = sql.trim_start().to_ascii_uppercase();
    if FORBIDDEN_PREFIXES.iter().any(|p| head.starts_with(p)) {
        let verb = head.split_whitespace().next().unwrap_or_default().to_string();
        return Err(DbError::ForbiddenStatement(verb));
    }
    if ROW_PREFIXES.iter().any(|p| head.starts_with(p)) {
        Ok(ManualKind::Rows)
    } else {
        Ok(ManualKind::Affected)
    }
}

/// Flattens nested lists so each leaf binds one placeholder.
pub fn flatten_params(params: Vec<SqlValue>) -> Vec<SqlValue> {
    let mut out = Vec::with_capacity(params.len());
    params.into_iter().for_each(|v| v.flatten_into(&mut out));
    out
}
