//! Query layer over SQLite.
//!
//! A [`ConnectionRegistry`] holds one pool per named connection and is built
//! once at startup. Each request works through its own [`Database`] handle,
//! which acquires pooled connections lazily and owns explicit transaction
//! state.

mod error;
mod query;
pub mod schema;

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use sqlx::pool::PoolConnection;
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row as _, Sqlite, SqlitePool, TypeInfo, ValueRef};

pub use error::DbError;
pub use query::{
    build_insert, classify_manual, validate_column, validate_table, LockClause, ManualKind, Order,
    Select, SqlValue, Statement, Update, ALLOWED_TABLES,
};

/// A result row, keyed by column name in select order.
pub type Row = Map<String, Value>;

/// Output of [`Database::manual_query`].
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutput {
    Rows(Vec<Row>),
    Affected(u64),
}

/// Name of the primary connection.
pub const DEFAULT_CONNECTION: &str = "default";
/// Name of the read-only connection to the predecessor database.
pub const LEGACY_CONNECTION: &str = "legacy";

/// Settings for opening pools.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub legacy_url: Option<String>,
    /// Bounds how long a statement waits on another connection's write lock.
    pub busy_timeout: Duration,
    pub max_connections: u32,
}

/// Named connection pools, built once at startup.
#[derive(Debug, Clone)]
pub struct ConnectionRegistry {
    pools: HashMap<String, SqlitePool>,
}

impl ConnectionRegistry {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, DbError> {
        let mut pools = HashMap::new();
        let default = open_pool(&config.url, config.busy_timeout, config.max_connections).await?;
        pools.insert(DEFAULT_CONNECTION.to_string(), default);

        if let Some(legacy_url) = &config.legacy_url {
            let legacy = open_pool(legacy_url, config.busy_timeout, config.max_connections).await?;
            pools.insert(LEGACY_CONNECTION.to_string(), legacy);
        }

        Ok(Self { pools })
    }

    pub fn from_pools<I, S>(pools: I) -> Self
    where
        I: IntoIterator<Item = (S, SqlitePool)>,
        S: Into<String>,
    {
        Self {
            pools: pools.into_iter().map(|(name, pool)| (name.into(), pool)).collect(),
        }
    }

    pub fn pool(&self, name: &str) -> Option<&SqlitePool> {
        self.pools.get(name)
    }

    pub fn has_connection(&self, name: &str) -> bool {
        self.pools.contains_key(name)
    }

    /// A fresh per-request handle on the default connection.
    pub fn database(self: &Arc<Self>) -> Database {
        Database::new(Arc::clone(self))
    }
}

/// Opens a pool with the busy timeout applied to every connection.
pub async fn open_pool(
    url: &str,
    busy_timeout: Duration,
    max_connections: u32,
) -> Result<SqlitePool, DbError> {
    let options = SqliteConnectOptions::from_str(url)
        .map_err(|e| DbError::driver("connect", e))?
        .busy_timeout(busy_timeout)
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .connect_with(options)
        .await
        .map_err(|e| DbError::driver("connect", e))
}

/// Per-request database handle.
///
/// Not shared between requests. Dropping a handle with an open transaction
/// discards its connection so the transaction is rolled back instead of
/// leaking back into the pool.
pub struct Database {
    registry: Arc<ConnectionRegistry>,
    current: String,
    connections: HashMap<String, PoolConnection<Sqlite>>,
    in_transaction: bool,
}

impl Database {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            current: DEFAULT_CONNECTION.to_string(),
            connections: HashMap::new(),
            in_transaction: false,
        }
    }

    pub fn current_connection(&self) -> &str {
        &self.current
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    pub fn has_connection(&self, name: &str) -> bool {
        self.registry.has_connection(name)
    }

    /// Switches the connection subsequent statements run on.
    pub fn use_connection(&mut self, name: &str) -> Result<(), DbError> {
        if name == self.current {
            return Ok(());
        }
        if self.in_transaction {
            return Err(DbError::TransactionOpen {
                current: self.current.clone(),
                requested: name.to_string(),
            });
        }
        if !self.registry.has_connection(name) {
            return Err(DbError::UnknownConnection(name.to_string()));
        }
        tracing::debug!(from = %self.current, to = %name, "Switching database connection");
        self.current = name.to_string();
        Ok(())
    }

    async fn connection(&mut self) -> Result<&mut PoolConnection<Sqlite>, DbError> {
        use std::collections::hash_map::Entry;

        match self.connections.entry(self.current.clone()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let pool = self
                    .registry
                    .pools
                    .get(entry.key())
                    .ok_or_else(|| DbError::UnknownConnection(entry.key().clone()))?;
                let conn = pool
                    .acquire()
                    .await
                    .map_err(|e| DbError::driver("acquire", e))?;
                Ok(entry.insert(conn))
            }
        }
    }

    /// Opens a transaction holding the database write lock from the start.
    pub async fn begin_transaction(&mut self) -> Result<(), DbError> {
        if self.in_transaction {
            return Err(DbError::NestedTransaction(self.current.clone()));
        }
        let conn = self.connection().await?;
        sqlx::query("BEGIN IMMEDIATE")
            .execute(&mut **conn)
            .await
            .map_err(|e| DbError::driver("begin_transaction", e))?;
        self.in_transaction = true;
        tracing::trace!(connection = %self.current, "Transaction started");
        Ok(())
    }

    pub async fn commit_transaction(&mut self) -> Result<(), DbError> {
        if !self.in_transaction {
            return Err(DbError::NoTransaction(self.current.clone()));
        }
        let conn = self.connection().await?;
        sqlx::query("COMMIT")
            .execute(&mut **conn)
            .await
            .map_err(|e| DbError::driver("commit_transaction", e))?;
        self.in_transaction = false;
        tracing::trace!(connection = %self.current, "Transaction committed");
        Ok(())
    }

    pub async fn rollback_transaction(&mut self) -> Result<(), DbError> {
        if !self.in_transaction {
            return Err(DbError::NoTransaction(self.current.clone()));
        }
        let conn = self.connection().await?;
        sqlx::query("ROLLBACK")
            .execute(&mut **conn)
            .await
            .map_err(|e| DbError::driver("rollback_transaction", e))?;
        self.in_transaction = false;
        tracing::debug!(connection = %self.current, "Transaction rolled back");
        Ok(())
    }

    /// Commits when `result` is `Ok`, rolls back otherwise.
    ///
    /// A failed rollback is logged; the original error is returned.
    pub async fn finish<T, E>(&mut self, result: Result<T, E>) -> Result<T, E>
    where
        E: From<DbError>,
    {
        match result {
            Ok(value) => {
                if let Err(e) = self.commit_transaction().await {
                    self.rollback_quietly().await;
                    return Err(e.into());
                }
                Ok(value)
            }
            Err(e) => {
                self.rollback_quietly().await;
                Err(e)
            }
        }
    }

    /// Rolls back if a transaction is open, logging any failure.
    pub async fn rollback_quietly(&mut self) {
        if !self.in_transaction {
            return;
        }
        if let Err(e) = self.rollback_transaction().await {
            tracing::error!(error = %e, connection = %self.current, "Rollback failed");
        }
    }

    /// Positional select; see [`Select`] for the builder form.
    pub async fn select<S: AsRef<str>>(
        &mut self,
        columns: &[S],
        table: &str,
        where_columns: &[S],
        where_values: Vec<SqlValue>,
        lock: Option<LockClause>,
    ) -> Result<Vec<Row>, DbError> {
        let filters = query::pair_columns(where_columns, where_values)?;
        let mut select = Select::table(table)
            .columns(columns.iter().map(|c| c.as_ref().to_string()))
            .with_filters(filters);
        if let Some(lock) = lock {
            select = select.lock(lock);
        }
        self.select_query(&select).await
    }

    pub async fn select_query(&mut self, select: &Select) -> Result<Vec<Row>, DbError> {
        let statement = select.build()?;
        if let Some(lock) = select.lock_clause() {
            if !self.in_transaction {
                return Err(DbError::LockOutsideTransaction);
            }
            tracing::trace!(
                table = %select.table_name(),
                lock = %lock,
                "Row lock held by transaction"
            );
        }
        self.fetch(statement).await
    }

    /// Inserts one row and returns its rowid.
    pub async fn insert<S: AsRef<str>>(
        &mut self,
        table: &str,
        columns: &[S],
        values: Vec<SqlValue>,
    ) -> Result<i64, DbError> {
        let statement = build_insert(table, columns, values)?;
        let conn = self.connection().await?;
        let result = bind_all(sqlx::query(&statement.sql), statement.params)
            .execute(&mut **conn)
            .await
            .map_err(|e| DbError::driver("insert", e))?;
        Ok(result.last_insert_rowid())
    }

    /// Positional update; returns the affected row count.
    pub async fn update<S: AsRef<str>>(
        &mut self,
        table: &str,
        columns: &[S],
        values: Vec<SqlValue>,
        where_columns: &[S],
        where_values: Vec<SqlValue>,
        not_where_columns: &[S],
        not_where_values: Vec<SqlValue>,
    ) -> Result<u64, DbError> {
        let update = Update::table(table).with_parts(
            query::pair_columns(columns, values)?,
            query::pair_columns(where_columns, where_values)?,
            query::pair_columns(not_where_columns, not_where_values)?,
        );
        self.update_query(&update).await
    }

    pub async fn update_query(&mut self, update: &Update) -> Result<u64, DbError> {
        let statement = update.build()?;
        let conn = self.connection().await?;
        let result = bind_all(sqlx::query(&statement.sql), statement.params)
            .execute(&mut **conn)
            .await
            .map_err(|e| DbError::driver("update", e))?;
        Ok(result.rows_affected())
    }

    /// Escape hatch for statements the builders cannot express.
    ///
    /// Statements starting with `DELETE`, `DROP`, `TRUNCATE` or `REPLACE` are
    /// rejected.
    pub async fn manual_query(
        &mut self,
        sql: &str,
        params: Vec<SqlValue>,
    ) -> Result<QueryOutput, DbError> {
        let kind = classify_manual(sql)?;
        let params = query::flatten_params(params);
        match kind {
            ManualKind::Rows => {
                let rows = self
                    .fetch(Statement {
                        sql: sql.to_string(),
                        params,
                    })
                    .await?;
                Ok(QueryOutput::Rows(rows))
            }
            ManualKind::Affected => {
                let conn = self.connection().await?;
                let result = bind_all(sqlx::query(sql), params)
                    .execute(&mut **conn)
                    .await
                    .map_err(|e| DbError::driver("manual_query", e))?;
                Ok(QueryOutput::Affected(result.rows_affected()))
            }
        }
    }

    async fn fetch(&mut self, statement: Statement) -> Result<Vec<Row>, DbError> {
        let conn = self.connection().await?;
        let rows = bind_all(sqlx::query(&statement.sql), statement.params)
            .fetch_all(&mut **conn)
            .await
            .map_err(|e| DbError::driver("select", e))?;
        rows.iter().map(row_to_map).collect()
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if !self.in_transaction {
            return;
        }
        if let Some(conn) = self.connections.remove(&self.current) {
            tracing::warn!(
                connection = %self.current,
                "Database handle dropped with open transaction, discarding connection"
            );
            drop(conn.detach());
        }
    }
}

fn bind_all<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    params: Vec<SqlValue>,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for param in query::flatten_params(params) {
        query = match param {
            SqlValue::Null => query.bind(None::<i64>),
            SqlValue::Int(v) => query.bind(v),
            SqlValue::Real(v) => query.bind(v),
            SqlValue::Text(v) => query.bind(v),
            // flatten_params leaves no lists behind.
            SqlValue::List(_) => query,
        };
    }
    query
}

fn row_to_map(row: &SqliteRow) -> Result<Row, DbError> {
    let mut map = Map::with_capacity(row.columns().len());
    for (index, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(index).map_err(DbError::decode)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            let type_name = raw.type_info().name().to_ascii_uppercase();
            match type_name.as_str() {
                "INTEGER" | "INT" | "BIGINT" | "BOOLEAN" => {
                    Value::from(row.try_get::<i64, _>(index).map_err(DbError::decode)?)
                }
                "REAL" | "FLOAT" | "DOUBLE" | "NUMERIC" => {
                    let v = row.try_get::<f64, _>(index).map_err(DbError::decode)?;
                    serde_json::Number::from_f64(v).map_or(Value::Null, Value::Number)
                }
                "BLOB" => {
                    let bytes = row.try_get::<Vec<u8>, _>(index).map_err(DbError::decode)?;
                    Value::String(String::from_utf8_lossy(&bytes).into_owned())
                }
                _ => Value::String(row.try_get::<String, _>(index).map_err(DbError::decode)?),
            }
        };
        map.insert(column.name().to_string(), value);
    }
    Ok(map)
}

/// Decodes a row into an entity.
pub fn decode<T: DeserializeOwned>(row: Row) -> Result<T, DbError> {
    serde_json::from_value(Value::Object(row)).map_err(DbError::decode)
}

/// Decodes at most one row; more than one is an integrity error.
pub fn decode_single<T: DeserializeOwned>(
    mut rows: Vec<Row>,
    what: &str,
) -> Result<Option<T>, DbError> {
    match rows.len() {
        0 => Ok(None),
        1 => rows.pop().map(decode).transpose(),
        n => Err(DbError::decode(format!("expected one {what} row, found {n}"))),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// A file-backed registry in a temp directory with the schema applied.
    ///
    /// In-memory SQLite would give each pooled connection its own database.
    pub async fn temp_registry() -> (tempfile::TempDir, Arc<ConnectionRegistry>) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("rphud.db").display());
        let pool = open_pool(&url, Duration::from_millis(500), 4).await.unwrap();
        schema::ensure_schema(&pool).await.unwrap();
        let registry = ConnectionRegistry::from_pools([(DEFAULT_CONNECTION, pool)]);
        (dir, Arc::new(registry))
    }

    /// Adds a legacy database with the predecessor's table.
    pub async fn with_legacy(
        dir: &tempfile::TempDir,
        registry: &ConnectionRegistry,
    ) -> Arc<ConnectionRegistry> {
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("legacy.db").display());
        let pool = open_pool(&url, Duration::from_millis(500), 2).await.unwrap();
        schema::ensure_legacy_schema(&pool).await.unwrap();
        let mut pools = registry.pools.clone();
        pools.insert(LEGACY_CONNECTION.to_string(), pool);
        Arc::new(ConnectionRegistry { pools })
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{temp_registry, with_legacy};
    use super::*;

    async fn seed_player(db: &mut Database, uuid: &str) -> i64 {
        db.insert(
            "players",
            &[
                "player_uuid",
                "player_name",
                "player_created",
                "player_last_online",
            ],
            vec![
                uuid.into(),
                "Resident".into(),
                "2024-01-01 00:00:00".into(),
                "2024-01-01 00:00:00".into(),
            ],
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn select_on_empty_table_returns_no_rows() {
        let (_dir, registry) = temp_registry().await;
        let mut db = registry.database();
        let rows = db
            .select(&["*"], "players", &["player_uuid"], vec!["nope".into()], None)
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn rows_keep_column_order_and_types() {
        let (_dir, registry) = temp_registry().await;
        let mut db = registry.database();
        let id = seed_player(&mut db, "U1").await;

        let rows = db
            .select(
                &["player_id", "player_uuid", "player_current_character"],
                "players",
                &["player_uuid"],
                vec!["U1".into()],
                None,
            )
            .await
            .unwrap();
        let keys: Vec<&str> = rows[0].keys().map(String::as_str).collect();
        assert_eq!(keys, ["player_id", "player_uuid", "player_current_character"]);
        assert_eq!(rows[0]["player_id"], Value::from(id));
        assert_eq!(rows[0]["player_current_character"], Value::Null);
    }

    #[tokio::test]
    async fn null_filter_renders_is_null() {
        let (_dir, registry) = temp_registry().await;
        let mut db = registry.database();
        seed_player(&mut db, "U1").await;

        let rows = db
            .select(
                &["player_uuid"],
                "players",
                &["player_hud_url"],
                vec![SqlValue::Null],
                None,
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn update_with_exclusion() {
        let (_dir, registry) = temp_registry().await;
        let mut db = registry.database();
        for id in [1i64, 2, 3] {
            db.insert(
                "sessions",
                &["id", "uuid", "expires"],
                vec![id.into(), "U1".into(), "2024-01-01 00:00:00".into()],
            )
            .await
            .unwrap();
        }

        let affected = db
            .update(
                "sessions",
                &["revoked"],
                vec![1i64.into()],
                &["uuid"],
                vec!["U1".into()],
                &["id"],
                vec![2i64.into()],
            )
            .await
            .unwrap();
        assert_eq!(affected, 2);

        let active = db
            .select(&["id"], "sessions", &["revoked"], vec![0i64.into()], None)
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0]["id"], Value::from(2));
    }

    #[tokio::test]
    async fn lock_requires_transaction() {
        let (_dir, registry) = temp_registry().await;
        let mut db = registry.database();
        let err = db
            .select(
                &["*"],
                "launch_tokens",
                &["token"],
                vec!["x".into()],
                Some(LockClause::ForUpdate),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::LockOutsideTransaction));

        db.begin_transaction().await.unwrap();
        let rows = db
            .select(
                &["*"],
                "launch_tokens",
                &["token"],
                vec!["x".into()],
                Some(LockClause::ForUpdate),
            )
            .await
            .unwrap();
        assert!(rows.is_empty());
        db.commit_transaction().await.unwrap();
    }

    #[tokio::test]
    async fn rollback_discards_changes() {
        let (_dir, registry) = temp_registry().await;
        let mut db = registry.database();
        db.begin_transaction().await.unwrap();
        seed_player(&mut db, "U1").await;
        db.rollback_transaction().await.unwrap();

        let rows = db
            .select(&["*"], "players", &["player_uuid"], vec!["U1".into()], None)
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn dropping_open_transaction_rolls_back() {
        let (_dir, registry) = temp_registry().await;
        {
            let mut db = registry.database();
            db.begin_transaction().await.unwrap();
            seed_player(&mut db, "U1").await;
        }

        let mut db = registry.database();
        let rows = db
            .select(&["*"], "players", &["player_uuid"], vec!["U1".into()], None)
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn transaction_state_errors() {
        let (_dir, registry) = temp_registry().await;
        let mut db = registry.database();
        assert!(matches!(
            db.commit_transaction().await,
            Err(DbError::NoTransaction(_))
        ));
        db.begin_transaction().await.unwrap();
        assert!(matches!(
            db.begin_transaction().await,
            Err(DbError::NestedTransaction(_))
        ));
        db.rollback_transaction().await.unwrap();
    }

    #[tokio::test]
    async fn finish_commits_or_rolls_back() {
        let (_dir, registry) = temp_registry().await;
        let mut db = registry.database();

        db.begin_transaction().await.unwrap();
        seed_player(&mut db, "kept").await;
        db.finish(Ok::<_, DbError>(())).await.unwrap();

        db.begin_transaction().await.unwrap();
        seed_player(&mut db, "discarded").await;
        let result: Result<(), DbError> = db.finish(Err(DbError::decode("boom"))).await;
        assert!(result.is_err());
        assert!(!db.in_transaction());

        let rows = db
            .select(
                &["player_uuid"],
                "players",
                &["player_uuid"],
                vec![vec!["kept", "discarded"].into()],
                None,
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["player_uuid"], "kept");
    }

    #[tokio::test]
    async fn manual_query_guard_and_outputs() {
        let (_dir, registry) = temp_registry().await;
        let mut db = registry.database();
        seed_player(&mut db, "U1").await;

        let err = db
            .manual_query("DELETE FROM players", Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::ForbiddenStatement(_)));

        let out = db
            .manual_query(
                "SELECT COUNT(*) AS n FROM players WHERE player_uuid IN (?, ?)",
                vec![vec!["U1", "U2"].into()],
            )
            .await
            .unwrap();
        let QueryOutput::Rows(rows) = out else {
            panic!("expected rows");
        };
        assert_eq!(rows[0]["n"], Value::from(1));

        let out = db
            .manual_query(
                "UPDATE players SET player_name = ? WHERE player_uuid = ?",
                vec!["Renamed".into(), "U1".into()],
            )
            .await
            .unwrap();
        assert_eq!(out, QueryOutput::Affected(1));
    }

    #[tokio::test]
    async fn switching_connections() {
        let (dir, registry) = temp_registry().await;
        let mut db = registry.database();
        assert!(matches!(
            db.use_connection(LEGACY_CONNECTION),
            Err(DbError::UnknownConnection(_))
        ));

        let registry = with_legacy(&dir, &registry).await;
        let mut db = registry.database();
        db.begin_transaction().await.unwrap();
        assert!(matches!(
            db.use_connection(LEGACY_CONNECTION),
            Err(DbError::TransactionOpen { .. })
        ));
        db.rollback_transaction().await.unwrap();

        db.use_connection(LEGACY_CONNECTION).unwrap();
        let out = db
            .manual_query("SELECT COUNT(*) AS n FROM legacy_characters", Vec::new())
            .await
            .unwrap();
        assert_eq!(out, QueryOutput::Rows(vec![{
            let mut row = Row::new();
            row.insert("n".into(), Value::from(0));
            row
        }]));
        db.use_connection(DEFAULT_CONNECTION).unwrap();
        assert_eq!(db.current_connection(), DEFAULT_CONNECTION);
    }

    #[tokio::test]
    async fn decode_single_rejects_duplicates() {
        let rows = vec![Row::new(), Row::new()];
        let err = decode_single::<Value>(rows, "player").unwrap_err();
        assert!(matches!(err, DbError::Decode(_)));
        assert_eq!(decode_single::<Value>(Vec::new(), "player").unwrap(), None);
    }
}
