//! The CRUD facade: one [`Database`] per owning request or task.

use std::collections::BTreeMap;

use crate::condition::ConditionSpec;
use crate::config::{ConnectionUrl, DatabaseConfig};
use crate::error::{Error, Result};
use crate::executor::{Cursor, Executor};
use crate::instrument::TimeReport;
use crate::query::{
    CreateOperation, DeleteOperation, Field, OnConflict, ReadOperation, Statement, Table,
    UpdateOperation,
};
use crate::sqlite::SqliteConnection;
use crate::transaction::TransactionState;
use crate::value::{FromRow, Key, Row, Value};

/// A single database connection together with its transaction state and
/// instrumentation.
///
/// Construct one per request or task and pass it to whatever needs database
/// access. It may be moved between threads but is never shared: every
/// executing method takes `&mut self`.
#[derive(Debug)]
pub struct Database {
    pub(crate) executor: Executor,
    pub(crate) transaction: TransactionState,
}

impl Database {
    /// Open a connection with default settings.
    pub fn connect(url: &str) -> Result<Self> {
        Self::from_config(&DatabaseConfig::new(url))
    }

    pub fn from_config(config: &DatabaseConfig) -> Result<Self> {
        let conn = ConnectionUrl::parse(&config.url)
            .and_then(|url| SqliteConnection::open(&url))
            .map_err(|err| {
                tracing::error!(error = %err, "Connection failed");
                Error::Connection(err)
            })?;
        tracing::info!(
            read_only = config.read_only,
            verbose = config.verbose,
            "Database connected"
        );
        Ok(Self {
            executor: Executor::new(conn, config.read_only, config.verbose),
            transaction: TransactionState::Idle,
        })
    }

    // ------------------------------------------------------------------
    // Modes and instrumentation
    // ------------------------------------------------------------------

    /// Skip every statement that is not a `SELECT`.
    pub fn set_read_only(&mut self, read_only: bool) {
        self.executor.set_read_only(read_only);
    }

    pub fn is_read_only(&self) -> bool {
        self.executor.is_read_only()
    }

    pub fn set_verbose(&mut self, verbose: bool) {
        self.executor.instruments_mut().set_verbose(verbose);
    }

    pub fn is_verbose(&self) -> bool {
        self.executor.instruments().is_verbose()
    }

    /// Statements executed since the last reset. Empty unless verbose.
    pub fn history(&self) -> &[String] {
        self.executor.instruments().history()
    }

    pub fn query_count(&self) -> u64 {
        self.executor.instruments().query_count()
    }

    /// Totals since the last reset; `None` unless verbose.
    pub fn time_report(&self) -> Option<TimeReport> {
        self.executor.instruments().report()
    }

    pub fn reset_instrumentation(&mut self) {
        self.executor.instruments_mut().reset();
    }

    /// `false` while the connection is inside an open transaction.
    pub fn is_autocommit(&self) -> bool {
        self.executor.is_autocommit()
    }

    // ------------------------------------------------------------------
    // Raw SQL
    // ------------------------------------------------------------------

    /// Run a statement and hand back its cursor.
    pub fn query(&mut self, sql: &str, params: &[Value]) -> Result<Cursor> {
        let cursor = self.executor.execute(sql, params)?;
        self.executor.finish();
        Ok(cursor)
    }

    /// Run several `;`-separated statements without parameters.
    pub fn execute_batch(&mut self, sql: &str) -> Result<()> {
        self.executor.execute_batch(sql)
    }

    /// Run a write; `None` when no row changed, the generated id otherwise.
    pub fn exec_id(&mut self, sql: &str, params: &[Value]) -> Result<Option<i64>> {
        self.executor.exec_id(sql, params)
    }

    pub fn fetch_one(&mut self, sql: &str, params: &[Value]) -> Result<Option<Row>> {
        self.executor.fetch_one(sql, params)
    }

    pub fn fetch_all(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.executor.fetch_all(sql, params)
    }

    /// One cell of the first row. Include a `LIMIT 1` for large reads.
    pub fn field(&mut self, field: &str, sql: &str, params: &[Value]) -> Result<Option<Value>> {
        self.fetch_one(sql, params)?
            .map(|row| row.take(field).ok_or_else(|| Error::MissingColumn(field.to_string())))
            .transpose()
    }

    /// One column of every row.
    pub fn fields(&mut self, field: &str, sql: &str, params: &[Value]) -> Result<Vec<Value>> {
        self.executor.fetch_column(field, sql, params)
    }

    /// One column of every row, keyed by `key`.
    pub fn fields_indexed(
        &mut self,
        field: &str,
        key: &str,
        sql: &str,
        params: &[Value],
    ) -> Result<BTreeMap<Key, Value>> {
        self.executor.fetch_column_indexed(field, key, sql, params)
    }

    // ------------------------------------------------------------------
    // CRUD
    // ------------------------------------------------------------------

    /// `SELECT <fields|*> FROM <table> WHERE <conditions> <trailing>`.
    pub fn select(
        &mut self,
        table: impl Into<Table>,
        conditions: &ConditionSpec,
        fields: &[Field],
        trailing: &str,
    ) -> Result<Cursor> {
        let op = ReadOperation::new(table)
            .conditions(conditions.clone())
            .fields(fields.iter().cloned())
            .trailing(trailing);
        self.select_with(&op)
    }

    pub fn select_with(&mut self, op: &ReadOperation) -> Result<Cursor> {
        let stmt = op.to_statement()?;
        self.query(&stmt.sql, &stmt.params)
    }

    /// The first matching row, or `None`. `trailing` is placed before the
    /// `LIMIT 1`, so an `ORDER BY` there picks which row comes first.
    pub fn select_row(
        &mut self,
        table: impl Into<Table>,
        conditions: &ConditionSpec,
        fields: &[Field],
        trailing: &str,
    ) -> Result<Option<Row>> {
        let stmt = ReadOperation::new(table)
            .conditions(conditions.clone())
            .fields(fields.iter().cloned())
            .trailing(trailing)
            .limit(1)
            .to_statement()?;
        self.fetch_one(&stmt.sql, &stmt.params)
    }

    pub fn select_row_as<T: FromRow>(
        &mut self,
        table: impl Into<Table>,
        conditions: &ConditionSpec,
    ) -> Result<Option<T>> {
        let stmt = ReadOperation::new(table)
            .conditions(conditions.clone())
            .limit(1)
            .to_statement()?;
        self.executor.shape(&stmt.sql, &stmt.params, |mut rows| {
            rows.next().as_ref().map(T::from_row).transpose()
        })
    }

    pub fn select_as<T: FromRow>(
        &mut self,
        table: impl Into<Table>,
        conditions: &ConditionSpec,
    ) -> Result<Vec<T>> {
        let stmt = ReadOperation::new(table)
            .conditions(conditions.clone())
            .to_statement()?;
        self.executor.shape(&stmt.sql, &stmt.params, |rows| {
            rows.map(|row| T::from_row(&row)).collect()
        })
    }

    /// All matching rows keyed by the `key` column. Later duplicates win.
    pub fn select_indexed(
        &mut self,
        table: impl Into<Table>,
        key: &str,
        conditions: &ConditionSpec,
        fields: &[Field],
    ) -> Result<BTreeMap<Key, Row>> {
        let stmt = ReadOperation::new(table)
            .conditions(conditions.clone())
            .fields(fields.iter().cloned())
            .to_statement()?;
        self.executor.shape(&stmt.sql, &stmt.params, |rows| {
            let mut indexed = BTreeMap::new();
            for row in rows {
                let k = row
                    .value(key)
                    .map(Key::from)
                    .ok_or_else(|| Error::MissingColumn(key.to_string()))?;
                indexed.insert(k, row);
            }
            Ok(indexed)
        })
    }

    /// One value of the first matching row. For an expression field the
    /// alias is read.
    pub fn select_field(
        &mut self,
        field: impl Into<Field>,
        table: impl Into<Table>,
        conditions: &ConditionSpec,
        trailing: &str,
    ) -> Result<Option<Value>> {
        let field = field.into();
        let key = field.key().to_string();
        self.select_row(table, conditions, &[field], trailing)?
            .map(|row| row.take(&key).ok_or(Error::MissingColumn(key)))
            .transpose()
    }

    /// `true` when at least one row matches.
    pub fn check(&mut self, table: impl Into<Table>, conditions: &ConditionSpec) -> Result<bool> {
        let stmt = ReadOperation::new(table)
            .conditions(conditions.clone())
            .fields([Field::expr("1", "found")])
            .limit(1)
            .to_statement()?;
        Ok(self.fetch_one(&stmt.sql, &stmt.params)?.is_some())
    }

    /// Number of matching rows.
    pub fn count(&mut self, table: impl Into<Table>, conditions: &ConditionSpec) -> Result<i64> {
        let stmt = ReadOperation::new(table)
            .conditions(conditions.clone())
            .fields([Field::expr("COUNT(*)", "count")])
            .to_statement()?;
        self.fetch_one(&stmt.sql, &stmt.params)?
            .map_or(Ok(0), |row| row.get::<i64>("count"))
    }

    /// Insert a row. Returns the id of the row written, or `None` when
    /// nothing was written (an ignored conflict, or a read-only connection).
    /// An upsert that updates an existing row returns that row's id.
    #[tracing::instrument(level = "debug", skip(self, data, on_conflict))]
    pub fn insert(
        &mut self,
        table: &str,
        data: &ConditionSpec,
        on_conflict: OnConflict,
    ) -> Result<Option<i64>> {
        let upsert = matches!(on_conflict, OnConflict::Update(_));
        let stmt = CreateOperation {
            table: table.to_string(),
            data: data.clone(),
            on_conflict,
        }
        .to_statement()?;
        if !upsert {
            return self.exec_id(&stmt.sql, &stmt.params);
        }
        self.fetch_one(&stmt.sql, &stmt.params)?
            .map(|row| row.get::<i64>(CreateOperation::UPSERT_ID))
            .transpose()
    }

    /// Returns the number of rows changed.
    #[tracing::instrument(level = "debug", skip(self, data, conditions))]
    pub fn update(
        &mut self,
        table: &str,
        data: &ConditionSpec,
        conditions: &ConditionSpec,
    ) -> Result<usize> {
        let stmt = UpdateOperation {
            table: table.to_string(),
            data: data.clone(),
            conditions: conditions.clone(),
        }
        .to_statement()?;
        self.exec(stmt)
    }

    /// Returns the number of rows removed.
    #[tracing::instrument(level = "debug", skip(self, conditions))]
    pub fn delete(&mut self, table: &str, conditions: &ConditionSpec) -> Result<usize> {
        let stmt = DeleteOperation {
            table: table.to_string(),
            conditions: conditions.clone(),
        }
        .to_statement()?;
        self.exec(stmt)
    }

    fn exec(&mut self, stmt: Statement) -> Result<usize> {
        self.executor.exec(&stmt.sql, &stmt.params)
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if self.in_transaction() {
            tracing::warn!("Database dropped inside an open transaction; it will be rolled back");
        }
    }
}
