//! Statement execution over the single connection.

use std::backtrace::Backtrace;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{Error, QueryError, Result};
use crate::instrument::Instrumentation;
use crate::sqlite::{RawResult, SqliteConnection};
use crate::value::{Key, Row, Value};

/// Rows produced by one statement, consumed in a single forward pass.
#[derive(Debug)]
pub struct Cursor {
    columns: Arc<[String]>,
    rows: std::vec::IntoIter<Row>,
    rows_affected: usize,
    last_insert_id: Option<i64>,
}

impl Cursor {
    pub(crate) fn empty() -> Self {
        Self {
            columns: Arc::from(Vec::new()),
            rows: Vec::new().into_iter(),
            rows_affected: 0,
            last_insert_id: None,
        }
    }

    pub(crate) fn from_raw(raw: RawResult) -> Self {
        Self {
            columns: raw.columns,
            rows: raw.rows.into_iter(),
            rows_affected: raw.rows_affected,
            last_insert_id: Some(raw.last_insert_id),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Rows changed by a write, or rows returned by a read.
    pub fn rows_affected(&self) -> usize {
        self.rows_affected
    }

    pub fn last_insert_id(&self) -> Option<i64> {
        self.last_insert_id
    }
}

impl Iterator for Cursor {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        self.rows.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.rows.size_hint()
    }
}

impl ExactSizeIterator for Cursor {}

/// `true` when the statement is a read.
pub(crate) fn is_select(sql: &str) -> bool {
    sql.trim_start()
        .get(..6)
        .is_some_and(|head| head.eq_ignore_ascii_case("SELECT"))
}

#[derive(Debug)]
pub(crate) struct Executor {
    conn: SqliteConnection,
    read_only: bool,
    instruments: Instrumentation,
}

impl Executor {
    pub fn new(conn: SqliteConnection, read_only: bool, verbose: bool) -> Self {
        Self {
            conn,
            read_only,
            instruments: Instrumentation::new(verbose),
        }
    }

    pub fn instruments(&self) -> &Instrumentation {
        &self.instruments
    }

    pub fn instruments_mut(&mut self) -> &mut Instrumentation {
        &mut self.instruments
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    pub fn is_autocommit(&self) -> bool {
        self.conn.is_autocommit()
    }

    /// Run one statement. The caller calls [`Executor::finish`] once the
    /// result has been shaped.
    pub fn execute(&mut self, sql: &str, params: &[Value]) -> Result<Cursor> {
        if self.read_only && !is_select(sql) {
            tracing::warn!(sql, "read-only connection, statement skipped");
            return Ok(Cursor::empty());
        }

        self.instruments.start(sql);
        tracing::debug!(sql, params = params.len(), "executing statement");
        let outcome = self.conn.run(sql, params);
        self.instruments.query_end();

        outcome
            .map(Cursor::from_raw)
            .map_err(|err| self.fail(&err, sql))
    }

    pub fn finish(&mut self) {
        self.instruments.finish();
    }

    pub fn execute_batch(&mut self, sql: &str) -> Result<()> {
        if self.read_only {
            tracing::warn!(sql, "read-only connection, batch skipped");
            return Ok(());
        }

        self.instruments.start(sql);
        let outcome = self.conn.execute_batch(sql);
        self.instruments.query_end();
        self.finish();
        outcome.map_err(|err| self.fail(&err, sql))
    }

    /// Run a statement and shape its rows. The timer is folded in once
    /// `shape` returns, whether or not it succeeded.
    pub fn shape<T>(
        &mut self,
        sql: &str,
        params: &[Value],
        shape: impl FnOnce(Cursor) -> Result<T>,
    ) -> Result<T> {
        let cursor = self.execute(sql, params)?;
        let shaped = shape(cursor);
        self.finish();
        shaped
    }

    /// Execute and finish, returning the affected row count.
    pub fn exec(&mut self, sql: &str, params: &[Value]) -> Result<usize> {
        self.shape(sql, params, |cursor| Ok(cursor.rows_affected()))
    }

    /// Run a write and return the generated id, or `None` when nothing changed.
    pub fn exec_id(&mut self, sql: &str, params: &[Value]) -> Result<Option<i64>> {
        self.shape(sql, params, |cursor| {
            if cursor.rows_affected() == 0 {
                return Ok(None);
            }
            Ok(cursor.last_insert_id())
        })
    }

    pub fn fetch_one(&mut self, sql: &str, params: &[Value]) -> Result<Option<Row>> {
        self.shape(sql, params, |mut cursor| Ok(cursor.next()))
    }

    pub fn fetch_all(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.shape(sql, params, |cursor| Ok(cursor.collect()))
    }

    /// One column of every row.
    pub fn fetch_column(&mut self, field: &str, sql: &str, params: &[Value]) -> Result<Vec<Value>> {
        self.shape(sql, params, |cursor| {
            cursor
                .map(|row| row.take(field).ok_or_else(|| Error::MissingColumn(field.to_string())))
                .collect()
        })
    }

    /// One column of every row, keyed by another column. Later rows win.
    pub fn fetch_column_indexed(
        &mut self,
        field: &str,
        key: &str,
        sql: &str,
        params: &[Value],
    ) -> Result<BTreeMap<Key, Value>> {
        self.shape(sql, params, |cursor| {
            let mut indexed = BTreeMap::new();
            for row in cursor {
                let k = row
                    .value(key)
                    .map(Key::from)
                    .ok_or_else(|| Error::MissingColumn(key.to_string()))?;
                let v = row
                    .take(field)
                    .ok_or_else(|| Error::MissingColumn(field.to_string()))?;
                indexed.insert(k, v);
            }
            Ok(indexed)
        })
    }

    /// Classify a driver failure and write it to the operational log.
    fn fail(&mut self, err: &rusqlite::Error, sql: &str) -> Error {
        self.finish();
        let error = QueryError::from_driver(err, sql);
        if self.instruments.is_verbose() {
            tracing::error!(
                code = ?error.code,
                sql = %error.sql,
                backtrace = %Backtrace::force_capture(),
                "{error}"
            );
        } else {
            tracing::error!(code = ?error.code, sql = %error.sql, "{error}");
        }
        Error::Query(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionUrl;

    fn executor(read_only: bool, verbose: bool) -> Executor {
        let url = ConnectionUrl::parse("sqlite::memory:").unwrap();
        let conn = SqliteConnection::open(&url).unwrap();
        let mut executor = Executor::new(conn, false, verbose);
        executor
            .execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT);")
            .unwrap();
        executor.set_read_only(read_only);
        executor
    }

    #[test]
    fn select_detection() {
        assert!(is_select("SELECT 1"));
        assert!(is_select("  select * from t"));
        assert!(!is_select("INSERT INTO t VALUES (1)"));
        assert!(!is_select("SEL"));
        assert!(!is_select(""));
    }

    #[test]
    fn read_only_skips_writes() {
        let mut ex = executor(true, false);
        let before = ex.instruments().query_count();
        assert_eq!(
            ex.exec("INSERT INTO t (name) VALUES (?)", &crate::values!["a"])
                .unwrap(),
            0
        );
        assert_eq!(ex.instruments().query_count(), before);
        assert!(ex.fetch_all("SELECT * FROM t", &[]).unwrap().is_empty());
    }

    #[test]
    fn exec_id_returns_generated_id() {
        let mut ex = executor(false, false);
        let id = ex
            .exec_id("INSERT INTO t (name) VALUES (?)", &crate::values!["a"])
            .unwrap();
        assert_eq!(id, Some(1));
        let none = ex.exec_id("UPDATE t SET name = 'b' WHERE id = 99", &[]).unwrap();
        assert_eq!(none, None);
    }

    #[test]
    fn column_helpers() {
        let mut ex = executor(false, false);
        for name in ["a", "b", "c"] {
            ex.exec("INSERT INTO t (name) VALUES (?)", &crate::values![name])
                .unwrap();
        }
        let names = ex.fetch_column("name", "SELECT * FROM t ORDER BY id", &[]).unwrap();
        assert_eq!(names, crate::values!["a", "b", "c"]);

        let by_id = ex
            .fetch_column_indexed("name", "id", "SELECT * FROM t", &[])
            .unwrap();
        assert_eq!(by_id.get(&Key::Integer(2)), Some(&Value::from("b")));

        assert!(matches!(
            ex.fetch_column("nope", "SELECT * FROM t", &[]),
            Err(Error::MissingColumn(_))
        ));
    }

    #[test]
    fn shaping_errors_still_close_the_timer() {
        let mut ex = executor(false, true);
        ex.exec("INSERT INTO t (name) VALUES ('a')", &[]).unwrap();
        ex.instruments_mut().reset();

        assert!(matches!(
            ex.fetch_column_indexed("name", "nope", "SELECT * FROM t", &[]),
            Err(Error::MissingColumn(c)) if c == "nope"
        ));
        let report = ex.instruments().report().unwrap();
        assert_eq!(report.query_count, 1);
        assert!(report.sql_time > std::time::Duration::ZERO);
        assert!(report.post_process_time >= report.sql_time);
    }

    #[test]
    fn driver_failures_become_query_errors() {
        let mut ex = executor(false, true);
        let err = ex.fetch_all("SELECT * FROM missing", &[]).unwrap_err();
        match err {
            Error::Query(q) => {
                assert_eq!(q.sql, "SELECT * FROM missing");
                assert!(q.message.contains("missing"));
                assert!(q.code.is_some());
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // the failing statement still counts and is recorded
        assert_eq!(ex.instruments().history().last().unwrap(), "SELECT * FROM missing");
    }
}
