//! SQLite driver adapter.
//!
//! Result rows are materialized before returning, so nothing handed upward
//! borrows the connection.

use std::sync::Arc;

use rusqlite::{params_from_iter, Connection, OpenFlags};

use crate::config::{ConnectionUrl, OpenMode};
use crate::error::ConnectionError;
use crate::value::{Row, Value};

/// What one statement produced.
#[derive(Debug)]
pub(crate) struct RawResult {
    pub columns: Arc<[String]>,
    pub rows: Vec<Row>,
    pub rows_affected: usize,
    pub last_insert_id: i64,
}

/// The single live connection.
#[derive(Debug)]
pub(crate) struct SqliteConnection {
    conn: Connection,
}

impl SqliteConnection {
    pub fn open(url: &ConnectionUrl) -> Result<Self, ConnectionError> {
        let mut flags = OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        flags |= match url.mode {
            OpenMode::ReadOnly => OpenFlags::SQLITE_OPEN_READ_ONLY,
            OpenMode::ReadWrite => OpenFlags::SQLITE_OPEN_READ_WRITE,
            OpenMode::ReadWriteCreate => {
                OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE
            }
        };

        let opened = if url.is_memory() {
            Connection::open_in_memory_with_flags(flags)
        } else {
            Connection::open_with_flags(&url.path, flags)
        };
        let open_error = |source| ConnectionError::Open {
            path: url.path.clone(),
            source,
        };
        let conn = opened.map_err(open_error)?;
        if let Some(timeout) = url.busy_timeout {
            conn.busy_timeout(timeout).map_err(open_error)?;
        }
        Ok(Self { conn })
    }

    /// Prepare and run one statement with positional parameters.
    pub fn run(&self, sql: &str, params: &[Value]) -> rusqlite::Result<RawResult> {
        let mut stmt = self.conn.prepare(sql)?;

        if stmt.column_count() == 0 {
            let rows_affected = stmt.execute(params_from_iter(params))?;
            return Ok(RawResult {
                columns: Arc::from(Vec::new()),
                rows: Vec::new(),
                rows_affected,
                last_insert_id: self.conn.last_insert_rowid(),
            });
        }

        let columns: Arc<[String]> = stmt
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();
        let width = columns.len();

        let mut rows = Vec::new();
        let mut cursor = stmt.query(params_from_iter(params))?;
        while let Some(row) = cursor.next()? {
            let values = (0..width)
                .map(|i| row.get::<_, Value>(i))
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.push(Row::new(Arc::clone(&columns), values));
        }

        Ok(RawResult {
            columns,
            rows_affected: rows.len(),
            rows,
            last_insert_id: self.conn.last_insert_rowid(),
        })
    }

    pub fn execute_batch(&self, sql: &str) -> rusqlite::Result<()> {
        self.conn.execute_batch(sql)
    }

    pub fn is_autocommit(&self) -> bool {
        self.conn.is_autocommit()
    }
}
