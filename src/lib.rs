//! Relational database access over a single SQLite connection.
//!
//! # Intention
//!
//! - Turn structured condition descriptions ([`ConditionSpec`]) into
//!   parameterized SQL; values are always bound, never interpolated.
//! - Provide table-oriented CRUD operations on an explicitly owned
//!   [`Database`], with transaction bracketing, a read-only safety valve and
//!   optional statement history and timing.
//!
//! # Architectural Boundaries
//!
//! - Only database access belongs here: no schema migration, no identity
//!   map, no pooling.
//! - Collaborators use the [`Database`] facade and never see driver handles.
//!
//! ```
//! use rust_dbaccess::{ConditionSpec, Database, OnConflict};
//!
//! # fn main() -> rust_dbaccess::Result<()> {
//! let mut db = Database::connect("sqlite::memory:")?;
//! db.execute_batch("CREATE TABLE user (user_id INTEGER PRIMARY KEY, email TEXT, type INTEGER)")?;
//!
//! let data = ConditionSpec::new().equal("email", "a@b.com").equal("type", 0);
//! let id = db.insert("user", &data, OnConflict::Fail)?.expect("row inserted");
//!
//! let row = db.select_row("user", &ConditionSpec::new().equal("user_id", id), &[], "")?;
//! assert_eq!(row.unwrap().get::<String>("email")?, "a@b.com");
//! # Ok(())
//! # }
//! ```

pub mod condition;
pub mod config;
pub mod database;
pub mod error;
pub mod executor;
pub mod instrument;
pub mod query;
mod sqlite;
pub mod transaction;
pub mod value;

pub use condition::{compile, CompareOp, CompiledClause, Condition, ConditionSpec, Joiner};
pub use config::{ConnectionUrl, DatabaseConfig, OpenMode};
pub use database::Database;
pub use error::{ConnectionError, Error, QueryError, Result};
pub use executor::Cursor;
pub use instrument::TimeReport;
pub use query::{Field, JoinKind, Limit, OnConflict, ReadOperation, Table};
pub use transaction::TransactionState;
pub use value::{FromRow, FromValue, Key, Row, Value};
