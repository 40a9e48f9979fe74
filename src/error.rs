//! Error taxonomy for the access layer.

use std::fmt;

use thiserror::Error;

use crate::transaction::TransactionState;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Every failure the access layer can surface to its callers.
#[derive(Debug, Error)]
pub enum Error {
    /// The caller supplied a condition shape that cannot be compiled.
    #[error("malformed condition on `{column}`: {reason}")]
    MalformedCondition { column: String, reason: String },

    /// A comparison operator outside `!=`, `<`, `<=`, `>`, `>=`, `LIKE`.
    #[error("unsupported operator `{0}`")]
    UnsupportedOperator(String),

    #[error("connection failed: {0}")]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("cannot {action} a transaction while {state}")]
    InvalidTransactionState {
        action: &'static str,
        state: TransactionState,
    },

    #[error("column `{0}` is not present in the result row")]
    MissingColumn(String),

    #[error("column `{column}`: expected {expected}, found {found}")]
    Conversion {
        column: String,
        expected: &'static str,
        found: &'static str,
    },
}

impl Error {
    pub(crate) fn malformed(column: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedCondition {
            column: column.into(),
            reason: reason.into(),
        }
    }
}

/// Failure to open the connection. Fatal for the owning context.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("invalid connection url: {0}")]
    InvalidUrl(String),

    #[error("unsupported driver `{0}`")]
    UnsupportedDriver(String),

    #[error("unsupported connection option `{0}`")]
    UnsupportedOption(String),

    #[error("could not open `{path}`: {source}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },
}

/// A statement the driver refused or failed to run.
///
/// Carries the offending SQL so the operational log can show exactly what ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryError {
    /// Driver result code, when the driver reported one.
    pub code: Option<i32>,
    pub message: String,
    pub sql: String,
}

impl QueryError {
    pub(crate) fn from_driver(err: &rusqlite::Error, sql: &str) -> Self {
        let code = match err {
            rusqlite::Error::SqliteFailure(ffi, _) => Some(ffi.extended_code),
            _ => None,
        };
        Self {
            code,
            message: err.to_string(),
            sql: sql.to_string(),
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "SQL ERROR ({code}): {}", self.message),
            None => write!(f, "SQL ERROR: {}", self.message),
        }
    }
}

impl std::error::Error for QueryError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_error_display_includes_code() {
        let err = QueryError {
            code: Some(1),
            message: "no such table: missing".to_string(),
            sql: "SELECT * FROM missing".to_string(),
        };
        assert_eq!(err.to_string(), "SQL ERROR (1): no such table: missing");
    }

    #[test]
    fn transaction_state_error_reads_naturally() {
        let err = Error::InvalidTransactionState {
            action: "commit",
            state: TransactionState::Idle,
        };
        assert_eq!(err.to_string(), "cannot commit a transaction while idle");
    }
}
