//! Transaction bracketing for a [`Database`].
//!
//! Only one level of transaction exists. Beginning twice, or ending a
//! transaction that was never begun, is a programming error and is reported
//! as [`Error::InvalidTransactionState`].

use std::fmt;

use crate::database::Database;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionState {
    #[default]
    Idle,
    Active,
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransactionState::Idle => "idle",
            TransactionState::Active => "active",
        })
    }
}

impl Database {
    /// Start a transaction; autocommit stays off until commit or rollback.
    ///
    /// A transaction opened behind the facade's back (a raw `BEGIN`) is
    /// adopted: the state becomes Active and the call fails as a double begin.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn begin(&mut self) -> Result<()> {
        self.sync_with_connection();
        self.expect_state(TransactionState::Idle, "begin")?;
        tracing::info!("Beginning transaction");
        self.executor.exec("BEGIN", &[])?;
        self.transaction = TransactionState::Active;
        Ok(())
    }

    /// Commit. When the connection has already left the transaction (the
    /// driver rolled it back, or a raw `COMMIT`/`ROLLBACK` ran) the state
    /// returns to Idle and the commit fails as a commit while idle.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn commit(&mut self) -> Result<()> {
        self.sync_with_connection();
        self.expect_state(TransactionState::Active, "commit")?;
        tracing::info!("Committing transaction");
        self.executor.exec("COMMIT", &[])?;
        self.transaction = TransactionState::Idle;
        Ok(())
    }

    /// Roll back. A transaction the connection already ended counts as
    /// rolled back; one opened by a raw `BEGIN` is rolled back too.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn rollback(&mut self) -> Result<()> {
        if self.connection_left_transaction() {
            tracing::warn!("Transaction already ended on the connection");
            self.transaction = TransactionState::Idle;
            return Ok(());
        }
        self.sync_with_connection();
        self.expect_state(TransactionState::Active, "rollback")?;
        tracing::info!("Rolling back transaction");
        self.executor.exec("ROLLBACK", &[])?;
        self.transaction = TransactionState::Idle;
        Ok(())
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction == TransactionState::Active
    }

    pub fn transaction_state(&self) -> TransactionState {
        self.transaction
    }

    /// Run `body` inside a transaction: commit when it returns `Ok`, roll
    /// back when it returns `Err`.
    pub fn transaction<T, E, F>(&mut self, body: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut Self) -> std::result::Result<T, E>,
        E: From<Error>,
    {
        self.begin()?;
        match body(self) {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = self.rollback() {
                    tracing::error!(error = %rollback, "rollback after failed transaction body failed");
                }
                Err(err)
            }
        }
    }

    /// Active here while the connection is back in autocommit. Read-only
    /// mode never sends `BEGIN`, so the connection says nothing there.
    fn connection_left_transaction(&self) -> bool {
        self.transaction == TransactionState::Active
            && !self.executor.is_read_only()
            && self.executor.is_autocommit()
    }

    /// Bring the state in line with the connection before acting on it.
    fn sync_with_connection(&mut self) {
        if self.connection_left_transaction() {
            tracing::warn!("Transaction already ended on the connection");
            self.transaction = TransactionState::Idle;
        } else if self.transaction == TransactionState::Idle && !self.executor.is_autocommit() {
            tracing::warn!("Adopting a transaction opened outside begin()");
            self.transaction = TransactionState::Active;
        }
    }

    fn expect_state(&self, expected: TransactionState, action: &'static str) -> Result<()> {
        if self.transaction == expected {
            Ok(())
        } else {
            Err(Error::InvalidTransactionState {
                action,
                state: self.transaction,
            })
        }
    }
}
