//! Error types for the SQLite driver.
//!
//! Internal operations return [`SqliteError`]; the [`Database`] trait
//! surface converts them into the shared [`DbError`] vocabulary.
//!
//! [`Database`]: ddsl_core::Database

use ddsl_core::DbError;
use thiserror::Error;

/// Errors that can occur inside the SQLite driver.
#[derive(Debug, Error)]
pub enum SqliteError {
    /// SQLite operation failure outside statement execution.
    #[error("database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    /// A submitted statement failed; position is 1-based within the text.
    #[error("{message}")]
    Statement {
        message: String,
        line: Option<usize>,
        column: Option<usize>,
    },

    /// CSV file could not be read.
    #[error("csv error: {0}")]
    CsvError(#[from] csv::Error),

    /// Schema or table name that cannot be used as an identifier.
    #[error("invalid identifier '{0}'")]
    InvalidIdentifier(String),

    /// Transaction requested in the wrong state.
    #[error("{0}")]
    Transaction(String),

    /// Advisory lock contention or misuse.
    #[error("{0}")]
    Lock(String),

    /// The connection was already closed.
    #[error("connection is closed")]
    Closed,
}

impl From<SqliteError> for DbError {
    fn from(err: SqliteError) -> Self {
        match err {
            SqliteError::Statement {
                message,
                line,
                column,
            } => DbError::Statement {
                message,
                line,
                column,
            },
            SqliteError::CsvError(e) => DbError::Import(e.to_string()),
            SqliteError::Transaction(msg) => DbError::Transaction(msg),
            SqliteError::Lock(msg) => DbError::Lock(msg),
            other => DbError::Driver(other.to_string()),
        }
    }
}

/// Convenience alias for results with [`SqliteError`].
pub type Result<T> = std::result::Result<T, SqliteError>;
