//! Error types for compiling and executing DDSL batches.
//!
//! Each phase has its own enum so callers can tell a convention mismatch
//! ([`CompileError::NoMatch`]) from a failing statement
//! ([`ExecutionError::Sql`]). [`Error`] wraps them all for the session API.

use ddsl_core::{DbError, ParseError, PatternError, RegistryError, SourceError};
use thiserror::Error;

/// Begin/commit/rollback requested in the wrong state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransactionStateError {
    /// Auto-transaction mode manages the transaction itself.
    #[error("'{0}' is not allowed while auto-transaction mode owns the transaction")]
    Owned(String),

    #[error("a transaction is already open")]
    AlreadyOpen,

    #[error("no transaction is open")]
    NotOpen,
}

/// Errors raised while turning parsed commands into instructions.
#[derive(Debug, Error)]
pub enum CompileError {
    /// No file matched any attempted pattern; nothing was appended.
    #[error("nothing matched '{command}'; tried: {}", patterns.join(", "))]
    NoMatch {
        command: String,
        patterns: Vec<String>,
    },

    /// A schema filter left no source schema to resolve patterns in.
    #[error("nothing matched '{command}': no source schema is left by '{filter}'")]
    NoSchemas { command: String, filter: String },

    /// The command shape has no compilation rule.
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    /// A name that must be `schema.item` is not.
    #[error("'{command}': malformed name '{name}', expected schema.item")]
    MalformedName { command: String, name: String },

    /// `indexes`/`constraints`/`triggers` need an `on` list.
    #[error("'{command}': a comma-delimited list of schema.table or schema.view names is required")]
    MissingList { command: String },

    /// A seed file has an extension with no handler at its location.
    #[error("unsupported seed file '{0}'")]
    UnsupportedSeed(String),

    /// A nested ddsl file tried to switch refs.
    #[error("{file}: nested commands may not carry a source ref")]
    NestedRef { file: String },

    /// Nested ddsl files include each other too deeply.
    #[error("{file}: ddsl files nest deeper than {limit} levels")]
    TooDeep { file: String, limit: usize },

    /// A nested ddsl file does not parse.
    #[error("{file}: {source}")]
    NestedParse {
        file: String,
        #[source]
        source: ParseError,
    },

    /// `list` needs a live database.
    #[error("'{0}' needs a database connection")]
    NoDatabase(String),

    #[error(transparent)]
    Transaction(#[from] TransactionStateError),

    #[error(transparent)]
    Pattern(#[from] PatternError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Database(#[from] DbError),
}

/// Errors raised while running instructions.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// A SQL file or script failed.
    #[error("{origin}: {source}")]
    Sql {
        origin: String,
        #[source]
        source: DbError,
    },

    /// A CSV seed could not be imported.
    #[error("{file}: {source}")]
    Import {
        file: String,
        #[source]
        source: DbError,
    },

    /// A shell command exited unsuccessfully.
    #[error("shell command '{command}' failed ({status}){}", stderr_suffix(.stderr))]
    Shell {
        command: String,
        status: String,
        stderr: String,
    },

    /// A shell command could not be started.
    #[error("failed to run '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// List output could not be rendered or written.
    #[error("output error: {0}")]
    Output(String),

    #[error(transparent)]
    Transaction(#[from] TransactionStateError),

    #[error(transparent)]
    Database(#[from] DbError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {stderr}")
    }
}

/// Errors loading or applying a [`RunConfig`](crate::RunConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A required setting has no value from any layer.
    #[error("no {0} configured")]
    Missing(&'static str),

    #[error(transparent)]
    Location(#[from] RegistryError),
}

/// Any error surfaced by a [`Session`](crate::Session).
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Database(#[from] DbError),
}

/// Convenience alias for results with [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
