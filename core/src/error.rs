//! Error types for the language layer and the collaborator seams.
//!
//! Parsing and grammar failures are raised by this crate. Source, database
//! and registry errors are defined here so that drivers in other crates and
//! the engine agree on a single vocabulary at the trait boundaries.

use std::path::PathBuf;

use thiserror::Error;

/// The built-in or a caller-supplied grammar text is malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("grammar line {line}: {message}")]
pub struct GrammarError {
    pub line: usize,
    pub message: String,
}

impl GrammarError {
    pub(crate) fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

/// Errors raised while turning command text into parsed commands.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The first word is not a known command.
    #[error("line {line}: unknown command '{command}'")]
    UnknownCommand { command: String, line: usize },

    /// A token does not fit the grammar at its position.
    #[error("line {line}: unexpected '{token}' after '{after}', expected one of: {expected}")]
    UnexpectedToken {
        token: String,
        after: String,
        expected: String,
        line: usize,
    },

    /// The statement ended before a required keyword.
    #[error("line {line}: incomplete command '{command}', expected one of: {expected}")]
    Incomplete {
        command: String,
        expected: String,
        line: usize,
    },

    /// The statement ended before a required argument.
    #[error("line {line}: '{command}' requires <{argument}>")]
    MissingArgument {
        command: String,
        argument: String,
        line: usize,
    },

    /// An identifier or `schema.item` pair is not well formed.
    #[error("line {line}: malformed name '{name}': {reason}")]
    MalformedName {
        name: String,
        reason: &'static str,
        line: usize,
    },

    /// A backtick literal is still open at end of input.
    #[error("line {line}: unterminated raw literal")]
    UnterminatedLiteral { line: usize },

    /// A `#` fragment without a ref name.
    #[error("line {line}: empty source ref")]
    EmptyRef { line: usize },
}

/// Errors raised while rendering a path pattern.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    /// A placeholder was left without a value.
    #[error("pattern '{pattern}' needs a value for {{{placeholder}}}")]
    MissingValue {
        pattern: String,
        placeholder: &'static str,
    },

    /// The file segment could not be turned into a name matcher.
    #[error("invalid file pattern '{0}'")]
    InvalidFilePattern(String),
}

/// Errors reported by a source tree driver.
#[derive(Debug, Error)]
pub enum SourceError {
    /// File system access failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A file requested by path does not exist.
    #[error("source file not found: {0}")]
    NotFound(String),

    /// The git driver failed.
    #[error("git error: {0}")]
    Git(String),

    /// A relative path tried to leave the source root.
    #[error("path escapes the source root: {0}")]
    OutsideRoot(String),
}

/// Errors reported by a database driver.
#[derive(Debug, Error)]
pub enum DbError {
    /// A statement failed; position is 1-based within the submitted text.
    #[error("{message}{}", position_suffix(.line, .column))]
    Statement {
        message: String,
        line: Option<usize>,
        column: Option<usize>,
    },

    /// Begin/commit/rollback in the wrong state.
    #[error("transaction error: {0}")]
    Transaction(String),

    /// The advisory lock could not be taken or released.
    #[error("lock error: {0}")]
    Lock(String),

    /// CSV import failure.
    #[error("import error: {0}")]
    Import(String),

    /// Any other driver failure.
    #[error("database error: {0}")]
    Driver(String),
}

fn position_suffix(line: &Option<usize>, column: &Option<usize>) -> String {
    match (line, column) {
        (Some(line), Some(column)) => format!(" (line {line}, column {column})"),
        (Some(line), None) => format!(" (line {line})"),
        _ => String::new(),
    }
}

/// Errors raised when resolving a location to a driver.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No driver is registered for the scheme.
    #[error("no {kind} driver registered for scheme '{scheme}'")]
    UnknownScheme { kind: &'static str, scheme: String },

    /// The location string could not be parsed.
    #[error("invalid location '{0}'")]
    InvalidLocation(String),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Database(#[from] DbError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statement_error_position() {
        let err = DbError::Statement {
            message: "near \"TABLEX\": syntax error".into(),
            line: Some(3),
            column: Some(8),
        };
        assert_eq!(
            err.to_string(),
            "near \"TABLEX\": syntax error (line 3, column 8)"
        );

        let err = DbError::Statement {
            message: "boom".into(),
            line: None,
            column: None,
        };
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn test_parse_error_mentions_line() {
        let err = ParseError::UnterminatedLiteral { line: 4 };
        assert_eq!(err.to_string(), "line 4: unterminated raw literal");
    }
}
