//! Bookkeeping tables and SQL text helpers.
//!
//! The driver keeps two tables in the `main` database:
//!
//! - `ddsl_log`: one row per executed DSL command (audit trail)
//! - `ddsl_lock`: at most one row, present while a run holds the lock
//!
//! Both are created on first use and hidden from catalog listings.

use crate::error::{Result, SqliteError};

/// Audit table name.
pub const LOG_TABLE: &str = "ddsl_log";

/// Advisory lock table name.
pub const LOCK_TABLE: &str = "ddsl_lock";

pub(crate) const LOG_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS main.ddsl_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ddsl TEXT NOT NULL,
    executed_at TEXT NOT NULL,
    db_user TEXT,
    os_user TEXT
);
"#;

pub(crate) const LOCK_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS main.ddsl_lock (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    holder TEXT NOT NULL,
    acquired_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

/// Returns `true` for tables the driver owns.
pub(crate) fn is_bookkeeping(name: &str) -> bool {
    name == LOG_TABLE || name == LOCK_TABLE
}

/// Quotes a schema, table or column name for interpolation.
///
/// # Errors
///
/// Returns [`SqliteError::InvalidIdentifier`] for empty names or names
/// containing NUL.
pub fn quote_ident(name: &str) -> Result<String> {
    if name.is_empty() || name.contains('\0') {
        return Err(SqliteError::InvalidIdentifier(name.to_string()));
    }
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Converts a byte offset into `text` to a 1-based `(line, column)` pair.
/// Columns count characters, not bytes.
pub(crate) fn position(text: &str, offset: usize) -> (usize, usize) {
    let mut end = offset.min(text.len());
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    let before = &text[..end];
    let line = before.matches('\n').count() + 1;
    let line_start = before.rfind('\n').map_or(0, |i| i + 1);
    let column = before[line_start..].chars().count() + 1;
    (line, column)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("users").unwrap(), "\"users\"");
        assert_eq!(quote_ident("we\"ird").unwrap(), "\"we\"\"ird\"");
        assert!(matches!(quote_ident(""), Err(SqliteError::InvalidIdentifier(_))));
    }

    #[test]
    fn test_position() {
        let sql = "create table a (id int);\ncreate tablex b;";
        assert_eq!(position(sql, 0), (1, 1));
        assert_eq!(position(sql, 25), (2, 1));
        assert_eq!(position(sql, 32), (2, 8));
        assert_eq!(position(sql, 999), (2, 17));
    }

    #[test]
    fn test_position_counts_chars() {
        let sql = "select 'ä', x";
        let offset = sql.find('x').unwrap();
        assert_eq!(position(sql, offset), (1, 13));
    }

    #[test]
    fn test_bookkeeping_names() {
        assert!(is_bookkeeping("ddsl_log"));
        assert!(is_bookkeeping("ddsl_lock"));
        assert!(!is_bookkeeping("users"));
    }
}
