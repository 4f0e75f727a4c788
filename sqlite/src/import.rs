//! CSV import into an existing table.

use std::path::Path;

use ddsl_core::CsvOptions;
use rusqlite::{Connection, params_from_iter};
use tracing::debug;

use crate::error::{Result, SqliteError};
use crate::schema::quote_ident;

/// Inserts every record of the CSV file at `path` into `schema.table`.
///
/// With a header row the header names the target columns; without one the
/// values are inserted positionally. Empty fields are stored as NULL.
pub(crate) fn import_csv(
    conn: &Connection,
    path: &Path,
    schema: &str,
    table: &str,
    options: CsvOptions,
) -> Result<usize> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(options.delimiter)
        .has_headers(options.has_header)
        .from_path(path)?;

    let target = format!("{}.{}", quote_ident(schema)?, quote_ident(table)?);
    let columns = if options.has_header {
        let quoted = reader
            .headers()?
            .iter()
            .map(|h| quote_ident(h.trim()))
            .collect::<Result<Vec<_>>>()?;
        Some(quoted)
    } else {
        None
    };

    let mut count = 0;
    let mut prepared: Option<(usize, rusqlite::Statement<'_>)> = None;
    for record in reader.records() {
        let record = record?;
        let width = record.len();
        if prepared.as_ref().is_none_or(|(w, _)| *w != width) {
            prepared = Some((width, prepare_insert(conn, &target, columns.as_deref(), width)?));
        }
        let Some((_, stmt)) = prepared.as_mut() else {
            continue;
        };
        let values = record.iter().map(|field| (!field.is_empty()).then_some(field));
        stmt.execute(params_from_iter(values)).map_err(|e| SqliteError::Statement {
            message: format!("{}: record {}: {e}", path.display(), count + 1),
            line: None,
            column: None,
        })?;
        count += 1;
    }

    debug!(path = %path.display(), schema, table, rows = count, "Imported CSV");
    Ok(count)
}

fn prepare_insert<'c>(
    conn: &'c Connection,
    target: &str,
    columns: Option<&[String]>,
    width: usize,
) -> Result<rusqlite::Statement<'c>> {
    let placeholders = vec!["?"; width].join(", ");
    let sql = match columns {
        Some(cols) => format!("INSERT INTO {target} ({}) VALUES ({placeholders})", cols.join(", ")),
        None => format!("INSERT INTO {target} VALUES ({placeholders})"),
    };
    conn.prepare(&sql).map_err(|e| SqliteError::Statement {
        message: e.to_string(),
        line: None,
        column: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE users (id INTEGER, name TEXT, email TEXT);")
            .unwrap();
        conn
    }

    #[test]
    fn test_import_with_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.csv");
        fs::write(&path, "name,id\nalice,1\nbob,2\n").unwrap();

        let conn = conn();
        let n = import_csv(&conn, &path, "main", "users", CsvOptions::default()).unwrap();
        assert_eq!(n, 2);
        let name: String = conn
            .query_row("SELECT name FROM users WHERE id = 2", [], |r| r.get(0))
            .unwrap();
        assert_eq!(name, "bob");
    }

    #[test]
    fn test_import_without_header_and_nulls() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.csv");
        fs::write(&path, "1;alice;\n").unwrap();

        let conn = conn();
        let options = CsvOptions {
            delimiter: b';',
            has_header: false,
        };
        assert_eq!(import_csv(&conn, &path, "main", "users", options).unwrap(), 1);
        let email: Option<String> = conn.query_row("SELECT email FROM users", [], |r| r.get(0)).unwrap();
        assert_eq!(email, None);
    }

    #[test]
    fn test_import_reports_bad_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.csv");
        fs::write(&path, "nope\nx\n").unwrap();

        let err = import_csv(&conn(), &path, "main", "users", CsvOptions::default()).unwrap_err();
        assert!(matches!(err, SqliteError::Statement { .. }));
        assert!(err.to_string().contains("nope"));
    }
}
