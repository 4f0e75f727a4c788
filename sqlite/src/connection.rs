//! The [`Database`] implementation over a rusqlite connection.

use std::path::Path;

use ddsl_core::{
    AuditEntry, CsvOptions, Database, DbError, ForeignKey, ItemKind, Location, SchemaItem,
};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, ErrorCode, params};
use tracing::debug;

use crate::catalog;
use crate::error::{Result, SqliteError};
use crate::import;
use crate::schema::{LOCK_TABLE_SQL, LOG_TABLE_SQL, position, quote_ident};

/// Path that opens a private in-memory database.
pub const MEMORY: &str = ":memory:";

/// A SQLite connection driven by DDSL.
///
/// Transactions are issued as plain `BEGIN`/`COMMIT`/`ROLLBACK` so that SQL
/// files may also manage them; the transaction state is read back from
/// SQLite's autocommit flag rather than tracked separately.
///
/// # Examples
///
/// ```
/// use ddsl_core::Database;
/// use ddsl_sqlite::SqliteDatabase;
///
/// let mut db = SqliteDatabase::open_in_memory().unwrap();
/// db.begin().unwrap();
/// db.exec("CREATE TABLE users (id INTEGER PRIMARY KEY);").unwrap();
/// db.commit().unwrap();
///
/// let items = db.schema_items("main", None).unwrap();
/// assert_eq!(items[0].name, "users");
/// ```
#[derive(Debug)]
pub struct SqliteDatabase {
    conn: Option<Connection>,
    locked: bool,
}

impl SqliteDatabase {
    /// Opens (creating if needed) the database file at `path`, or a private
    /// in-memory database for [`MEMORY`].
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::DatabaseError`] if SQLite cannot open the file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = if path.as_os_str() == MEMORY {
            Connection::open_in_memory()?
        } else {
            Connection::open(path)?
        };
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        debug!(path = %path.display(), "Opened SQLite database");
        Ok(Self {
            conn: Some(conn),
            locked: false,
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(MEMORY)
    }

    /// Opens the database named by a `sqlite://path` location.
    pub fn from_location(location: &Location) -> Result<Self> {
        Self::open(&location.path)
    }

    /// Attaches another database file as schema `name`.
    pub fn attach(&mut self, name: &str, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref().to_string_lossy().into_owned();
        self.conn()?
            .execute(&format!("ATTACH DATABASE ?1 AS {}", quote_ident(name)?), params![path])?;
        Ok(())
    }

    /// The underlying connection, for callers that need raw access.
    pub fn connection(&self) -> Result<&Connection> {
        self.conn()
    }

    fn conn(&self) -> Result<&Connection> {
        self.conn.as_ref().ok_or(SqliteError::Closed)
    }

    fn exec_batch(&self, sql: &str) -> Result<()> {
        self.conn()?.execute_batch(sql).map_err(|e| statement_error(sql, e))
    }

    fn lock_inner(&mut self) -> Result<()> {
        if self.locked {
            return Err(SqliteError::Lock("lock already held by this connection".into()));
        }
        let conn = self.conn()?;
        conn.execute_batch(LOCK_TABLE_SQL)?;
        let holder = format!("pid {}", std::process::id());
        match conn.execute("INSERT INTO main.ddsl_lock (id, holder) VALUES (1, ?1)", params![holder]) {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                let (owner, since): (String, String) = conn.query_row(
                    "SELECT holder, acquired_at FROM main.ddsl_lock WHERE id = 1",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )?;
                return Err(SqliteError::Lock(format!("database is locked by {owner} since {since}")));
            }
            Err(e) => return Err(e.into()),
        }
        self.locked = true;
        debug!(holder, "Acquired advisory lock");
        Ok(())
    }

    fn unlock_inner(&mut self) -> Result<()> {
        if !self.locked {
            return Err(SqliteError::Lock("lock is not held".into()));
        }
        self.conn()?.execute("DELETE FROM main.ddsl_lock WHERE id = 1", [])?;
        self.locked = false;
        debug!("Released advisory lock");
        Ok(())
    }

    fn query_inner(&self, sql: &str) -> Result<Vec<Vec<Option<String>>>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql).map_err(|e| statement_error(sql, e))?;
        let width = stmt.column_count();
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(match row.get_ref(i)? {
                    ValueRef::Null => None,
                    ValueRef::Integer(v) => Some(v.to_string()),
                    ValueRef::Real(v) => Some(v.to_string()),
                    ValueRef::Text(v) | ValueRef::Blob(v) => Some(String::from_utf8_lossy(v).into_owned()),
                });
            }
            out.push(values);
        }
        Ok(out)
    }
}

/// Maps a statement failure to an error positioned within `full`.
///
/// SQLite reports offsets relative to the statement being prepared, which
/// is always a suffix of the submitted text.
fn statement_error(full: &str, err: rusqlite::Error) -> SqliteError {
    let (message, offset) = match &err {
        rusqlite::Error::SqlInputError { msg, sql, offset, .. } => {
            let base = full.len().saturating_sub(sql.len());
            (msg.clone(), usize::try_from(*offset).ok().map(|o| base + o))
        }
        other => (other.to_string(), None),
    };
    let (line, column) = match offset {
        Some(offset) => {
            let (line, column) = position(full, offset);
            (Some(line), Some(column))
        }
        None => (None, None),
    };
    SqliteError::Statement {
        message,
        line,
        column,
    }
}

impl Database for SqliteDatabase {
    fn lock(&mut self) -> std::result::Result<(), DbError> {
        Ok(self.lock_inner()?)
    }

    fn unlock(&mut self) -> std::result::Result<(), DbError> {
        Ok(self.unlock_inner()?)
    }

    fn begin(&mut self) -> std::result::Result<(), DbError> {
        if self.in_transaction() {
            return Err(SqliteError::Transaction("a transaction is already open".into()).into());
        }
        Ok(self.exec_batch("BEGIN")?)
    }

    fn commit(&mut self) -> std::result::Result<(), DbError> {
        if !self.in_transaction() {
            return Err(SqliteError::Transaction("no transaction is open".into()).into());
        }
        Ok(self.exec_batch("COMMIT")?)
    }

    fn rollback(&mut self) -> std::result::Result<(), DbError> {
        if !self.in_transaction() {
            return Err(SqliteError::Transaction("no transaction is open".into()).into());
        }
        Ok(self.exec_batch("ROLLBACK")?)
    }

    fn in_transaction(&self) -> bool {
        self.conn.as_ref().is_some_and(|c| !c.is_autocommit())
    }

    fn exec(&mut self, sql: &str) -> std::result::Result<(), DbError> {
        Ok(self.exec_batch(sql)?)
    }

    fn query(&self, sql: &str) -> std::result::Result<Vec<Vec<Option<String>>>, DbError> {
        Ok(self.query_inner(sql)?)
    }

    fn import_csv(
        &mut self,
        path: &Path,
        schema: &str,
        table: &str,
        options: CsvOptions,
    ) -> std::result::Result<usize, DbError> {
        Ok(import::import_csv(self.conn()?, path, schema, table, options)?)
    }

    fn schema_names(&self) -> std::result::Result<Vec<String>, DbError> {
        Ok(catalog::schema_names(self.conn()?)?)
    }

    fn foreign_keys(&self) -> std::result::Result<Vec<ForeignKey>, DbError> {
        Ok(catalog::foreign_keys(self.conn()?)?)
    }

    fn schema_items(&self, schema: &str, kind: Option<ItemKind>) -> std::result::Result<Vec<SchemaItem>, DbError> {
        Ok(catalog::schema_items(self.conn()?, schema, kind)?)
    }

    fn current_user(&self) -> std::result::Result<Option<String>, DbError> {
        // SQLite has no database users.
        Ok(None)
    }

    fn record_audit(&mut self, entry: &AuditEntry) -> std::result::Result<(), DbError> {
        let conn = self.conn()?;
        conn.execute_batch(LOG_TABLE_SQL).map_err(SqliteError::from)?;
        conn.execute(
            "INSERT INTO main.ddsl_log (ddsl, executed_at, db_user, os_user) VALUES (?1, ?2, ?3, ?4)",
            params![entry.ddsl, entry.executed_at, entry.db_user, entry.os_user],
        )
        .map_err(SqliteError::from)?;
        Ok(())
    }

    fn close(&mut self) -> std::result::Result<(), DbError> {
        let conn = self.conn.take().ok_or(SqliteError::Closed)?;
        conn.close().map_err(|(_, e)| SqliteError::from(e))?;
        debug!("Closed SQLite database");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> SqliteDatabase {
        SqliteDatabase::open_in_memory().unwrap()
    }

    #[test]
    fn test_transaction_state() {
        let mut db = db();
        assert!(!db.in_transaction());
        assert!(matches!(db.commit(), Err(DbError::Transaction(_))));
        db.begin().unwrap();
        assert!(db.in_transaction());
        assert!(matches!(db.begin(), Err(DbError::Transaction(_))));
        db.exec("CREATE TABLE t (id INTEGER);").unwrap();
        db.rollback().unwrap();
        assert!(!db.in_transaction());
        assert!(db.schema_items("main", None).unwrap().is_empty());
    }

    #[test]
    fn test_statement_error_position() {
        let mut db = db();
        let err = db
            .exec("CREATE TABLE a (id INTEGER);\nCREATE TABLEX b (id INTEGER);")
            .unwrap_err();
        match err {
            DbError::Statement { line, column, .. } => {
                assert_eq!(line, Some(2));
                assert_eq!(column, Some(8));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_runtime_error_has_no_position() {
        let mut db = db();
        db.exec("CREATE TABLE t (id INTEGER PRIMARY KEY);").unwrap();
        let err = db.exec("INSERT INTO t VALUES (1); INSERT INTO t VALUES (1);").unwrap_err();
        assert!(matches!(err, DbError::Statement { line: None, .. }));
    }

    #[test]
    fn test_lock_is_not_reentrant() {
        let mut db = db();
        db.lock().unwrap();
        assert!(matches!(db.lock(), Err(DbError::Lock(_))));
        db.unlock().unwrap();
        assert!(matches!(db.unlock(), Err(DbError::Lock(_))));
        db.lock().unwrap();
    }

    #[test]
    fn test_lock_across_connections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.db");
        let mut first = SqliteDatabase::open(&path).unwrap();
        let mut second = SqliteDatabase::open(&path).unwrap();
        first.lock().unwrap();
        let err = second.lock().unwrap_err();
        assert!(err.to_string().contains("locked by pid"));
        first.unlock().unwrap();
        second.lock().unwrap();
    }

    #[test]
    fn test_query_rows() {
        let mut db = db();
        db.exec("CREATE TABLE t (a INTEGER, b TEXT, c REAL); INSERT INTO t VALUES (1, 'x', NULL);")
            .unwrap();
        let rows = db.query("SELECT a, b, c FROM t").unwrap();
        assert_eq!(rows, vec![vec![Some("1".to_string()), Some("x".to_string()), None]]);
    }

    #[test]
    fn test_audit_record() {
        let mut db = db();
        db.record_audit(&AuditEntry {
            ddsl: "create tables".into(),
            executed_at: "2024-01-01T00:00:00Z".into(),
            db_user: None,
            os_user: Some("ops".into()),
        })
        .unwrap();
        let rows = db.query("SELECT ddsl, os_user FROM ddsl_log").unwrap();
        assert_eq!(rows[0], [Some("create tables".to_string()), Some("ops".to_string())]);
    }

    #[test]
    fn test_attach_adds_schema() {
        let mut db = db();
        db.attach("audit", MEMORY).unwrap();
        assert_eq!(db.schema_names().unwrap(), ["audit", "main"]);
    }

    #[test]
    fn test_close() {
        let mut db = db();
        db.close().unwrap();
        assert!(matches!(db.schema_names(), Err(DbError::Driver(_))));
        assert!(db.close().is_err());
    }
}
