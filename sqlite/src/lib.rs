//! SQLite driver for DDSL.
//!
//! [`SqliteDatabase`] implements [`Database`](ddsl_core::Database) over a
//! rusqlite connection. SQLite has a flat namespace per database file, so
//! schemas are modelled as attached databases: `main` is always present and
//! further schemas are added with `ATTACH DATABASE` (from a SQL file run
//! outside a transaction, or with [`SqliteDatabase::attach`]).
//!
//! # Architecture
//!
//! - **`connection`**: transactions, statement execution with line/column
//!   error positions, advisory lock and audit log
//! - **`catalog`**: schema, item and foreign-key introspection
//! - **`import`**: CSV loading
//! - **`schema`**: bookkeeping table DDL and identifier quoting
//!
//! # Quick start
//!
//! ```no_run
//! use ddsl_core::{Location, Registry};
//!
//! let mut registry = Registry::new();
//! ddsl_sqlite::register(&mut registry);
//!
//! let location: Location = "sqlite://app.db".parse().unwrap();
//! let mut db = registry.open_database(&location).unwrap();
//! db.exec("CREATE TABLE users (id INTEGER PRIMARY KEY);").unwrap();
//! ```

mod catalog;
mod connection;
mod error;
mod import;
mod schema;

pub use connection::{MEMORY, SqliteDatabase};
pub use error::{Result, SqliteError};
pub use schema::{LOCK_TABLE, LOG_TABLE, quote_ident};

use ddsl_core::{Database, DbError, Location, Registry, RegistryError};

/// URL scheme served by this driver.
pub const SCHEME: &str = "sqlite";

/// Opens a `sqlite://path` location as a boxed [`Database`].
pub fn open(location: &Location) -> std::result::Result<Box<dyn Database>, RegistryError> {
    let db = SqliteDatabase::from_location(location).map_err(DbError::from)?;
    Ok(Box::new(db))
}

/// Registers the `sqlite` scheme.
pub fn register(registry: &mut Registry) {
    registry.register_database(SCHEME, open);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_open_memory() {
        let mut registry = Registry::new();
        register(&mut registry);
        let location: Location = "sqlite://:memory:".parse().unwrap();
        let db = registry.open_database(&location).unwrap();
        assert_eq!(db.schema_names().unwrap(), ["main"]);
    }
}
