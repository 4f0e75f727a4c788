//! The database seam.
//!
//! A [`Database`] executes SQL text, manages one transaction at a time,
//! imports CSV files and answers catalog questions for `list` commands and
//! wildcard expansion.

use std::fmt;
use std::path::Path;

use serde::Serialize;

use crate::error::DbError;

/// Schema item categories reported by the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Table,
    View,
    Function,
    Procedure,
    Type,
}

impl ItemKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::View => "view",
            Self::Function => "function",
            Self::Procedure => "procedure",
            Self::Type => "type",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct SchemaItem {
    pub schema: String,
    pub name: String,
    pub kind: ItemKind,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ForeignKey {
    pub child_schema: String,
    pub child_table: String,
    pub child_column: String,
    pub parent_schema: String,
    pub parent_table: String,
    pub parent_column: String,
}

/// One row of the execution log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEntry {
    /// Command text as written.
    pub ddsl: String,
    /// RFC 3339 timestamp.
    pub executed_at: String,
    pub db_user: Option<String>,
    pub os_user: Option<String>,
}

/// Options for [`Database::import_csv`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsvOptions {
    pub delimiter: u8,
    pub has_header: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            has_header: true,
        }
    }
}

/// A database connection able to run DDSL instructions.
pub trait Database {
    /// Takes the exclusive run lock. Fails if another run holds it.
    fn lock(&mut self) -> Result<(), DbError>;

    fn unlock(&mut self) -> Result<(), DbError>;

    fn begin(&mut self) -> Result<(), DbError>;

    fn commit(&mut self) -> Result<(), DbError>;

    fn rollback(&mut self) -> Result<(), DbError>;

    fn in_transaction(&self) -> bool;

    /// Executes one or more SQL statements.
    fn exec(&mut self, sql: &str) -> Result<(), DbError>;

    /// Runs a query and returns rows of nullable text values.
    fn query(&self, sql: &str) -> Result<Vec<Vec<Option<String>>>, DbError>;

    /// Loads a CSV file into `schema.table`, returning the number of rows.
    fn import_csv(
        &mut self,
        path: &Path,
        schema: &str,
        table: &str,
        options: CsvOptions,
    ) -> Result<usize, DbError>;

    /// User schemas, sorted.
    fn schema_names(&self) -> Result<Vec<String>, DbError>;

    fn foreign_keys(&self) -> Result<Vec<ForeignKey>, DbError>;

    /// Items in `schema`, optionally restricted to one kind, sorted by name.
    fn schema_items(&self, schema: &str, kind: Option<ItemKind>) -> Result<Vec<SchemaItem>, DbError>;

    fn current_user(&self) -> Result<Option<String>, DbError>;

    fn record_audit(&mut self, entry: &AuditEntry) -> Result<(), DbError>;

    /// Releases the connection. Further calls fail.
    fn close(&mut self) -> Result<(), DbError>;
}
