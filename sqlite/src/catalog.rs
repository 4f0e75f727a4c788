//! Catalog introspection.
//!
//! SQLite schemas are the attached databases (`main` plus anything added
//! with `ATTACH`). Only tables and views exist as schema items; the other
//! item kinds always list empty.

use ddsl_core::{ForeignKey, ItemKind, SchemaItem};
use rusqlite::Connection;

use crate::error::Result;
use crate::schema::{is_bookkeeping, quote_ident};

/// Names of attached databases except `temp`, sorted.
pub(crate) fn schema_names(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("PRAGMA database_list")?;
    let mut names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    names.retain(|name| name != "temp");
    names.sort();
    Ok(names)
}

/// Tables and views in `schema`, sorted by name.
pub(crate) fn schema_items(conn: &Connection, schema: &str, kind: Option<ItemKind>) -> Result<Vec<SchemaItem>> {
    let wanted: &[&str] = match kind {
        None => &["table", "view"],
        Some(ItemKind::Table) => &["table"],
        Some(ItemKind::View) => &["view"],
        Some(ItemKind::Function | ItemKind::Procedure | ItemKind::Type) => return Ok(Vec::new()),
    };

    let sql = format!(
        "SELECT name, type FROM {}.sqlite_master \
         WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' ORDER BY name",
        quote_ident(schema)?
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(rows
        .into_iter()
        .filter(|(name, ty)| wanted.contains(&ty.as_str()) && !(schema == "main" && is_bookkeeping(name)))
        .map(|(name, ty)| SchemaItem {
            schema: schema.to_string(),
            name,
            kind: if ty == "view" { ItemKind::View } else { ItemKind::Table },
        })
        .collect())
}

/// Foreign keys of every table in every schema, sorted.
pub(crate) fn foreign_keys(conn: &Connection) -> Result<Vec<ForeignKey>> {
    let mut keys = Vec::new();
    for schema in schema_names(conn)? {
        let quoted = quote_ident(&schema)?;
        for table in schema_items(conn, &schema, Some(ItemKind::Table))? {
            let sql = format!("PRAGMA {quoted}.foreign_key_list({})", quote_ident(&table.name)?);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                ))
            })?;
            for row in rows {
                let (parent_table, child_column, parent_column) = row?;
                keys.push(ForeignKey {
                    child_schema: schema.clone(),
                    child_table: table.name.clone(),
                    child_column,
                    // References cannot leave the attached database.
                    parent_schema: schema.clone(),
                    parent_table,
                    parent_column: parent_column.unwrap_or_default(),
                });
            }
        }
    }
    keys.sort();
    Ok(keys)
}
