//! Rendering for `list` results.

use serde::{Deserialize, Serialize};

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum OutputFormat {
    /// Aligned columns with a header row.
    #[default]
    Text,
    Csv,
    /// Array of objects keyed by column name.
    Json,
}

/// A header row plus string cells.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: &[&str]) -> Self {
        Self {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }
}

/// Formats a table in the requested output format.
pub fn format_table(table: &Table, format: OutputFormat) -> Result<String, String> {
    match format {
        OutputFormat::Text => Ok(table_to_text(table)),
        OutputFormat::Csv => table_to_csv(table),
        OutputFormat::Json => table_to_json(table),
    }
}

fn table_to_text(table: &Table) -> String {
    let mut widths: Vec<usize> = table.headers.iter().map(|h| h.chars().count()).collect();
    for row in &table.rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(cell.chars().count());
            }
        }
    }

    let line = |cells: &[String]| {
        let padded: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(cell, w)| format!("{cell:<w$}"))
            .collect();
        padded.join("  ").trim_end().to_string()
    };

    let mut out = String::new();
    out.push_str(&line(&table.headers));
    out.push('\n');
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    out.push_str(&rule.join("  "));
    out.push('\n');
    for row in &table.rows {
        out.push_str(&line(row));
        out.push('\n');
    }
    out.push_str(&format!("({} rows)\n", table.rows.len()));
    out
}

fn table_to_csv(table: &Table) -> Result<String, String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(&table.headers)
        .map_err(|e| format!("CSV serialization failed: {e}"))?;
    for row in &table.rows {
        writer
            .write_record(row)
            .map_err(|e| format!("CSV serialization failed: {e}"))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| format!("CSV serialization failed: {e}"))?;
    String::from_utf8(bytes).map_err(|e| format!("CSV serialization failed: {e}"))
}

fn table_to_json(table: &Table) -> Result<String, String> {
    let objects: Vec<serde_json::Value> = table
        .rows
        .iter()
        .map(|row| {
            let map: serde_json::Map<String, serde_json::Value> = table
                .headers
                .iter()
                .zip(row)
                .map(|(h, v)| (h.clone(), serde_json::Value::String(v.clone())))
                .collect();
            serde_json::Value::Object(map)
        })
        .collect();
    let mut out = serde_json::to_string_pretty(&objects).map_err(|e| format!("JSON serialization failed: {e}"))?;
    out.push('\n');
    Ok(out)
}
