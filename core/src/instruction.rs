//! Primitive executable steps produced by the compiler.
//!
//! Each variant carries exactly the fields its handler needs. Instructions
//! are created once, appended in order and consumed once by the processor.

use std::fmt;

use serde::Serialize;

use crate::database::ItemKind;

/// A file in the source tree, pinned to the ref it was resolved against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SourceFile {
    /// `/`-separated path relative to the source root.
    pub path: String,
    pub source_ref: Option<String>,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, source_ref: Option<String>) -> Self {
        Self {
            path: path.into(),
            source_ref,
        }
    }
}

impl fmt::Display for SourceFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source_ref {
            Some(r) => write!(f, "{}#{r}", self.path),
            None => f.write_str(&self.path),
        }
    }
}

/// What a `list` instruction shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ListKind {
    Schemas,
    ForeignKeys,
    SchemaItems,
    Tables,
    Views,
    Functions,
    Procedures,
    Types,
}

impl ListKind {
    pub fn from_object(object: &str) -> Option<Self> {
        match object {
            "schemas" => Some(Self::Schemas),
            "foreign-keys" => Some(Self::ForeignKeys),
            "schema-items" => Some(Self::SchemaItems),
            "tables" => Some(Self::Tables),
            "views" => Some(Self::Views),
            "functions" => Some(Self::Functions),
            "procedures" => Some(Self::Procedures),
            "types" => Some(Self::Types),
            _ => None,
        }
    }

    /// Item kind filter for schema-item listings; `None` means all kinds.
    pub fn item_kind(self) -> Option<ItemKind> {
        match self {
            Self::Tables => Some(ItemKind::Table),
            Self::Views => Some(ItemKind::View),
            Self::Functions => Some(ItemKind::Function),
            Self::Procedures => Some(ItemKind::Procedure),
            Self::Types => Some(ItemKind::Type),
            Self::Schemas | Self::ForeignKeys | Self::SchemaItems => None,
        }
    }
}

impl fmt::Display for ListKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Schemas => "schemas",
            Self::ForeignKeys => "foreign-keys",
            Self::SchemaItems => "schema-items",
            Self::Tables => "tables",
            Self::Views => "views",
            Self::Functions => "functions",
            Self::Procedures => "procedures",
            Self::Types => "types",
        })
    }
}

/// One primitive step of a compiled batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Instruction {
    /// Marks (and audits) the DSL command the following steps came from.
    RunDdsl { text: String },
    ExecSqlFile { file: SourceFile },
    ExecSqlScript { sql: String },
    ExecShellFile { file: SourceFile },
    ExecShell { command: String, args: Vec<String> },
    ImportCsv {
        file: SourceFile,
        schema: String,
        table: String,
    },
    Begin,
    Commit,
    Rollback,
    EnterDdslFile { file: SourceFile },
    LeaveDdslFile { file: SourceFile },
    List { kind: ListKind, schemas: Vec<String> },
}

impl Instruction {
    /// Returns `true` for informational steps that never need a transaction.
    pub fn is_list(&self) -> bool {
        matches!(self, Self::List { .. })
    }

    /// The source file the step reads, if any.
    pub fn file(&self) -> Option<&SourceFile> {
        match self {
            Self::ExecSqlFile { file }
            | Self::ExecShellFile { file }
            | Self::ImportCsv { file, .. }
            | Self::EnterDdslFile { file }
            | Self::LeaveDdslFile { file } => Some(file),
            _ => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RunDdsl { text } => write!(f, "ddsl: {text}"),
            Self::ExecSqlFile { file } => write!(f, "execute sql file {file}"),
            Self::ExecSqlScript { sql } => write!(f, "execute sql script ({} bytes)", sql.len()),
            Self::ExecShellFile { file } => write!(f, "execute shell script {file}"),
            Self::ExecShell { command, args } => write!(f, "execute shell {command} {}", args.join(" ")),
            Self::ImportCsv {
                file,
                schema,
                table,
            } => write!(f, "import csv {file} into {schema}.{table}"),
            Self::Begin => f.write_str("begin transaction"),
            Self::Commit => f.write_str("commit transaction"),
            Self::Rollback => f.write_str("rollback transaction"),
            Self::EnterDdslFile { file } => write!(f, "enter ddsl file {file}"),
            Self::LeaveDdslFile { file } => write!(f, "leave ddsl file {file}"),
            Self::List { kind, schemas } => write!(f, "list {kind} in [{}]", schemas.join(", ")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_accessor() {
        let file = SourceFile::new("schemas/a/seeds/users.csv", None);
        let ins = Instruction::ImportCsv {
            file: file.clone(),
            schema: "a".into(),
            table: "users".into(),
        };
        assert_eq!(ins.file(), Some(&file));
        assert!(!ins.is_list());
        assert_eq!(Instruction::Begin.file(), None);
    }

    #[test]
    fn test_display_includes_ref() {
        let ins = Instruction::ExecSqlFile {
            file: SourceFile::new("roles.create.sql", Some("v2".into())),
        };
        assert_eq!(ins.to_string(), "execute sql file roles.create.sql#v2");
    }

    #[test]
    fn test_serializes_with_type_tag() {
        let ins = Instruction::List {
            kind: ListKind::SchemaItems,
            schemas: vec!["a".into()],
        };
        let json = serde_json::to_value(&ins).unwrap();
        assert_eq!(json["type"], "list");
        assert_eq!(json["kind"], "schema-items");
    }

    #[test]
    fn test_list_kind_item_filter() {
        assert_eq!(ListKind::from_object("views").and_then(ListKind::item_kind), Some(ItemKind::View));
        assert_eq!(ListKind::SchemaItems.item_kind(), None);
        assert_eq!(ListKind::from_object("nope"), None);
    }
}
