//! Convention-based path patterns for every object kind.
//!
//! A pattern is a relative path template with `{schema}`, `{item}` and
//! `{verb}` placeholders. Once rendered, a directory segment may still be
//! `?` ("any immediate subdirectory") and the file segment may contain `?`
//! or `*` (a dot-free name) and `{a,b}` alternations. Wildcard expansion
//! happens in the compiler, which owns the source tree.
//!
//! ```
//! use ddsl_core::{PatternKind, Verb};
//!
//! let paths = PatternKind::Table.render(Some(Verb::Create), Some("app"), Some("users")).unwrap();
//! assert_eq!(paths, ["schemas/app/tables/users/table.create.sql"]);
//! ```

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::error::PatternError;

/// Placeholder value that matches any name during expansion.
pub const WILDCARD: &str = "?";

/// DDL verb substituted into `{verb}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verb {
    Create,
    Drop,
    Grant,
    Revoke,
}

impl Verb {
    /// Maps a root command to its verb.
    pub fn from_root(root: &str) -> Option<Self> {
        match root {
            "create" => Some(Self::Create),
            "drop" => Some(Self::Drop),
            "grant" => Some(Self::Grant),
            "revoke" => Some(Self::Revoke),
            _ => None,
        }
    }

    /// The privileges verb paired with a DDL verb (`create` grants, `drop` revokes).
    pub fn privileges(self) -> Self {
        match self {
            Self::Create | Self::Grant => Self::Grant,
            Self::Drop | Self::Revoke => Self::Revoke,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Drop => "drop",
            Self::Grant => "grant",
            Self::Revoke => "revoke",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Object kinds with a path pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternKind {
    Database,
    DatabasePrivs,
    Roles,
    Extensions,
    Schema,
    SchemaPrivs,
    Table,
    TablePrivs,
    Constraints,
    TableIndexes,
    ViewIndexes,
    Triggers,
    ForeignKeys,
    View,
    ViewPrivs,
    Function,
    FunctionPrivs,
    Procedure,
    ProcedurePrivs,
    Type,
    TypePrivs,
    DatabaseSeeds,
    SchemaSeeds,
    TableSeeds,
}

impl PatternKind {
    /// Relative path templates, in resolution order.
    pub fn templates(self) -> &'static [&'static str] {
        match self {
            Self::Database | Self::DatabasePrivs => &["database.{verb}.sql"],
            Self::Roles => &["roles.{verb}.sql"],
            Self::Extensions => &["extensions.{verb}.sql"],
            Self::Schema => &["schemas/{schema}/schema.{verb}.sql"],
            Self::SchemaPrivs => &["schemas/{schema}/privileges.{verb}.sql"],
            Self::Table => &["schemas/{schema}/tables/{item}/table.{verb}.sql"],
            Self::TablePrivs => &["schemas/{schema}/tables/{item}/privileges.{verb}.sql"],
            Self::Constraints => &["schemas/{schema}/tables/{item}/constraints.{verb}.sql"],
            Self::TableIndexes => &["schemas/{schema}/tables/{item}/indexes.{verb}.sql"],
            Self::ViewIndexes => &["schemas/{schema}/views/{item}/indexes.{verb}.sql"],
            Self::Triggers => &["schemas/{schema}/tables/{item}/triggers.{verb}.sql"],
            Self::ForeignKeys => &["schemas/{schema}/tables/?/foreign-keys.{verb}.sql"],
            Self::View => &["schemas/{schema}/views/{item}/view.{verb}.sql"],
            Self::ViewPrivs => &["schemas/{schema}/views/{item}/privileges.{verb}.sql"],
            Self::Function => &["schemas/{schema}/functions/{item}/function.{verb}.sql"],
            Self::FunctionPrivs => &["schemas/{schema}/functions/{item}/privileges.{verb}.sql"],
            Self::Procedure => &["schemas/{schema}/procedures/{item}/procedure.{verb}.sql"],
            Self::ProcedurePrivs => &["schemas/{schema}/procedures/{item}/privileges.{verb}.sql"],
            Self::Type | Self::TypePrivs => &["schemas/{schema}/types/{item}.{verb}.sql"],
            Self::DatabaseSeeds => &["seeds/*.{sql,sh,ddsl}"],
            Self::SchemaSeeds => &["schemas/{schema}/seeds/*.{sql,csv,sh,ddsl}"],
            Self::TableSeeds => &["schemas/{schema}/tables/{item}/seeds/*.{csv,sql}"],
        }
    }

    /// Returns `true` for the `*-privs` kinds used by grant/revoke.
    pub fn is_privileges(self) -> bool {
        matches!(
            self,
            Self::DatabasePrivs
                | Self::SchemaPrivs
                | Self::TablePrivs
                | Self::ViewPrivs
                | Self::FunctionPrivs
                | Self::ProcedurePrivs
                | Self::TypePrivs
        )
    }

    /// Substitutes placeholders in every template.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError::MissingValue`] when a template uses a
    /// placeholder that was not supplied.
    pub fn render(
        self,
        verb: Option<Verb>,
        schema: Option<&str>,
        item: Option<&str>,
    ) -> Result<Vec<String>, PatternError> {
        self.templates()
            .iter()
            .map(|template| {
                let mut out = template.to_string();
                for (placeholder, value) in [
                    ("schema", schema),
                    ("item", item),
                    ("verb", verb.map(Verb::as_str)),
                ] {
                    let token = format!("{{{placeholder}}}");
                    if !out.contains(&token) {
                        continue;
                    }
                    let value = value.ok_or(PatternError::MissingValue {
                        pattern: template.to_string(),
                        placeholder,
                    })?;
                    out = out.replace(&token, value);
                }
                Ok(out)
            })
            .collect()
    }
}

static ALTERNATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([^{}]*)\}").expect("valid alternation regex"));

/// Turns the file segment of a rendered pattern into an anchored name
/// matcher. `?` and `*` match a dot-free name, `{a,b}` matches either
/// alternative, everything else is literal.
pub fn name_regex(segment: &str) -> Result<Regex, PatternError> {
    let mut out = String::from("^");
    let mut last = 0;
    for caps in ALTERNATION_RE.captures_iter(segment) {
        let whole = caps.get(0).map(|m| m.range()).unwrap_or_default();
        out.push_str(&literal_with_wildcards(&segment[last..whole.start]));
        let alternatives: Vec<_> = caps[1].split(',').map(regex::escape).collect();
        out.push_str(&format!("(?:{})", alternatives.join("|")));
        last = whole.end;
    }
    out.push_str(&literal_with_wildcards(&segment[last..]));
    out.push('$');
    Regex::new(&out).map_err(|_| PatternError::InvalidFilePattern(segment.to_string()))
}

fn literal_with_wildcards(text: &str) -> String {
    text.split(['?', '*'])
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join("[^./]+")
}

/// Returns `true` if a directory or file segment needs expansion.
pub fn is_wildcard_segment(segment: &str) -> bool {
    segment.contains(['?', '*', '{'])
}

/// Extracts `(schema, item)` from a rendered schema-item path
/// (`schemas/S/<kind>/N/...` or `schemas/S/types/N.verb.sql`).
pub fn schema_item_of(path: &str) -> Option<(&str, &str)> {
    let mut segments = path.split('/');
    if segments.next()? != "schemas" {
        return None;
    }
    let schema = segments.next()?;
    segments.next()?;
    let item = segments.next()?;
    let item = item.split('.').next()?;
    if schema.is_empty() || item.is_empty() {
        return None;
    }
    Some((schema, item))
}

/// Base name of a path without any extension (`seeds/01_users.sql` -> `01_users`).
pub fn file_stem(path: &str) -> &str {
    let name = path.rsplit('/').next().unwrap_or(path);
    name.split('.').next().unwrap_or(name)
}

/// Extension of a path (`users.csv` -> `csv`).
pub fn file_extension(path: &str) -> Option<&str> {
    let name = path.rsplit('/').next().unwrap_or(path);
    name.rsplit_once('.').map(|(_, ext)| ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_substitutes_all_placeholders() {
        let paths = PatternKind::Constraints
            .render(Some(Verb::Drop), Some("s"), Some("t"))
            .unwrap();
        assert_eq!(paths, ["schemas/s/tables/t/constraints.drop.sql"]);

        let paths = PatternKind::Database.render(Some(Verb::Create), None, None).unwrap();
        assert_eq!(paths, ["database.create.sql"]);
    }

    #[test]
    fn test_render_requires_values() {
        let err = PatternKind::Table.render(Some(Verb::Create), Some("s"), None).unwrap_err();
        assert_eq!(
            err,
            PatternError::MissingValue {
                pattern: "schemas/{schema}/tables/{item}/table.{verb}.sql".into(),
                placeholder: "item",
            }
        );
    }

    #[test]
    fn test_seed_patterns_keep_alternation() {
        let paths = PatternKind::SchemaSeeds.render(None, Some("app"), None).unwrap();
        assert_eq!(paths, ["schemas/app/seeds/*.{sql,csv,sh,ddsl}"]);
    }

    #[test]
    fn test_privileges_verb() {
        assert_eq!(Verb::Create.privileges(), Verb::Grant);
        assert_eq!(Verb::Drop.privileges(), Verb::Revoke);
        assert!(PatternKind::TypePrivs.is_privileges());
        assert!(!PatternKind::Type.is_privileges());
    }

    #[test]
    fn test_name_regex() {
        let re = name_regex("*.{sql,csv}").unwrap();
        assert!(re.is_match("users.sql"));
        assert!(re.is_match("01_users.csv"));
        assert!(!re.is_match("users.sh"));
        assert!(!re.is_match("a.b.sql"));

        let re = name_regex("?.create.sql").unwrap();
        assert!(re.is_match("money.create.sql"));
        assert!(!re.is_match("money.drop.sql"));

        let re = name_regex("table.create.sql").unwrap();
        assert!(re.is_match("table.create.sql"));
        assert!(!re.is_match("tableXcreate.sql"));
    }

    #[test]
    fn test_schema_item_of() {
        assert_eq!(
            schema_item_of("schemas/app/tables/users/table.create.sql"),
            Some(("app", "users"))
        );
        assert_eq!(
            schema_item_of("schemas/app/types/money.create.sql"),
            Some(("app", "money"))
        );
        assert_eq!(schema_item_of("schemas/app/schema.create.sql"), None);
        assert_eq!(schema_item_of("database.create.sql"), None);
    }

    #[test]
    fn test_file_name_helpers() {
        assert_eq!(file_stem("schemas/a/seeds/users.csv"), "users");
        assert_eq!(file_extension("schemas/a/seeds/users.csv"), Some("csv"));
        assert_eq!(file_extension("Makefile"), None);
    }
}
