//! Parsed command values produced by the [`Parser`](crate::Parser).

use std::fmt;

use serde::Serialize;

/// Filter clause following the object keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Clause {
    In,
    Except,
    ExceptIn,
    On,
    With,
    Without,
}

impl Clause {
    /// Maps the keyword chain after the object node to a clause.
    pub fn from_keywords(keywords: &[String]) -> Option<Self> {
        let joined = keywords
            .iter()
            .map(|k| k.to_ascii_lowercase())
            .collect::<Vec<_>>()
            .join(" ");
        match joined.as_str() {
            "in" => Some(Self::In),
            "except" => Some(Self::Except),
            "except in" => Some(Self::ExceptIn),
            "on" => Some(Self::On),
            "with" => Some(Self::With),
            "without" => Some(Self::Without),
            _ => None,
        }
    }

    /// `except`, `except in` and `without` drop the listed names.
    pub fn is_exclusion(self) -> bool {
        matches!(self, Self::Except | Self::ExceptIn | Self::Without)
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::In => "in",
            Self::Except => "except",
            Self::ExceptIn => "except in",
            Self::On => "on",
            Self::With => "with",
            Self::Without => "without",
        })
    }
}

/// Value captured for one argument slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "kind", content = "value")]
pub enum ArgValue {
    /// Comma-delimited names, split and validated.
    List(Vec<String>),
    /// Backtick literal, verbatim.
    Raw(String),
    /// Source-relative file path.
    Path(String),
}

/// An argument slot and its captured value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtArg {
    pub slot: String,
    pub value: ArgValue,
}

/// Result of parsing one statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedCommand {
    /// Root verb (`create`, `drop`, `seed`, ...), lowercase.
    pub root: String,
    /// Keyword chain from the root to the terminal node, lowercase.
    pub path: Vec<String>,
    /// Deepest `primary` node on the path.
    pub object: Option<String>,
    pub clause: Option<Clause>,
    pub args: Vec<ExtArg>,
    /// Branch/tag-like pointer into the source tree.
    pub source_ref: Option<String>,
    /// Statement text as written.
    pub text: String,
    /// 1-based line where the statement starts.
    pub line: usize,
}

impl ParsedCommand {
    /// Name of the terminal node matched.
    pub fn terminal(&self) -> &str {
        self.path.last().map(String::as_str).unwrap_or(&self.root)
    }

    pub fn arg(&self, slot: &str) -> Option<&ArgValue> {
        self.args.iter().find(|a| a.slot == slot).map(|a| &a.value)
    }

    /// Names captured for a list slot; empty when the slot is absent.
    pub fn names(&self, slot: &str) -> &[String] {
        match self.arg(slot) {
            Some(ArgValue::List(names)) => names,
            _ => &[],
        }
    }

    /// Returns `true` for informational commands.
    pub fn is_list(&self) -> bool {
        self.root == "list"
    }
}

impl fmt::Display for ParsedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Splits `schema.item` into its two parts.
///
/// Returns `None` unless there are exactly two non-empty parts.
pub fn split_qualified(name: &str) -> Option<(&str, &str)> {
    let mut parts = name.split('.');
    let schema = parts.next()?;
    let item = parts.next()?;
    if parts.next().is_some() || schema.is_empty() || item.is_empty() {
        return None;
    }
    Some((schema, item))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clause_from_keywords() {
        let kw = |s: &str| s.split(' ').map(String::from).collect::<Vec<_>>();
        assert_eq!(Clause::from_keywords(&kw("except in")), Some(Clause::ExceptIn));
        assert_eq!(Clause::from_keywords(&kw("IN")), Some(Clause::In));
        assert_eq!(Clause::from_keywords(&[]), None);
        assert!(Clause::Except.is_exclusion());
        assert!(!Clause::With.is_exclusion());
    }

    #[test]
    fn test_split_qualified() {
        assert_eq!(split_qualified("foo.bar"), Some(("foo", "bar")));
        assert_eq!(split_qualified("foo.?"), Some(("foo", "?")));
        assert_eq!(split_qualified("foo"), None);
        assert_eq!(split_qualified("foo."), None);
        assert_eq!(split_qualified(".bar"), None);
        assert_eq!(split_qualified("a.b.c"), None);
    }
}
