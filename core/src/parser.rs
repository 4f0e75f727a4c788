//! Statement splitting, tokenizing and grammar matching.
//!
//! Input is one statement per line, or several on one line separated by
//! `;`. Backtick literals may span lines and are carried verbatim. Lines
//! starting with `--` are comments.
//!
//! # Example
//!
//! ```
//! use ddsl_core::{Clause, Parser, grammar};
//!
//! let parser = Parser::new(grammar());
//! let cmds = parser.parse("create tables except in audit,staging #release-2").unwrap();
//! assert_eq!(cmds.len(), 1);
//! assert_eq!(cmds[0].object.as_deref(), Some("tables"));
//! assert_eq!(cmds[0].clause, Some(Clause::ExceptIn));
//! assert_eq!(cmds[0].names("schema-names"), ["audit", "staging"]);
//! assert_eq!(cmds[0].source_ref.as_deref(), Some("release-2"));
//! ```

use std::iter::Peekable;
use std::str::Chars;
use std::sync::LazyLock;

use regex::Regex;

use crate::command::{ArgValue, Clause, ExtArg, ParsedCommand, split_qualified};
use crate::error::ParseError;
use crate::grammar::{ArgDef, ArgKind, Grammar, NodeId, Property};

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_$-]*$").expect("valid name regex"));

/// Lexical class of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Identifier, comma list or path. Becomes a keyword when it matches a
    /// child of the current grammar node.
    Word,
    /// A single `schema.item` pair.
    Qualified,
    Integer,
    /// Backtick literal (delimiters stripped).
    Raw,
    /// `#ref` (marker stripped).
    Ref,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
}

impl Token {
    fn word(text: String) -> Self {
        let kind = if text.starts_with('#') {
            TokenKind::Ref
        } else if !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()) {
            TokenKind::Integer
        } else if !text.contains(',') && !text.contains('/') && split_qualified(&text).is_some() {
            TokenKind::Qualified
        } else {
            TokenKind::Word
        };
        let text = match kind {
            TokenKind::Ref => text[1..].to_string(),
            _ => text,
        };
        Self { kind, text }
    }
}

/// One statement cut out of the input, before tokenizing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub text: String,
    pub line: usize,
}

/// Matches statements against a [`Grammar`].
#[derive(Debug, Clone, Copy)]
pub struct Parser<'g> {
    grammar: &'g Grammar,
}

impl<'g> Parser<'g> {
    pub fn new(grammar: &'g Grammar) -> Self {
        Self { grammar }
    }

    /// Parses every statement in `input`.
    ///
    /// Fails on the first statement that does not match; nothing is
    /// returned for the statements before it.
    pub fn parse(&self, input: &str) -> Result<Vec<ParsedCommand>, ParseError> {
        split_statements(input)?
            .iter()
            .map(|stmt| self.parse_statement(stmt))
            .collect()
    }

    /// Parses a single statement.
    pub fn parse_statement(&self, stmt: &Statement) -> Result<ParsedCommand, ParseError> {
        let line = stmt.line;
        let mut tokens = tokenize(&stmt.text, line)?;

        let source_ref = if tokens.last().is_some_and(|t| t.kind == TokenKind::Ref) {
            tokens.pop().map(|t| t.text)
        } else {
            None
        };
        if source_ref.as_deref() == Some("") {
            return Err(ParseError::EmptyRef { line });
        }

        let mut tokens = tokens.into_iter();
        let first = tokens.next().ok_or(ParseError::UnknownCommand {
            command: String::new(),
            line,
        })?;
        let mut node = match first.kind {
            TokenKind::Word => self.grammar.root(&first.text),
            _ => None,
        }
        .ok_or_else(|| ParseError::UnknownCommand {
            command: first.text.clone(),
            line,
        })?;

        let mut path = vec![self.grammar.node(node).name.clone()];
        let mut args = Vec::new();
        let mut next_arg = 0;

        for token in tokens {
            let def = self.grammar.node(node);
            if next_arg < def.args.len() {
                args.push(take_arg(&def.args[next_arg], token, &path.join(" "), line)?);
                next_arg += 1;
                continue;
            }

            let child = match token.kind {
                TokenKind::Word => self.grammar.child(node, &token.text),
                _ => None,
            };
            match child {
                Some(child) => {
                    node = child;
                    path.push(self.grammar.node(child).name.clone());
                    next_arg = 0;
                }
                None => {
                    let token = match token.kind {
                        TokenKind::Raw => format!("`{}`", token.text),
                        TokenKind::Ref => format!("#{}", token.text),
                        _ => token.text,
                    };
                    return Err(ParseError::UnexpectedToken {
                        token,
                        after: path.join(" "),
                        expected: self.expected(node, false),
                        line,
                    });
                }
            }
        }

        let def = self.grammar.node(node);
        if let Some(missing) = def.args.get(next_arg) {
            return Err(ParseError::MissingArgument {
                command: path.join(" "),
                argument: missing.name.clone(),
                line,
            });
        }
        if !self.grammar.is_complete(node) {
            return Err(ParseError::Incomplete {
                command: path.join(" "),
                expected: self.expected(node, true),
                line,
            });
        }

        let (object, clause) = self.object_and_clause(node, &path);

        Ok(ParsedCommand {
            root: path[0].clone(),
            path,
            object,
            clause,
            args,
            source_ref,
            text: stmt.text.clone(),
            line,
        })
    }

    /// Finds the deepest primary node on the path and reads the clause from
    /// the keywords below it.
    fn object_and_clause(&self, terminal: NodeId, path: &[String]) -> (Option<String>, Option<Clause>) {
        let mut current = Some(terminal);
        while let Some(id) = current {
            let def = self.grammar.node(id);
            if def.has(Property::Primary) {
                let below = &path[def.level + 1..];
                return (Some(def.name.clone()), Clause::from_keywords(below));
            }
            current = self.grammar.parent(id);
        }
        (None, None)
    }

    fn expected(&self, node: NodeId, required_only: bool) -> String {
        let names: Vec<_> = self
            .grammar
            .children(node)
            .map(|c| self.grammar.node(c))
            .filter(|c| !required_only || !c.has(Property::Optional))
            .map(|c| c.name.as_str())
            .collect();
        if names.is_empty() {
            "end of command".to_string()
        } else {
            names.join(", ")
        }
    }
}

fn take_arg(def: &ArgDef, token: Token, after: &str, line: usize) -> Result<ExtArg, ParseError> {
    let unexpected = |token: &Token| ParseError::UnexpectedToken {
        token: token.text.clone(),
        after: after.to_string(),
        expected: format!("<{}>", def.name),
        line,
    };

    let value = match def.kind {
        ArgKind::Names | ArgKind::QualifiedNames => {
            if matches!(token.kind, TokenKind::Raw | TokenKind::Ref) {
                return Err(unexpected(&token));
            }
            let names = token
                .text
                .split(',')
                .map(|name| validate_name(def.kind, name, line))
                .collect::<Result<Vec<_>, _>>()?;
            ArgValue::List(names)
        }
        ArgKind::SqlText => match token.kind {
            TokenKind::Raw => ArgValue::Raw(token.text),
            TokenKind::Word | TokenKind::Qualified => ArgValue::Path(token.text),
            _ => return Err(unexpected(&token)),
        },
        ArgKind::ShellText => match token.kind {
            TokenKind::Raw => ArgValue::Raw(token.text),
            _ => return Err(unexpected(&token)),
        },
    };

    Ok(ExtArg {
        slot: def.name.clone(),
        value,
    })
}

fn validate_name(kind: ArgKind, name: &str, line: usize) -> Result<String, ParseError> {
    let malformed = |reason| ParseError::MalformedName {
        name: name.to_string(),
        reason,
        line,
    };

    if name.is_empty() {
        return Err(malformed("empty list element"));
    }
    if kind == ArgKind::Names {
        if !NAME_RE.is_match(name) {
            return Err(malformed("not an identifier"));
        }
        return Ok(name.to_string());
    }

    let (schema, item) = split_qualified(name).ok_or_else(|| malformed("expected schema.item"))?;
    for part in [schema, item] {
        if part != "?" && !NAME_RE.is_match(part) {
            return Err(malformed("not an identifier"));
        }
    }
    Ok(name.to_string())
}

/// Splits input into statements on newlines and `;`, honoring backtick
/// literals and skipping blank lines and `--` comments.
pub fn split_statements(input: &str) -> Result<Vec<Statement>, ParseError> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut chars = input.chars().peekable();
    let mut line = 1;
    let mut start_line = 1;
    let mut raw_line = None;

    while let Some(ch) = chars.next() {
        if raw_line.is_none() {
            if ch == '-' && chars.peek() == Some(&'-') && current.trim().is_empty() {
                skip_line(&mut chars);
                continue;
            }
            if ch == '\n' || ch == ';' {
                flush(&mut statements, &mut current, start_line);
                if ch == '\n' {
                    line += 1;
                }
                start_line = line;
                continue;
            }
        }

        if ch == '`' {
            raw_line = match raw_line {
                Some(_) => None,
                None => Some(line),
            };
        }
        if ch == '\n' {
            line += 1;
        }
        if current.trim().is_empty() && !ch.is_whitespace() {
            start_line = line;
        }
        current.push(ch);
    }

    if let Some(line) = raw_line {
        return Err(ParseError::UnterminatedLiteral { line });
    }
    flush(&mut statements, &mut current, start_line);
    Ok(statements)
}

fn skip_line(chars: &mut Peekable<Chars<'_>>) {
    while let Some(&next) = chars.peek() {
        if next == '\n' {
            break;
        }
        chars.next();
    }
}

fn flush(statements: &mut Vec<Statement>, current: &mut String, line: usize) {
    let text = current.trim();
    if !text.is_empty() {
        statements.push(Statement {
            text: text.to_string(),
            line,
        });
    }
    current.clear();
}

/// Splits one statement into tokens on whitespace outside backtick literals.
pub fn tokenize(text: &str, line: usize) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();

    while let Some(&ch) = chars.peek() {
        if ch.is_whitespace() {
            chars.next();
            continue;
        }
        if ch == '`' {
            chars.next();
            let mut raw = String::new();
            let mut closed = false;
            for c in chars.by_ref() {
                if c == '`' {
                    closed = true;
                    break;
                }
                raw.push(c);
            }
            if !closed {
                return Err(ParseError::UnterminatedLiteral { line });
            }
            tokens.push(Token {
                kind: TokenKind::Raw,
                text: raw,
            });
            continue;
        }

        let mut word = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_whitespace() || c == '`' {
                break;
            }
            word.push(c);
            chars.next();
        }
        tokens.push(Token::word(word));
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::grammar;

    fn parse(input: &str) -> Result<Vec<ParsedCommand>, ParseError> {
        Parser::new(grammar()).parse(input)
    }

    fn one(input: &str) -> ParsedCommand {
        let mut cmds = parse(input).unwrap();
        assert_eq!(cmds.len(), 1, "expected one statement in {input:?}");
        cmds.remove(0)
    }

    #[test]
    fn test_singular_qualified_list() {
        let cmd = one("create table foo.bar,baz.qux");
        assert_eq!(cmd.root, "create");
        assert_eq!(cmd.object.as_deref(), Some("table"));
        assert_eq!(cmd.clause, None);
        assert_eq!(cmd.names("item-names"), ["foo.bar", "baz.qux"]);
        assert_eq!(cmd.terminal(), "table");
    }

    #[test]
    fn test_plural_with_clauses() {
        assert_eq!(one("drop tables").clause, None);
        let cmd = one("drop tables in a,b");
        assert_eq!(cmd.clause, Some(Clause::In));
        assert_eq!(cmd.names("schema-names"), ["a", "b"]);
        let cmd = one("create views except in a");
        assert_eq!(cmd.clause, Some(Clause::ExceptIn));
        assert_eq!(cmd.path, ["create", "views", "except", "in"]);
        let cmd = one("create schemas except a");
        assert_eq!(cmd.clause, Some(Clause::Except));
    }

    #[test]
    fn test_keywords_are_case_insensitive() {
        let cmd = one("CREATE Tables IN Foo");
        assert_eq!(cmd.root, "create");
        assert_eq!(cmd.path, ["create", "tables", "in"]);
        assert_eq!(cmd.names("schema-names"), ["Foo"]);
    }

    #[test]
    fn test_grant_object_below_intermediate_nodes() {
        let cmd = one("revoke privileges on tables except in audit");
        assert_eq!(cmd.root, "revoke");
        assert_eq!(cmd.object.as_deref(), Some("tables"));
        assert_eq!(cmd.clause, Some(Clause::ExceptIn));
    }

    #[test]
    fn test_seed_args_then_clause() {
        let cmd = one("seed schema app with users,roles");
        assert_eq!(cmd.object.as_deref(), Some("schema"));
        assert_eq!(cmd.clause, Some(Clause::With));
        assert_eq!(cmd.names("schema-names"), ["app"]);
        assert_eq!(cmd.names("seed-names"), ["users", "roles"]);
    }

    #[test]
    fn test_on_clause_wildcard() {
        let cmd = one("create indexes on foo_schema.?");
        assert_eq!(cmd.clause, Some(Clause::On));
        assert_eq!(cmd.names("item-names"), ["foo_schema.?"]);
    }

    #[test]
    fn test_multi_statement_batch() {
        let cmds = parse("begin; create types\n\n  commit transaction\n").unwrap();
        let roots: Vec<_> = cmds.iter().map(|c| c.root.as_str()).collect();
        assert_eq!(roots, ["begin", "create", "commit"]);
        assert_eq!(cmds[1].text, "create types");
        assert_eq!(cmds[2].line, 3);
    }

    #[test]
    fn test_comments_are_skipped() {
        let cmds = parse("-- setup; not a statement\ncreate roles\n  -- trailing note\n").unwrap();
        assert_eq!(cmds.len(), 1);
        assert_eq!(cmds[0].line, 2);
    }

    #[test]
    fn test_raw_literal_spans_lines() {
        let input = "sql `create table t (\n  id integer;\n  name text\n)`\nlist schemas";
        let cmds = parse(input).unwrap();
        assert_eq!(cmds.len(), 2);
        assert_eq!(
            cmds[0].arg("sql"),
            Some(&ArgValue::Raw("create table t (\n  id integer;\n  name text\n)".into()))
        );
        assert_eq!(cmds[1].line, 5);
    }

    #[test]
    fn test_sql_file_argument() {
        let cmd = one("sql scripts/fix-owner.sql");
        assert_eq!(cmd.arg("sql"), Some(&ArgValue::Path("scripts/fix-owner.sql".into())));
        let cmd = one("seed sql patch.sql");
        assert_eq!(cmd.object.as_deref(), Some("sql"));
        assert_eq!(cmd.arg("sql"), Some(&ArgValue::Path("patch.sql".into())));
    }

    #[test]
    fn test_seed_cmd_requires_raw() {
        let cmd = one("seed cmd `echo hi`");
        assert_eq!(cmd.arg("cmd"), Some(&ArgValue::Raw("echo hi".into())));
        assert!(matches!(
            parse("seed cmd echo").unwrap_err(),
            ParseError::UnexpectedToken { .. }
        ));
    }

    #[test]
    fn test_source_ref() {
        let cmd = one("create schema app #v1.2");
        assert_eq!(cmd.source_ref.as_deref(), Some("v1.2"));
        assert_eq!(
            parse("create roles #").unwrap_err(),
            ParseError::EmptyRef { line: 1 }
        );
        assert!(matches!(
            parse("create #main roles").unwrap_err(),
            ParseError::UnexpectedToken { .. }
        ));
    }

    #[test]
    fn test_unknown_command() {
        assert_eq!(
            parse("explode everything").unwrap_err(),
            ParseError::UnknownCommand {
                command: "explode".into(),
                line: 1
            }
        );
    }

    #[test]
    fn test_unexpected_token_lists_choices() {
        let err = parse("create tablez").unwrap_err();
        match err {
            ParseError::UnexpectedToken { token, expected, .. } => {
                assert_eq!(token, "tablez");
                assert!(expected.contains("tables"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_incomplete_and_missing_argument() {
        assert!(matches!(
            parse("create").unwrap_err(),
            ParseError::Incomplete { .. }
        ));
        assert!(matches!(
            parse("create indexes").unwrap_err(),
            ParseError::Incomplete { .. }
        ));
        assert!(matches!(
            parse("create table").unwrap_err(),
            ParseError::MissingArgument { .. }
        ));
        assert!(matches!(
            parse("create tables in").unwrap_err(),
            ParseError::MissingArgument { .. }
        ));
    }

    #[test]
    fn test_malformed_qualified_names() {
        for input in ["create table foo", "create table foo.", "create table a.b.c", "create table a.b,,c.d"] {
            assert!(
                matches!(parse(input).unwrap_err(), ParseError::MalformedName { .. }),
                "{input} should be malformed"
            );
        }
        assert!(matches!(
            parse("create tables in a,,b").unwrap_err(),
            ParseError::MalformedName { .. }
        ));
    }

    #[test]
    fn test_unterminated_literal() {
        assert_eq!(
            parse("create roles\nsql `select 1;\n").unwrap_err(),
            ParseError::UnterminatedLiteral { line: 2 }
        );
    }

    #[test]
    fn test_trailing_tokens_rejected() {
        assert!(matches!(
            parse("create roles now").unwrap_err(),
            ParseError::UnexpectedToken { .. }
        ));
    }

    #[test]
    fn test_list_and_transaction_commands() {
        let cmd = one("list foreign-keys");
        assert!(cmd.is_list());
        assert_eq!(cmd.object.as_deref(), Some("foreign-keys"));
        let cmd = one("begin transaction");
        assert_eq!(cmd.object, None);
        assert_eq!(cmd.path, ["begin", "transaction"]);
    }

    #[test]
    fn test_list_filters() {
        let cmd = one("list schemas in a,b");
        assert_eq!(cmd.clause, Some(Clause::In));
        assert_eq!(cmd.names("schema-names"), ["a", "b"]);
        let cmd = one("list schemas except in a");
        assert_eq!(cmd.clause, Some(Clause::ExceptIn));
        assert_eq!(cmd.names("schema-names"), ["a"]);
        let cmd = one("list foreign-keys in a");
        assert_eq!(cmd.clause, Some(Clause::In));
        let cmd = one("list foreign-keys except in a,b");
        assert_eq!(cmd.path, ["list", "foreign-keys", "except", "in"]);
        assert_eq!(one("list tables except in a").clause, Some(Clause::ExceptIn));
    }

    #[test]
    fn test_token_classes() {
        let tokens = tokenize("seed table a.b with 001,x `raw text` #main", 1).unwrap();
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            [
                TokenKind::Word,
                TokenKind::Word,
                TokenKind::Qualified,
                TokenKind::Word,
                TokenKind::Word,
                TokenKind::Raw,
                TokenKind::Ref,
            ]
        );
        assert_eq!(tokenize("42", 1).unwrap()[0].kind, TokenKind::Integer);
    }

    #[test]
    fn test_integer_names_are_valid_seed_names() {
        let cmd = one("seed database with 001");
        assert_eq!(cmd.names("seed-names"), ["001"]);
    }
}
