//! Language layer of the DDSL schema command language.
//!
//! This crate holds everything that does not touch a real source tree or
//! database:
//!
//! - [`Grammar`]: the immutable command tree, built once from [`GRAMMAR`].
//! - [`Parser`]: splits input into statements and matches them against the
//!   grammar, producing [`ParsedCommand`] values.
//! - [`PatternKind`]: the convention-based path pattern table.
//! - [`Instruction`]: primitive steps produced by the compiler.
//! - [`SourceTree`], [`Database`] and [`Registry`]: the seams drivers plug
//!   into.
//!
//! # Example
//!
//! ```
//! use ddsl_core::{Parser, grammar};
//!
//! let parser = Parser::new(grammar());
//! let cmds = parser.parse("create schemas; seed table app.users with ref_data").unwrap();
//! assert_eq!(cmds.len(), 2);
//! assert_eq!(cmds[1].root, "seed");
//! assert_eq!(cmds[1].names("item-names"), ["app.users"]);
//! ```

pub mod command;
pub mod database;
pub mod error;
pub mod grammar;
pub mod instruction;
pub mod location;
pub mod parser;
pub mod pattern;
pub mod registry;
pub mod source;

pub use command::{ArgValue, Clause, ExtArg, ParsedCommand, split_qualified};
pub use database::{AuditEntry, CsvOptions, Database, ForeignKey, ItemKind, SchemaItem};
pub use error::{DbError, GrammarError, ParseError, PatternError, RegistryError, SourceError};
pub use grammar::{ArgDef, ArgKind, CommandDef, GRAMMAR, Grammar, NodeId, Property, grammar};
pub use instruction::{Instruction, ListKind, SourceFile};
pub use location::Location;
pub use parser::{Parser, Statement, Token, TokenKind, split_statements, tokenize};
pub use pattern::{PatternKind, Verb, WILDCARD};
pub use registry::Registry;
pub use source::{ANY_NAME, DirHandle, FileHandle, SourceTree};
