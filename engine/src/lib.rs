//! Compiler and interpreter for the DDSL schema command language.
//!
//! This crate turns parsed commands into instructions and runs them:
//!
//! - [`Compiler`] resolves each command against the source tree's path
//!   conventions and appends [`Instruction`](ddsl_core::Instruction)s to a
//!   [`Context`].
//! - [`Processor`] executes the queued instructions against a
//!   [`Database`](ddsl_core::Database), owning transaction discipline and
//!   dry-run behavior.
//! - [`Session`] ties a registry-opened source and database together and
//!   is what the `ddsl` binary drives.
//!
//! # Architecture
//!
//! - **`compiler`**: path pattern resolution, attachments, seeds, nesting
//! - **`processor`**: per-instruction handlers, audit, shell, CSV, `list`
//! - **`context`**: run settings plus the pending instruction list
//! - **`sources`**: source trees opened per `#ref`
//! - **`config`**: YAML run configuration
//! - **`output`**: text/CSV/JSON rendering of `list` results
//!
//! # Quick start
//!
//! ```no_run
//! use ddsl_core::Registry;
//! use ddsl_engine::{RunConfig, Session};
//!
//! let mut registry = Registry::new();
//! ddsl_source::register(&mut registry);
//! ddsl_sqlite::register(&mut registry);
//!
//! let config = RunConfig::load("ddsl.yml").unwrap();
//! let mut session = Session::open(&config, &registry).unwrap();
//! session.run("create database; create schemas; seed schemas", &mut std::io::stdout()).unwrap();
//! ```

pub mod compiler;
pub mod config;
pub mod context;
pub mod error;
pub mod output;
pub mod processor;
pub mod session;
pub mod sources;

pub use compiler::{Compiler, MAX_DEPTH};
pub use config::RunConfig;
pub use context::Context;
pub use error::{CompileError, ConfigError, Error, ExecutionError, Result, TransactionStateError};
pub use output::{OutputFormat, Table, format_table};
pub use processor::{DATABASE_ENV, Processor, SOURCE_ENV};
pub use session::Session;
pub use sources::Sources;
