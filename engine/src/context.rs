//! Per-session execution state shared by the compiler and the processor.

use std::collections::BTreeSet;

use ddsl_core::{Instruction, Location};

use crate::config::RunConfig;
use crate::error::ConfigError;
use crate::output::OutputFormat;

/// Run settings plus the instruction list being built and consumed.
///
/// The compiler appends to the list, the processor drains it. The open
/// database handle lives next to the context in
/// [`Session`](crate::Session), not inside it.
#[derive(Debug, Clone)]
pub struct Context {
    pub source: Option<Location>,
    pub database: Option<Location>,
    pub auto_transaction: bool,
    pub dry_run: bool,
    pub format: OutputFormat,
    /// Whether the processor currently holds an open transaction.
    pub in_transaction: bool,
    /// Nested ddsl file depth while processing.
    pub depth: usize,
    instructions: Vec<Instruction>,
    attempted: BTreeSet<String>,
    non_list: bool,
}

impl Default for Context {
    fn default() -> Self {
        Self {
            source: None,
            database: None,
            auto_transaction: true,
            dry_run: false,
            format: OutputFormat::default(),
            in_transaction: false,
            depth: 0,
            instructions: Vec::new(),
            attempted: BTreeSet::new(),
            non_list: false,
        }
    }
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a context from run settings. Locations are optional here;
    /// [`Session::open`](crate::Session::open) insists on both.
    pub fn from_config(config: &RunConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            source: config.source.as_deref().map(str::parse::<Location>).transpose()?,
            database: config.database.as_deref().map(str::parse::<Location>).transpose()?,
            auto_transaction: config.auto_transaction,
            dry_run: config.dry_run,
            format: config.format,
            ..Self::default()
        })
    }

    /// Appends compiled steps.
    pub fn extend(&mut self, steps: impl IntoIterator<Item = Instruction>) {
        for step in steps {
            self.non_list |= !step.is_list();
            self.instructions.push(step);
        }
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Drains the pending list.
    pub fn take_instructions(&mut self) -> Vec<Instruction> {
        self.non_list = false;
        std::mem::take(&mut self.instructions)
    }

    /// Drops everything appended after `len`.
    pub fn truncate(&mut self, len: usize) {
        self.instructions.truncate(len);
        self.non_list = self.instructions.iter().any(|i| !i.is_list());
    }

    /// Returns `true` if a pending step needs a transaction.
    pub fn saw_non_list(&self) -> bool {
        self.non_list
    }

    pub fn clear_attempts(&mut self) {
        self.attempted.clear();
    }

    pub fn record_attempts<I, S>(&mut self, patterns: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attempted.extend(patterns.into_iter().map(Into::into));
    }

    /// Patterns tried by the last top-level command, sorted.
    pub fn attempted(&self) -> impl Iterator<Item = &str> {
        self.attempted.iter().map(String::as_str)
    }
}
