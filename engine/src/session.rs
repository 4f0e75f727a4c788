//! One open source + database pair with its execution context.

use std::io::Write;

use ddsl_core::{Database, Grammar, Instruction, ParsedCommand, Parser, Registry, grammar};
use tracing::{debug, warn};

use crate::compiler::Compiler;
use crate::config::RunConfig;
use crate::context::Context;
use crate::error::{CompileError, Result};
use crate::processor::Processor;
use crate::sources::Sources;

/// Parses, compiles and executes DDSL text.
///
/// Compilation is all-or-nothing per call: if any statement fails to parse
/// or compile, nothing from that call is queued. Execution drains the queue.
///
/// ```no_run
/// use ddsl_core::Registry;
/// use ddsl_engine::{RunConfig, Session};
///
/// let mut registry = Registry::new();
/// ddsl_source::register(&mut registry);
/// ddsl_sqlite::register(&mut registry);
///
/// let config = RunConfig {
///     source: Some("./db".into()),
///     database: Some("sqlite://app.db".into()),
///     ..RunConfig::default()
/// };
/// let mut session = Session::open(&config, &registry).unwrap();
/// session.run("create schemas; create tables", &mut std::io::stdout()).unwrap();
/// session.close().unwrap();
/// ```
pub struct Session {
    ctx: Context,
    sources: Sources,
    db: Box<dyn Database>,
    grammar: &'static Grammar,
}

impl Session {
    /// Opens the configured source and database through `registry`.
    pub fn open(config: &RunConfig, registry: &Registry) -> Result<Self> {
        let ctx = Context::from_config(config)?;
        let source = config.source_location()?;
        let database = config.database_location()?;
        let db = registry.open_database(&database)?;
        debug!(source = %source, database = %database, "session opened");
        Ok(Self::new(ctx, Sources::new(registry.clone(), source), db))
    }

    /// Assembles a session from parts already opened.
    pub fn new(ctx: Context, sources: Sources, db: Box<dyn Database>) -> Self {
        Self {
            ctx,
            sources,
            db,
            grammar: grammar(),
        }
    }

    /// Parses and compiles `text`, queueing the resulting instructions.
    /// Returns the number queued.
    pub fn compile(&mut self, text: &str) -> Result<usize> {
        let commands = Parser::new(self.grammar).parse(text)?;
        let mark = self.ctx.instructions().len();
        let mut total = 0;
        for cmd in &commands {
            match self.compile_command(cmd) {
                Ok(count) => total += count,
                Err(err) => {
                    self.ctx.truncate(mark);
                    return Err(err.into());
                }
            }
        }
        Ok(total)
    }

    fn compile_command(&mut self, cmd: &ParsedCommand) -> std::result::Result<usize, CompileError> {
        let tree = self.sources.get(cmd.source_ref.as_deref())?;
        Compiler::new(self.grammar, tree.as_ref())
            .with_database(self.db.as_ref())
            .with_ref(cmd.source_ref.as_deref())
            .compile(&mut self.ctx, cmd)
    }

    /// Executes the queued instructions, writing `list` output to `out`.
    ///
    /// Outside dry-run, a batch with side effects runs under the database's
    /// advisory lock. The lock is released whether or not the batch succeeds.
    pub fn execute(&mut self, out: &mut dyn Write) -> Result<usize> {
        let locking = !self.ctx.dry_run && self.ctx.saw_non_list();
        if locking {
            if let Err(err) = self.db.lock() {
                self.ctx.take_instructions();
                return Err(err.into());
            }
        }

        let result = Processor::new(&mut self.ctx, self.db.as_mut(), &self.sources, out).run();

        if locking {
            if let Err(err) = self.db.unlock() {
                if result.is_ok() {
                    return Err(err.into());
                }
                warn!(error = %err, "failed to release lock");
            }
        }
        Ok(result?)
    }

    /// Compiles then executes `text`. Nothing runs if compilation fails.
    pub fn run(&mut self, text: &str, out: &mut dyn Write) -> Result<usize> {
        self.compile(text)?;
        self.execute(out)
    }

    /// Instructions queued and not yet executed.
    pub fn instructions(&self) -> &[Instruction] {
        self.ctx.instructions()
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.ctx
    }

    pub fn database(&self) -> &dyn Database {
        self.db.as_ref()
    }

    pub fn database_mut(&mut self) -> &mut dyn Database {
        self.db.as_mut()
    }

    /// Closes the database, rolling back a transaction left open by an
    /// explicit `begin`.
    pub fn close(mut self) -> Result<()> {
        if self.db.in_transaction() {
            warn!("rolling back transaction left open at close");
            self.db.rollback()?;
        }
        self.db.close()?;
        Ok(())
    }
}
