//! Processor: runs compiled instructions against a database.
//!
//! Steps run one at a time in list order. In auto-transaction mode a batch
//! holding any non-list step is wrapped in a transaction: it commits at the
//! end and rolls back on the first failing step. In dry-run mode every
//! side effect is logged under the `ddsl::dry_run` target instead of
//! performed; `list` steps still query the database, they change nothing.
//!
//! Audit rows are written on the batch's own connection, so a batch that
//! rolls back leaves no audit row behind.

use std::io::Write;
use std::process::Command;

use ddsl_core::{AuditEntry, CsvOptions, Database, Instruction, ListKind, SourceFile};
use tracing::{debug, info, warn};

use crate::context::Context;
use crate::error::{ExecutionError, TransactionStateError};
use crate::output::{Table, format_table};
use crate::sources::Sources;

/// Environment variable naming the source location for shell seeds.
pub const SOURCE_ENV: &str = "DDSL_SOURCE";
/// Environment variable naming the database location for shell seeds.
pub const DATABASE_ENV: &str = "DDSL_DATABASE";

const DRY_RUN: &str = "ddsl::dry_run";

/// Drains the context's instruction list and executes it.
pub struct Processor<'a> {
    ctx: &'a mut Context,
    db: &'a mut dyn Database,
    sources: &'a Sources,
    out: &'a mut dyn Write,
}

impl<'a> Processor<'a> {
    pub fn new(ctx: &'a mut Context, db: &'a mut dyn Database, sources: &'a Sources, out: &'a mut dyn Write) -> Self {
        Self { ctx, db, sources, out }
    }

    /// Runs every pending instruction. Returns the number executed.
    ///
    /// # Errors
    ///
    /// Stops at the first failing step. If this run opened the transaction
    /// it is rolled back before the error is returned.
    pub fn run(&mut self) -> Result<usize, ExecutionError> {
        let implicit = self.ctx.auto_transaction && self.ctx.saw_non_list();
        let steps = self.ctx.take_instructions();
        self.ctx.depth = 0;
        debug!(steps = steps.len(), implicit, dry_run = self.ctx.dry_run, "processing batch");

        if implicit {
            self.begin()?;
        }
        for step in &steps {
            if let Err(err) = self.step(step) {
                if implicit {
                    self.abort();
                }
                return Err(err);
            }
        }
        if implicit {
            if let Err(err) = self.commit() {
                self.abort();
                return Err(err);
            }
        }
        Ok(steps.len())
    }

    fn step(&mut self, step: &Instruction) -> Result<(), ExecutionError> {
        match step {
            Instruction::RunDdsl { text } => self.run_ddsl(text),
            Instruction::ExecSqlFile { file } => self.exec_sql_file(file),
            Instruction::ExecSqlScript { sql } => self.exec_sql("sql script", sql),
            Instruction::ExecShellFile { file } => self.exec_shell_file(file),
            Instruction::ExecShell { command, args } => self.exec_shell(command, args),
            Instruction::ImportCsv { file, schema, table } => self.import_csv(file, schema, table),
            Instruction::Begin => self.begin(),
            Instruction::Commit => self.commit(),
            Instruction::Rollback => self.rollback(),
            Instruction::EnterDdslFile { file } => {
                info!("{}> {file}", self.indent());
                self.ctx.depth += 1;
                Ok(())
            }
            Instruction::LeaveDdslFile { file } => {
                self.ctx.depth = self.ctx.depth.saturating_sub(1);
                info!("{}< {file}", self.indent());
                Ok(())
            }
            Instruction::List { kind, schemas } => self.list(*kind, schemas),
        }
    }

    fn indent(&self) -> String {
        "  ".repeat(self.ctx.depth)
    }

    fn run_ddsl(&mut self, text: &str) -> Result<(), ExecutionError> {
        info!("{}{text}", self.indent());
        if self.ctx.dry_run {
            return Ok(());
        }

        let entry = AuditEntry {
            ddsl: text.to_string(),
            executed_at: chrono::Utc::now().to_rfc3339(),
            db_user: self.db.current_user().ok().flatten(),
            os_user: std::env::var("USER").or_else(|_| std::env::var("USERNAME")).ok(),
        };
        if let Err(err) = self.db.record_audit(&entry) {
            warn!(error = %err, command = text, "failed to record audit entry");
        }
        Ok(())
    }

    fn exec_sql_file(&mut self, file: &SourceFile) -> Result<(), ExecutionError> {
        if self.ctx.dry_run {
            info!(target: DRY_RUN, "DRY-RUN execute sql file {file}");
            return Ok(());
        }
        let sql = self.sources.get(file.source_ref.as_deref())?.read_to_string(&file.path)?;
        self.exec_sql(&file.to_string(), &sql)
    }

    fn exec_sql(&mut self, origin: &str, sql: &str) -> Result<(), ExecutionError> {
        if self.ctx.dry_run {
            info!(target: DRY_RUN, "DRY-RUN execute {origin} ({} bytes)", sql.len());
            return Ok(());
        }
        debug!(origin, bytes = sql.len(), "executing sql");
        self.db.exec(sql).map_err(|source| ExecutionError::Sql {
            origin: origin.to_string(),
            source,
        })
    }

    fn exec_shell_file(&mut self, file: &SourceFile) -> Result<(), ExecutionError> {
        if self.ctx.dry_run {
            info!(target: DRY_RUN, "DRY-RUN run shell script {file}");
            return Ok(());
        }
        let path = self.sources.get(file.source_ref.as_deref())?.local_path(&file.path)?;
        self.exec_shell("sh", &[path.to_string_lossy().into_owned()])
    }

    fn exec_shell(&mut self, command: &str, args: &[String]) -> Result<(), ExecutionError> {
        let shown = std::iter::once(command)
            .chain(args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");
        if self.ctx.dry_run {
            info!(target: DRY_RUN, "DRY-RUN run shell {shown}");
            return Ok(());
        }

        let mut child = Command::new(command);
        child.args(args);
        if let Some(source) = &self.ctx.source {
            child.env(SOURCE_ENV, source.to_string());
        }
        if let Some(database) = &self.ctx.database {
            child.env(DATABASE_ENV, database.to_string());
        }
        debug!(command = %shown, "running shell command");
        let output = child.output().map_err(|source| ExecutionError::Spawn {
            command: shown.clone(),
            source,
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        for line in stdout.lines() {
            info!("{}| {line}", self.indent());
        }
        if !output.status.success() {
            return Err(ExecutionError::Shell {
                command: shown,
                status: output.status.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }
        for line in stderr.lines() {
            warn!("{}| {line}", self.indent());
        }
        Ok(())
    }

    fn import_csv(&mut self, file: &SourceFile, schema: &str, table: &str) -> Result<(), ExecutionError> {
        if self.ctx.dry_run {
            info!(target: DRY_RUN, "DRY-RUN import {file} into {schema}.{table}");
            return Ok(());
        }
        let path = self.sources.get(file.source_ref.as_deref())?.local_path(&file.path)?;
        let rows = self
            .db
            .import_csv(&path, schema, table, CsvOptions::default())
            .map_err(|source| ExecutionError::Import {
                file: file.to_string(),
                source,
            })?;
        info!(rows, "{}imported {file} into {schema}.{table}", self.indent());
        Ok(())
    }

    fn begin(&mut self) -> Result<(), ExecutionError> {
        if self.ctx.in_transaction {
            return Err(TransactionStateError::AlreadyOpen.into());
        }
        if self.ctx.dry_run {
            info!(target: DRY_RUN, "DRY-RUN begin transaction");
        } else {
            self.db.begin()?;
            debug!("transaction opened");
        }
        self.ctx.in_transaction = true;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), ExecutionError> {
        if !self.ctx.in_transaction {
            return Err(TransactionStateError::NotOpen.into());
        }
        if self.ctx.dry_run {
            info!(target: DRY_RUN, "DRY-RUN commit transaction");
        } else {
            self.db.commit()?;
            debug!("transaction committed");
        }
        self.ctx.in_transaction = false;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), ExecutionError> {
        if !self.ctx.in_transaction {
            return Err(TransactionStateError::NotOpen.into());
        }
        if self.ctx.dry_run {
            info!(target: DRY_RUN, "DRY-RUN rollback transaction");
        } else {
            self.db.rollback()?;
            info!("transaction rolled back");
        }
        self.ctx.in_transaction = false;
        Ok(())
    }

    /// Rolls back the implicit transaction after a failure.
    fn abort(&mut self) {
        if !self.ctx.in_transaction {
            return;
        }
        if let Err(err) = self.rollback() {
            warn!(error = %err, "rollback after failure did not complete");
            self.ctx.in_transaction = false;
        }
    }

    fn list(&mut self, kind: ListKind, schemas: &[String]) -> Result<(), ExecutionError> {
        let table = match kind {
            ListKind::Schemas => {
                let mut table = Table::new(&["schema"]);
                for schema in schemas {
                    table.push(vec![schema.clone()]);
                }
                table
            }
            ListKind::ForeignKeys => {
                let mut table = Table::new(&[
                    "child_schema",
                    "child_table",
                    "child_column",
                    "parent_schema",
                    "parent_table",
                    "parent_column",
                ]);
                for key in self.db.foreign_keys()? {
                    if schemas.contains(&key.child_schema) {
                        table.push(vec![
                            key.child_schema,
                            key.child_table,
                            key.child_column,
                            key.parent_schema,
                            key.parent_table,
                            key.parent_column,
                        ]);
                    }
                }
                table
            }
            _ => {
                let mut table = Table::new(&["schema", "name", "kind"]);
                for schema in schemas {
                    for item in self.db.schema_items(schema, kind.item_kind())? {
                        table.push(vec![item.schema, item.name, item.kind.to_string()]);
                    }
                }
                table
            }
        };

        let text = format_table(&table, self.ctx.format).map_err(ExecutionError::Output)?;
        self.out
            .write_all(text.as_bytes())
            .map_err(|e| ExecutionError::Output(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use ddsl_core::{Location, Registry};
    use ddsl_sqlite::SqliteDatabase;

    use super::*;
    use crate::output::OutputFormat;

    fn sources(dir: &tempfile::TempDir) -> Sources {
        let mut registry = Registry::new();
        ddsl_source::register(&mut registry);
        let base: Location = dir.path().display().to_string().parse().unwrap();
        Sources::new(registry, base)
    }

    fn run(ctx: &mut Context, db: &mut SqliteDatabase, sources: &Sources) -> (Result<usize, ExecutionError>, String) {
        let mut out = Vec::new();
        let result = Processor::new(ctx, db, sources, &mut out).run();
        (result, String::from_utf8(out).unwrap())
    }

    fn table_names(db: &SqliteDatabase) -> Vec<String> {
        db.schema_items("main", None)
            .unwrap()
            .into_iter()
            .map(|i| i.name)
            .collect()
    }

    #[test]
    fn test_implicit_transaction_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let sources = sources(&dir);
        let mut db = SqliteDatabase::open_in_memory().unwrap();
        let mut ctx = Context::new();
        ctx.extend([
            Instruction::ExecSqlScript {
                sql: "CREATE TABLE t (id INTEGER);".into(),
            },
            Instruction::ExecSqlScript {
                sql: "INSERT INTO missing VALUES (1);".into(),
            },
        ]);

        let (result, _) = run(&mut ctx, &mut db, &sources);
        assert!(matches!(result, Err(ExecutionError::Sql { .. })));
        assert!(!ctx.in_transaction);
        assert!(!db.in_transaction());
        assert!(table_names(&db).is_empty());
    }

    #[test]
    fn test_failed_nested_run_resets_depth() {
        let dir = tempfile::tempdir().unwrap();
        let sources = sources(&dir);
        let mut db = SqliteDatabase::open_in_memory().unwrap();
        let mut ctx = Context::new();
        let file = SourceFile::new("seeds/nested.ddsl", None);
        ctx.extend([
            Instruction::EnterDdslFile { file: file.clone() },
            Instruction::ExecSqlScript {
                sql: "INSERT INTO missing VALUES (1);".into(),
            },
            Instruction::LeaveDdslFile { file },
        ]);
        let (result, _) = run(&mut ctx, &mut db, &sources);
        assert!(result.is_err());
        assert_eq!(ctx.depth, 1);

        ctx.extend([Instruction::ExecSqlScript {
            sql: "CREATE TABLE t (id INTEGER);".into(),
        }]);
        let (result, _) = run(&mut ctx, &mut db, &sources);
        assert_eq!(result.unwrap(), 1);
        assert_eq!(ctx.depth, 0);
    }

    #[test]
    fn test_explicit_transaction_state_errors() {
        let dir = tempfile::tempdir().unwrap();
        let sources = sources(&dir);
        let mut db = SqliteDatabase::open_in_memory().unwrap();
        let mut ctx = Context::new();
        ctx.auto_transaction = false;
        ctx.dry_run = true;

        ctx.extend([Instruction::Commit]);
        let (result, _) = run(&mut ctx, &mut db, &sources);
        assert!(matches!(
            result,
            Err(ExecutionError::Transaction(TransactionStateError::NotOpen))
        ));

        ctx.extend([Instruction::Begin, Instruction::Begin]);
        let (result, _) = run(&mut ctx, &mut db, &sources);
        assert!(matches!(
            result,
            Err(ExecutionError::Transaction(TransactionStateError::AlreadyOpen))
        ));
        assert!(ctx.in_transaction);
        assert!(!db.in_transaction());
    }

    #[test]
    fn test_list_writes_table() {
        let dir = tempfile::tempdir().unwrap();
        let sources = sources(&dir);
        let mut db = SqliteDatabase::open_in_memory().unwrap();
        db.exec("CREATE TABLE users (id INTEGER); CREATE VIEW names AS SELECT id FROM users;")
            .unwrap();
        let mut ctx = Context::new();
        ctx.format = OutputFormat::Csv;
        ctx.extend([Instruction::List {
            kind: ListKind::SchemaItems,
            schemas: vec!["main".into()],
        }]);

        let (result, out) = run(&mut ctx, &mut db, &sources);
        assert_eq!(result.unwrap(), 1);
        assert_eq!(out, "schema,name,kind\nmain,names,view\nmain,users,table\n");
    }

    #[test]
    fn test_dry_run_skips_shell() {
        let dir = tempfile::tempdir().unwrap();
        let sources = sources(&dir);
        let mut db = SqliteDatabase::open_in_memory().unwrap();
        let mut ctx = Context::new();
        ctx.dry_run = true;
        ctx.extend([Instruction::ExecShell {
            command: "sh".into(),
            args: vec!["-c".into(), "exit 1".into()],
        }]);

        let (result, _) = run(&mut ctx, &mut db, &sources);
        assert_eq!(result.unwrap(), 1);
        assert!(!ctx.in_transaction);
    }

    #[test]
    fn test_shell_failure_reports_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let sources = sources(&dir);
        let mut db = SqliteDatabase::open_in_memory().unwrap();
        let mut ctx = Context::new();
        ctx.extend([Instruction::ExecShell {
            command: "sh".into(),
            args: vec!["-c".into(), "echo broken >&2; exit 3".into()],
        }]);

        let (result, _) = run(&mut ctx, &mut db, &sources);
        match result {
            Err(ExecutionError::Shell { stderr, .. }) => assert_eq!(stderr, "broken"),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
