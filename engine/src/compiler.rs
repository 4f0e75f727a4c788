//! Preprocessor: compiles parsed commands into instructions.
//!
//! Each file-producing command first emits [`Instruction::RunDdsl`] and then
//! one step per file its path patterns resolve to. A command that resolves
//! nothing appends nothing and fails with [`CompileError::NoMatch`], listing
//! every pattern it tried.
//!
//! Ordering rules:
//!
//! - explicit name lists keep the order they were written in;
//! - resolved sets (all schemas, wildcard expansion) are sorted;
//! - `create` of a table, view, function, procedure, type or schema attaches
//!   its secondary files (constraints, indexes, privileges) right after the
//!   primary file;
//! - `create tables` emits foreign keys after every table of every schema,
//!   `drop tables` before any table.
//!
//! # Example
//!
//! ```no_run
//! use ddsl_core::{Location, Parser, grammar};
//! use ddsl_engine::{Compiler, Context};
//!
//! let location: Location = "./db".parse().unwrap();
//! let tree = ddsl_source::LocalTree::open(&location).unwrap();
//! let cmd = &Parser::new(grammar()).parse("create table app.users").unwrap()[0];
//!
//! let mut ctx = Context::new();
//! let count = Compiler::new(grammar(), &tree).compile(&mut ctx, cmd).unwrap();
//! assert_eq!(count, ctx.instructions().len());
//! ```

use ddsl_core::pattern::{file_extension, file_stem, is_wildcard_segment, name_regex, schema_item_of};
use ddsl_core::source::join;
use ddsl_core::{
    ANY_NAME, ArgValue, Clause, Database, Grammar, Instruction, ListKind, ParsedCommand, Parser, PatternError,
    PatternKind, SourceFile, SourceTree, Verb, WILDCARD, split_qualified,
};
use regex::Regex;
use tracing::{debug, trace};

use crate::context::Context;
use crate::error::{CompileError, TransactionStateError};

/// Deepest allowed chain of `.ddsl` seed files including each other.
pub const MAX_DEPTH: usize = 16;

const SCHEMAS_DIR: &str = "schemas";

/// Schema item categories that share the singular/plural command shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemClass {
    Table,
    View,
    Function,
    Procedure,
    Type,
}

impl ItemClass {
    /// Class and whether the object is the schema-filtered plural form.
    fn from_object(object: &str) -> Option<(Self, bool)> {
        let class = match object {
            "table" | "tables" => Self::Table,
            "view" | "views" => Self::View,
            "function" | "functions" => Self::Function,
            "procedure" | "procedures" => Self::Procedure,
            "type" | "types" => Self::Type,
            _ => return None,
        };
        Some((class, object.ends_with('s')))
    }

    fn primary(self) -> PatternKind {
        match self {
            Self::Table => PatternKind::Table,
            Self::View => PatternKind::View,
            Self::Function => PatternKind::Function,
            Self::Procedure => PatternKind::Procedure,
            Self::Type => PatternKind::Type,
        }
    }

    fn privileges(self) -> PatternKind {
        match self {
            Self::Table => PatternKind::TablePrivs,
            Self::View => PatternKind::ViewPrivs,
            Self::Function => PatternKind::FunctionPrivs,
            Self::Procedure => PatternKind::ProcedurePrivs,
            Self::Type => PatternKind::TypePrivs,
        }
    }

    /// Kinds compiled after a successful create, in order.
    fn attachments(self) -> &'static [PatternKind] {
        match self {
            Self::Table => &[
                PatternKind::Constraints,
                PatternKind::TableIndexes,
                PatternKind::TablePrivs,
            ],
            Self::View => &[PatternKind::ViewIndexes, PatternKind::ViewPrivs],
            Self::Function => &[PatternKind::FunctionPrivs],
            Self::Procedure => &[PatternKind::ProcedurePrivs],
            Self::Type => &[PatternKind::TypePrivs],
        }
    }

    /// Directory under `schemas/S/` holding items of this class.
    fn dir(self) -> &'static str {
        match self {
            Self::Table => "tables",
            Self::View => "views",
            Self::Function => "functions",
            Self::Procedure => "procedures",
            Self::Type => "types",
        }
    }

    /// Item placeholder matching every item of a schema. Types are files,
    /// everything else is a directory.
    fn any_item(self) -> &'static str {
        match self {
            Self::Type => "*",
            _ => WILDCARD,
        }
    }
}

/// Steps and patterns gathered for one top-level command.
#[derive(Debug, Default)]
struct Plan {
    steps: Vec<Instruction>,
    attempted: Vec<String>,
}

/// Compiles commands against one source tree (at one ref).
#[derive(Clone)]
pub struct Compiler<'a> {
    grammar: &'a Grammar,
    source: &'a dyn SourceTree,
    database: Option<&'a dyn Database>,
    source_ref: Option<String>,
    depth: usize,
}

impl<'a> Compiler<'a> {
    pub fn new(grammar: &'a Grammar, source: &'a dyn SourceTree) -> Self {
        Self {
            grammar,
            source,
            database: None,
            source_ref: None,
            depth: 0,
        }
    }

    /// Live database for `list` commands.
    pub fn with_database(mut self, database: &'a dyn Database) -> Self {
        self.database = Some(database);
        self
    }

    /// Ref recorded on every emitted file step.
    pub fn with_ref(mut self, source_ref: Option<&str>) -> Self {
        self.source_ref = source_ref.map(str::to_string);
        self
    }

    /// Compiles one command and appends its steps to `ctx`.
    ///
    /// Returns the number of steps appended. On error nothing is appended;
    /// the patterns tried are still available from
    /// [`Context::attempted`].
    pub fn compile(&self, ctx: &mut Context, cmd: &ParsedCommand) -> Result<usize, CompileError> {
        ctx.clear_attempts();
        let mut plan = Plan::default();
        let result = self.compile_command(ctx, cmd, &mut plan);
        ctx.record_attempts(plan.attempted);
        result?;

        let count = plan.steps.len();
        debug!(command = %cmd, count, "compiled");
        ctx.extend(plan.steps);
        Ok(count)
    }

    fn compile_command(&self, ctx: &Context, cmd: &ParsedCommand, plan: &mut Plan) -> Result<(), CompileError> {
        match cmd.root.as_str() {
            "begin" | "commit" | "rollback" => return self.compile_transaction(ctx, cmd, plan),
            "list" => return self.compile_list(cmd, plan),
            _ => {}
        }

        let start = plan.steps.len();
        let mark = plan.attempted.len();
        plan.steps.push(Instruction::RunDdsl { text: cmd.text.clone() });
        match cmd.root.as_str() {
            "create" | "drop" | "grant" | "revoke" => self.compile_ddl(cmd, plan)?,
            "seed" => self.compile_seed(ctx, cmd, plan)?,
            "sql" => self.compile_sql(cmd, plan)?,
            _ => return Err(unknown(cmd)),
        }

        if plan.steps.len() == start + 1 {
            plan.steps.truncate(start);
            if plan.attempted.len() == mark {
                return Err(no_schemas(cmd));
            }
            let mut patterns = plan.attempted[mark..].to_vec();
            patterns.sort();
            patterns.dedup();
            return Err(CompileError::NoMatch {
                command: cmd.text.clone(),
                patterns,
            });
        }
        Ok(())
    }

    fn compile_transaction(&self, ctx: &Context, cmd: &ParsedCommand, plan: &mut Plan) -> Result<(), CompileError> {
        if ctx.auto_transaction {
            return Err(TransactionStateError::Owned(cmd.root.clone()).into());
        }
        match cmd.root.as_str() {
            "begin" => plan.steps.push(Instruction::Begin),
            "commit" => plan.steps.extend([
                Instruction::RunDdsl { text: cmd.text.clone() },
                Instruction::Commit,
            ]),
            _ => plan.steps.extend([
                Instruction::RunDdsl { text: cmd.text.clone() },
                Instruction::Rollback,
            ]),
        }
        Ok(())
    }

    fn compile_list(&self, cmd: &ParsedCommand, plan: &mut Plan) -> Result<(), CompileError> {
        let kind = cmd
            .object
            .as_deref()
            .and_then(ListKind::from_object)
            .ok_or_else(|| unknown(cmd))?;
        let database = self.database.ok_or_else(|| CompileError::NoDatabase(cmd.text.clone()))?;

        let mut all = database.schema_names()?;
        all.sort();
        let schemas = match kind {
            ListKind::ForeignKeys => all,
            _ => filter_schemas(all, cmd),
        };
        plan.steps.push(Instruction::List { kind, schemas });
        Ok(())
    }

    fn compile_ddl(&self, cmd: &ParsedCommand, plan: &mut Plan) -> Result<(), CompileError> {
        let verb = Verb::from_root(&cmd.root).ok_or_else(|| unknown(cmd))?;
        let object = cmd.object.as_deref().ok_or_else(|| unknown(cmd))?;
        let privileges_only = matches!(verb, Verb::Grant | Verb::Revoke);

        match object {
            "database" => {
                let kind = if privileges_only {
                    PatternKind::DatabasePrivs
                } else {
                    PatternKind::Database
                };
                self.emit(plan, kind, verb, None, None)?;
            }
            "roles" => {
                self.emit(plan, PatternKind::Roles, verb, None, None)?;
            }
            "extensions" => {
                self.emit(plan, PatternKind::Extensions, verb, None, None)?;
            }
            "foreign-keys" => {
                for schema in self.source_schemas()? {
                    self.emit(plan, PatternKind::ForeignKeys, verb, Some(&schema), None)?;
                }
            }
            "schemas" => {
                let schemas = filter_schemas(self.source_schemas()?, cmd);
                self.compile_schemas(plan, verb, &schemas)?;
            }
            "schema" => self.compile_schemas(plan, verb, cmd.names("schema-names"))?,
            "indexes" | "constraints" | "triggers" => self.compile_on(cmd, plan, verb, object)?,
            _ => match ItemClass::from_object(object) {
                Some((class, true)) => self.compile_items_in_schemas(cmd, plan, verb, class)?,
                Some((class, false)) => self.compile_items(cmd, plan, verb, class)?,
                None => return Err(unknown(cmd)),
            },
        }
        Ok(())
    }

    fn compile_schemas(&self, plan: &mut Plan, verb: Verb, schemas: &[String]) -> Result<(), CompileError> {
        for schema in schemas {
            if matches!(verb, Verb::Grant | Verb::Revoke) {
                self.emit(plan, PatternKind::SchemaPrivs, verb, Some(schema), None)?;
                continue;
            }
            let created = self.emit(plan, PatternKind::Schema, verb, Some(schema), None)?;
            if verb == Verb::Create && !created.is_empty() {
                self.emit(plan, PatternKind::SchemaPrivs, verb, Some(schema), None)?;
            }
        }
        Ok(())
    }

    /// Plural forms: every item of every schema left after filtering.
    fn compile_items_in_schemas(
        &self,
        cmd: &ParsedCommand,
        plan: &mut Plan,
        verb: Verb,
        class: ItemClass,
    ) -> Result<(), CompileError> {
        let schemas = filter_schemas(self.source_schemas()?, cmd);

        if class == ItemClass::Table && verb == Verb::Drop {
            for schema in &schemas {
                self.emit(plan, PatternKind::ForeignKeys, verb, Some(schema), None)?;
            }
        }

        for schema in &schemas {
            if matches!(verb, Verb::Grant | Verb::Revoke) {
                self.emit(plan, class.privileges(), verb, Some(schema), Some(class.any_item()))?;
                continue;
            }

            let found = self.emit(plan, class.primary(), verb, Some(schema), Some(class.any_item()))?;
            if verb != Verb::Create || found.is_empty() {
                continue;
            }
            let items = match class {
                ItemClass::Type => found
                    .iter()
                    .filter_map(|path| schema_item_of(path))
                    .map(|(_, item)| item.to_string())
                    .collect(),
                _ => self.item_dirs(schema, class)?,
            };
            for item in &items {
                self.attach(plan, class, schema, item)?;
            }
        }

        if class == ItemClass::Table && verb == Verb::Create {
            for schema in &schemas {
                self.emit(plan, PatternKind::ForeignKeys, verb, Some(schema), None)?;
            }
        }
        Ok(())
    }

    /// Singular forms: an explicit `schema.item` list, `?` allowed in either part.
    fn compile_items(&self, cmd: &ParsedCommand, plan: &mut Plan, verb: Verb, class: ItemClass) -> Result<(), CompileError> {
        for name in cmd.names("item-names") {
            let (schema, item) = qualified(cmd, name)?;
            if matches!(verb, Verb::Grant | Verb::Revoke) {
                self.emit(plan, class.privileges(), verb, Some(schema), Some(item))?;
                continue;
            }

            let found = self.emit(plan, class.primary(), verb, Some(schema), Some(item))?;
            if verb != Verb::Create {
                continue;
            }
            for path in &found {
                if let Some((schema, item)) = schema_item_of(path) {
                    self.attach(plan, class, schema, item)?;
                }
            }
        }
        Ok(())
    }

    fn compile_on(&self, cmd: &ParsedCommand, plan: &mut Plan, verb: Verb, object: &str) -> Result<(), CompileError> {
        let names = cmd.names("item-names");
        if cmd.clause != Some(Clause::On) || names.is_empty() {
            return Err(CompileError::MissingList {
                command: cmd.text.clone(),
            });
        }
        let kinds: &[PatternKind] = match object {
            "indexes" => &[PatternKind::TableIndexes, PatternKind::ViewIndexes],
            "constraints" => &[PatternKind::Constraints],
            _ => &[PatternKind::Triggers],
        };
        for name in names {
            let (schema, item) = qualified(cmd, name)?;
            for &kind in kinds {
                self.emit(plan, kind, verb, Some(schema), Some(item))?;
            }
        }
        Ok(())
    }

    fn attach(&self, plan: &mut Plan, class: ItemClass, schema: &str, item: &str) -> Result<(), CompileError> {
        for &kind in class.attachments() {
            self.emit(plan, kind, Verb::Create, Some(schema), Some(item))?;
        }
        Ok(())
    }

    fn compile_seed(&self, ctx: &Context, cmd: &ParsedCommand, plan: &mut Plan) -> Result<(), CompileError> {
        let object = cmd.object.as_deref().ok_or_else(|| unknown(cmd))?;
        match object {
            "database" => {
                let files = self.resolve(plan, PatternKind::DatabaseSeeds, None, None, None)?;
                for path in select_seeds(cmd, files) {
                    self.seed_file(ctx, plan, &path, None)?;
                }
            }
            "schema" => {
                for schema in cmd.names("schema-names") {
                    self.seed_schema(ctx, cmd, plan, schema)?;
                }
            }
            "schemas" => {
                for schema in filter_schemas(self.source_schemas()?, cmd) {
                    self.seed_schema(ctx, cmd, plan, &schema)?;
                }
            }
            "table" => {
                for name in cmd.names("item-names") {
                    let (schema, item) = qualified(cmd, name)?;
                    let files = self.resolve(plan, PatternKind::TableSeeds, None, Some(schema), Some(item))?;
                    self.seed_table_files(ctx, plan, select_seeds(cmd, files))?;
                }
            }
            "tables" => {
                for schema in filter_schemas(self.source_schemas()?, cmd) {
                    let files = self.resolve(plan, PatternKind::TableSeeds, None, Some(&schema), Some(WILDCARD))?;
                    self.seed_table_files(ctx, plan, files)?;
                }
            }
            "cmd" => match cmd.arg("cmd") {
                Some(ArgValue::Raw(text)) => plan.steps.push(Instruction::ExecShell {
                    command: "sh".into(),
                    args: vec!["-c".into(), text.clone()],
                }),
                _ => return Err(unknown(cmd)),
            },
            "sql" => self.compile_sql(cmd, plan)?,
            _ => return Err(unknown(cmd)),
        }
        Ok(())
    }

    fn seed_schema(&self, ctx: &Context, cmd: &ParsedCommand, plan: &mut Plan, schema: &str) -> Result<(), CompileError> {
        let files = self.resolve(plan, PatternKind::SchemaSeeds, None, Some(schema), None)?;
        for path in select_seeds(cmd, files) {
            let target = (schema.to_string(), file_stem(&path).to_string());
            self.seed_file(ctx, plan, &path, Some(target))?;
        }
        Ok(())
    }

    fn seed_table_files(&self, ctx: &Context, plan: &mut Plan, files: Vec<String>) -> Result<(), CompileError> {
        for path in files {
            let target = schema_item_of(&path).map(|(s, t)| (s.to_string(), t.to_string()));
            self.seed_file(ctx, plan, &path, target)?;
        }
        Ok(())
    }

    /// Emits the step for one seed file. `target` is the table a CSV file loads into.
    fn seed_file(
        &self,
        ctx: &Context,
        plan: &mut Plan,
        path: &str,
        target: Option<(String, String)>,
    ) -> Result<(), CompileError> {
        let file = self.file(path);
        match (file_extension(path), target) {
            (Some("sql"), _) => plan.steps.push(Instruction::ExecSqlFile { file }),
            (Some("sh"), _) => plan.steps.push(Instruction::ExecShellFile { file }),
            (Some("csv"), Some((schema, table))) => plan.steps.push(Instruction::ImportCsv { file, schema, table }),
            (Some("ddsl"), _) => self.compile_nested(ctx, plan, file)?,
            _ => return Err(CompileError::UnsupportedSeed(path.to_string())),
        }
        Ok(())
    }

    /// Inlines the commands of a `.ddsl` seed file between enter/leave markers.
    fn compile_nested(&self, ctx: &Context, plan: &mut Plan, file: SourceFile) -> Result<(), CompileError> {
        if self.depth >= MAX_DEPTH {
            return Err(CompileError::TooDeep {
                file: file.to_string(),
                limit: MAX_DEPTH,
            });
        }
        let text = self.source.read_to_string(&file.path)?;
        let commands = Parser::new(self.grammar)
            .parse(&text)
            .map_err(|source| CompileError::NestedParse {
                file: file.to_string(),
                source,
            })?;
        if commands.iter().any(|c| c.source_ref.is_some()) {
            return Err(CompileError::NestedRef { file: file.to_string() });
        }

        debug!(file = %file, commands = commands.len(), depth = self.depth + 1, "compiling nested ddsl");
        plan.steps.push(Instruction::EnterDdslFile { file: file.clone() });
        let nested = Compiler {
            depth: self.depth + 1,
            ..self.clone()
        };
        for command in &commands {
            nested.compile_command(ctx, command, plan)?;
        }
        plan.steps.push(Instruction::LeaveDdslFile { file });
        Ok(())
    }

    fn compile_sql(&self, cmd: &ParsedCommand, plan: &mut Plan) -> Result<(), CompileError> {
        match cmd.arg("sql") {
            Some(ArgValue::Raw(sql)) => plan.steps.push(Instruction::ExecSqlScript { sql: sql.clone() }),
            Some(ArgValue::Path(path)) => {
                let path = path.trim_start_matches("./");
                plan.attempted.push(path.to_string());
                let (dir, name) = path.rsplit_once('/').unwrap_or(("", path));
                let exact = Regex::new(&format!("^{}$", regex::escape(name)))
                    .map_err(|_| PatternError::InvalidFilePattern(name.to_string()))?;
                if !self.source.list_files(dir, &exact)?.is_empty() {
                    plan.steps.push(Instruction::ExecSqlFile { file: self.file(path) });
                }
            }
            _ => return Err(unknown(cmd)),
        }
        Ok(())
    }

    /// Resolves a pattern kind and emits one SQL file step per match.
    fn emit(
        &self,
        plan: &mut Plan,
        kind: PatternKind,
        verb: Verb,
        schema: Option<&str>,
        item: Option<&str>,
    ) -> Result<Vec<String>, CompileError> {
        let found = self.resolve(plan, kind, Some(verb), schema, item)?;
        plan.steps.extend(found.iter().map(|path| Instruction::ExecSqlFile { file: self.file(path) }));
        Ok(found)
    }

    /// Renders a pattern kind, records the patterns and expands them.
    fn resolve(
        &self,
        plan: &mut Plan,
        kind: PatternKind,
        verb: Option<Verb>,
        schema: Option<&str>,
        item: Option<&str>,
    ) -> Result<Vec<String>, CompileError> {
        let verb = verb.map(|v| if kind.is_privileges() { v.privileges() } else { v });
        let mut found = Vec::new();
        for pattern in kind.render(verb, schema, item)? {
            let matched = self.expand(&pattern)?;
            trace!(pattern = %pattern, matched = matched.len(), "resolved pattern");
            plan.attempted.push(pattern);
            found.extend(matched);
        }
        Ok(found)
    }

    /// Expands wildcard directory segments and matches the file segment.
    fn expand(&self, pattern: &str) -> Result<Vec<String>, CompileError> {
        let (dir, file) = pattern.rsplit_once('/').unwrap_or(("", pattern));
        let file_re = name_regex(file)?;
        let mut found = Vec::new();
        for dir in self.expand_dirs(dir)? {
            found.extend(self.source.list_files(&dir, &file_re)?.into_iter().map(|f| f.path));
        }
        found.sort();
        Ok(found)
    }

    /// Replaces the first wildcard segment with each matching subdirectory
    /// and recurses on the rest.
    fn expand_dirs(&self, dir: &str) -> Result<Vec<String>, CompileError> {
        let segments: Vec<&str> = dir.split('/').filter(|s| !s.is_empty()).collect();
        let Some(at) = segments.iter().position(|s| is_wildcard_segment(s)) else {
            return Ok(vec![dir.to_string()]);
        };

        let prefix = segments[..at].join("/");
        let rest = segments[at + 1..].join("/");
        let mut dirs = Vec::new();
        for sub in self.source.list_directories(&prefix, &name_regex(segments[at])?)? {
            let concrete = if rest.is_empty() { sub.path } else { join(&sub.path, &rest) };
            dirs.extend(self.expand_dirs(&concrete)?);
        }
        Ok(dirs)
    }

    /// Every schema directory in the source tree, sorted.
    fn source_schemas(&self) -> Result<Vec<String>, CompileError> {
        Ok(self
            .source
            .list_directories(SCHEMAS_DIR, &ANY_NAME)?
            .into_iter()
            .map(|d| d.name)
            .collect())
    }

    fn item_dirs(&self, schema: &str, class: ItemClass) -> Result<Vec<String>, CompileError> {
        let dir = format!("{SCHEMAS_DIR}/{schema}/{}", class.dir());
        Ok(self
            .source
            .list_directories(&dir, &ANY_NAME)?
            .into_iter()
            .map(|d| d.name)
            .collect())
    }

    fn file(&self, path: &str) -> SourceFile {
        SourceFile::new(path, self.source_ref.clone())
    }
}

fn unknown(cmd: &ParsedCommand) -> CompileError {
    CompileError::UnknownCommand(cmd.text.clone())
}

fn qualified<'c>(cmd: &ParsedCommand, name: &'c str) -> Result<(&'c str, &'c str), CompileError> {
    split_qualified(name).ok_or_else(|| CompileError::MalformedName {
        command: cmd.text.clone(),
        name: name.to_string(),
    })
}

/// Nothing was tried because schema selection came up empty.
fn no_schemas(cmd: &ParsedCommand) -> CompileError {
    let filter = match cmd.clause {
        Some(clause @ (Clause::In | Clause::Except | Clause::ExceptIn)) => {
            format!("{clause} {}", cmd.names("schema-names").join(","))
        }
        _ => format!("{SCHEMAS_DIR}/{WILDCARD}"),
    };
    CompileError::NoSchemas {
        command: cmd.text.clone(),
        filter,
    }
}

/// Applies an `in`/`except`/`except in` clause to a sorted schema list.
fn filter_schemas(existing: Vec<String>, cmd: &ParsedCommand) -> Vec<String> {
    let listed = cmd.names("schema-names");
    match cmd.clause {
        Some(Clause::In) => existing.into_iter().filter(|s| listed.contains(s)).collect(),
        Some(clause) if clause.is_exclusion() => existing.into_iter().filter(|s| !listed.contains(s)).collect(),
        _ => existing,
    }
}

/// Applies `with`/`without` to seed files by stem. `with` keeps the listed order.
fn select_seeds(cmd: &ParsedCommand, files: Vec<String>) -> Vec<String> {
    let names = cmd.names("seed-names");
    match cmd.clause {
        Some(Clause::With) => names
            .iter()
            .flat_map(|name| files.iter().filter(move |f| file_stem(f) == name.as_str()).cloned())
            .collect(),
        Some(clause) if clause.is_exclusion() => files
            .into_iter()
            .filter(|f| !names.iter().any(|name| name.as_str() == file_stem(f)))
            .collect(),
        _ => files,
    }
}
