use std::fs;
use std::io::{IsTerminal, Read};
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use ddsl_core::{Registry, grammar};
use ddsl_engine::{OutputFormat, RunConfig, Session};
use tracing_subscriber::EnvFilter;

const PACKAGE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Parser)]
#[command(name = "ddsl")]
#[command(version = PACKAGE_VERSION)]
#[command(about = "Run DDSL schema commands against a database")]
struct Cli {
    #[command(subcommand)]
    command: Command,
    /// Show debug logging.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,
    /// Only show warnings and errors.
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Compile and execute commands.
    Run(RunArgs),
    /// Compile commands and print the instruction list without executing.
    Plan(PlanArgs),
    /// Print the command grammar.
    Grammar,
}

#[derive(Debug, Args)]
struct Target {
    /// Source tree location (dir, file://dir, dir#ref, git://dir#ref).
    #[arg(long, env = "DDSL_SOURCE")]
    source: Option<String>,
    /// Database location (sqlite://path).
    #[arg(long, env = "DDSL_DATABASE")]
    database: Option<String>,
    /// YAML run configuration; flags and environment take precedence.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct Input {
    /// Commands to run; several may be separated by ';'.
    commands: Vec<String>,
    /// Read commands from a file ('-' for stdin).
    #[arg(short, long, conflicts_with = "commands")]
    file: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct RunArgs {
    #[command(flatten)]
    target: Target,
    #[command(flatten)]
    input: Input,
    /// Log what would run without changing anything.
    #[arg(long)]
    dry_run: bool,
    /// Do not wrap the batch in a transaction; use begin/commit explicitly.
    #[arg(long)]
    no_auto_transaction: bool,
    /// Output format for list commands.
    #[arg(long)]
    format: Option<OutputFormat>,
}

#[derive(Debug, Args)]
struct PlanArgs {
    #[command(flatten)]
    target: Target,
    #[command(flatten)]
    input: Input,
    /// Compile as if auto-transaction mode were off.
    #[arg(long)]
    no_auto_transaction: bool,
    /// Print instructions as JSON.
    #[arg(long)]
    json: bool,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let result = match cli.command {
        Command::Run(args) => run_commands(args),
        Command::Plan(args) => run_plan(args),
        Command::Grammar => {
            print!("{}", grammar().describe());
            Ok(())
        }
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

/// `RUST_LOG` wins; otherwise `-v`/`-q` pick the level for the ddsl crates.
fn init_logging(verbose: bool, quiet: bool) {
    let level = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(format!("ddsl={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

fn registry() -> Registry {
    let mut registry = Registry::new();
    ddsl_source::register(&mut registry);
    ddsl_sqlite::register(&mut registry);
    registry
}

/// Layers flags (and their environment fallbacks) over the config file.
fn load_config(target: &Target) -> Result<RunConfig, String> {
    let mut config = match &target.config {
        Some(path) => RunConfig::load(path).map_err(|e| format!("{}: {e}", path.display()))?,
        None => RunConfig::default(),
    };
    if let Some(source) = &target.source {
        config.source = Some(source.clone());
    }
    if let Some(database) = &target.database {
        config.database = Some(database.clone());
    }
    Ok(config)
}

fn read_input(input: &Input) -> Result<String, String> {
    match &input.file {
        Some(path) if path.as_os_str() == "-" => read_stdin(),
        Some(path) => fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display())),
        None if !input.commands.is_empty() => Ok(input.commands.join("\n")),
        None if !std::io::stdin().is_terminal() => read_stdin(),
        None => Err("no commands given; pass them as arguments, with --file, or on stdin".to_string()),
    }
}

fn read_stdin() -> Result<String, String> {
    let mut text = String::new();
    std::io::stdin()
        .read_to_string(&mut text)
        .map_err(|e| format!("failed to read stdin: {e}"))?;
    Ok(text)
}

fn run_commands(args: RunArgs) -> Result<(), String> {
    let mut config = load_config(&args.target)?;
    config.dry_run |= args.dry_run;
    if args.no_auto_transaction {
        config.auto_transaction = false;
    }
    if let Some(format) = args.format {
        config.format = format;
    }
    let text = read_input(&args.input)?;

    let mut session = Session::open(&config, &registry()).map_err(|e| e.to_string())?;
    let mut stdout = std::io::stdout().lock();
    let result = session.run(&text, &mut stdout);
    let closed = session.close();

    let executed = result.map_err(|e| e.to_string())?;
    closed.map_err(|e| e.to_string())?;
    tracing::info!(executed, dry_run = config.dry_run, "done");
    Ok(())
}

fn run_plan(args: PlanArgs) -> Result<(), String> {
    let mut config = load_config(&args.target)?;
    config.dry_run = true;
    if args.no_auto_transaction {
        config.auto_transaction = false;
    }
    let text = read_input(&args.input)?;

    let mut session = Session::open(&config, &registry()).map_err(|e| e.to_string())?;
    let compiled = session.compile(&text);
    let rendered = compiled.map_err(|e| e.to_string()).and_then(|_| {
        if args.json {
            serde_json::to_string_pretty(session.instructions()).map_err(|e| format!("JSON serialization failed: {e}"))
        } else {
            Ok(session
                .instructions()
                .iter()
                .map(|i| i.to_string())
                .collect::<Vec<_>>()
                .join("\n"))
        }
    });
    session.close().map_err(|e| e.to_string())?;
    println!("{}", rendered?);
    Ok(())
}
