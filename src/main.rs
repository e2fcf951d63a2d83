use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

use sitepulse::cli::{analyze, ingest, run, stats};
use sitepulse::config::{Config, ParsePolicy};
use sitepulse::logging;
use sitepulse::source::FileType;
use sitepulse::store::EventStore;

#[derive(Parser)]
#[command(name = "sitepulse")]
#[command(about = "Chat vs email activity summaries from chat-widget event logs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "sitepulse.yaml", global = true)]
    config: String,

    /// Database path (overrides config)
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Log filter, e.g. info or sitepulse=debug (RUST_LOG wins)
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Args)]
struct InputArgs {
    /// Log file, one JSON event per line
    file: PathBuf,

    /// Input encoding: auto, text, gzip or zstd
    #[arg(long, default_value = "auto")]
    ftype: String,

    /// Records buffered per kind before writing (overrides config)
    #[arg(long)]
    batch_size: Option<usize>,

    /// Abort on the first unparseable line instead of skipping it
    #[arg(long)]
    strict: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Load, classify and print per-site summaries
    Run(InputArgs),

    /// Load and classify only
    Ingest(InputArgs),

    /// Print per-site summaries from an existing database
    Analyze,

    /// Show row counts
    Stats,
}

fn resolve_file_type(path: &Path, ftype: &str) -> Result<FileType> {
    if ftype.eq_ignore_ascii_case("auto") {
        Ok(FileType::detect(path))
    } else {
        ftype.parse()
    }
}

fn apply_input_overrides(config: &mut Config, input: &InputArgs) {
    if let Some(batch_size) = input.batch_size {
        config.ingest.batch_size = batch_size;
    }
    if input.strict {
        config.ingest.parse_policy = ParsePolicy::Strict;
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config
    let mut config = Config::load(&cli.config)?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    logging::init(&config.logging.level)?;

    let db_path = cli.database.unwrap_or_else(|| config.database_path());
    tracing::info!(path = %db_path.display(), "opening database");

    // Initialize store
    let store = EventStore::open(&db_path)?;

    let mut stdout = std::io::stdout().lock();

    match cli.command {
        Commands::Run(input) => {
            apply_input_overrides(&mut config, &input);
            let file_type = resolve_file_type(&input.file, &input.ftype)?;
            run::run(&store, &config, &input.file, file_type, &mut stdout)?;
        }
        Commands::Ingest(input) => {
            apply_input_overrides(&mut config, &input);
            let file_type = resolve_file_type(&input.file, &input.ftype)?;
            ingest::run(&store, &config, &input.file, file_type)?;
        }
        Commands::Analyze => {
            analyze::run(&store, &mut stdout)?;
        }
        Commands::Stats => {
            stats::run(&store)?;
        }
    }

    Ok(())
}
