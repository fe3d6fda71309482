//! Tilevault CLI - command-line interface
//!
//! This binary drives the tilevault pipeline:
//! - `ingest` / `merge`: process one archive into a tile store
//! - `plan` / `run`: plan pending releases against the done directory
//!   and optionally execute the plan end to end
//! - `serve`: serve processed stores over HTTP
//!
//! The planner, executor and server are configured through environment
//! variables (`ARCHIVES_URL`, `META_WORK_FOLDER`, `META_DONE_FOLDER`,
//! `META_TMP_FOLDER`, `GITHUB_TOKEN`, `PORT`, `DATA_PATH`).

mod commands;
mod error;

use clap::{Parser, Subcommand};
use error::CliError;
use std::path::PathBuf;
use tilevault::logging::{default_log_dir, default_log_file, init_logging};

#[derive(Parser)]
#[command(name = "tilevault")]
#[command(version = tilevault::VERSION)]
#[command(about = "Tile archive ingestion, pyramid building and serving", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest an archive (tar.gz, 7z or directory) into a tile store
    Ingest {
        /// Input archive or extracted directory
        #[arg(long)]
        from: PathBuf,

        /// Output tile store path
        #[arg(long)]
        out: PathBuf,

        /// Optional base store; tiles are stored as diffs against it
        #[arg(long)]
        base: Option<PathBuf>,

        /// Number of worker threads
        #[arg(long, default_value_t = 10)]
        workers: usize,
    },

    /// Build the zoom pyramid inside a tile store
    Merge {
        /// Tile store to merge
        #[arg(long)]
        target: PathBuf,

        /// Optional base store; merged levels are diffed against it
        #[arg(long)]
        base: Option<PathBuf>,

        /// Number of worker threads
        #[arg(long, default_value_t = 16)]
        workers: usize,

        /// Deepest zoom level to produce
        #[arg(long = "initz", default_value_t = 10)]
        initial_zoom: i32,
    },

    /// Plan pending release jobs and print the summary
    Plan {
        /// Walk all release pages instead of only the current one
        #[arg(long)]
        all: bool,
    },

    /// Plan pending release jobs and execute them
    Run,

    /// Serve processed tile stores over HTTP
    Serve,
}

fn main() {
    let cli = Cli::parse();

    let _guard = match init_logging(default_log_dir(), default_log_file()) {
        Ok(guard) => guard,
        Err(e) => CliError::LoggingInit(e.to_string()).exit(),
    };

    let result = match cli.command {
        Commands::Ingest {
            from,
            out,
            base,
            workers,
        } => commands::ingest::run(&from, &out, base.as_deref(), workers),
        Commands::Merge {
            target,
            base,
            workers,
            initial_zoom,
        } => commands::merge::run(&target, base.as_deref(), workers, initial_zoom),
        Commands::Plan { all } => commands::plan::run(all),
        Commands::Run => commands::run::run(),
        Commands::Serve => commands::serve::run(),
    };

    if let Err(e) = result {
        e.exit();
    }
}
