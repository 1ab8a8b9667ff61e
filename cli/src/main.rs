//! bulk-upload - Command-line interface for the OPEX package engine.
//!
//! Builds a bulk-upload package from a table, previews the package tree
//! without touching the disk, or undoes a previous build's file moves.

use clap::{Parser, Subcommand};
use opex_engine::{
    create_build, plan_build, run_build, undo_moves, Build, BuildOptions, BuildProgress,
    ChecksumAlgorithm, EngineError, FileMove,
};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_subscriber::{fmt, EnvFilter};

/// bulk-upload - Build OPEX bulk-upload packages
#[derive(Parser, Debug)]
#[command(name = "bulk-upload")]
#[command(version = "0.1.0")]
#[command(about = "Turn a table of files into an OPEX bulk-upload package")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose output
    #[arg(long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build a package and move the listed files into it
    Build {
        /// Table describing the files to upload
        #[arg(long, value_name = "CSV")]
        table: PathBuf,

        /// Directory the package container is created in
        #[arg(long, value_name = "DIR")]
        output: PathBuf,

        /// Fixity algorithms declared on every asset: md5, sha256, sha512
        #[arg(long, value_name = "ALGORITHMS", value_delimiter = ',', default_value = "sha256")]
        fixity: Vec<String>,

        /// File name of the move log written inside the container
        #[arg(long, value_name = "NAME", default_value = "moves.csv")]
        moves_log_name: String,
    },

    /// Validate the table and print the package tree without writing anything
    Plan {
        #[arg(long, value_name = "CSV")]
        table: PathBuf,

        #[arg(long, value_name = "DIR")]
        output: PathBuf,
    },

    /// Move files recorded in a move log back to where they came from
    Undo {
        /// Move log written by a previous build
        #[arg(long, value_name = "CSV")]
        moves: PathBuf,
    },
}

/// A failed CLI run: message for the user and the process exit code.
#[derive(Debug)]
struct Failure {
    code: i32,
    message: String,
}

impl Failure {
    fn usage(message: String) -> Self {
        Failure { code: 1, message }
    }
}

impl From<EngineError> for Failure {
    fn from(e: EngineError) -> Self {
        if let Some(code) = e.raw_os_error() {
            tracing::debug!(os_error = code, "operating system error");
        }
        Failure {
            code: if e.is_validation() { 1 } else { 2 },
            message: e.to_string(),
        }
    }
}

/// CLI implementation of BuildProgress for displaying build progress
struct CliProgress {
    verbose: bool,
    start_time: Instant,
}

impl CliProgress {
    fn new(verbose: bool) -> Self {
        CliProgress {
            verbose,
            start_time: Instant::now(),
        }
    }

    fn format_duration(elapsed: std::time::Duration) -> String {
        let secs = elapsed.as_secs();
        let mins = secs / 60;
        let secs = secs % 60;

        if mins > 0 {
            format!("{}m {}s", mins, secs)
        } else {
            format!("{}s", secs)
        }
    }
}

impl BuildProgress for CliProgress {
    fn on_build_started(&self, build: &Build) {
        eprintln!("Building package...");
        eprintln!("  Table: {}", build.table_path.display());
        if let Some(dir) = build.container_dir() {
            eprintln!("  Container: {}", dir.display());
        }
        if let Some(container) = &build.container {
            eprintln!(
                "  Contents: {} collections, {} digital objects, {} assets",
                container.collections().count(),
                container.digital_objects().count(),
                container.assets().count()
            );
        }
        eprintln!();
    }

    fn on_sidecar_written(&self, path: &Path) {
        if self.verbose {
            eprintln!("  wrote {}", path.display());
        }
    }

    fn on_file_moved(&self, index: usize, total: usize, file_move: &FileMove) {
        if self.verbose {
            eprintln!(
                "[{:3}/{}] {} -> {}",
                index + 1,
                total,
                file_move.original_location.display(),
                file_move.destination.display()
            );
        }
    }

    fn on_build_completed(&self, build: &Build) {
        eprintln!("Build complete!");
        eprintln!(
            "Summary: {} sidecars written, {} files moved",
            build.sidecars_written.len(),
            build.moves.as_ref().map(|m| m.len()).unwrap_or(0)
        );
        if let Some(log) = &build.moves_log {
            eprintln!("Move log: {}", log.display());
        }
        eprintln!("Elapsed: {}", Self::format_duration(self.start_time.elapsed()));
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn parse_fixities(names: &[String]) -> Result<Vec<ChecksumAlgorithm>, Failure> {
    let mut algorithms = Vec::new();
    let mut invalid = Vec::new();
    for name in names {
        match ChecksumAlgorithm::from_name(name) {
            Some(algorithm) if !algorithms.contains(&algorithm) => algorithms.push(algorithm),
            Some(_) => {}
            None => invalid.push(name.as_str()),
        }
    }

    if !invalid.is_empty() {
        return Err(Failure::usage(format!(
            "Invalid fixity algorithm(s) '{}'. Must be 'md5', 'sha256', or 'sha512'",
            invalid.join("', '")
        )));
    }
    if algorithms.is_empty() {
        return Err(Failure::usage("At least one fixity algorithm is required".to_string()));
    }
    Ok(algorithms)
}

/// Parse command-line arguments, then run the requested command
fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let exit_code = match run_cli(&cli) {
        Ok(()) => 0,
        Err(failure) => {
            eprintln!("Error: {}", failure.message);
            failure.code
        }
    };

    std::process::exit(exit_code);
}

/// Main CLI logic - separated for testability
fn run_cli(cli: &Cli) -> Result<(), Failure> {
    match &cli.command {
        Command::Build {
            table,
            output,
            fixity,
            moves_log_name,
        } => {
            let options = BuildOptions {
                fixity_algorithms: parse_fixities(fixity)?,
                moves_log_name: moves_log_name.clone(),
                ..BuildOptions::default()
            };

            let mut build = create_build(table, output, options)?;
            plan_build(&mut build)?;

            let progress = CliProgress::new(cli.verbose);
            run_build(&mut build, Some(&progress))?;
            Ok(())
        }
        Command::Plan { table, output } => {
            let mut build = create_build(table, output, BuildOptions::default())?;
            plan_build(&mut build)?;

            if let Some(container) = &build.container {
                print!("{}", container.render_tree());
            }
            Ok(())
        }
        Command::Undo { moves } => {
            let progress = CliProgress::new(cli.verbose);
            let batch = undo_moves(moves, Some(&progress))?;
            eprintln!("Undo complete: {} files restored", batch.len());
            Ok(())
        }
    }
}
