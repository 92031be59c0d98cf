// rsc - the RuneScript incremental project compiler CLI.
//
// Usage:
//   rsc check <dir>            Full diff, report diagnostics, exit non-zero on error
//   rsc build <dir> [-o FILE]  Full diff and persist the resulting cache
//   rsc watch <dir>            Full diff, then re-diff on every source change

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "rsc")]
#[command(about = "Incremental project compiler for RuneScript", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a full diff and report diagnostics
    Check {
        /// Source directory
        #[arg(value_name = "DIR")]
        dir: PathBuf,
    },

    /// Run a full diff and persist the resulting cache
    Build {
        /// Source directory
        #[arg(value_name = "DIR")]
        dir: PathBuf,

        /// Cache file to write (default: <dir>/.rsc-cache)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Watch a source directory and re-diff on change
    Watch {
        /// Source directory
        #[arg(value_name = "DIR")]
        dir: PathBuf,

        /// Poll interval in milliseconds
        #[arg(long, default_value_t = 500)]
        poll_ms: u64,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check { dir } => rsc::cli::check::execute(&dir)?,
        Commands::Build { dir, output } => rsc::cli::build::execute(&dir, output.as_deref())?,
        Commands::Watch { dir, poll_ms } => rsc::cli::watch::execute(&dir, Duration::from_millis(poll_ms))?,
    }

    Ok(())
}
