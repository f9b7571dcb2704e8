//! CLI for the artload resource loader.

mod commands;

use anyhow::Result;
use artload_core::config;
use artload_core::request::Priority;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::{run_fetch, run_ledger_status, run_ledger_sweep, FetchArgs};

/// Top-level CLI for artload.
#[derive(Debug, Parser)]
#[command(name = "artload")]
#[command(about = "artload: priority-scheduled artifact loader with a failure ledger", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Load artifacts from URLs and report one line per request.
    Fetch {
        /// HTTP/HTTPS URLs to load.
        urls: Vec<String>,

        /// Priority for every request (low, normal, high, critical).
        #[arg(long, default_value = "normal", value_name = "PRIORITY")]
        priority: Priority,

        /// Read additional URLs from a file, one per line (`#` starts a comment).
        #[arg(long, value_name = "FILE")]
        from_file: Option<PathBuf>,

        /// Artifact cache directory (default: XDG cache dir).
        #[arg(long, value_name = "DIR")]
        cache_dir: Option<PathBuf>,
    },

    /// Inspect or maintain the failure ledger.
    Ledger {
        #[command(subcommand)]
        command: LedgerCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum LedgerCommand {
    /// List suppressed identities and outstanding failure records.
    Status,
    /// Promote records that have aged past the observation window.
    Sweep,
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Fetch {
                urls,
                priority,
                from_file,
                cache_dir,
            } => {
                let args = FetchArgs {
                    urls,
                    priority,
                    from_file,
                    cache_dir,
                };
                run_fetch(&cfg, args).await?;
            }
            CliCommand::Ledger { command } => match command {
                LedgerCommand::Status => run_ledger_status(&cfg).await?,
                LedgerCommand::Sweep => run_ledger_sweep(&cfg).await?,
            },
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
