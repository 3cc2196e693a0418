//! CLI for the SDM download manager.
//!
//! Each invocation runs the engine in-process against the shared resume
//! store, so `resume`, `cancel` and `remove` act on downloads an earlier
//! `get` left behind.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use sdm_core::config;
use sdm_core::{Engine, ResumeStore};
use std::path::{Path, PathBuf};

use commands::{
    run_cancel, run_checksum, run_get, run_history, run_list, run_remove, run_resume, GetArgs,
};

/// Top-level CLI for the SDM download manager.
#[derive(Debug, Parser)]
#[command(name = "sdm")]
#[command(about = "SDM: segmented HTTP download manager", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download a URL. Ctrl-C pauses; continue later with `sdm resume`.
    Get {
        /// Direct HTTP/HTTPS URL to download.
        url: String,

        /// Output file or directory (default: current directory).
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,

        /// Number of segments (default from config).
        #[arg(short = 'n', long, value_name = "N")]
        segments: Option<usize>,

        /// Bandwidth ceiling in bytes per second for this run.
        #[arg(long, value_name = "BPS")]
        limit: Option<u64>,

        /// Expected SHA-256 (hex) of the finished file.
        #[arg(long, value_name = "HEX")]
        sha256: Option<String>,

        /// Extra request header, e.g. -H "Authorization: Bearer x". Repeatable.
        #[arg(short = 'H', long = "header", value_name = "NAME: VALUE")]
        headers: Vec<String>,
    },

    /// Show stored downloads (paused or failed).
    List,

    /// Show finished downloads, newest first.
    History {
        /// Maximum number of entries.
        #[arg(short = 'n', long, value_name = "N", default_value_t = 50)]
        limit: u32,
    },

    /// Resume a paused download by its ID.
    Resume {
        /// Download identifier.
        id: i64,

        /// Bandwidth ceiling in bytes per second for this run.
        #[arg(long, value_name = "BPS")]
        limit: Option<u64>,
    },

    /// Cancel a download by its ID and delete its partial file.
    Cancel {
        /// Download identifier.
        id: i64,
    },

    /// Forget a failed download by its ID (the partial file stays).
    Remove {
        /// Download identifier.
        id: i64,
    },

    /// Compute SHA-256 of a file (e.g. after download).
    Checksum {
        /// Path to the file.
        path: String,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        if let CliCommand::Checksum { path } = &cli.command {
            return run_checksum(Path::new(path)).await;
        }

        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);
        let store = ResumeStore::open_default().await?;
        match &cli.command {
            CliCommand::List => return run_list(&store).await,
            CliCommand::History { limit } => return run_history(&store, *limit).await,
            _ => {}
        }

        let engine = Engine::new(cfg, store);
        let restored = engine.restore().await?;
        tracing::debug!(restored, "engine ready");

        match cli.command {
            CliCommand::Get {
                url,
                output,
                segments,
                limit,
                sha256,
                headers,
            } => {
                let output = match output {
                    Some(p) => p,
                    None => std::env::current_dir()?,
                };
                let args = GetArgs {
                    url,
                    output,
                    segments,
                    limit,
                    sha256,
                    headers,
                };
                run_get(&engine, args).await?;
            }
            CliCommand::Resume { id, limit } => run_resume(&engine, id, limit).await?,
            CliCommand::Cancel { id } => run_cancel(&engine, id).await?,
            CliCommand::Remove { id } => run_remove(&engine, id).await?,
            CliCommand::List | CliCommand::History { .. } | CliCommand::Checksum { .. } => {}
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
