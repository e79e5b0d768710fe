//! dpm-migrate CLI
//!
//! Commands:
//! - `dpm-migrate migrate` - Migrate legacy markets (all, or one with `--market`)
//! - `dpm-migrate list` - Show the migration corpus in order
//! - `dpm-migrate dump` - Export unresolved legacy markets to JSON
//! - `dpm-migrate schema` - Apply database migrations

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::migration::DEFAULT_DUMP_FILE;

/// Legacy DPM market migration tool
#[derive(Parser, Debug)]
#[command(name = "dpm-migrate")]
#[command(author, version, about = "Migrate legacy DPM multi-answer markets to CPMM")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Configuration directory
    #[arg(short, long, global = true, default_value = "config", env = "DPM_MIGRATE_CONFIG_DIR")]
    pub config_dir: PathBuf,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Migrate legacy markets, most important first
    Migrate {
        /// Migrate only this market
        #[arg(short, long)]
        market: Option<String>,
        /// Plan without writing anything
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        json: bool,
    },

    /// List the markets a migration run would visit
    List {
        #[arg(long)]
        json: bool,
    },

    /// Write unresolved legacy markets with answers and bets to a JSON file
    Dump {
        #[arg(short, long, default_value = DEFAULT_DUMP_FILE)]
        output: PathBuf,
    },

    /// Apply database schema migrations
    Schema,
}

impl Commands {
    /// Command run when none is given: migrate the whole corpus
    pub fn default_command() -> Self {
        Commands::Migrate {
            market: None,
            dry_run: false,
            json: false,
        }
    }
}
