//! Command-line argument parsing
//!
//! Provides clap-based CLI with subcommands and verbosity control.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Ask questions over a private corpus, seeing only what your role may see
#[derive(Parser, Debug)]
#[command(name = "rbac-rag")]
#[command(version)]
#[command(about = "Role-filtered question answering over a private document corpus", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Policy file (overrides the config file setting)
    #[arg(long, global = true)]
    pub policy: Option<PathBuf>,

    /// Corpus directory (overrides the config file setting)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Verbosity: -v (debug), -vv (trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Subcommand
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ask a question as a given role
    Ask {
        /// Role of the asking party
        #[arg(short, long)]
        role: String,

        /// Number of chunks to place in the context (overrides config)
        #[arg(short)]
        k: Option<usize>,

        /// The question
        #[arg(value_name = "QUERY")]
        query: String,
    },

    /// Embed the corpus and upload it to the configured Qdrant collection
    Ingest,

    /// List roles and their scope rules
    Roles,

    /// Check whether a role may see a document path
    Check {
        role: String,
        path: String,
    },

    /// Display effective configuration
    Config,
}

impl Args {
    /// Log filter derived from `-v` flags; `RUST_LOG` takes precedence
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "rbac_rag=info",
            1 => "rbac_rag=debug",
            _ => "rbac_rag=trace",
        }
    }
}
