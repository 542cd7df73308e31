//! CLI argument definitions for Indigo.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Indigo -- inspect and edit the entity store.
#[derive(Parser)]
#[command(
    name = "indigo",
    version,
    about = "Indigo -- inspect and edit the entity store",
    long_about = "Runs one storage operation against the backend selected in the \
                  [storage] section of the config file and prints the result as JSON."
)]
pub struct Cli {
    /// Config file holding the [storage] section.
    #[arg(long, short, global = true, default_value = "config/default.toml")]
    pub config: PathBuf,

    /// Give up after this many seconds.
    #[arg(long, global = true, default_value_t = 30)]
    pub timeout: u64,

    /// Default log level when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

/// `--where` clauses shared by the query subcommands.
#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// Condition `field op value`, e.g. `age >= 18` or `name = erin`.
    /// Repeat to combine; values are JSON, or a bare string.
    #[arg(long = "where", short = 'w', value_name = "CLAUSE")]
    pub clauses: Vec<String>,

    /// Join clauses with OR instead of AND.
    #[arg(long)]
    pub any: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Store a new document and print its id.
    Create {
        collection: String,
        /// Document as a JSON object.
        json: String,
    },

    /// Print documents matching the filter.
    Get {
        collection: String,
        #[command(flatten)]
        filter: FilterArgs,
        /// Maximum number of documents (0 = all).
        #[arg(long, short = 'n', default_value_t = 0)]
        limit: usize,
    },

    /// Print the first document matching the filter.
    GetOne {
        collection: String,
        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Print the ids of documents matching the filter.
    Ids {
        collection: String,
        #[command(flatten)]
        filter: FilterArgs,
        /// Maximum number of ids (0 = all).
        #[arg(long, short = 'n', default_value_t = 0)]
        limit: usize,
    },

    /// Print one document by id.
    GetById { collection: String, id: String },

    /// Merge a JSON patch into every document matching the filter.
    Update {
        collection: String,
        /// Patch as a JSON object.
        json: String,
        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Merge a JSON patch into one document.
    UpdateById {
        collection: String,
        id: String,
        /// Patch as a JSON object.
        json: String,
    },

    /// Delete every document matching the filter.
    Delete {
        collection: String,
        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Delete one document by id.
    DeleteById { collection: String, id: String },

    /// Validate the config and open the backend.
    Check,
}
