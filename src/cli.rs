use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Store root for targets and versions (overrides PAGEWATCH_DATA_DIR).
    #[arg(long, global = true)]
    pub data_dir: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Register a page for monitoring (no-op if already registered).
    Add(AddArgs),
    /// Stop monitoring a page and delete its history.
    Remove(TargetArgs),
    /// List registered pages and their last check state.
    List,
    /// List stored versions of a page, newest first.
    Versions(TargetArgs),
    /// Summarize a stored version against the page's current content.
    Diff(DiffArgs),
    /// Run one check cycle for a single page.
    Check(TargetArgs),
    /// Run one check cycle for every registered page.
    CheckAll,
    /// Check all pages repeatedly until interrupted.
    Watch,
    /// Send a test notification through the configured transport.
    TestNotify,
}

#[derive(Debug, Args)]
pub struct AddArgs {
    /// Page URL (must be http/https).
    #[arg(long)]
    pub url: String,
}

#[derive(Debug, Args)]
pub struct TargetArgs {
    /// Target id as printed by `add` or `list`.
    #[arg(long)]
    pub id: String,
}

#[derive(Debug, Args)]
pub struct DiffArgs {
    #[arg(long)]
    pub id: String,

    /// Version id as printed by `versions`.
    #[arg(long)]
    pub version: String,
}
