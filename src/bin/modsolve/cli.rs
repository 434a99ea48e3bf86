//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

/// modsolve - constraint-based mod dependency resolution
#[derive(Parser)]
#[command(name = "modsolve")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve a candidate document and print the selected mods
    Resolve(ResolveArgs),

    /// Validate candidate and override documents without solving
    Check(CheckArgs),

    /// Print the diagnosis graph of the first failed solve as JSON
    Graph(GraphArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Documents shared by commands that read candidates.
#[derive(Args)]
pub struct DocumentArgs {
    /// Candidate document (defaults to the nearest mods.toml)
    pub candidates: Option<PathBuf>,

    /// Dependency override document
    #[arg(long)]
    pub overrides: Option<PathBuf>,
}

#[derive(Args)]
pub struct ResolveArgs {
    #[command(flatten)]
    pub documents: DocumentArgs,

    /// Config file to use instead of the global and project config
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Write a plain-text failure log to this file
    #[arg(long)]
    pub report_log: Option<PathBuf>,

    /// Print machine-readable JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct CheckArgs {
    #[command(flatten)]
    pub documents: DocumentArgs,
}

#[derive(Args)]
pub struct GraphArgs {
    #[command(flatten)]
    pub documents: DocumentArgs,

    /// Config file to use instead of the global and project config
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Write the graph to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}
