//! modsolve CLI - resolve mod sets and explain failures

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};
use modsolve::util::GlobalContext;

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    // Parse CLI
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("modsolve=debug")
    } else {
        EnvFilter::new("modsolve=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    let mut ctx = GlobalContext::new()?;
    ctx.set_verbose(cli.verbose);
    ctx.set_color(!cli.no_color);

    // Execute command
    match cli.command {
        Commands::Resolve(args) => commands::resolve::execute(args, &ctx),
        Commands::Check(args) => commands::check::execute(args, &ctx),
        Commands::Graph(args) => commands::graph::execute(args, &ctx),
        Commands::Completions(args) => commands::completions::execute(args),
    }
}
