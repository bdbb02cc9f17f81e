//! Disarm CLI - command-line utility for content disarm and
//! reconstruction.

mod cli;
mod commands;
mod output;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = cli::Cli::parse();
    let formatter = output::create_formatter(cli.json, cli.verbose, cli.quiet);

    let code = match &cli.command {
        cli::Commands::Scan(args) => commands::scan::execute(args, &*formatter)?,
        cli::Commands::Clean(args) => commands::clean::execute(args, &*formatter)?,
    };
    std::process::exit(code);
}
