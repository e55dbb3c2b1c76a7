mod commands;
mod prompt;

use anyhow::Result;
use clap::{ArgAction, Parser};
use colored::Colorize;
use lysis_core::config::ExperimentConfig;
use log::debug;
use std::path::PathBuf;

use commands::Command;

#[derive(Debug, Parser)]
#[command(name = "lysis", version)]
#[command(about = "Phage lysis/lysogeny competition experiments")]
struct Cli {
    /// JSON configuration file; command-line flags override its values
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors and skip the banner and summary
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let config = match &cli.config {
        Some(path) => ExperimentConfig::load(path)?,
        None => ExperimentConfig::default(),
    };
    debug!("configuration: {config:?}");

    if !cli.quiet {
        announce_banner();
    }
    commands::run(cli.command, config, cli.quiet)
}

/// `RUST_LOG` wins over the level derived from `-v`/`-q`.
fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn announce_banner() {
    println!("{}", "Lysis competition experiments".bright_cyan().bold());
    println!("{}", "=============================".cyan());
}
