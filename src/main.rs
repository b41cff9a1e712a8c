mod allocator;
mod cli;
mod commands;
mod config;
mod constants;
mod error;
mod git;
mod pool;
mod process;
mod reconcile;
mod repair;
mod slot_name;
mod ui;
mod worktrees;


use anyhow::Result;
use clap::Parser;
use cli::Cli;
use constants::{DEFAULT_LOG_FILTER, LOG_FILTER_ENV};
use tracing_subscriber::EnvFilter;

fn main() {
    init_logging();
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    commands::run(cli.command)
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_FILTER_ENV)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}
