mod approval;
mod candidates;
mod cli;
mod commands;
mod config;
mod engine;
mod inventory;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use config::Config;
use std::io;

fn main() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    // Exit codes: 0 clean, 99 differences present (diff only), 1 failures.
    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            ui::error(&format!("{e:#}"));
            1
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    let jobs = cli.jobs.max(1) as usize;
    match cli.command {
        Command::Diff(args) => {
            let config = Config::load(cli.config.as_deref())?;
            commands::diff::run(&config, &args, jobs)
        }
        Command::Commit(args) => {
            let config = Config::load(cli.config.as_deref())?;
            commands::commit::run(&config, &args, jobs)
        }
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "convoy", &mut io::stdout());
            Ok(0)
        }
    }
}
