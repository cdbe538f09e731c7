//! Load-generation harness for the connection pool.

mod commands;
mod config;
mod simulated;

use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::commands::config::ConfigArgs;
use crate::commands::run::RunArgs;
use crate::config::HarnessConfig;

/// Connection pool harness
///
/// Drives a pool of simulated database connections from many threads.
#[derive(Parser)]
#[clap(name = "cpool", author, version, about)]
struct Cli {
    /// Path to a TOML configuration file
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level (RUST_LOG takes precedence)
    #[clap(short, long, global = true)]
    verbose: bool,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run worker threads against the pool and report the outcome
    Run(RunArgs),

    /// Print the effective configuration
    Config(ConfigArgs),
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_millis()
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let config = HarnessConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run(args) => {
            let summary = commands::run::execute(&args, config)?;
            if args.json {
                let json = serde_json::to_string_pretty(&summary)
                    .context("Failed to serialize run summary")?;
                println!("{}", json);
            } else {
                print!("{}", summary.to_text());
            }
        }
        Commands::Config(args) => {
            if let Some(rendered) = commands::config::execute(&args, &config)? {
                print!("{}", rendered);
            }
        }
    }

    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("error: {:#}", e);
        process::exit(1);
    }
}
