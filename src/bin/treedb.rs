//! treedb CLI Binary
//!
//! Command-line interface for the treedb resource graph engine.

use anyhow::Context;
use clap::Parser;
use std::process;
use treedb::logging::init_logging;
use treedb::tooling::cli::{load_config, Cli, CliContext};

fn run(cli: &Cli) -> anyhow::Result<i32> {
    let mut config = load_config(&cli.workspace, cli.config.as_deref())
        .context("loading configuration")?;
    cli.apply_log_overrides(&mut config);
    init_logging(Some(&config.logging)).context("initializing logging")?;

    let context = CliContext::from_config(&cli.workspace, &config)
        .with_context(|| format!("opening treedb {}", config.treedb.name))?
        .with_format(cli.format);

    let output = context.execute(&cli.command)?;
    if output.result == 0 {
        println!("{}", output.text);
    } else {
        eprintln!("{}", output.text);
    }
    Ok(output.result)
}

fn main() {
    let cli = Cli::parse();

    match run(&cli) {
        Ok(0) => {}
        Ok(_) => process::exit(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}
