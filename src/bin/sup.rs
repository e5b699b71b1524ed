// src/bin/sup.rs

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use stackup::{
    CancellationToken,
    cli::{
        Cli, exit_code_for,
        handlers::run::{self, Collaborators, RunOptions},
    },
};
use std::env;
use std::io;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// The main entry point of `sup`.
/// Sets up logging, parses arguments, runs the Supfile, and maps failures to
/// exit codes.
fn main() {
    let cli = Cli::parse();
    init_logger(cli.debug);

    let cancellation_token = Arc::new(AtomicBool::new(false));

    if let Err(e) = run_cli(cli, &cancellation_token) {
        eprintln!("\n{}: {}", "Error".red().bold(), e);
        std::process::exit(exit_code_for(&e));
    }
}

/// `RUST_LOG` wins when set; otherwise `warn`, or `debug` with `-D`.
fn init_logger(debug: bool) {
    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(if debug {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Warn
        })
        .format_timestamp(None);
    if let Ok(spec) = env::var("RUST_LOG") {
        builder.parse_filters(&spec);
    }
    builder.init();
}

fn run_cli(cli: Cli, cancellation_token: &CancellationToken) -> Result<()> {
    log::debug!("CLI args parsed: {:?}", cli);

    let working_dir = env::current_dir().context("Could not determine the current directory")?;
    let options = RunOptions {
        working_dir: working_dir.clone(),
        supfile: cli.file.clone(),
        only: cli.only.clone(),
        except: cli.except.clone(),
        env_vars: cli.env.clone(),
        process_env: env::vars().collect(),
    };
    let collaborators = Collaborators::system(&working_dir, cli.disable_prefix);

    run::handle(
        &options,
        &cli.positionals(),
        collaborators,
        &mut io::stderr(),
        cancellation_token,
    )?;
    Ok(())
}
