//! `igconf` binary entry point.

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use igconf::cli::{self, Cli};

fn main() -> ExitCode {
    let filter =
        EnvFilter::try_from_env("IGCONF_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match cli::run(Cli::parse()) {
        Ok(code) => code,
        Err(err) => {
            // Fancy formatted output via miette's report renderer.
            eprintln!("{:?}", miette::Report::new(err));
            ExitCode::FAILURE
        }
    }
}
