#![deny(missing_docs)]

//! # Refwalk CLI
//!
//! Command Line Interface for the `$ref` resolution engine.
//!
//! Supported Commands:
//! - `check`: Reports missing references and circular references.
//! - `resolve`: Writes a document with every resolvable `$ref` inlined.
//! - `index`: Indexes every document under one or more directories.
//!
//! Logging goes to stderr and is controlled with `RUST_LOG`.

use clap::{Parser, Subcommand};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod check;
mod error;
#[cfg(feature = "client")]
mod http;
mod index;
mod resolve;
mod session;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Locate, check and dereference $ref graphs")]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check every reference without modifying the document.
    Check(check::CheckArgs),
    /// Inline every resolvable reference.
    Resolve(resolve::ResolveArgs),
    /// Index every document under the given directories.
    Index(index::IndexArgs),
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match &cli.command {
        Commands::Check(args) => check::execute(args),
        Commands::Resolve(args) => resolve::execute(args),
        Commands::Index(args) => index::execute(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", err);
            ExitCode::FAILURE
        }
    }
}
