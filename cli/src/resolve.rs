#![deny(missing_docs)]

//! # Resolve Command
//!
//! Dereferences every resolvable `$ref` of a document and writes the result.
//! Circular references are left in place as `$ref` nodes.

use crate::error::{CliError, CliResult};
use crate::session::{Session, SessionArgs};
use refwalk_core::Resolver;
use serde_json::Value;
use std::fs;
use std::path::PathBuf;

/// Arguments for the resolve command.
#[derive(clap::Args, Debug, Clone)]
pub struct ResolveArgs {
    /// Entry document (YAML or JSON).
    pub spec: PathBuf,

    #[clap(flatten)]
    pub session: SessionArgs,

    /// Write the resolved document here instead of stdout.
    #[clap(long, short)]
    pub output: Option<PathBuf>,

    /// Output format.
    #[clap(long, value_enum, default_value_t = OutputFormat::Yaml)]
    pub format: OutputFormat,
}

/// Serialization of the resolved document.
#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// YAML.
    Yaml,
    /// Pretty-printed JSON.
    Json,
}

/// Executes the resolution.
///
/// The document is written even when problems were found; those are printed
/// to stderr and reported as [`CliError::Reported`].
pub fn execute(args: &ResolveArgs) -> CliResult<()> {
    let session = Session::open(&args.spec, &args.session)?;
    let index = session.file.index(session.rolodex.index_config())?;
    let mut index = index.lock();

    let errors = Resolver::new(&mut index).resolve();
    for error in &errors {
        eprintln!("error: {}", error);
    }

    let rendered = render(index.root(), args.format)?;
    match &args.output {
        Some(path) => {
            fs::write(path, rendered)?;
            tracing::info!(output = %path.display(), "resolved document written");
        }
        None => print!("{}", rendered),
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(CliError::Reported(errors.len()))
    }
}

fn render(root: &Value, format: OutputFormat) -> CliResult<String> {
    match format {
        OutputFormat::Yaml => Ok(serde_yaml::to_string(root)?),
        OutputFormat::Json => {
            let mut out = serde_json::to_string_pretty(root)?;
            out.push('\n');
            Ok(out)
        }
    }
}
