#![deny(missing_docs)]

//! # Check Command
//!
//! Validates every `$ref` reachable from a document without modifying it:
//! missing targets and infinite cycles are problems, other cycles are listed.

use crate::error::{CliError, CliResult};
use crate::session::{Session, SessionArgs};
use refwalk_core::{CircularReferenceResult, Resolver, ResolvingError};
use serde::Serialize;
use std::path::PathBuf;

/// Arguments for the check command.
#[derive(clap::Args, Debug, Clone)]
pub struct CheckArgs {
    /// Entry document (YAML or JSON).
    pub spec: PathBuf,

    #[clap(flatten)]
    pub session: SessionArgs,

    /// Set polymorphic (allOf / oneOf / anyOf) cycles aside.
    #[clap(long, env = "REFWALK_IGNORE_POLY")]
    pub ignore_poly: bool,

    /// Set cycles through array items aside.
    #[clap(long, env = "REFWALK_IGNORE_ARRAY")]
    pub ignore_array: bool,

    /// Report format.
    #[clap(long, value_enum, env = "REFWALK_FORMAT", default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
}

/// How the check report is printed.
#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    /// One line per problem.
    Text,
    /// A single JSON document.
    Json,
}

#[derive(Serialize)]
struct CheckReport<'a> {
    spec: &'a str,
    references_visited: usize,
    errors: Vec<ErrorEntry>,
    circular_references: &'a [CircularReferenceResult],
    ignored_poly_references: &'a [CircularReferenceResult],
    ignored_array_references: &'a [CircularReferenceResult],
}

#[derive(Serialize)]
struct ErrorEntry {
    message: String,
    path: String,
    line: Option<usize>,
    column: Option<usize>,
}

impl From<&ResolvingError> for ErrorEntry {
    fn from(error: &ResolvingError) -> Self {
        Self {
            message: error.kind.to_string(),
            path: error.path.clone(),
            line: error.position.map(|p| p.line),
            column: error.position.map(|p| p.column),
        }
    }
}

/// Executes the check.
///
/// Returns [`CliError::Reported`] when any problem was found.
pub fn execute(args: &CheckArgs) -> CliResult<()> {
    let session = Session::open(&args.spec, &args.session)?;
    let index = session.file.index(session.rolodex.index_config())?;
    let mut index = index.lock();

    let mut resolver = Resolver::new(&mut index);
    if args.ignore_poly {
        resolver.ignore_polymorphic_circular_references();
    }
    if args.ignore_array {
        resolver.ignore_array_circular_references();
    }
    let errors = resolver.check_for_circular_references();

    let report = match args.format {
        ReportFormat::Text => render_text(session.file.full_path(), &resolver, &errors),
        ReportFormat::Json => render_json(session.file.full_path(), &resolver, &errors)?,
    };
    println!("{}", report);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(CliError::Reported(errors.len()))
    }
}

fn render_text(spec: &str, resolver: &Resolver<'_>, errors: &[ResolvingError]) -> String {
    let mut lines = vec![format!(
        "{}: {} reference(s) visited, {} circular, {} problem(s)",
        spec,
        resolver.references_visited(),
        resolver.circular_references().len(),
        errors.len()
    )];
    lines.extend(errors.iter().map(|e| format!("  error: {}", e)));
    lines.extend(
        resolver
            .safe_circular_references()
            .iter()
            .map(|c| format!("  circular: {}", c.generate_journey_path())),
    );
    lines.extend(
        resolver
            .ignored_poly_references()
            .iter()
            .chain(resolver.ignored_array_references())
            .map(|c| format!("  ignored: {}", c.generate_journey_path())),
    );
    lines.join("\n")
}

fn render_json(spec: &str, resolver: &Resolver<'_>, errors: &[ResolvingError]) -> CliResult<String> {
    let report = CheckReport {
        spec,
        references_visited: resolver.references_visited(),
        errors: errors.iter().map(ErrorEntry::from).collect(),
        circular_references: resolver.circular_references(),
        ignored_poly_references: resolver.ignored_poly_references(),
        ignored_array_references: resolver.ignored_array_references(),
    };
    Ok(serde_json::to_string_pretty(&report)?)
}
