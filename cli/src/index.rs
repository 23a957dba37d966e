#![deny(missing_docs)]

//! # Index Command
//!
//! Indexes every document under one or more directories concurrently and
//! prints a per-document summary.

use crate::error::{CliError, CliResult};
use refwalk_core::{IndexConfig, LocalFs, Rolodex};
use std::path::PathBuf;
use std::sync::Arc;

/// Arguments for the index command.
#[derive(clap::Args, Debug, Clone)]
pub struct IndexArgs {
    /// Directories to walk.
    #[clap(required = true, value_name = "DIR")]
    pub dirs: Vec<PathBuf>,
}

/// Executes the bulk indexing pass.
///
/// Files that fail to index are printed to stderr and reported as
/// [`CliError::Reported`]; the others are still summarized.
pub fn execute(args: &IndexArgs) -> CliResult<()> {
    let rolodex = Rolodex::new(IndexConfig::default());
    for dir in &args.dirs {
        rolodex.add_local_fs(dir, Arc::new(LocalFs::new(dir)?));
    }

    let result = rolodex.index_the_rolodex();
    for line in summarize(&rolodex) {
        println!("{}", line);
    }

    match result {
        Ok(()) => Ok(()),
        Err(err) => {
            let leaves = err.leaves();
            for leaf in &leaves {
                eprintln!("error: {}", leaf);
            }
            Err(CliError::Reported(leaves.len()))
        }
    }
}

fn summarize(rolodex: &Rolodex) -> Vec<String> {
    let mut lines: Vec<String> = rolodex
        .indexes()
        .iter()
        .map(|index| {
            let index = index.lock();
            format!(
                "{}: {} $ref site(s), {} schema(s)",
                index.location(),
                index.all_sequenced_references().len(),
                index.all_component_schemas().len()
            )
        })
        .collect();
    lines.sort();

    if let Some(elapsed) = rolodex.indexing_duration() {
        lines.push(format!(
            "indexed {} document(s) in {}ms",
            rolodex.indexes().len(),
            elapsed.as_millis()
        ));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_index_directories() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.yaml"), "x:\n  $ref: '#/y'\ny: {}\n").unwrap();
        fs::write(dir.path().join("b.json"), "{}").unwrap();

        execute(&IndexArgs {
            dirs: vec![dir.path().to_path_buf()],
        })
        .unwrap();
    }

    #[test]
    fn test_summary_lines() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.yaml"), "x:\n  $ref: '#/y'\ny: {}\n").unwrap();

        let rolodex = Rolodex::new(IndexConfig::default());
        rolodex.add_local_fs(dir.path(), Arc::new(LocalFs::new(dir.path()).unwrap()));
        rolodex.index_the_rolodex().unwrap();

        let lines = summarize(&rolodex);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("a.yaml: 1 $ref site(s), 0 schema(s)"));
        assert!(lines[1].starts_with("indexed 1 document(s)"));
    }

    #[test]
    fn test_invalid_file_is_reported() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("bad.yaml"), "a: [unclosed").unwrap();
        let result = execute(&IndexArgs {
            dirs: vec![dir.path().to_path_buf()],
        });
        assert!(matches!(result, Err(CliError::Reported(1))));
    }
}
