#![deny(missing_docs)]

//! # Session Setup
//!
//! Builds the rolodex shared by `check` and `resolve`: the directory of the
//! entry document is always the first local root, followed by every
//! `--root` in the order given.

use crate::error::CliResult;
use refwalk_core::{IndexConfig, LocalFs, Rolodex, RolodexFile};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Lookup roots shared by the commands that open a document.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct SessionArgs {
    /// Additional directories searched for referenced documents.
    #[clap(long = "root", value_name = "DIR")]
    pub roots: Vec<PathBuf>,

    /// Fetch `http` / `https` references over the network.
    #[cfg(feature = "client")]
    #[clap(long)]
    pub remote: bool,
}

/// A rolodex plus the opened entry document.
pub struct Session {
    /// The rolodex serving every lookup.
    pub rolodex: Arc<Rolodex>,
    /// The entry document.
    pub file: Arc<RolodexFile>,
}

impl Session {
    /// Registers the lookup roots and opens `spec`.
    pub fn open(spec: &Path, args: &SessionArgs) -> CliResult<Self> {
        let rolodex = Rolodex::new(IndexConfig::default());

        let spec_dir = match spec.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        rolodex.add_local_fs(&spec_dir, Arc::new(LocalFs::new(&spec_dir)?));
        for root in &args.roots {
            rolodex.add_local_fs(root, Arc::new(LocalFs::new(root)?));
        }

        #[cfg(feature = "client")]
        {
            if args.remote {
                let http = Arc::new(crate::http::HttpFs::default());
                rolodex.add_remote_fs("https://", http.clone());
                rolodex.add_remote_fs("http://", http);
            }
        }

        let location = std::path::absolute(spec)?;
        let file = rolodex.open(&location.to_string_lossy())?;
        tracing::debug!(spec = %file.full_path(), roots = rolodex.local_roots().len(), "session opened");
        Ok(Self { rolodex, file })
    }
}
