#![deny(missing_docs)]

//! # Local Filesystem
//!
//! Walks a directory tree once, building a [`RolodexFile`] for every YAML or
//! JSON document found. Files that appear later are still served, as plain
//! handles, as long as they live under the base directory.

use crate::document::FileExtension;
use crate::error::{AppError, AppResult};
use crate::index::locator::clean_path;
use crate::rolodex::{absolute_path, file_mode, FileMetadata, FsEntry, RolodexFile, RolodexFs};
use indexmap::IndexMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

/// A directory tree on disk.
#[derive(Debug)]
pub struct LocalFs {
    base_dir: PathBuf,
    files: IndexMap<String, Arc<RolodexFile>>,
}

impl LocalFs {
    /// Walks `base_dir`, reading every supported document beneath it.
    pub fn new(base_dir: impl AsRef<Path>) -> AppResult<Self> {
        let base_dir = absolute_path(base_dir.as_ref());
        if !base_dir.is_dir() {
            return Err(AppError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} is not a directory", base_dir.display()),
            )));
        }

        let mut files = IndexMap::new();
        for entry in WalkDir::new(&base_dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !entry.file_type().is_file() || !FileExtension::from_path(path).is_supported() {
                continue;
            }

            let full_path = clean_path(path).to_string_lossy().into_owned();
            let file = match read_file(path) {
                Ok((content, metadata)) => RolodexFile::new(full_path.clone(), content, metadata),
                Err(err) => {
                    tracing::warn!(file = %full_path, error = %err, "unable to read file");
                    RolodexFile::unreadable(full_path.clone(), err.to_string())
                }
            };
            files.insert(full_path, Arc::new(file));
        }

        tracing::debug!(root = %base_dir.display(), files = files.len(), "local filesystem walked");
        Ok(Self { base_dir, files })
    }

    /// The absolute, cleaned base directory.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Number of documents found by the walk.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the walk found no documents.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl RolodexFs for LocalFs {
    fn open(&self, name: &str) -> io::Result<FsEntry> {
        let requested = Path::new(name);
        let full = if requested.is_absolute() {
            clean_path(requested)
        } else {
            clean_path(&self.base_dir.join(requested))
        };

        if let Some(file) = self.files.get(full.to_string_lossy().as_ref()) {
            return Ok(FsEntry::Native(file.clone()));
        }
        if !full.starts_with(&self.base_dir) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} is outside {}", full.display(), self.base_dir.display()),
            ));
        }

        let file = std::fs::File::open(&full)?;
        Ok(FsEntry::Handle(Box::new(file)))
    }

    fn files(&self) -> Vec<Arc<RolodexFile>> {
        self.files.values().cloned().collect()
    }
}

fn read_file(path: &Path) -> io::Result<(Vec<u8>, FileMetadata)> {
    let content = std::fs::read(path)?;
    let meta = std::fs::metadata(path)?;
    Ok((
        content,
        FileMetadata {
            modified: meta.modified()?,
            mode: file_mode(&meta),
            len: meta.len(),
        },
    ))
}
