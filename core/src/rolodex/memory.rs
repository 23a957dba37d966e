#![deny(missing_docs)]

//! # Memory Filesystem
//!
//! Documents registered by name. Lookups return foreign handles, so the
//! rolodex reads, stats, and wraps them like any third-party source. Bulk
//! indexing sees every registered YAML / JSON document.

use crate::document::FileExtension;
use crate::rolodex::{BufferedHandle, FileMetadata, FsEntry, RolodexFile, RolodexFs};
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::io;
use std::sync::Arc;
use std::time::SystemTime;

/// Documents held in memory, keyed by the exact name they are opened with.
#[derive(Debug, Default)]
pub struct MemoryFs {
    files: RwLock<IndexMap<String, (Vec<u8>, SystemTime)>>,
}

impl MemoryFs {
    /// An empty filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a document.
    pub fn insert(&self, name: impl Into<String>, content: impl Into<Vec<u8>>) {
        self.files
            .write()
            .insert(name.into(), (content.into(), SystemTime::now()));
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with_file(self, name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        self.insert(name, content);
        self
    }

    /// Number of documents.
    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    /// Whether no documents are registered.
    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }
}

impl RolodexFs for MemoryFs {
    fn open(&self, name: &str) -> io::Result<FsEntry> {
        match self.files.read().get(name) {
            Some((content, modified)) => Ok(FsEntry::Handle(Box::new(BufferedHandle::new(
                content.clone(),
                *modified,
            )))),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} not found in memory", name),
            )),
        }
    }

    fn files(&self) -> Vec<Arc<RolodexFile>> {
        self.files
            .read()
            .iter()
            .filter(|(name, _)| FileExtension::from_path(name.as_str()).is_supported())
            .map(|(name, (content, modified))| {
                let metadata = FileMetadata {
                    modified: *modified,
                    mode: 0o444,
                    len: content.len() as u64,
                };
                Arc::new(RolodexFile::new(name.clone(), content.clone(), metadata))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_open_returns_handle() {
        let fs = MemoryFs::new().with_file("pet.yaml", "type: object");
        assert_eq!(fs.len(), 1);
        match fs.open("pet.yaml").unwrap() {
            FsEntry::Handle(mut handle) => {
                let mut out = String::new();
                handle.read_to_string(&mut out).unwrap();
                assert_eq!(out, "type: object");
                assert_eq!(handle.metadata().unwrap().len, 12);
            }
            FsEntry::Native(_) => panic!("memory files are served as handles"),
        }
        assert!(fs.open("other.yaml").is_err());
    }

    #[test]
    fn test_files_lists_documents() {
        let fs = MemoryFs::new()
            .with_file("pet.yaml", "type: object")
            .with_file("notes.txt", "not a document")
            .with_file("tag.json", "{}");
        let names: Vec<String> = fs.files().iter().map(|f| f.name().to_string()).collect();
        assert_eq!(names, vec!["pet.yaml", "tag.json"]);
        assert_eq!(fs.files()[0].size(), 12);
    }
}
