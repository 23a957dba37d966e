#![deny(missing_docs)]

//! # Rolodex Files
//!
//! A document served by a rolodex filesystem. Parsing and indexing happen
//! at most once per file, on first use.

use crate::document::{parse_document, FileExtension, ParsedDocument};
use crate::error::{AppError, AppResult};
use crate::index::{IndexConfig, SpecIndex};
use crate::rolodex::FileMetadata;
use parking_lot::Mutex;
use std::borrow::Cow;
use std::sync::{Arc, OnceLock};
use std::time::SystemTime;

/// An opened document.
#[derive(Debug)]
pub struct RolodexFile {
    name: String,
    full_path: String,
    extension: FileExtension,
    content: Vec<u8>,
    modified: SystemTime,
    mode: u32,
    errors: Vec<String>,
    document: OnceLock<ParsedDocument>,
    index: OnceLock<Arc<Mutex<SpecIndex>>>,
}

impl RolodexFile {
    /// Wraps content read from `full_path`.
    pub fn new(full_path: impl Into<String>, content: Vec<u8>, metadata: FileMetadata) -> Self {
        let full_path = full_path.into();
        Self {
            name: file_name(&full_path),
            extension: FileExtension::from_path(url_path(&full_path)),
            full_path,
            content,
            modified: metadata.modified,
            mode: metadata.mode,
            errors: Vec::new(),
            document: OnceLock::new(),
            index: OnceLock::new(),
        }
    }

    /// A file that was found but could not be read.
    pub fn unreadable(full_path: impl Into<String>, reason: impl Into<String>) -> Self {
        let mut file = Self::new(
            full_path,
            Vec::new(),
            FileMetadata {
                modified: SystemTime::UNIX_EPOCH,
                mode: 0,
                len: 0,
            },
        );
        file.errors.push(reason.into());
        file
    }

    /// File name, without directories.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Canonical location the file was served from.
    pub fn full_path(&self) -> &str {
        &self.full_path
    }

    /// Format, detected from the file name.
    pub fn extension(&self) -> FileExtension {
        self.extension
    }

    /// Raw content.
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// Content as text (lossy).
    pub fn content_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.content)
    }

    /// Size of the content in bytes.
    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }

    /// Last modification time.
    pub fn mod_time(&self) -> SystemTime {
        self.modified
    }

    /// Permission bits.
    pub fn mode(&self) -> u32 {
        self.mode
    }

    /// Always `false`: only documents are served.
    pub fn is_dir(&self) -> bool {
        false
    }

    /// Problems met while reading the file.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// The parsed document, parsed on first call.
    pub fn document(&self) -> AppResult<&ParsedDocument> {
        if let Some(document) = self.document.get() {
            return Ok(document);
        }
        if !self.errors.is_empty() {
            return Err(AppError::General(self.errors.join("; ")));
        }
        let parsed = parse_document(&self.content)?;
        Ok(self.document.get_or_init(|| parsed))
    }

    /// The index of this file, built on first call with a copy of `config`
    /// pointing at this file's location.
    pub fn index(&self, config: &IndexConfig) -> AppResult<Arc<Mutex<SpecIndex>>> {
        if let Some(index) = self.index.get() {
            return Ok(index.clone());
        }
        let document = self.document()?.clone();
        let config = config.clone().with_spec_absolute_path(self.full_path.clone());
        let index = Arc::new(Mutex::new(SpecIndex::from_document(document, config)));
        Ok(self.index.get_or_init(|| index).clone())
    }

    /// The index, if one has been built.
    pub fn get_index(&self) -> Option<Arc<Mutex<SpecIndex>>> {
        self.index.get().cloned()
    }
}

fn url_path(full_path: &str) -> &str {
    full_path
        .split(|c: char| c == '?' || c == '#')
        .next()
        .unwrap_or(full_path)
}

fn file_name(full_path: &str) -> String {
    url_path(full_path)
        .rsplit(|c: char| c == '/' || c == '\\')
        .find(|s| !s.is_empty())
        .unwrap_or(full_path)
        .to_string()
}
