#![deny(missing_docs)]

//! # Rolodex
//!
//! - **file**: Opened documents, with lazily parsed content and index.
//! - **local**: A directory tree on disk, walked up front.
//! - **memory**: Documents held in memory, served as foreign handles.
//!
//! A [`Rolodex`] routes document lookups to registered filesystems: URLs go
//! to remote filesystems, everything else is tried against each local root
//! in registration order. It can also index every file its filesystems
//! know about, one concurrent task per filesystem and per file.

pub mod file;
pub mod local;
pub mod memory;

pub use file::RolodexFile;
pub use local::LocalFs;
pub use memory::MemoryFs;

use crate::error::{AppError, AppResult};
use crate::index::locator::{clean_path, parse_remote_url};
use crate::index::{IndexConfig, SpecIndex};
use crossbeam::channel;
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant, SystemTime};

/// Metadata of an opened document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMetadata {
    /// Last modification time.
    pub modified: SystemTime,
    /// Unix permission bits (synthesized on other platforms).
    pub mode: u32,
    /// Size in bytes.
    pub len: u64,
}

/// A readable document handle produced by a filesystem that does not build
/// [`RolodexFile`]s itself.
pub trait FsHandle: Read + Send {
    /// Metadata of the underlying document.
    fn metadata(&self) -> io::Result<FileMetadata>;
}

impl FsHandle for std::fs::File {
    fn metadata(&self) -> io::Result<FileMetadata> {
        let meta = std::fs::File::metadata(self)?;
        Ok(FileMetadata {
            modified: meta.modified()?,
            mode: file_mode(&meta),
            len: meta.len(),
        })
    }
}

/// An in-memory handle over already fetched content.
#[derive(Debug)]
pub struct BufferedHandle {
    cursor: Cursor<Vec<u8>>,
    modified: SystemTime,
    mode: u32,
}

impl BufferedHandle {
    /// Wraps read-only content last modified at `modified`.
    pub fn new(content: Vec<u8>, modified: SystemTime) -> Self {
        Self {
            cursor: Cursor::new(content),
            modified,
            mode: 0o444,
        }
    }
}

impl Read for BufferedHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.cursor.read(buf)
    }
}

impl FsHandle for BufferedHandle {
    fn metadata(&self) -> io::Result<FileMetadata> {
        Ok(FileMetadata {
            modified: self.modified,
            mode: self.mode,
            len: self.cursor.get_ref().len() as u64,
        })
    }
}

/// What a filesystem returns for a successful lookup.
pub enum FsEntry {
    /// A file the filesystem already built (and may have indexed).
    Native(Arc<RolodexFile>),
    /// Any other readable handle; the rolodex reads and wraps it.
    Handle(Box<dyn FsHandle>),
}

impl fmt::Debug for FsEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FsEntry::Native(file) => f.debug_tuple("Native").field(&file.full_path()).finish(),
            FsEntry::Handle(_) => f.write_str("Handle(..)"),
        }
    }
}

/// A source of documents the rolodex can route lookups to.
pub trait RolodexFs: Send + Sync + fmt::Debug {
    /// Opens the document called `name`.
    fn open(&self, name: &str) -> io::Result<FsEntry>;

    /// Every file this filesystem wants indexed by
    /// [`Rolodex::index_the_rolodex`]. Empty by default.
    fn files(&self) -> Vec<Arc<RolodexFile>> {
        Vec::new()
    }
}

/// A multi-source virtual filesystem for reference lookups.
#[derive(Debug)]
pub struct Rolodex {
    local_fs: RwLock<IndexMap<String, Arc<dyn RolodexFs>>>,
    remote_fs: RwLock<IndexMap<String, Arc<dyn RolodexFs>>>,
    index_config: IndexConfig,
    indexed: AtomicBool,
    indexing_duration: Mutex<Option<Duration>>,
    indexes: Mutex<Vec<Arc<Mutex<SpecIndex>>>>,
    opened: Mutex<HashMap<String, Arc<RolodexFile>>>,
}

impl Rolodex {
    /// Creates an empty rolodex. Every index it builds (or hands `config` to)
    /// can reach back to it.
    pub fn new(config: IndexConfig) -> Arc<Self> {
        Arc::new_cyclic(|rolodex| {
            let mut index_config = config;
            index_config.rolodex = Some(rolodex.clone());
            Self {
                local_fs: RwLock::new(IndexMap::new()),
                remote_fs: RwLock::new(IndexMap::new()),
                index_config,
                indexed: AtomicBool::new(false),
                indexing_duration: Mutex::new(None),
                indexes: Mutex::new(Vec::new()),
                opened: Mutex::new(HashMap::new()),
            }
        })
    }

    /// The configuration handed to indexes, with the back-reference set.
    pub fn index_config(&self) -> &IndexConfig {
        &self.index_config
    }

    /// Registers a local filesystem rooted at `base_dir`.
    ///
    /// Roots are tried in registration order. Registering the same root again
    /// replaces its filesystem.
    pub fn add_local_fs(&self, base_dir: impl AsRef<Path>, fs: Arc<dyn RolodexFs>) {
        let root = absolute_path(base_dir.as_ref())
            .to_string_lossy()
            .into_owned();
        tracing::debug!(root = %root, "local filesystem registered");
        self.local_fs.write().insert(root, fs);
    }

    /// Registers a remote filesystem serving URLs under `base_url`.
    pub fn add_remote_fs(&self, base_url: &str, fs: Arc<dyn RolodexFs>) {
        let root = parse_remote_url(base_url)
            .map(|url| url.to_string())
            .unwrap_or_else(|| base_url.to_string());
        tracing::debug!(root = %root, "remote filesystem registered");
        self.remote_fs.write().insert(root, fs);
    }

    /// Registered local roots, in lookup order.
    pub fn local_roots(&self) -> Vec<String> {
        self.local_fs.read().keys().cloned().collect()
    }

    /// Registered remote roots.
    pub fn remote_roots(&self) -> Vec<String> {
        self.remote_fs.read().keys().cloned().collect()
    }

    /// Whether [`index_the_rolodex`](Self::index_the_rolodex) has run.
    pub fn is_indexed(&self) -> bool {
        self.indexed.load(Ordering::SeqCst)
    }

    /// Wall time of the indexing pass, once it has run.
    pub fn indexing_duration(&self) -> Option<Duration> {
        *self.indexing_duration.lock()
    }

    /// Indexes produced by the indexing pass, in completion order.
    pub fn indexes(&self) -> Vec<Arc<Mutex<SpecIndex>>> {
        self.indexes.lock().clone()
    }

    /// Indexes every file of every registered filesystem.
    ///
    /// Each filesystem runs as its own task, and each of its files is indexed
    /// in its own task. Failures are collected without stopping sibling
    /// work and returned together. Calling this again is a no-op.
    pub fn index_the_rolodex(&self) -> AppResult<()> {
        if self.indexed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let filesystems: Vec<(String, Arc<dyn RolodexFs>)> = {
            let local = self.local_fs.read();
            let remote = self.remote_fs.read();
            local
                .iter()
                .chain(remote.iter())
                .map(|(root, fs)| (root.clone(), fs.clone()))
                .collect()
        };

        let started = Instant::now();
        let (done_tx, done_rx) = channel::unbounded::<String>();
        let (error_tx, error_rx) = channel::unbounded::<AppError>();
        let (index_tx, index_rx) = channel::unbounded::<Arc<Mutex<SpecIndex>>>();
        let mut caught: Vec<AppError> = Vec::new();
        let mut produced: Vec<Arc<Mutex<SpecIndex>>> = Vec::new();
        let config = &self.index_config;

        thread::scope(|scope| {
            for (root, fs) in &filesystems {
                let done_tx = done_tx.clone();
                let error_tx = error_tx.clone();
                let index_tx = index_tx.clone();
                scope.spawn(move || {
                    thread::scope(|files| {
                        for file in fs.files() {
                            let error_tx = error_tx.clone();
                            let index_tx = index_tx.clone();
                            files.spawn(move || match file.index(config) {
                                Ok(index) => {
                                    let _ = index_tx.send(index);
                                }
                                Err(err) => {
                                    tracing::warn!(file = %file.full_path(), error = %err, "unable to index file");
                                    let _ = error_tx.send(AppError::FileIndex {
                                        path: file.full_path().to_string(),
                                        reason: err.to_string(),
                                    });
                                }
                            });
                        }
                    });
                    let _ = done_tx.send(root.clone());
                });
            }
            drop((done_tx, error_tx, index_tx));

            let mut completed = 0;
            while completed < filesystems.len() {
                crossbeam::select! {
                    recv(done_rx) -> msg => match msg {
                        Ok(root) => {
                            completed += 1;
                            tracing::debug!(root = %root, "filesystem indexed");
                        }
                        Err(_) => break,
                    },
                    recv(error_rx) -> msg => {
                        if let Ok(err) = msg {
                            caught.push(err);
                        }
                    }
                    recv(index_rx) -> msg => {
                        if let Ok(index) = msg {
                            produced.push(index);
                        }
                    }
                }
            }
        });

        caught.extend(error_rx.try_iter());
        produced.extend(index_rx.try_iter());

        let elapsed = started.elapsed();
        *self.indexing_duration.lock() = Some(elapsed);
        tracing::info!(
            filesystems = filesystems.len(),
            indexes = produced.len(),
            errors = caught.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "rolodex indexed"
        );

        self.indexes.lock().extend(produced);
        match AppError::join(caught) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Opens the document at `location`, which is a URL, an absolute path,
    /// or a path relative to one of the local roots.
    ///
    /// Opened files are cached, so a document is read at most once.
    pub fn open(&self, location: &str) -> AppResult<Arc<RolodexFile>> {
        if let Some(file) = self.opened.lock().get(location) {
            return Ok(file.clone());
        }

        let mut attempts = Vec::new();
        let file = if parse_remote_url(location).is_some() {
            self.open_remote(location, &mut attempts)
        } else {
            self.open_local(location, &mut attempts)
        };

        match file {
            Some(file) => {
                let mut opened = self.opened.lock();
                opened.insert(location.to_string(), file.clone());
                opened.insert(file.full_path().to_string(), file.clone());
                Ok(file)
            }
            None => {
                if attempts.is_empty() {
                    attempts.push("no filesystem registered".to_string());
                }
                Err(AppError::FileLookup {
                    location: location.to_string(),
                    attempts,
                })
            }
        }
    }

    fn open_local(&self, location: &str, attempts: &mut Vec<String>) -> Option<Arc<RolodexFile>> {
        let roots: Vec<(String, Arc<dyn RolodexFs>)> = self
            .local_fs
            .read()
            .iter()
            .map(|(root, fs)| (root.clone(), fs.clone()))
            .collect();
        let requested = Path::new(location);

        for (root, fs) in roots {
            let joined = if requested.is_absolute() {
                clean_path(requested)
            } else {
                clean_path(&Path::new(&root).join(requested))
            };
            let joined = joined.to_string_lossy().into_owned();

            let (entry, full_path) = match fs.open(&joined) {
                Ok(entry) => (entry, joined),
                Err(first) => match fs.open(location) {
                    Ok(entry) => (entry, location.to_string()),
                    Err(second) => {
                        attempts.push(format!("{}: {}", joined, first));
                        if joined != location {
                            attempts.push(format!("{} (root {}): {}", location, root, second));
                        }
                        continue;
                    }
                },
            };

            match materialize(entry, &full_path) {
                Ok(file) => return Some(file),
                Err(err) => attempts.push(format!("{}: {}", full_path, err)),
            }
        }
        None
    }

    fn open_remote(&self, location: &str, attempts: &mut Vec<String>) -> Option<Arc<RolodexFile>> {
        let remotes: Vec<(String, Arc<dyn RolodexFs>)> = self
            .remote_fs
            .read()
            .iter()
            .filter(|(root, _)| location.starts_with(root.as_str()))
            .map(|(root, fs)| (root.clone(), fs.clone()))
            .collect();

        if remotes.is_empty() {
            attempts.push(format!("no remote filesystem serves {}", location));
        }

        for (root, fs) in remotes {
            let result = fs
                .open(location)
                .map_err(AppError::from)
                .and_then(|entry| materialize(entry, location));
            match result {
                Ok(file) => return Some(file),
                Err(err) => attempts.push(format!("{} (root {}): {}", location, root, err)),
            }
        }
        None
    }
}

/// Turns a filesystem entry into a shared file, reading foreign handles to the end.
fn materialize(entry: FsEntry, full_path: &str) -> AppResult<Arc<RolodexFile>> {
    match entry {
        FsEntry::Native(file) => Ok(file),
        FsEntry::Handle(mut handle) => {
            let mut content = Vec::new();
            handle.read_to_end(&mut content)?;
            let metadata = handle.metadata()?;
            if content.is_empty() {
                return Err(AppError::General(format!("'{}' is empty", full_path)));
            }
            Ok(Arc::new(RolodexFile::new(full_path, content, metadata)))
        }
    }
}

/// Makes `path` absolute (against the working directory) and cleans it lexically.
pub(crate) fn absolute_path(path: &Path) -> PathBuf {
    match std::path::absolute(path) {
        Ok(absolute) => clean_path(&absolute),
        Err(_) => clean_path(path),
    }
}

pub(crate) fn file_mode(meta: &std::fs::Metadata) -> u32 {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        meta.permissions().mode()
    }
    #[cfg(not(unix))]
    {
        if meta.permissions().readonly() {
            0o444
        } else {
            0o644
        }
    }
}
