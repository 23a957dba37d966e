#![deny(missing_docs)]

//! # Refwalk Core
//!
//! Locates, validates and dereferences `$ref` graphs in OpenAPI and JSON
//! Schema documents, including documents spread across local directories
//! and remote hosts.
//!
//! ```no_run
//! use refwalk_core::{IndexConfig, LocalFs, Resolver, Rolodex};
//! use std::sync::Arc;
//!
//! # fn main() -> refwalk_core::AppResult<()> {
//! let rolodex = Rolodex::new(IndexConfig::default());
//! rolodex.add_local_fs("specs", Arc::new(LocalFs::new("specs")?));
//!
//! let file = rolodex.open("api.yaml")?;
//! let index = file.index(rolodex.index_config())?;
//! let mut index = index.lock();
//! for error in Resolver::new(&mut index).resolve() {
//!     eprintln!("{}", error);
//! }
//! # Ok(())
//! # }
//! ```

/// Shared error types.
pub mod error;

/// YAML / JSON loading with `$ref` source positions.
pub mod document;

/// Per-document reference indexing and resolution.
pub mod index;

/// Multi-source virtual filesystem.
pub mod rolodex;

pub use document::{parse_document, FileExtension, ParsedDocument, Position};
pub use error::{AppError, AppResult};
pub use index::locator::Locator;
pub use index::reference::{RefId, RefSite, Reference};
pub use index::resolver::{
    CircularReferenceResult, Resolver, ResolvingError, ResolvingErrorKind, MAX_JOURNEY_LENGTH,
};
pub use index::{IndexConfig, SpecIndex};
pub use rolodex::{
    BufferedHandle, FileMetadata, FsEntry, FsHandle, LocalFs, MemoryFs, Rolodex, RolodexFile,
    RolodexFs,
};
