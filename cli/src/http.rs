#![deny(missing_docs)]

//! # HTTP Filesystem
//!
//! A remote rolodex filesystem backed by blocking `ureq` requests.

use refwalk_core::{BufferedHandle, FsEntry, RolodexFs};
use std::io;
use std::time::SystemTime;

/// Serves `http` / `https` documents by fetching them on open.
#[derive(Debug, Default)]
pub struct HttpFs;

impl RolodexFs for HttpFs {
    fn open(&self, name: &str) -> io::Result<FsEntry> {
        tracing::debug!(url = name, "fetching remote document");
        let mut response = ureq::get(name).call().map_err(io::Error::other)?;
        let content = response
            .body_mut()
            .read_to_vec()
            .map_err(io::Error::other)?;
        Ok(FsEntry::Handle(Box::new(BufferedHandle::new(
            content,
            SystemTime::now(),
        ))))
    }
}
