//! The seam between the command layer and a storage account.
//!
//! Commands only talk to [`StorageClient`]. [`LocalStorage`] is the account the
//! binary ships with: a directory tree standing in for the remote service.

mod cipher;
mod local;
#[cfg(test)]
pub mod memory;

use std::{
    io::{Read, Write},
    time::Duration,
};

use rand::{rngs::OsRng, RngCore};
use thiserror::Error;

use crate::models::{CopyRef, DeltaPage, DeltaPoll, Entry, Link, ThumbnailFormat, ThumbnailSize};

pub use local::LocalStorage;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0} already exists")]
    Conflict(String),

    #[error("{0} is a directory")]
    IsDirectory(String),

    #[error("{0} not supported by this account")]
    Unsupported(&'static str),

    #[error("no revision {revision} for {path}")]
    InvalidRevision { path: String, revision: String },

    #[error("invalid cursor: {0}")]
    InvalidCursor(String),

    #[error("encryption failure: {0}")]
    Crypto(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Blocking operations on a storage account.
///
/// Paths are absolute remote paths (`/dir/file`). Optional operations default
/// to [`StorageError::Unsupported`].
pub trait StorageClient {
    /// Runs the interactive authentication and returns a fresh access token.
    fn authenticate(&mut self) -> StorageResult<String>;

    fn set_access_token(&mut self, token: &str);

    fn access_token(&self) -> Option<&str>;

    fn metadata(
        &mut self,
        path: &str,
        include_children: bool,
        include_deleted: bool,
        revision: Option<&str>,
    ) -> StorageResult<Entry>;

    /// `parent_revision` names the revision being replaced; a mismatch, or an
    /// existing file with `overwrite` unset, stores the upload under a new name.
    fn upload_whole(
        &mut self,
        reader: &mut dyn Read,
        destination: &str,
        overwrite: bool,
        parent_revision: Option<&str>,
    ) -> StorageResult<Entry>;

    fn upload_chunked(
        &mut self,
        reader: &mut dyn Read,
        chunk_size: usize,
        destination: &str,
        overwrite: bool,
        parent_revision: Option<&str>,
    ) -> StorageResult<Entry>;

    /// Wraps `plain` so that reading it yields the encrypted stream.
    /// `size` is the plaintext length, needed for framing.
    fn encrypting_reader(
        &self,
        key: &[u8],
        plain: Box<dyn Read>,
        size: u64,
    ) -> StorageResult<Box<dyn Read>>;

    /// Streams `path` from byte `offset` on into `out` and returns the bytes written.
    fn download(
        &mut self,
        path: &str,
        revision: Option<&str>,
        offset: u64,
        out: &mut dyn Write,
    ) -> StorageResult<u64>;

    fn download_encrypted(
        &mut self,
        key: &[u8],
        path: &str,
        revision: Option<&str>,
        out: &mut dyn Write,
    ) -> StorageResult<u64>;

    /// With `from_reference`, `from` is a reference returned by [`StorageClient::copy_ref`].
    fn copy(&mut self, from: &str, to: &str, from_reference: bool) -> StorageResult<Entry>;

    fn move_entry(&mut self, from: &str, to: &str) -> StorageResult<Entry>;

    /// Removes a file, or a directory recursively.
    fn delete(&mut self, path: &str) -> StorageResult<Entry>;

    fn create_folder(&mut self, path: &str) -> StorageResult<Entry>;

    /// `limit` of zero means no limit.
    fn search(
        &mut self,
        dir: &str,
        query: &str,
        limit: usize,
        include_deleted: bool,
    ) -> StorageResult<Vec<Entry>>;

    /// Newest first.
    fn revisions(&mut self, path: &str, limit: usize) -> StorageResult<Vec<Entry>>;

    fn restore(&mut self, path: &str, revision: &str) -> StorageResult<Entry>;

    fn share_link(&mut self, path: &str, short: bool) -> StorageResult<Link>;

    fn copy_ref(&mut self, _path: &str) -> StorageResult<CopyRef> {
        Err(StorageError::Unsupported("copy references"))
    }

    fn media_link(&mut self, _path: &str) -> StorageResult<Link> {
        Err(StorageError::Unsupported("media links"))
    }

    fn thumbnail(
        &mut self,
        _path: &str,
        _format: ThumbnailFormat,
        _size: ThumbnailSize,
        _out: &mut dyn Write,
    ) -> StorageResult<u64> {
        Err(StorageError::Unsupported("thumbnails"))
    }

    fn delta(&mut self, _cursor: Option<&str>, _prefix: Option<&str>) -> StorageResult<DeltaPage> {
        Err(StorageError::Unsupported("delta"))
    }

    fn longpoll_delta(&mut self, _cursor: &str, _timeout: Duration) -> StorageResult<DeltaPoll> {
        Err(StorageError::Unsupported("long-poll delta"))
    }

    /// Generates a symmetric key from the operating system's secure generator.
    fn generate_key(&mut self, length: usize) -> StorageResult<Vec<u8>> {
        let mut key = vec![0u8; length];
        OsRng
            .try_fill_bytes(&mut key)
            .map_err(|err| StorageError::Crypto(err.to_string()))?;
        Ok(key)
    }
}
