//! In-memory account for tests. Every remote call is recorded in `calls`.

use std::{
    collections::{BTreeMap, BTreeSet},
    io::{Cursor, Read, Write},
    time::Duration,
};

use super::{StorageClient, StorageError, StorageResult};
use crate::{
    models::{DeltaPoll, Entry, Link},
    utils::{clean_remote_path, is_within, parent_and_name},
};

const SEALED_PREFIX: &[u8] = b"sealed:";

#[derive(Debug, Default)]
pub struct MemoryStorage {
    pub files: BTreeMap<String, Vec<u8>>,
    pub dirs: BTreeSet<String>,
    pub calls: Vec<String>,
    pub generated_keys: usize,
    /// Paths whose uploads and downloads fail.
    pub broken: BTreeSet<String>,
    /// Answer to long-polls; unsupported when unset.
    pub poll: Option<DeltaPoll>,
    token: Option<String>,
}

impl MemoryStorage {
    pub fn with_files(files: &[(&str, &str)]) -> Self {
        let mut storage = Self::default();
        for (path, content) in files {
            storage.insert(path, content.as_bytes());
        }
        storage
    }

    pub fn insert(&mut self, path: &str, content: &[u8]) {
        let path = clean_remote_path(path);
        let mut parent = parent_and_name(&path).0.to_string();
        while parent != "/" {
            self.dirs.insert(parent.clone());
            parent = parent_and_name(&parent).0.to_string();
        }
        self.files.insert(path, content.to_vec());
    }

    pub fn content(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(Vec::as_slice)
    }

    fn record(&mut self, call: &str, path: &str) {
        self.calls.push(format!("{call} {path}"));
    }

    fn check(&self, path: &str) -> StorageResult<()> {
        if self.broken.contains(path) {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset",
            )));
        }
        Ok(())
    }

    fn entry(&self, path: &str) -> StorageResult<Entry> {
        if path == "/" || self.dirs.contains(path) {
            return Ok(Entry::dir(path));
        }
        let content = self
            .files
            .get(path)
            .ok_or_else(|| StorageError::NotFound(path.to_string()))?;
        Ok(Entry::file(
            path,
            content.len() as u64,
            format!("rev{}", content.len()),
        ))
    }

    fn store(&mut self, reader: &mut dyn Read, destination: &str) -> StorageResult<Entry> {
        let destination = clean_remote_path(destination);
        self.check(&destination)?;
        let mut content = Vec::new();
        reader.read_to_end(&mut content)?;
        self.insert(&destination, &content);
        self.entry(&destination)
    }

    fn fetch(&self, path: &str) -> StorageResult<&[u8]> {
        self.check(path)?;
        self.files
            .get(path)
            .map(Vec::as_slice)
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }
}

impl StorageClient for MemoryStorage {
    fn authenticate(&mut self) -> StorageResult<String> {
        self.calls.push("authenticate".to_string());
        self.token = Some("memory-token".to_string());
        Ok("memory-token".to_string())
    }

    fn set_access_token(&mut self, token: &str) {
        self.token = Some(token.to_string());
    }

    fn access_token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    fn metadata(
        &mut self,
        path: &str,
        include_children: bool,
        _include_deleted: bool,
        _revision: Option<&str>,
    ) -> StorageResult<Entry> {
        self.record("metadata", path);
        let mut entry = self.entry(path)?;
        if entry.is_dir && include_children {
            let dirs = self.dirs.iter().filter(|d| parent_and_name(d).0 == path);
            let files = self.files.keys().filter(|f| parent_and_name(f).0 == path);
            let mut contents = dirs
                .chain(files)
                .map(|child| self.entry(child))
                .collect::<StorageResult<Vec<_>>>()?;
            contents.sort_by(|a, b| a.path.cmp(&b.path));
            entry.contents = contents;
        }
        Ok(entry)
    }

    fn upload_whole(
        &mut self,
        reader: &mut dyn Read,
        destination: &str,
        _overwrite: bool,
        _parent_revision: Option<&str>,
    ) -> StorageResult<Entry> {
        self.record("upload_whole", destination);
        self.store(reader, destination)
    }

    fn upload_chunked(
        &mut self,
        reader: &mut dyn Read,
        chunk_size: usize,
        destination: &str,
        _overwrite: bool,
        _parent_revision: Option<&str>,
    ) -> StorageResult<Entry> {
        self.calls.push(format!("upload_chunked({chunk_size}) {destination}"));
        self.store(reader, destination)
    }

    fn encrypting_reader(
        &self,
        key: &[u8],
        mut plain: Box<dyn Read>,
        size: u64,
    ) -> StorageResult<Box<dyn Read>> {
        let mut content = Vec::new();
        plain.read_to_end(&mut content)?;
        if content.len() as u64 != size {
            return Err(StorageError::Crypto("size mismatch".to_string()));
        }
        let mut sealed = SEALED_PREFIX.to_vec();
        sealed.extend(xor(key, &content));
        Ok(Box::new(Cursor::new(sealed)))
    }

    fn download(
        &mut self,
        path: &str,
        _revision: Option<&str>,
        offset: u64,
        out: &mut dyn Write,
    ) -> StorageResult<u64> {
        self.record("download", path);
        let content = self.fetch(path)?;
        let rest = content.get(offset as usize..).unwrap_or_default();
        out.write_all(rest)?;
        Ok(rest.len() as u64)
    }

    fn download_encrypted(
        &mut self,
        key: &[u8],
        path: &str,
        _revision: Option<&str>,
        out: &mut dyn Write,
    ) -> StorageResult<u64> {
        self.record("download_encrypted", path);
        let sealed = self
            .fetch(path)?
            .strip_prefix(SEALED_PREFIX)
            .ok_or_else(|| StorageError::Crypto("not encrypted".to_string()))?;
        let plain = xor(key, sealed);
        out.write_all(&plain)?;
        Ok(plain.len() as u64)
    }

    fn copy(&mut self, from: &str, to: &str, _from_reference: bool) -> StorageResult<Entry> {
        self.record("copy", from);
        let content = self.fetch(from)?.to_vec();
        self.insert(to, &content);
        self.entry(to)
    }

    fn move_entry(&mut self, from: &str, to: &str) -> StorageResult<Entry> {
        self.record("move", from);
        let content = self
            .files
            .remove(from)
            .ok_or_else(|| StorageError::NotFound(from.to_string()))?;
        self.insert(to, &content);
        self.entry(to)
    }

    fn delete(&mut self, path: &str) -> StorageResult<Entry> {
        self.record("delete", path);
        let entry = self.entry(path)?;
        self.files.retain(|file, _| file != path && !is_within(file, path));
        self.dirs.retain(|dir| dir != path && !is_within(dir, path));
        Ok(entry.deleted())
    }

    fn create_folder(&mut self, path: &str) -> StorageResult<Entry> {
        self.record("create_folder", path);
        if self.entry(path).is_ok() {
            return Err(StorageError::Conflict(path.to_string()));
        }
        self.dirs.insert(path.to_string());
        self.entry(path)
    }

    fn search(
        &mut self,
        dir: &str,
        query: &str,
        limit: usize,
        _include_deleted: bool,
    ) -> StorageResult<Vec<Entry>> {
        self.record("search", dir);
        let mut found: Vec<Entry> = self
            .files
            .keys()
            .filter(|file| is_within(file, dir) && parent_and_name(file).1.contains(query))
            .map(|file| self.entry(file))
            .collect::<StorageResult<_>>()?;
        if limit > 0 {
            found.truncate(limit);
        }
        Ok(found)
    }

    fn revisions(&mut self, path: &str, _limit: usize) -> StorageResult<Vec<Entry>> {
        self.record("revisions", path);
        Ok(vec![self.entry(path)?])
    }

    fn restore(&mut self, path: &str, _revision: &str) -> StorageResult<Entry> {
        self.record("restore", path);
        self.entry(path)
    }

    fn share_link(&mut self, path: &str, _short: bool) -> StorageResult<Link> {
        self.record("share_link", path);
        self.entry(path)?;
        Ok(Link {
            url: format!("memory://{}", path.trim_start_matches('/')),
            expires: None,
        })
    }

    fn longpoll_delta(&mut self, cursor: &str, _timeout: Duration) -> StorageResult<DeltaPoll> {
        self.record("longpoll_delta", cursor);
        self.poll
            .clone()
            .ok_or(StorageError::Unsupported("long-poll delta"))
    }

    fn generate_key(&mut self, length: usize) -> StorageResult<Vec<u8>> {
        self.calls.push("generate_key".to_string());
        self.generated_keys += 1;
        Ok((0..length).map(|i| i as u8 + 1).collect())
    }
}

fn xor(key: &[u8], data: &[u8]) -> Vec<u8> {
    data.iter()
        .zip(key.iter().cycle())
        .map(|(byte, k)| byte ^ k)
        .collect()
}
