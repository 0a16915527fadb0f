use std::{
    env,
    io::{self, Cursor, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use eyre::eyre;
use fs_err as fs;
use ignore::WalkBuilder;
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::{cipher, StorageClient, StorageError, StorageResult};
use crate::{
    models::{CopyRef, DeltaEntry, DeltaPage, DeltaPoll, Entry, Link},
    utils::{clean_remote_path, is_within, join_remote, parent_and_name},
};

pub const ROOT_ENV: &str = "DBOX_ROOT";
const DEFAULT_ROOT: &str = ".dbox-storage";
const META_DIR: &str = ".dbox";
const TOKEN_FILE: &str = "token";
const HISTORY_DIR: &str = "revisions";
const UPLOADS_DIR: &str = "uploads";
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// A storage account kept in a local directory.
///
/// Account state lives in `<root>/.dbox`: the access token, staged uploads and
/// the archived revisions of every path that was overwritten or deleted.
#[derive(Debug)]
pub struct LocalStorage {
    root: PathBuf,
    token: Option<String>,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            token: None,
        }
    }

    /// `$DBOX_ROOT` if set, `~/.dbox-storage` otherwise.
    pub fn from_env() -> eyre::Result<Self> {
        if let Some(root) = env::var_os(ROOT_ENV) {
            return Ok(Self::new(root));
        }
        let home = dirs::home_dir().ok_or_else(|| eyre!("cannot locate the home directory"))?;
        Ok(Self::new(home.join(DEFAULT_ROOT)))
    }

    fn meta_dir(&self) -> PathBuf {
        self.root.join(META_DIR)
    }

    fn history(&self, remote: &str) -> History {
        History::of(&self.meta_dir(), remote)
    }

    fn authorize(&self) -> StorageResult<()> {
        let expected = match fs::read_to_string(self.meta_dir().join(TOKEN_FILE)) {
            Ok(token) => token,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(StorageError::Auth("account is not initialised".to_string()))
            }
            Err(err) => return Err(err.into()),
        };
        match &self.token {
            Some(token) if token == expected.trim() => Ok(()),
            Some(_) => Err(StorageError::Auth("access token was revoked".to_string())),
            None => Err(StorageError::Auth("no access token".to_string())),
        }
    }

    /// Maps a remote path to its clean form and its location on disk.
    fn resolve(&self, remote: &str) -> StorageResult<(String, PathBuf)> {
        let remote = clean_remote_path(remote);
        let relative = remote.trim_start_matches('/');
        if relative.split('/').next() == Some(META_DIR) {
            return Err(StorageError::NotFound(remote));
        }
        let local = self.root.join(relative);
        Ok((remote, local))
    }

    fn remote_path(&self, local: &Path) -> String {
        let relative = pathdiff::diff_paths(local, &self.root)
            .unwrap_or_else(|| local.to_path_buf());
        let segments: Vec<_> = relative.iter().map(|s| s.to_string_lossy()).collect();
        format!("/{}", segments.join("/"))
    }

    fn entry_at(&self, local: &Path, remote: &str) -> StorageResult<Entry> {
        let metadata = fs::metadata(local).map_err(|err| not_found(err, remote))?;
        let entry = if metadata.is_dir() {
            Entry::dir(remote)
        } else {
            Entry::file(remote, metadata.len(), revision_of(local)?)
        };
        Ok(match metadata.modified() {
            Ok(modified) => entry.modified_at(DateTime::<Utc>::from(modified)),
            Err(_) => entry,
        })
    }

    /// Every file and directory below `dir`, sorted, without `dir` itself.
    fn walk(&self, dir: &Path) -> Vec<PathBuf> {
        let meta = self.meta_dir();
        let mut paths: Vec<PathBuf> = WalkBuilder::new(dir)
            .standard_filters(false)
            .filter_entry(move |entry| entry.path() != meta)
            .build()
            .filter_map(|result| match result {
                Ok(entry) => Some(entry.into_path()),
                Err(err) => {
                    warn!("skipping unreadable entry: {err}");
                    None
                }
            })
            .filter(|path| path.as_path() != dir)
            .collect();
        paths.sort();
        paths
    }

    fn children(
        &self,
        local: &Path,
        remote: &str,
        include_deleted: bool,
    ) -> StorageResult<Vec<Entry>> {
        let meta = self.meta_dir();
        let mut contents = Vec::new();
        for dir_entry in fs::read_dir(local)? {
            let child = dir_entry?.path();
            if child == meta {
                continue;
            }
            let child_remote = self.remote_path(&child);
            contents.push(self.entry_at(&child, &child_remote)?);
        }
        if include_deleted {
            for tombstone in self.tombstones()? {
                if parent_and_name(&tombstone.path).0 == remote {
                    contents.push(tombstone);
                }
            }
        }
        contents.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(contents)
    }

    /// The deleted entry recorded for `history`, unless the path exists again.
    fn tombstone(&self, history: &History) -> StorageResult<Option<Entry>> {
        let (deleted_at, remote) = match (history.deleted_at(), history.remote_path()) {
            (Some(deleted_at), Some(remote)) => (deleted_at, remote),
            _ => return Ok(None),
        };
        if self.resolve(&remote)?.1.exists() {
            return Ok(None);
        }
        let revision = history
            .versions()?
            .into_iter()
            .next()
            .map(|version| version.revision)
            .unwrap_or_default();
        Ok(Some(
            Entry::file(remote, 0, revision)
                .deleted()
                .modified_at(DateTime::<Utc>::from(deleted_at)),
        ))
    }

    fn tombstones(&self) -> StorageResult<Vec<Entry>> {
        let mut found = Vec::new();
        for history in History::all(&self.meta_dir())? {
            if let Some(tombstone) = self.tombstone(&history)? {
                found.push(tombstone);
            }
        }
        Ok(found)
    }

    /// The file holding `remote` at `revision`, the live file when no revision is given.
    fn content_path(
        &self,
        remote: &str,
        local: &Path,
        revision: Option<&str>,
    ) -> StorageResult<PathBuf> {
        if local.is_dir() {
            return Err(StorageError::IsDirectory(remote.to_string()));
        }
        let revision = match revision {
            None if local.is_file() => return Ok(local.to_path_buf()),
            None => return Err(StorageError::NotFound(remote.to_string())),
            Some(revision) => revision,
        };
        if local.is_file() && revision_of(local)? == revision {
            return Ok(local.to_path_buf());
        }
        self.history(remote)
            .version(revision)
            .ok_or_else(|| StorageError::InvalidRevision {
                path: remote.to_string(),
                revision: revision.to_string(),
            })
    }

    /// Writes an upload to a staging file, then moves it into place.
    fn stage<F>(
        &mut self,
        destination: &str,
        overwrite: bool,
        parent_revision: Option<&str>,
        fill: F,
    ) -> StorageResult<Entry>
    where
        F: FnOnce(&mut fs::File) -> StorageResult<()>,
    {
        self.authorize()?;
        let uploads = self.meta_dir().join(UPLOADS_DIR);
        fs::create_dir_all(&uploads)?;
        let mut id = [0u8; 8];
        OsRng.fill_bytes(&mut id);
        let staged = uploads.join(hex::encode(id));

        let mut file = fs::File::create(&staged)?;
        let result = fill(&mut file).and_then(|()| Ok(file.sync_all()?));
        drop(file);

        let result = match result {
            Ok(()) => self.commit(&staged, destination, overwrite, parent_revision),
            Err(err) => Err(err),
        };
        if result.is_err() {
            let _ = fs::remove_file(&staged);
        }
        result
    }

    fn commit(
        &mut self,
        staged: &Path,
        destination: &str,
        overwrite: bool,
        parent_revision: Option<&str>,
    ) -> StorageResult<Entry> {
        let (mut remote, mut local) = self.resolve(destination)?;
        if local.is_dir() {
            return Err(StorageError::IsDirectory(remote));
        }
        if local.is_file() {
            let current = revision_of(&local)?;
            let replace = overwrite && parent_revision.map_or(true, |parent| parent == current);
            if replace {
                self.history(&remote).archive(&remote, &local)?;
            } else {
                (remote, local) = self.free_name(&remote)?;
                debug!(path = %remote, "destination taken, storing under a new name");
            }
        }
        if let Some(parent) = local.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(staged, &local)?;
        self.history(&remote).clear_deleted()?;
        info!(path = %remote, "stored upload");
        self.entry_at(&local, &remote)
    }

    /// `name (1).ext`, `name (2).ext`, ... whichever is free first.
    fn free_name(&self, remote: &str) -> StorageResult<(String, PathBuf)> {
        let (parent, name) = parent_and_name(remote);
        let (stem, extension) = match name.rsplit_once('.') {
            Some((stem, extension)) if !stem.is_empty() => (stem, Some(extension)),
            _ => (name, None),
        };
        let mut n = 1;
        loop {
            let candidate = match extension {
                Some(extension) => format!("{stem} ({n}).{extension}"),
                None => format!("{stem} ({n})"),
            };
            let (remote, local) = self.resolve(&join_remote(parent, &candidate))?;
            if !local.exists() {
                return Ok((remote, local));
            }
            n += 1;
        }
    }

    fn existing(&self, path: &str) -> StorageResult<(String, PathBuf)> {
        let (remote, local) = self.resolve(path)?;
        if !local.exists() {
            return Err(StorageError::NotFound(remote));
        }
        Ok((remote, local))
    }

    fn copy_tree(&self, from: &Path, to: &Path) -> StorageResult<()> {
        if from.is_file() {
            if let Some(parent) = to.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(from, to)?;
            return Ok(());
        }
        fs::create_dir_all(to)?;
        for path in self.walk(from) {
            let target = match path.strip_prefix(from) {
                Ok(relative) => to.join(relative),
                Err(_) => continue,
            };
            if path.is_dir() {
                fs::create_dir_all(&target)?;
            } else {
                fs::copy(&path, &target)?;
            }
        }
        Ok(())
    }

    /// `local` itself when it is a file, every file below it otherwise.
    fn files_at(&self, local: &Path) -> Vec<PathBuf> {
        if local.is_dir() {
            self.walk(local)
                .into_iter()
                .filter(|path| path.is_file())
                .collect()
        } else {
            vec![local.to_path_buf()]
        }
    }

    /// Archives every file at `local` and records it as removed from its path.
    fn retire(&self, local: &Path) -> StorageResult<()> {
        for file in self.files_at(local) {
            let remote = self.remote_path(&file);
            let history = self.history(&remote);
            history.archive(&remote, &file)?;
            history.mark_deleted()?;
        }
        Ok(())
    }

    /// Stamps `local` and everything below it as modified now. A rename keeps
    /// the old times.
    fn touch(&self, local: &Path) -> StorageResult<()> {
        let now = SystemTime::now();
        let mut paths = self.walk(local);
        paths.push(local.to_path_buf());
        for path in paths {
            let file = if path.is_dir() {
                fs::File::open(&path)?
            } else {
                fs::OpenOptions::new().write(true).open(&path)?
            };
            file.file().set_modified(now)?;
        }
        Ok(())
    }

    fn local_link(&self, path: &str) -> StorageResult<Link> {
        let (_, local) = self.existing(path)?;
        Ok(Link {
            url: format!("file://{}", local.display()),
            expires: None,
        })
    }
}

impl StorageClient for LocalStorage {
    fn authenticate(&mut self) -> StorageResult<String> {
        let meta = self.meta_dir();
        fs::create_dir_all(&meta)?;
        let token_file = meta.join(TOKEN_FILE);
        let token = match fs::read_to_string(&token_file) {
            Ok(existing) if !existing.trim().is_empty() => existing.trim().to_string(),
            _ => {
                let mut bytes = [0u8; 16];
                OsRng.fill_bytes(&mut bytes);
                let token = hex::encode(bytes);
                fs::write(&token_file, &token)?;
                token
            }
        };
        info!(root = %self.root.display(), "authenticated");
        self.token = Some(token.clone());
        Ok(token)
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
        include_deleted: bool,
        revision: Option<&str>,
    ) -> StorageResult<Entry> {
        self.authorize()?;
        let (remote, local) = self.resolve(path)?;
        if revision.is_some() {
            let content = self.content_path(&remote, &local, revision)?;
            return self.entry_at(&content, &remote);
        }
        if !local.exists() {
            if include_deleted {
                if let Some(tombstone) = self.tombstone(&self.history(&remote))? {
                    return Ok(tombstone);
                }
            }
            return Err(StorageError::NotFound(remote));
        }
        let mut entry = self.entry_at(&local, &remote)?;
        if entry.is_dir && include_children {
            entry.contents = self.children(&local, &remote, include_deleted)?;
        }
        Ok(entry)
    }

    fn upload_whole(
        &mut self,
        reader: &mut dyn Read,
        destination: &str,
        overwrite: bool,
        parent_revision: Option<&str>,
    ) -> StorageResult<Entry> {
        self.stage(destination, overwrite, parent_revision, |file| {
            io::copy(reader, file)?;
            Ok(())
        })
    }

    fn upload_chunked(
        &mut self,
        reader: &mut dyn Read,
        chunk_size: usize,
        destination: &str,
        overwrite: bool,
        parent_revision: Option<&str>,
    ) -> StorageResult<Entry> {
        self.stage(destination, overwrite, parent_revision, |file| {
            let mut buffer = vec![0u8; chunk_size.max(1)];
            let mut offset = 0u64;
            loop {
                let read = read_chunk(reader, &mut buffer)?;
                if read == 0 {
                    break;
                }
                file.write_all(&buffer[..read])?;
                offset += read as u64;
                debug!(offset, "chunk accepted");
            }
            Ok(())
        })
    }

    fn encrypting_reader(
        &self,
        key: &[u8],
        mut plain: Box<dyn Read>,
        size: u64,
    ) -> StorageResult<Box<dyn Read>> {
        let mut buffer = Vec::with_capacity(size as usize);
        plain.read_to_end(&mut buffer)?;
        if buffer.len() as u64 != size {
            return Err(StorageError::Crypto(format!(
                "expected {size} bytes of plaintext, read {}",
                buffer.len()
            )));
        }
        Ok(Box::new(Cursor::new(cipher::encrypt(key, &buffer)?)))
    }

    fn download(
        &mut self,
        path: &str,
        revision: Option<&str>,
        offset: u64,
        out: &mut dyn Write,
    ) -> StorageResult<u64> {
        self.authorize()?;
        let (remote, local) = self.resolve(path)?;
        let content = self.content_path(&remote, &local, revision)?;
        let mut file = fs::File::open(content)?;
        file.seek(SeekFrom::Start(offset))?;
        Ok(io::copy(&mut file, out)?)
    }

    fn download_encrypted(
        &mut self,
        key: &[u8],
        path: &str,
        revision: Option<&str>,
        out: &mut dyn Write,
    ) -> StorageResult<u64> {
        let mut sealed = Vec::new();
        self.download(path, revision, 0, &mut sealed)?;
        let plain = cipher::decrypt(key, &sealed)?;
        out.write_all(&plain)?;
        Ok(plain.len() as u64)
    }

    fn copy(&mut self, from: &str, to: &str, from_reference: bool) -> StorageResult<Entry> {
        self.authorize()?;
        let from = if from_reference {
            decode_reference(from)?
        } else {
            from.to_string()
        };
        let (_, from_local) = self.existing(&from)?;
        let (to_remote, to_local) = self.resolve(to)?;
        if to_local.exists() || to_local.starts_with(&from_local) {
            return Err(StorageError::Conflict(to_remote));
        }
        self.copy_tree(&from_local, &to_local)?;
        self.history(&to_remote).clear_deleted()?;
        self.entry_at(&to_local, &to_remote)
    }

    fn copy_ref(&mut self, path: &str) -> StorageResult<CopyRef> {
        self.authorize()?;
        let (remote, _) = self.existing(path)?;
        Ok(CopyRef {
            reference: URL_SAFE_NO_PAD.encode(remote),
            expires: None,
        })
    }

    fn move_entry(&mut self, from: &str, to: &str) -> StorageResult<Entry> {
        self.authorize()?;
        let (from_remote, from_local) = self.existing(from)?;
        let (to_remote, to_local) = self.resolve(to)?;
        if to_local.exists() || to_local.starts_with(&from_local) {
            return Err(StorageError::Conflict(to_remote));
        }
        if let Some(parent) = to_local.parent() {
            fs::create_dir_all(parent)?;
        }
        self.retire(&from_local)?;
        fs::rename(&from_local, &to_local)?;
        for file in self.files_at(&to_local) {
            self.history(&self.remote_path(&file)).clear_deleted()?;
        }
        self.touch(&to_local)?;
        info!(from = %from_remote, to = %to_remote, "moved");
        self.entry_at(&to_local, &to_remote)
    }

    fn delete(&mut self, path: &str) -> StorageResult<Entry> {
        self.authorize()?;
        let (remote, local) = self.existing(path)?;
        if remote == "/" {
            return Err(StorageError::Unsupported("deleting the root folder"));
        }
        let entry = self.entry_at(&local, &remote)?;
        self.retire(&local)?;
        if entry.is_dir {
            fs::remove_dir_all(&local)?;
        } else {
            fs::remove_file(&local)?;
        }
        info!(path = %remote, "deleted");
        Ok(entry.deleted())
    }

    fn create_folder(&mut self, path: &str) -> StorageResult<Entry> {
        self.authorize()?;
        let (remote, local) = self.resolve(path)?;
        if local.exists() {
            return Err(StorageError::Conflict(remote));
        }
        fs::create_dir_all(&local)?;
        self.entry_at(&local, &remote)
    }

    fn search(
        &mut self,
        dir: &str,
        query: &str,
        limit: usize,
        include_deleted: bool,
    ) -> StorageResult<Vec<Entry>> {
        self.authorize()?;
        let (remote_dir, local_dir) = self.existing(dir)?;
        if !local_dir.is_dir() {
            return Err(StorageError::NotFound(remote_dir));
        }
        let words: Vec<String> = query.split_whitespace().map(str::to_lowercase).collect();
        let matches = |path: &str| {
            let name = parent_and_name(path).1.to_lowercase();
            words.iter().all(|word| name.contains(word.as_str()))
        };

        let mut found = Vec::new();
        for local in self.walk(&local_dir) {
            let remote = self.remote_path(&local);
            if matches(&remote) {
                found.push(self.entry_at(&local, &remote)?);
            }
        }
        if include_deleted {
            for tombstone in self.tombstones()? {
                if is_within(&tombstone.path, &remote_dir) && matches(&tombstone.path) {
                    found.push(tombstone);
                }
            }
        }
        found.sort_by(|a, b| a.path.cmp(&b.path));
        if limit > 0 {
            found.truncate(limit);
        }
        Ok(found)
    }

    fn revisions(&mut self, path: &str, limit: usize) -> StorageResult<Vec<Entry>> {
        self.authorize()?;
        let (remote, local) = self.resolve(path)?;
        let history = self.history(&remote);

        let mut revisions = Vec::new();
        if local.is_dir() {
            return Err(StorageError::IsDirectory(remote));
        } else if local.is_file() {
            revisions.push(self.entry_at(&local, &remote)?);
        } else if let Some(tombstone) = self.tombstone(&history)? {
            revisions.push(tombstone);
        }
        for version in history.versions()? {
            let live = revisions
                .iter()
                .any(|entry| !entry.is_deleted && entry.revision == version.revision);
            if !live {
                revisions.push(
                    Entry::file(remote.as_str(), version.bytes, version.revision)
                        .modified_at(DateTime::<Utc>::from(version.archived)),
                );
            }
        }
        if revisions.is_empty() {
            return Err(StorageError::NotFound(remote));
        }
        if limit > 0 {
            revisions.truncate(limit);
        }
        Ok(revisions)
    }

    fn restore(&mut self, path: &str, revision: &str) -> StorageResult<Entry> {
        self.authorize()?;
        let (remote, local) = self.resolve(path)?;
        if local.is_dir() {
            return Err(StorageError::IsDirectory(remote));
        }
        if local.is_file() && revision_of(&local)? == revision {
            return self.entry_at(&local, &remote);
        }
        let history = self.history(&remote);
        let version = history
            .version(revision)
            .ok_or_else(|| StorageError::InvalidRevision {
                path: remote.clone(),
                revision: revision.to_string(),
            })?;
        if local.is_file() {
            history.archive(&remote, &local)?;
        }
        if let Some(parent) = local.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(&version, &local)?;
        history.clear_deleted()?;
        info!(path = %remote, revision, "restored");
        self.entry_at(&local, &remote)
    }

    fn share_link(&mut self, path: &str, short: bool) -> StorageResult<Link> {
        self.authorize()?;
        if short {
            debug!("short links are not available, returning the full url");
        }
        self.local_link(path)
    }

    fn media_link(&mut self, path: &str) -> StorageResult<Link> {
        self.authorize()?;
        self.local_link(path)
    }

    fn delta(&mut self, cursor: Option<&str>, prefix: Option<&str>) -> StorageResult<DeltaPage> {
        self.authorize()?;
        let since = cursor.map(parse_cursor).transpose()?;
        let now = SystemTime::now();
        let (remote_prefix, local_prefix) = self.resolve(prefix.unwrap_or("/"))?;

        let mut entries = Vec::new();
        if local_prefix.is_dir() {
            for local in self.walk(&local_prefix) {
                let modified = fs::metadata(&local)?.modified()?;
                if since.map_or(true, |since| modified > since) {
                    let remote = self.remote_path(&local);
                    let entry = self.entry_at(&local, &remote)?;
                    entries.push(DeltaEntry {
                        path: remote,
                        entry: Some(entry),
                    });
                }
            }
        }
        if let Some(since) = since {
            for history in History::all(&self.meta_dir())? {
                let removed = history.deleted_at().map_or(false, |at| at > since);
                if !removed {
                    continue;
                }
                if let Some(tombstone) = self.tombstone(&history)? {
                    if is_within(&tombstone.path, &remote_prefix) {
                        entries.push(DeltaEntry {
                            path: tombstone.path,
                            entry: None,
                        });
                    }
                }
            }
        }
        Ok(DeltaPage {
            entries,
            cursor: format_cursor(now),
            has_more: false,
            reset: since.is_none(),
        })
    }

    fn longpoll_delta(&mut self, cursor: &str, timeout: Duration) -> StorageResult<DeltaPoll> {
        let deadline = Instant::now() + timeout;
        loop {
            if !self.delta(Some(cursor), None)?.entries.is_empty() {
                return Ok(DeltaPoll {
                    changes: true,
                    backoff: None,
                });
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(DeltaPoll {
                    changes: false,
                    backoff: None,
                });
            }
            thread::sleep(POLL_INTERVAL.min(deadline - now));
        }
    }
}

/// Archived revisions of one remote path.
///
/// Layout: `path` holds the remote path, `deleted` marks a removal, and
/// `versions/<revision>` holds old contents.
struct History {
    dir: PathBuf,
}

struct Version {
    revision: String,
    path: PathBuf,
    bytes: u64,
    archived: SystemTime,
}

impl History {
    fn of(meta: &Path, remote: &str) -> Self {
        let digest = Sha256::digest(remote.as_bytes());
        Self {
            dir: meta.join(HISTORY_DIR).join(hex::encode(&digest[..8])),
        }
    }

    fn all(meta: &Path) -> StorageResult<Vec<Self>> {
        let dir = meta.join(HISTORY_DIR);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut all = Vec::new();
        for entry in fs::read_dir(dir)? {
            all.push(Self { dir: entry?.path() });
        }
        Ok(all)
    }

    fn versions_dir(&self) -> PathBuf {
        self.dir.join("versions")
    }

    fn remote_path(&self) -> Option<String> {
        fs::read_to_string(self.dir.join("path")).ok()
    }

    /// Copies the current content of `local` into the history and returns its revision.
    fn archive(&self, remote: &str, local: &Path) -> StorageResult<String> {
        let revision = revision_of(local)?;
        fs::create_dir_all(self.versions_dir())?;
        fs::write(self.dir.join("path"), remote)?;
        fs::copy(local, self.versions_dir().join(&revision))?;
        Ok(revision)
    }

    fn version(&self, revision: &str) -> Option<PathBuf> {
        if revision.is_empty() || !revision.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let path = self.versions_dir().join(revision);
        path.is_file().then(|| path)
    }

    /// Newest first.
    fn versions(&self) -> StorageResult<Vec<Version>> {
        let dir = self.versions_dir();
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut versions = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let metadata = fs::metadata(&path)?;
            versions.push(Version {
                revision: path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default(),
                bytes: metadata.len(),
                archived: metadata.modified()?,
                path,
            });
        }
        versions.sort_by(|a, b| (b.archived, &a.path).cmp(&(a.archived, &b.path)));
        Ok(versions)
    }

    fn mark_deleted(&self) -> StorageResult<()> {
        fs::write(self.dir.join("deleted"), "")?;
        Ok(())
    }

    fn clear_deleted(&self) -> StorageResult<()> {
        match fs::remove_file(self.dir.join("deleted")) {
            Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }

    fn deleted_at(&self) -> Option<SystemTime> {
        fs::metadata(self.dir.join("deleted")).ok()?.modified().ok()
    }
}

/// Content revision: the first 8 bytes of the SHA-256 digest, in hex.
fn revision_of(path: &Path) -> StorageResult<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(&hasher.finalize()[..8]))
}

fn not_found(err: io::Error, remote: &str) -> StorageError {
    if err.kind() == io::ErrorKind::NotFound {
        StorageError::NotFound(remote.to_string())
    } else {
        err.into()
    }
}

/// Fills `buffer` unless the reader ends first.
fn read_chunk(reader: &mut dyn Read, buffer: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

fn decode_reference(reference: &str) -> StorageResult<String> {
    URL_SAFE_NO_PAD
        .decode(reference)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .ok_or_else(|| StorageError::NotFound(reference.to_string()))
}

fn parse_cursor(cursor: &str) -> StorageResult<SystemTime> {
    cursor
        .parse::<u64>()
        .map(|millis| UNIX_EPOCH + Duration::from_millis(millis))
        .map_err(|_| StorageError::InvalidCursor(cursor.to_string()))
}

fn format_cursor(time: SystemTime) -> String {
    let millis = time
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    millis.to_string()
}
