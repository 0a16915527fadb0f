use std::{
    ffi::OsString,
    io::{Read, Write},
    path::{Path, PathBuf},
};

use eyre::{bail, Result, WrapErr};
use fs_err as fs;
use tracing::{debug, info};

use crate::{
    models::{Chunking, Credentials, Entry, Mode, ThumbnailFormat, ThumbnailSize, TransferRequest},
    storage::{StorageClient, StorageResult},
};

pub const KEY_LENGTH: usize = 32;

const PARTIAL_SUFFIX: &str = ".part";

/// Chooses and drives the strategy for one upload or download.
pub struct TransferOrchestrator<'a> {
    credentials: &'a mut Credentials,
    client: &'a mut dyn StorageClient,
}

impl<'a> TransferOrchestrator<'a> {
    pub fn new(credentials: &'a mut Credentials, client: &'a mut dyn StorageClient) -> Self {
        Self {
            credentials,
            client,
        }
    }

    /// The stored key, or a freshly generated one that is kept for every later run.
    pub fn encryption_key(&mut self) -> Result<Vec<u8>> {
        let client = &mut *self.client;
        let key = self.credentials.key_or_insert_with(|| {
            info!("generating a new encryption key");
            Ok(client.generate_key(KEY_LENGTH)?)
        })?;
        Ok(key.to_vec())
    }

    pub fn upload(&mut self, request: &TransferRequest) -> Result<Entry> {
        let file = fs::File::open(&request.local)?;
        let size = file.metadata()?.len();
        let mut reader: Box<dyn Read> = Box::new(file);

        if request.mode == Mode::Encrypted {
            let key = self.encryption_key()?;
            reader = self.client.encrypting_reader(&key, reader, size)?;
        }

        let revision = request.revision.as_deref();
        debug!(
            source = %request.local.display(),
            destination = %request.remote,
            mode = ?request.mode,
            chunking = ?request.chunking,
            "uploading"
        );
        let entry = match request.chunking {
            Chunking::Whole => {
                self.client
                    .upload_whole(&mut reader, &request.remote, request.overwrite, revision)
            }
            Chunking::Chunked(chunk_size) => self.client.upload_chunked(
                &mut reader,
                chunk_size,
                &request.remote,
                request.overwrite,
                revision,
            ),
        }?;
        Ok(entry)
    }

    pub fn download(&mut self, request: &TransferRequest) -> Result<()> {
        request.validate_download()?;
        let revision = request.revision.as_deref();
        debug!(
            source = %request.remote,
            destination = %request.local.display(),
            mode = ?request.mode,
            resume = request.resume,
            "downloading"
        );

        match request.mode {
            Mode::Encrypted => {
                let key = self.encryption_key()?;
                let client = &mut *self.client;
                fresh_download(&request.local, |out| {
                    client.download_encrypted(&key, &request.remote, revision, out)
                })
            }
            Mode::Plain if request.resume => self.resume_download(request),
            Mode::Plain => {
                let client = &mut *self.client;
                fresh_download(&request.local, |out| {
                    client.download(&request.remote, revision, 0, out)
                })
            }
        }
    }

    pub fn thumbnail(
        &mut self,
        remote: &str,
        local: &Path,
        format: ThumbnailFormat,
        size: ThumbnailSize,
    ) -> Result<()> {
        let client = &mut *self.client;
        fresh_download(local, |out| client.thumbnail(remote, format, size, out))
    }

    /// Appends the missing tail of the remote file, pinned to the revision seen now.
    fn resume_download(&mut self, request: &TransferRequest) -> Result<()> {
        let remote = self
            .client
            .metadata(&request.remote, false, false, request.revision.as_deref())?;
        if remote.is_dir {
            bail!("{} is a directory", remote.path);
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&request.local)?;
        let offset = file.metadata()?.len();
        if offset > remote.bytes {
            bail!(
                "{} is larger than {} ({} > {} bytes)",
                request.local.display(),
                remote.path,
                offset,
                remote.bytes
            );
        }
        if offset == remote.bytes {
            debug!(offset, "already complete");
            return Ok(());
        }

        debug!(offset, total = remote.bytes, "resuming");
        self.client
            .download(&request.remote, Some(&remote.revision), offset, &mut file)?;
        file.sync_all()?;
        Ok(())
    }
}

/// Downloads into a sibling `.part` file and renames it over `destination`
/// only once complete, so a failure leaves any previous file untouched.
fn fresh_download<F>(destination: &Path, fetch: F) -> Result<()>
where
    F: FnOnce(&mut dyn Write) -> StorageResult<u64>,
{
    let partial = partial_path(destination);
    let mut file = fs::File::create(&partial)?;
    let result = fetch(&mut file)
        .map_err(eyre::Report::from)
        .and_then(|written| {
            file.sync_all()?;
            Ok(written)
        });
    drop(file);

    match result {
        Ok(written) => {
            fs::rename(&partial, destination)
                .wrap_err_with(|| format!("cannot create {}", destination.display()))?;
            debug!(written, destination = %destination.display(), "download complete");
            Ok(())
        }
        Err(err) => {
            let _ = fs::remove_file(&partial);
            Err(err)
        }
    }
}

fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| OsString::from("download"));
    name.push(PARTIAL_SUFFIX);
    destination.with_file_name(name)
}
