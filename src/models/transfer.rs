use std::path::PathBuf;

use crate::error::CommandError;

pub const DEFAULT_CHUNK_SIZE: usize = 4 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Plain,
    Encrypted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chunking {
    Whole,
    Chunked(usize),
}

/// A single upload or download, built from a command's flags.
///
/// For uploads `local` is the source and `remote` the destination; for
/// downloads it is the other way round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub local: PathBuf,
    pub remote: String,
    pub mode: Mode,
    pub chunking: Chunking,
    pub resume: bool,
    pub overwrite: bool,
    pub revision: Option<String>,
}

impl TransferRequest {
    pub fn new(local: impl Into<PathBuf>, remote: impl Into<String>) -> Self {
        Self {
            local: local.into(),
            remote: remote.into(),
            mode: Mode::Plain,
            chunking: Chunking::Whole,
            resume: false,
            overwrite: true,
            revision: None,
        }
    }

    pub fn encrypted(mut self, encrypted: bool) -> Self {
        self.mode = if encrypted {
            Mode::Encrypted
        } else {
            Mode::Plain
        };
        self
    }

    pub fn chunked(mut self, chunk_size: usize) -> Self {
        self.chunking = Chunking::Chunked(chunk_size);
        self
    }

    pub fn resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn revision(mut self, revision: Option<String>) -> Self {
        self.revision = revision.filter(|rev| !rev.is_empty());
        self
    }

    pub fn is_encrypted(&self) -> bool {
        self.mode == Mode::Encrypted
    }

    /// Rejects flag combinations no download strategy can honour.
    pub fn validate_download(&self) -> Result<(), CommandError> {
        if self.is_encrypted() && self.resume {
            return Err(CommandError::MutuallyExclusive {
                first: "aes",
                second: "c",
            });
        }
        Ok(())
    }

    pub fn validate_upload(&self, command: &str) -> Result<(), CommandError> {
        if let Chunking::Chunked(0) = self.chunking {
            return Err(CommandError::usage(
                command,
                "chunk size must be greater than zero",
            ));
        }
        Ok(())
    }
}
