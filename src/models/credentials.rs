use std::{
    env,
    io::{self, Write},
    path::{Path, PathBuf},
};

use eyre::{eyre, Result, WrapErr};
use fs_err as fs;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const CONFIG_FILENAME: &str = ".dbox";
pub const CONFIG_ENV: &str = "DBOX_CONFIG";

/// Persisted access token and symmetric key.
///
/// The key must never be replaced once it exists: files encrypted with it would
/// become unreadable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    token: String,
    #[serde(default, with = "key_encoding")]
    key: Option<Vec<u8>>,
    #[serde(skip)]
    dirty: bool,
}

impl Credentials {
    pub fn token(&self) -> Option<&str> {
        if self.token.is_empty() {
            None
        } else {
            Some(&self.token)
        }
    }

    pub fn set_token(&mut self, token: impl Into<String>) {
        self.token = token.into();
        self.dirty = true;
    }

    pub fn key(&self) -> Option<&[u8]> {
        self.key.as_deref()
    }

    /// Returns the stored key, generating and recording one on first use.
    pub fn key_or_insert_with<F>(&mut self, generate: F) -> Result<&[u8]>
    where
        F: FnOnce() -> Result<Vec<u8>>,
    {
        if self.key.is_none() {
            let key = generate()?;
            if key.is_empty() {
                return Err(eyre!("generated encryption key is empty"));
            }
            self.key = Some(key);
            self.dirty = true;
        }
        Ok(self.key.as_deref().unwrap_or_default())
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

/// Reads and writes [`Credentials`] at a fixed location.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `$DBOX_CONFIG` if set, `~/.dbox` otherwise.
    pub fn from_env() -> Result<Self> {
        if let Some(path) = env::var_os(CONFIG_ENV) {
            return Ok(Self::new(path));
        }
        let home = dirs::home_dir().ok_or_else(|| eyre!("cannot locate the home directory"))?;
        Ok(Self::new(home.join(CONFIG_FILENAME)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing or malformed file means "no credentials yet". Any other read
    /// failure is an error: saving over a file we could not read may lose its key.
    pub fn load(&self) -> Result<Option<Credentials>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no credential file");
                return Ok(None);
            }
            Err(err) => return Err(err).wrap_err("cannot read the credential file"),
        };
        match serde_json::from_str(&content) {
            Ok(credentials) => Ok(Some(credentials)),
            Err(err) => {
                warn!(path = %self.path.display(), "ignoring malformed credential file: {err}");
                Ok(None)
            }
        }
    }

    /// Writes through a sibling temp file so a crash never truncates a valid file.
    pub fn save(&self, credentials: &mut Credentials) -> Result<()> {
        let content = serde_json::to_string_pretty(credentials)?;
        let temp = self.temp_path();

        let mut file = create_private(&temp)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp, &self.path)
            .wrap_err_with(|| format!("failed to replace {}", self.path.display()))?;
        credentials.dirty = false;
        debug!(path = %self.path.display(), "credentials saved");
        Ok(())
    }

    /// Saves only when the record changed during this run.
    pub fn save_if_dirty(&self, credentials: &mut Credentials) -> Result<bool> {
        if !credentials.is_dirty() {
            return Ok(false);
        }
        self.save(credentials)?;
        Ok(true)
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| CONFIG_FILENAME.into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

/// Creates `path` readable by the owner only. A stale file is removed first
/// since the mode only applies on creation.
fn create_private(path: &Path) -> Result<fs::File> {
    match fs::remove_file(path) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => return Err(err.into()),
        _ => {}
    }
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use fs_err::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    Ok(options.open(path)?)
}

/// Keys are stored as base64 text, `null` when absent.
mod key_encoding {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        key: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match key {
            Some(key) => serializer.serialize_str(&STANDARD.encode(key)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        match encoded.as_deref() {
            None | Some("") => Ok(None),
            Some(encoded) => STANDARD.decode(encoded).map(Some).map_err(D::Error::custom),
        }
    }
}
