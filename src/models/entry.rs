use chrono::{DateTime, Utc};

/// Metadata snapshot of one remote file or directory.
///
/// `contents` is only filled for directories, and only one level deep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entry {
    pub path: String,
    pub is_dir: bool,
    pub is_deleted: bool,
    pub size: String,
    pub bytes: u64,
    pub modified: Option<DateTime<Utc>>,
    pub revision: String,
    pub contents: Vec<Entry>,
}

impl Entry {
    pub fn file(path: impl Into<String>, bytes: u64, revision: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            size: human_size(bytes),
            bytes,
            revision: revision.into(),
            ..Self::default()
        }
    }

    pub fn dir(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            is_dir: true,
            size: human_size(0),
            ..Self::default()
        }
    }

    pub fn modified_at(mut self, modified: DateTime<Utc>) -> Self {
        self.modified = Some(modified);
        self
    }

    pub fn deleted(mut self) -> Self {
        self.is_deleted = true;
        self
    }
}

const UNITS: [&str; 5] = ["KB", "MB", "GB", "TB", "PB"];

/// Renders a byte count the way the storage service reports sizes, e.g. `0 bytes` or `1.5 MB`.
pub fn human_size(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{bytes} bytes");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}
