use std::{str::FromStr, time::Duration};

use chrono::{DateTime, Utc};

use super::Entry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub url: String,
    pub expires: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyRef {
    pub reference: String,
    pub expires: Option<DateTime<Utc>>,
}

/// One change in a delta page. `entry` is `None` when the path was removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaEntry {
    pub path: String,
    pub entry: Option<Entry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaPage {
    pub entries: Vec<DeltaEntry>,
    pub cursor: String,
    pub has_more: bool,
    pub reset: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaPoll {
    pub changes: bool,
    /// How long the server asks clients to wait before polling again.
    pub backoff: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThumbnailSize {
    ExtraSmall,
    Small,
    Medium,
    Large,
    ExtraLarge,
}

impl FromStr for ThumbnailSize {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "xs" => Ok(Self::ExtraSmall),
            "s" => Ok(Self::Small),
            "m" => Ok(Self::Medium),
            "l" => Ok(Self::Large),
            "xl" => Ok(Self::ExtraLarge),
            other => Err(format!(
                "invalid thumbnail size '{other}' (xs, s, m, l or xl)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThumbnailFormat {
    Jpeg,
    Png,
}

impl FromStr for ThumbnailFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "jpeg" => Ok(Self::Jpeg),
            "png" => Ok(Self::Png),
            other => Err(format!("invalid thumbnail format '{other}' (jpeg or png)")),
        }
    }
}
