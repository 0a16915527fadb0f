use std::io::{self, Write};

use chrono::{DateTime, Utc};

use crate::models::Entry;

/// Timestamp layout used by the storage service, e.g. `Mon, 02 Jan 2006 15:04:05 +0000`.
pub const DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

const DELETED_MARKER: &str = "[deleted]";
const GUTTER: &str = "  ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingFormat {
    Short,
    Long,
}

impl ListingFormat {
    pub fn from_long_flag(long: bool) -> Self {
        if long {
            Self::Long
        } else {
            Self::Short
        }
    }

    /// Renders sibling entries, each shown relative to `prefix_len`.
    pub fn render(self, entries: &[Entry], prefix_len: usize) -> Vec<String> {
        match self {
            Self::Short => entries
                .iter()
                .map(|entry| short_line(entry, prefix_len))
                .collect(),
            Self::Long => long_lines(entries, prefix_len),
        }
    }

    pub fn write(
        self,
        out: &mut dyn Write,
        entries: &[Entry],
        prefix_len: usize,
    ) -> io::Result<()> {
        for line in self.render(entries, prefix_len) {
            writeln!(out, "{line}")?;
        }
        Ok(())
    }
}

pub fn format_time(time: &DateTime<Utc>) -> String {
    time.format(DATE_FORMAT).to_string()
}

/// The entry's path without its first `prefix_len` bytes, with a trailing `/` for directories.
///
/// A prefix that does not fit the path leaves it whole.
pub fn display_name(entry: &Entry, prefix_len: usize) -> String {
    let path = entry.path.as_str();
    let mut name = match path.get(prefix_len..) {
        Some(relative) if !relative.is_empty() => relative.to_string(),
        _ => path.to_string(),
    };
    if entry.is_dir && path != "/" {
        name.push('/');
    }
    name
}

pub fn short_line(entry: &Entry, prefix_len: usize) -> String {
    let mut line = display_name(entry, prefix_len);
    if entry.is_deleted {
        line.push(' ');
        line.push_str(DELETED_MARKER);
    }
    line
}

/// Aligned `name size modified revision [deleted]` lines.
///
/// Column widths are the widest value in the batch, so the whole batch is
/// rendered before any line is returned.
pub fn long_lines(entries: &[Entry], prefix_len: usize) -> Vec<String> {
    let rows: Vec<[String; 4]> = entries
        .iter()
        .map(|entry| {
            [
                display_name(entry, prefix_len),
                entry.size.clone(),
                entry.modified.as_ref().map(format_time).unwrap_or_default(),
                entry.revision.clone(),
            ]
        })
        .collect();

    let mut widths = [0usize; 4];
    for row in &rows {
        for (width, field) in widths.iter_mut().zip(row) {
            *width = (*width).max(field.chars().count());
        }
    }

    rows.iter()
        .zip(entries)
        .map(|(row, entry)| {
            let mut line = row
                .iter()
                .zip(widths)
                .map(|(field, width)| format!("{field:<width$}"))
                .collect::<Vec<_>>()
                .join(GUTTER);
            if entry.is_deleted {
                line.push_str(GUTTER);
                line.push_str(DELETED_MARKER);
            }
            line.trim_end().to_string()
        })
        .collect()
}
