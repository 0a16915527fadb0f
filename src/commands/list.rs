use std::slice;

use clap::Parser;
use eyre::Result;

use super::{parse_args, some_args, two_args, Session};
use crate::utils::{child_prefix_len, clean_remote_path, ListingFormat};

const DEFAULT_REVISION_LIMIT: usize = 10;

/// List files from directories.
#[derive(Parser, Debug)]
#[clap(name = "list")]
struct ListArgs {
    /// Show deleted entries
    #[clap(short = 'a', value_parser)]
    all: bool,

    /// Do not show the children of a directory
    #[clap(short = 'd', value_parser)]
    no_children: bool,

    /// Display long format
    #[clap(short = 'l', value_parser)]
    long: bool,

    #[clap(value_parser)]
    files: Vec<String>,
}

/// Search files.
#[derive(Parser, Debug)]
#[clap(name = "search")]
struct SearchArgs {
    /// Show deleted entries
    #[clap(short = 'a', value_parser)]
    all: bool,

    /// Display long format
    #[clap(short = 'l', value_parser)]
    long: bool,

    /// Maximum number of entries, 0 for no limit
    #[clap(short = 'm', value_parser, default_value_t = 0)]
    limit: usize,

    #[clap(value_parser)]
    params: Vec<String>,
}

/// Get revisions of files.
#[derive(Parser, Debug)]
#[clap(name = "revisions")]
struct RevisionArgs {
    /// Maximum number of revisions
    #[clap(short = 'l', value_parser, default_value_t = DEFAULT_REVISION_LIMIT)]
    limit: usize,

    #[clap(value_parser)]
    files: Vec<String>,
}

/// Prints each path, then the children of directories relative to them.
/// Listed paths are separated by a blank line; failed ones only go to stderr.
pub fn list(session: &mut Session, args: &[String]) -> Result<()> {
    let Some(args) = parse_args::<ListArgs>(session.out, "list", args)? else {
        return Ok(());
    };
    let format = ListingFormat::from_long_flag(args.long);
    let files = if args.files.is_empty() {
        vec!["/".to_string()]
    } else {
        args.files
    };

    let mut printed = false;
    for file in &files {
        let path = clean_remote_path(file);
        let mut entry = match session.client.metadata(&path, !args.no_children, args.all, None) {
            Ok(entry) => entry,
            Err(err) => {
                session.report_failure(file, err)?;
                continue;
            }
        };
        if printed {
            writeln!(session.out)?;
        }
        printed = true;

        let children = std::mem::take(&mut entry.contents);
        format.write(session.out, slice::from_ref(&entry), 0)?;
        if entry.is_dir && !children.is_empty() {
            writeln!(session.out)?;
            format.write(session.out, &children, child_prefix_len(&path))?;
        }
    }
    Ok(())
}

pub fn search(session: &mut Session, args: &[String]) -> Result<()> {
    let Some(args) = parse_args::<SearchArgs>(session.out, "search", args)? else {
        return Ok(());
    };
    let (dir, query) = two_args("search", &args.params, "path and query")?;
    let dir = clean_remote_path(dir);

    let entries = session.client.search(&dir, query, args.limit, args.all)?;
    let format = ListingFormat::from_long_flag(args.long);
    writeln!(session.out, "{dir}:")?;
    format.write(session.out, &entries, child_prefix_len(&dir))?;
    Ok(())
}

/// Long listing of each file's history, newest first. Deleted revisions
/// without content are left out.
pub fn revisions(session: &mut Session, args: &[String]) -> Result<()> {
    let Some(args) = parse_args::<RevisionArgs>(session.out, "revisions", args)? else {
        return Ok(());
    };
    for file in some_args("revisions", &args.files, "files")? {
        let entries = match session.client.revisions(&clean_remote_path(file), args.limit) {
            Ok(entries) => entries,
            Err(err) => {
                session.report_failure(file, err)?;
                continue;
            }
        };
        let shown: Vec<_> = entries
            .into_iter()
            .filter(|entry| !entry.is_deleted || entry.bytes != 0)
            .collect();
        ListingFormat::Long.write(session.out, &shown, 0)?;
    }
    Ok(())
}
