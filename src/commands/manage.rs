use clap::Parser;
use eyre::Result;
use tracing::info;

use super::{parse_args, some_args, two_args, Session};
use crate::utils::{clean_remote_path, format_time};

/// Copy file or directory.
#[derive(Parser, Debug)]
#[clap(name = "copy")]
struct CopyArgs {
    /// The source is a reference obtained with copyref
    #[clap(short = 'r', value_parser)]
    reference: bool,

    #[clap(value_parser)]
    paths: Vec<String>,
}

pub fn copy(session: &mut Session, args: &[String]) -> Result<()> {
    let Some(args) = parse_args::<CopyArgs>(session.out, "copy", args)? else {
        return Ok(());
    };
    let (from, to) = two_args("copy", &args.paths, "from path and to path")?;
    let from = if args.reference {
        from.to_string()
    } else {
        clean_remote_path(from)
    };
    let entry = session.client.copy(&from, &clean_remote_path(to), args.reference)?;
    info!(from = %from, to = %entry.path, "copied");
    Ok(())
}

pub fn copy_ref(session: &mut Session, args: &[String]) -> Result<()> {
    for file in some_args("copyref", args, "files")? {
        match session.client.copy_ref(&clean_remote_path(file)) {
            Ok(reference) => {
                let expires = reference
                    .expires
                    .as_ref()
                    .map_or_else(|| "never".to_string(), format_time);
                writeln!(
                    session.out,
                    "{file}: ref: {} expires on {expires}",
                    reference.reference
                )?;
            }
            Err(err) => session.report_failure(file, err)?,
        }
    }
    Ok(())
}

pub fn r#move(session: &mut Session, args: &[String]) -> Result<()> {
    let (from, to) = two_args("move", args, "from path and to path")?;
    let entry = session
        .client
        .move_entry(&clean_remote_path(from), &clean_remote_path(to))?;
    info!(from = %from, to = %entry.path, "moved");
    Ok(())
}

/// Deletes every path in turn. A failure is reported and the next path is tried.
pub fn delete(session: &mut Session, args: &[String]) -> Result<()> {
    for file in some_args("delete", args, "files")? {
        if let Err(err) = session.client.delete(&clean_remote_path(file)) {
            session.report_failure(file, err)?;
        }
    }
    Ok(())
}

pub fn mkdir(session: &mut Session, args: &[String]) -> Result<()> {
    for dir in some_args("mkdir", args, "directories")? {
        if let Err(err) = session.client.create_folder(&clean_remote_path(dir)) {
            session.report_failure(dir, err)?;
        }
    }
    Ok(())
}

pub fn restore(session: &mut Session, args: &[String]) -> Result<()> {
    let (path, revision) = two_args("restore", args, "path and revision")?;
    let entry = session.client.restore(&clean_remote_path(path), revision)?;
    info!(path = %entry.path, revision = %entry.revision, "restored");
    Ok(())
}
