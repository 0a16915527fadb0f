use clap::Parser;
use eyre::Result;

use super::{parse_args, some_args, Session};
use crate::{
    models::Link,
    storage::StorageResult,
    utils::{clean_remote_path, format_time},
};

/// Share files.
#[derive(Parser, Debug)]
#[clap(name = "shares")]
struct ShareArgs {
    /// Get the original URL instead of a shortened one
    #[clap(short = 'o', value_parser)]
    original: bool,

    #[clap(value_parser)]
    files: Vec<String>,
}

pub fn shares(session: &mut Session, args: &[String]) -> Result<()> {
    let Some(args) = parse_args::<ShareArgs>(session.out, "shares", args)? else {
        return Ok(());
    };
    for file in some_args("shares", &args.files, "files")? {
        let link = session.client.share_link(&clean_remote_path(file), !args.original);
        announce(session, file, link)?;
    }
    Ok(())
}

pub fn media(session: &mut Session, args: &[String]) -> Result<()> {
    for file in some_args("media", args, "files")? {
        let link = session.client.media_link(&clean_remote_path(file));
        announce(session, file, link)?;
    }
    Ok(())
}

fn announce(session: &mut Session, file: &str, link: StorageResult<Link>) -> Result<()> {
    match link {
        Ok(link) => {
            let expires = link
                .expires
                .as_ref()
                .map_or_else(|| "never".to_string(), format_time);
            writeln!(
                session.out,
                "{file} is now available using {}, this link expires on {expires}",
                link.url
            )?;
        }
        Err(err) => session.report_failure(file, err)?,
    }
    Ok(())
}
