use std::{slice, time::Duration};

use clap::Parser;
use eyre::Result;
use tracing::debug;

use super::{one_arg, parse_args, Session};
use crate::utils::{clean_remote_path, long_lines};

const DEFAULT_POLL_TIMEOUT_SECS: u64 = 30;

/// Get modifications.
#[derive(Parser, Debug)]
#[clap(name = "delta")]
struct DeltaArgs {
    /// Cursor returned by a previous call
    #[clap(short = 'c', value_parser)]
    cursor: Option<String>,

    /// Only report changes below this path
    #[clap(short = 'p', value_parser)]
    prefix: Option<String>,
}

/// Get modifications with timeout.
#[derive(Parser, Debug)]
#[clap(name = "ldelta")]
struct LongPollArgs {
    /// Seconds to wait for a change
    #[clap(short = 't', value_parser, default_value_t = DEFAULT_POLL_TIMEOUT_SECS)]
    timeout: u64,

    #[clap(value_parser)]
    cursor: Vec<String>,
}

/// Prints every change since the cursor, page after page, then the cursor to
/// pass next time.
pub fn delta(session: &mut Session, args: &[String]) -> Result<()> {
    let Some(args) = parse_args::<DeltaArgs>(session.out, "delta", args)? else {
        return Ok(());
    };
    let prefix = args
        .prefix
        .filter(|prefix| !prefix.is_empty())
        .map(|prefix| clean_remote_path(&prefix));
    let mut cursor = args.cursor.filter(|cursor| !cursor.is_empty());

    loop {
        let page = session.client.delta(cursor.as_deref(), prefix.as_deref())?;
        debug!(
            changes = page.entries.len(),
            reset = page.reset,
            has_more = page.has_more,
            "delta page"
        );
        for change in &page.entries {
            match &change.entry {
                None => writeln!(session.out, "{}: deleted", change.path)?,
                Some(entry) => {
                    let line = long_lines(slice::from_ref(entry), 0).concat();
                    writeln!(session.out, "{}: {line}", change.path)?;
                }
            }
        }
        cursor = Some(page.cursor);
        if !page.has_more {
            break;
        }
    }

    if let Some(cursor) = cursor {
        writeln!(session.out, "cursor: {cursor}")?;
    }
    Ok(())
}

pub fn longpoll_delta(session: &mut Session, args: &[String]) -> Result<()> {
    let Some(args) = parse_args::<LongPollArgs>(session.out, "ldelta", args)? else {
        return Ok(());
    };
    let cursor = one_arg("ldelta", &args.cursor, "cursor")?;

    let poll = session
        .client
        .longpoll_delta(cursor, Duration::from_secs(args.timeout))?;
    if poll.changes {
        writeln!(session.out, "You may now call delta with cursor {cursor}")?;
    } else {
        writeln!(session.out, "No changes")?;
    }
    if let Some(backoff) = poll.backoff {
        writeln!(
            session.out,
            "Wait {} seconds before polling again",
            backoff.as_secs()
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{thread, time::Duration};

    use crate::{
        commands::tests::run,
        models::{Credentials, DeltaPoll},
        storage::{memory::MemoryStorage, LocalStorage, StorageClient},
    };
    use pretty_assertions::assert_eq;

    fn account() -> (tempfile::TempDir, LocalStorage) {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = LocalStorage::new(dir.path());
        storage.authenticate().unwrap();
        (dir, storage)
    }

    fn cursor_of(out: &str) -> String {
        out.lines()
            .last()
            .and_then(|line| line.strip_prefix("cursor: "))
            .unwrap()
            .to_string()
    }

    #[test]
    fn should_print_changes_then_cursor() {
        let (_dir, mut storage) = account();
        storage
            .upload_whole(&mut b"old".as_slice(), "/old.txt", true, None)
            .unwrap();
        let mut credentials = Credentials::default();

        let first = run(&mut credentials, &mut storage, &["delta"]);
        assert!(first.out.starts_with("/old.txt: /old.txt  3 bytes"));
        let cursor = cursor_of(&first.out);
        thread::sleep(Duration::from_millis(20));

        storage.delete("/old.txt").unwrap();
        let second = run(&mut credentials, &mut storage, &["delta", "-c", &cursor]);

        assert!(second.result.is_ok());
        assert_eq!("/old.txt: deleted", second.out.lines().next().unwrap());
        assert_ne!(cursor, cursor_of(&second.out));
    }

    #[test]
    fn should_limit_delta_to_prefix() {
        let (_dir, mut storage) = account();
        storage
            .upload_whole(&mut b"a".as_slice(), "/docs/a.txt", true, None)
            .unwrap();
        storage
            .upload_whole(&mut b"b".as_slice(), "/other/b.txt", true, None)
            .unwrap();
        let mut credentials = Credentials::default();

        let run = run(&mut credentials, &mut storage, &["delta", "-p", "docs"]);

        assert!(run.out.contains("/docs/a.txt: "));
        assert!(!run.out.contains("/other"));
    }

    #[test]
    fn should_report_no_changes_after_timeout() {
        let (_dir, mut storage) = account();
        let mut credentials = Credentials::default();
        let cursor = storage.delta(None, None).unwrap().cursor;
        thread::sleep(Duration::from_millis(20));

        let run = run(
            &mut credentials,
            &mut storage,
            &["ldelta", "-t", "0", &cursor],
        );

        assert!(run.result.is_ok());
        assert_eq!("No changes\n", run.out);
    }

    #[test]
    fn should_announce_changes_to_long_poll() {
        let (_dir, mut storage) = account();
        let mut credentials = Credentials::default();
        let cursor = storage.delta(None, None).unwrap().cursor;
        thread::sleep(Duration::from_millis(20));
        storage
            .upload_whole(&mut b"new".as_slice(), "/new.txt", true, None)
            .unwrap();

        let run = run(&mut credentials, &mut storage, &["ldelta", &cursor]);

        assert_eq!(
            format!("You may now call delta with cursor {cursor}\n"),
            run.out
        );
    }

    #[test]
    fn should_pass_on_requested_backoff() {
        let mut credentials = Credentials::default();
        let mut storage = MemoryStorage::default();
        storage.poll = Some(DeltaPoll {
            changes: false,
            backoff: Some(Duration::from_secs(60)),
        });

        let run = run(&mut credentials, &mut storage, &["ldelta", "-t", "5", "42"]);

        assert!(run.result.is_ok());
        assert_eq!(
            "No changes\nWait 60 seconds before polling again\n",
            run.out
        );
        assert_eq!(vec!["longpoll_delta 42"], storage.calls);
    }

    #[test]
    fn should_require_a_cursor_for_long_poll() {
        let mut credentials = Credentials::default();
        let mut storage = MemoryStorage::default();

        let run = run(&mut credentials, &mut storage, &["ldelta"]);

        assert_eq!(
            "exactly one parameter needed for ldelta (cursor)",
            run.result.unwrap_err().to_string()
        );
    }
}
