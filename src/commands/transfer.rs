use std::path::Path;

use clap::Parser;
use eyre::Result;

use super::{parse_args, two_args, Session};
use crate::{
    models::{ThumbnailFormat, ThumbnailSize, TransferRequest, DEFAULT_CHUNK_SIZE},
    utils::clean_remote_path,
};

/// Upload a file.
#[derive(Parser, Debug)]
#[clap(name = "put")]
struct PutArgs {
    /// Encrypt the file with AES before sending it
    #[clap(long = "aes", value_parser)]
    aes: bool,

    /// Do not overwrite an existing file
    #[clap(short = 'k', value_parser)]
    keep: bool,

    /// Revision of the file being overwritten
    #[clap(short = 'r', value_parser)]
    revision: Option<String>,

    #[clap(value_parser)]
    files: Vec<String>,
}

/// Upload a file in chunks.
#[derive(Parser, Debug)]
#[clap(name = "cput")]
struct ChunkedPutArgs {
    /// Encrypt the file with AES before sending it
    #[clap(long = "aes", value_parser)]
    aes: bool,

    /// Size of each chunk in bytes
    #[clap(short = 'c', value_parser, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Do not overwrite an existing file
    #[clap(short = 'k', value_parser)]
    keep: bool,

    /// Revision of the file being overwritten
    #[clap(short = 'r', value_parser)]
    revision: Option<String>,

    #[clap(value_parser)]
    files: Vec<String>,
}

/// Download a file.
#[derive(Parser, Debug)]
#[clap(name = "get")]
struct GetArgs {
    /// Decrypt a file uploaded with -aes
    #[clap(long = "aes", value_parser)]
    aes: bool,

    /// Resume a partial download
    #[clap(short = 'c', value_parser)]
    resume: bool,

    /// Download the file at this revision
    #[clap(short = 'r', value_parser)]
    revision: Option<String>,

    #[clap(value_parser)]
    files: Vec<String>,
}

/// Download a thumbnail.
#[derive(Parser, Debug)]
#[clap(name = "thumbnails")]
struct ThumbnailArgs {
    /// Size of the thumbnail (xs, s, m, l or xl)
    #[clap(short = 's', value_parser, default_value = "s")]
    size: ThumbnailSize,

    /// Format of the thumbnail (jpeg or png)
    #[clap(short = 'f', value_parser, default_value = "png")]
    format: ThumbnailFormat,

    #[clap(value_parser)]
    files: Vec<String>,
}

pub fn put(session: &mut Session, args: &[String]) -> Result<()> {
    let Some(args) = parse_args::<PutArgs>(session.out, "put", args)? else {
        return Ok(());
    };
    let (source, destination) = two_args("put", &args.files, "source and destination")?;
    let request = TransferRequest::new(source, clean_remote_path(destination))
        .encrypted(args.aes)
        .overwrite(!args.keep)
        .revision(args.revision);
    upload(session, source, &request, "put")
}

pub fn chunked_put(session: &mut Session, args: &[String]) -> Result<()> {
    let Some(args) = parse_args::<ChunkedPutArgs>(session.out, "cput", args)? else {
        return Ok(());
    };
    let (source, destination) = two_args("cput", &args.files, "source and destination")?;
    let request = TransferRequest::new(source, clean_remote_path(destination))
        .encrypted(args.aes)
        .chunked(args.chunk_size)
        .overwrite(!args.keep)
        .revision(args.revision);
    upload(session, source, &request, "cput")
}

fn upload(
    session: &mut Session,
    source: &str,
    request: &TransferRequest,
    command: &str,
) -> Result<()> {
    request.validate_upload(command)?;
    let result = session
        .orchestrator()
        .upload(request)
        .map(|entry| entry.path);
    session.report_transfer(source, result)
}

pub fn get(session: &mut Session, args: &[String]) -> Result<()> {
    let Some(args) = parse_args::<GetArgs>(session.out, "get", args)? else {
        return Ok(());
    };
    let request = TransferRequest::new("", "")
        .encrypted(args.aes)
        .resume(args.resume);
    request.validate_download()?;
    let (source, destination) = two_args("get", &args.files, "source and destination")?;

    let request = TransferRequest {
        local: destination.into(),
        remote: clean_remote_path(source),
        ..request
    }
    .revision(args.revision);
    let result = session
        .orchestrator()
        .download(&request)
        .map(|()| destination.to_string());
    session.report_transfer(source, result)
}

pub fn thumbnails(session: &mut Session, args: &[String]) -> Result<()> {
    let Some(args) = parse_args::<ThumbnailArgs>(session.out, "thumbnails", args)? else {
        return Ok(());
    };
    let (source, destination) = two_args("thumbnails", &args.files, "source and destination")?;
    let result = session
        .orchestrator()
        .thumbnail(
            &clean_remote_path(source),
            Path::new(destination),
            args.format,
            args.size,
        )
        .map(|()| destination.to_string());
    session.report_transfer(source, result)
}

#[cfg(test)]
mod tests {
    use crate::{
        commands::tests::run,
        error::CommandError,
        models::{CredentialStore, Credentials},
        storage::memory::MemoryStorage,
    };
    use fs_err as fs;
    use pretty_assertions::assert_eq;

    #[test]
    fn should_print_destination_and_persist_new_key_after_encrypted_put() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("localfile.txt");
        fs::write(&source, "some content").unwrap();
        let store = CredentialStore::new(dir.path().join(".dbox"));
        let mut credentials = Credentials::default();
        let mut storage = MemoryStorage::default();

        let run = run(
            &mut credentials,
            &mut storage,
            &["put", "-aes", source.to_str().unwrap(), "/remote/file.txt"],
        );
        store.save_if_dirty(&mut credentials).unwrap();

        assert!(run.result.is_ok());
        assert_eq!("/remote/file.txt\n", run.out);
        assert_eq!("", run.err);
        let loaded = store.load().unwrap().unwrap();
        assert!(!loaded.key().unwrap().is_empty());
    }

    #[test]
    fn should_reject_encrypted_resume_before_contacting_storage() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("dest");
        let mut credentials = Credentials::default();
        let mut storage = MemoryStorage::with_files(&[("/file", "content")]);

        let run = run(
            &mut credentials,
            &mut storage,
            &["get", "-c", "-aes", "file", destination.to_str().unwrap()],
        );

        let err = run.result.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CommandError>(),
            Some(CommandError::MutuallyExclusive { .. })
        ));
        assert_eq!("-aes and -c are mutually exclusive", err.to_string());
        assert!(storage.calls.is_empty());
        assert!(!destination.exists());
    }

    #[test]
    fn should_reject_wrong_argument_count() {
        let mut credentials = Credentials::default();
        let mut storage = MemoryStorage::default();

        let run = run(&mut credentials, &mut storage, &["put", "only-one"]);

        assert_eq!(
            "exactly two parameters needed for put (source and destination)",
            run.result.unwrap_err().to_string()
        );
        assert!(storage.calls.is_empty());
    }

    #[test]
    fn should_report_failed_download_on_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("dest");
        let mut credentials = Credentials::default();
        let mut storage = MemoryStorage::default();

        let run = run(
            &mut credentials,
            &mut storage,
            &["get", "/missing", destination.to_str().unwrap()],
        );

        assert!(run.result.is_ok());
        assert_eq!("", run.out);
        assert!(run.err.starts_with("/missing: "));
        assert!(!destination.exists());
    }

    #[test]
    fn should_report_undecryptable_download_and_keep_the_new_key() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("dest");
        let mut credentials = Credentials::default();
        let mut storage = MemoryStorage::with_files(&[("/a.txt", "plain")]);

        let run = run(
            &mut credentials,
            &mut storage,
            &["get", "-aes", "/a.txt", destination.to_str().unwrap()],
        );

        assert!(run.result.is_ok());
        assert_eq!("", run.out);
        assert_eq!("/a.txt: encryption failure: not encrypted\n", run.err);
        assert!(credentials.is_dirty());
        assert!(!destination.exists());
    }

    #[test]
    fn should_download_into_destination() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("dest");
        let mut credentials = Credentials::default();
        let mut storage = MemoryStorage::with_files(&[("/docs/a.txt", "hello")]);

        let run = run(
            &mut credentials,
            &mut storage,
            &["get", "docs/a.txt", destination.to_str().unwrap()],
        );

        assert!(run.result.is_ok());
        assert_eq!(format!("{}\n", destination.display()), run.out);
        assert_eq!("hello", fs::read_to_string(&destination).unwrap());
    }

    #[test]
    fn should_upload_in_requested_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("big.bin");
        fs::write(&source, "0123456789").unwrap();
        let mut credentials = Credentials::default();
        let mut storage = MemoryStorage::default();

        let run = run(
            &mut credentials,
            &mut storage,
            &["cput", "-c", "4", source.to_str().unwrap(), "big.bin"],
        );

        assert!(run.result.is_ok());
        assert_eq!("/big.bin\n", run.out);
        assert_eq!(vec!["upload_chunked(4) /big.bin"], storage.calls);
    }

    #[test]
    fn should_reject_zero_chunk_size() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("a");
        fs::write(&source, "a").unwrap();
        let mut credentials = Credentials::default();
        let mut storage = MemoryStorage::default();

        let run = run(
            &mut credentials,
            &mut storage,
            &["cput", "-c", "0", source.to_str().unwrap(), "/a"],
        );

        assert!(run.result.is_err());
        assert!(storage.calls.is_empty());
    }

    #[test]
    fn should_report_unsupported_thumbnails() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("thumb.png");
        let target = destination.to_str().unwrap();
        let mut credentials = Credentials::default();
        let mut storage = MemoryStorage::with_files(&[("/a.jpg", "jpeg")]);

        let run = run(
            &mut credentials,
            &mut storage,
            &["thumbnails", "-s", "xl", "/a.jpg", target],
        );

        assert!(run.result.is_ok());
        assert!(run.err.starts_with("/a.jpg: "));
        assert!(!destination.exists());
    }

    #[test]
    fn should_reject_unknown_thumbnail_size() {
        let mut credentials = Credentials::default();
        let mut storage = MemoryStorage::default();

        let run = run(
            &mut credentials,
            &mut storage,
            &["thumbnails", "-s", "huge", "/a", "b"],
        );

        assert!(matches!(
            run.result.unwrap_err().downcast_ref::<CommandError>(),
            Some(CommandError::Usage { .. })
        ));
    }
}
