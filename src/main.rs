use std::{
    env,
    io::{self, Write},
    process,
};

use commands::{write_usage, Registry, Session};
use crossterm::{
    style::{Color, Print, ResetColor, SetForegroundColor},
    ExecutableCommand,
};
use error::CommandError;
use eyre::{Result, WrapErr};
use models::CredentialStore;
use storage::{LocalStorage, StorageClient};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

pub mod commands;
pub mod error;
pub mod models;
pub mod storage;
pub mod utils;

const PROGRAM: &str = "dbox";
const DEFAULT_LOG_FILTER: &str = "warn";

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let mut argv = env::args();
    let program = argv.next().unwrap_or_else(|| PROGRAM.to_string());
    let argv: Vec<String> = argv.collect();

    let Some((name, args)) = argv.split_first() else {
        let _ = write_usage(&mut io::stderr(), &program);
        process::exit(1);
    };

    let registry = Registry::new();
    if let Err(err) = run(&registry, name, args) {
        let _ = report(&registry, &program, name, &err);
        process::exit(1);
    }
}

/// Runs one command. Credentials are written back once, after the command,
/// whether or not it succeeded.
fn run(registry: &Registry, name: &str, args: &[String]) -> Result<()> {
    let command = registry
        .get(name)
        .ok_or_else(|| CommandError::UnknownCommand(name.to_string()))?;
    let mut out = io::stdout().lock();
    if command.is_help() {
        registry.write_help(&mut out)?;
        return Ok(());
    }

    let store = CredentialStore::from_env()?;
    let mut credentials = store.load()?.unwrap_or_default();
    let mut client = LocalStorage::from_env()?;
    match credentials.token().map(str::to_string) {
        Some(token) => client.set_access_token(&token),
        None => {
            let token = client.authenticate().wrap_err("authentication failed")?;
            credentials.set_token(token);
        }
    }

    let mut err = io::stderr().lock();
    let result = registry.dispatch(
        name,
        args,
        &mut Session {
            credentials: &mut credentials,
            client: &mut client,
            out: &mut out,
            err: &mut err,
        },
    );
    out.flush()?;

    match store.save_if_dirty(&mut credentials) {
        Ok(saved) => debug!(saved, path = %store.path().display(), "credentials"),
        Err(save_err) if result.is_err() => warn!("cannot save credentials: {save_err:#}"),
        Err(save_err) => return Err(save_err),
    }
    result
}

fn report(registry: &Registry, program: &str, name: &str, err: &eyre::Report) -> io::Result<()> {
    let mut stderr = io::stderr();
    stderr
        .execute(SetForegroundColor(Color::Red))?
        .execute(Print(format!("{err:#}\n")))?
        .execute(ResetColor)?;

    match err.downcast_ref::<CommandError>() {
        Some(CommandError::UnknownCommand(_)) => write_usage(&mut stderr, program),
        Some(_) => match registry.get(name) {
            Some(command) => writeln!(
                stderr,
                "Usage: {program} {} {}",
                command.name, command.usage
            ),
            None => write_usage(&mut stderr, program),
        },
        None => Ok(()),
    }
}
