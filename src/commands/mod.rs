//! The command table and the dispatcher.
//!
//! Every command owns its flag set: handlers receive the raw arguments that
//! follow the command name and parse them with their own `clap` parser.

pub mod delta;
pub mod list;
pub mod manage;
pub mod share;
pub mod transfer;

use std::{
    collections::BTreeMap,
    fmt::Display,
    io::{self, Write},
    iter,
};

use clap::Parser;
use eyre::Result;
use tracing::debug;

use crate::{
    error::CommandError, models::Credentials, storage::StorageClient, utils::TransferOrchestrator,
};

pub const HELP: &str = "help";

/// Flags spelled with a single dash that `clap` only knows as long flags.
const SINGLE_DASH_LONG_FLAGS: &[&str] = &["aes"];

/// Everything a handler may touch during one invocation.
pub struct Session<'a> {
    pub credentials: &'a mut Credentials,
    pub client: &'a mut dyn StorageClient,
    pub out: &'a mut dyn Write,
    pub err: &'a mut dyn Write,
}

impl<'a> Session<'a> {
    pub fn orchestrator(&mut self) -> TransferOrchestrator<'_> {
        TransferOrchestrator::new(&mut *self.credentials, &mut *self.client)
    }

    /// Reports a failed item of a batch; the batch goes on.
    pub fn report_failure(&mut self, item: &str, error: impl Display) -> Result<()> {
        debug!(item, "item failed");
        writeln!(self.err, "{item}: {error}")?;
        Ok(())
    }

    /// Prints where a finished transfer landed, or the source and the reason it failed.
    pub fn report_transfer(&mut self, source: &str, result: Result<String>) -> Result<()> {
        match result {
            Ok(destination) => writeln!(self.out, "{destination}")?,
            Err(err) => self.report_failure(source, format!("{err:#}"))?,
        }
        Ok(())
    }
}

pub type Handler = fn(&mut Session<'_>, &[String]) -> Result<()>;

#[derive(Clone, Copy)]
enum Action {
    Help,
    Run(Handler),
}

pub struct Command {
    pub name: &'static str,
    pub description: &'static str,
    pub usage: &'static str,
    action: Action,
}

impl Command {
    fn run(
        name: &'static str,
        description: &'static str,
        usage: &'static str,
        handler: Handler,
    ) -> Self {
        Self {
            name,
            description,
            usage,
            action: Action::Run(handler),
        }
    }

    pub fn is_help(&self) -> bool {
        matches!(self.action, Action::Help)
    }
}

/// Command name to handler, built once per process.
pub struct Registry {
    commands: BTreeMap<&'static str, Command>,
}

impl Registry {
    pub fn new() -> Self {
        let commands = [
            Command::run(
                "copy",
                "Copy file or directory.",
                "[-r] from_file to_file",
                manage::copy,
            ),
            Command::run(
                "copyref",
                "Get a copy reference of a file.",
                "file [files...]",
                manage::copy_ref,
            ),
            Command::run(
                "cput",
                "Upload a file in chunks.",
                "[-aes] [-c chunksize] [-k] [-r rev] file destination",
                transfer::chunked_put,
            ),
            Command::run(
                "delta",
                "Get modifications.",
                "[-c cursor] [-p path_prefix]",
                delta::delta,
            ),
            Command::run(
                "delete",
                "Remove file or directory (Warning this remove is recursive).",
                "file [files...]",
                manage::delete,
            ),
            Command::run(
                "get",
                "Download a file.",
                "[-aes] [-c] [-r rev] file destination",
                transfer::get,
            ),
            Command::run(
                "list",
                "List files from directories.",
                "[-a] [-d] [-l] [files...]",
                list::list,
            ),
            Command::run(
                "ldelta",
                "Get modifications with timeout.",
                "[-t timeout] cursor",
                delta::longpoll_delta,
            ),
            Command::run(
                "media",
                "Shares files with direct access.",
                "file [files...]",
                share::media,
            ),
            Command::run(
                "mkdir",
                "Create directories.",
                "directory [directories...]",
                manage::mkdir,
            ),
            Command::run(
                "move",
                "Move file or directory.",
                "from_file to_file",
                manage::r#move,
            ),
            Command::run(
                "put",
                "Upload a file.",
                "[-aes] [-k] [-r rev] file destination",
                transfer::put,
            ),
            Command::run(
                "restore",
                "Restore a file to a previous revision.",
                "path revision",
                manage::restore,
            ),
            Command::run(
                "revisions",
                "Get revisions of files.",
                "[-l limit] file [files...]",
                list::revisions,
            ),
            Command::run(
                "search",
                "Search files.",
                "[-a] [-l] [-m limit] path \"query words\"",
                list::search,
            ),
            Command::run(
                "shares",
                "Share files.",
                "[-o] file [files...]",
                share::shares,
            ),
            Command::run(
                "thumbnails",
                "Download a thumbnail.",
                "[-s size] [-f format] file destination",
                transfer::thumbnails,
            ),
            Command {
                name: HELP,
                description: "Show this help message",
                usage: "",
                action: Action::Help,
            },
        ];
        Self {
            commands: commands
                .into_iter()
                .map(|command| (command.name, command))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Command> {
        self.commands.get(name)
    }

    pub fn dispatch(&self, name: &str, args: &[String], session: &mut Session) -> Result<()> {
        let command = self
            .get(name)
            .ok_or_else(|| CommandError::UnknownCommand(name.to_string()))?;
        debug!(command = name, ?args, "dispatching");
        match command.action {
            Action::Help => self.write_help(session.out)?,
            Action::Run(handler) => handler(session, args)?,
        }
        Ok(())
    }

    /// Lists every command in name order, `help` last.
    pub fn write_help(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "Command list:")?;
        for command in self.commands.values().filter(|command| !command.is_help()) {
            writeln!(out, "{:>10}: {}", command.name, command.description)?;
            writeln!(out, "            Usage: {} {}", command.name, command.usage)?;
        }
        if let Some(help) = self.get(HELP) {
            writeln!(out, "{:>10}: {}", help.name, help.description)?;
        }
        Ok(())
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

pub fn write_usage(out: &mut dyn Write, program: &str) -> io::Result<()> {
    writeln!(out, "Usage: {program} command command_arguments")?;
    writeln!(out, "       Use help command to list available commands")?;
    writeln!(
        out,
        "       Use command -h to get help for commands accepting options"
    )
}

/// Parses a command's own flags. `Ok(None)` means help was requested and printed.
pub(crate) fn parse_args<T: Parser>(
    out: &mut dyn Write,
    command: &str,
    args: &[String],
) -> Result<Option<T>> {
    let argv = iter::once(command.to_string())
        .chain(args.iter().map(|arg| normalize_flag(arg)));
    match T::try_parse_from(argv) {
        Ok(parsed) => Ok(Some(parsed)),
        Err(err) if !err.use_stderr() => {
            write!(out, "{err}")?;
            Ok(None)
        }
        Err(err) => {
            let message = err.to_string();
            Err(CommandError::usage(command, message.trim_end()).into())
        }
    }
}

fn normalize_flag(arg: &str) -> String {
    match arg.strip_prefix('-') {
        Some(name) if SINGLE_DASH_LONG_FLAGS.contains(&name) => format!("--{name}"),
        _ => arg.to_string(),
    }
}

pub(crate) fn one_arg<'a>(command: &str, args: &'a [String], what: &str) -> Result<&'a str> {
    match args {
        [only] => Ok(only),
        _ => Err(CommandError::usage(
            command,
            format!("exactly one parameter needed for {command} ({what})"),
        )
        .into()),
    }
}

pub(crate) fn two_args<'a>(
    command: &str,
    args: &'a [String],
    what: &str,
) -> Result<(&'a str, &'a str)> {
    match args {
        [first, second] => Ok((first, second)),
        _ => Err(CommandError::usage(
            command,
            format!("exactly two parameters needed for {command} ({what})"),
        )
        .into()),
    }
}

pub(crate) fn some_args<'a>(command: &str, args: &'a [String], what: &str) -> Result<&'a [String]> {
    if args.is_empty() {
        return Err(CommandError::usage(
            command,
            format!("at least one parameter needed for {command} ({what})"),
        )
        .into());
    }
    Ok(args)
}
