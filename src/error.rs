use thiserror::Error;

/// Errors detected while interpreting a command line, before any remote call.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("{message}")]
    Usage { command: String, message: String },

    #[error("-{first} and -{second} are mutually exclusive")]
    MutuallyExclusive {
        first: &'static str,
        second: &'static str,
    },

    #[error("Unknown command '{0}'")]
    UnknownCommand(String),
}

impl CommandError {
    pub fn usage(command: &str, message: impl Into<String>) -> Self {
        Self::Usage {
            command: command.to_string(),
            message: message.into(),
        }
    }
}
