use crate::lexer::LexingError;
use crate::registry::RegistryError;
use crate::session::SessionError;
use crate::store::StoreError;

/// Errors surfaced by the interpreter for one input line.
#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    #[error(transparent)]
    Parse(#[from] LexingError),
    #[error("command not found: {0}")]
    CommandNotFound(String),
    #[error("too many arguments for command '{0}'")]
    TooManyArguments(String),
    #[error("invalid exit code: {0}")]
    InvalidExitCode(String),
    #[error("failed to record history: {0}")]
    HistoryWrite(#[source] StoreError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Registry(RegistryError),
    /// Already reported on the command's error stream.
    #[error("{0:#}")]
    Execution(anyhow::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ShellError {
    /// Whether the user still needs to see this error.
    pub fn needs_report(&self) -> bool {
        !matches!(self, ShellError::Execution(_))
    }
}

impl From<RegistryError> for ShellError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::CommandNotFound(name) => ShellError::CommandNotFound(name),
            other => ShellError::Registry(other),
        }
    }
}
