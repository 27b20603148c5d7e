use anyhow::Result;
use std::fs::File;
use std::io::{self, Read, Write};
use std::process::Stdio;
use tokio_util::sync::CancellationToken;

/// Abstraction over a readable input stream that can also be handed to a
/// child process.
///
/// `stdio` returns `None` when the stream has no file descriptor of its own
/// (e.g. an in-memory buffer). The process runner then pipes the child's
/// input and feeds it from this reader.
pub trait Stdin: Read {
    /// Produce a [`Stdio`] handle suitable for `std::process::Command`.
    fn stdio(&mut self) -> io::Result<Option<Stdio>>;
}

/// Abstraction over a writable output stream that can also be handed to a
/// child process.
///
/// `None` from `stdio` means the child's output is piped and copied into
/// this writer after the child exits.
pub trait Stdout: Write {
    /// Produce a [`Stdio`] handle suitable for `std::process::Command`.
    fn stdio(&mut self) -> io::Result<Option<Stdio>>;
}

impl Stdin for File {
    fn stdio(&mut self) -> io::Result<Option<Stdio>> {
        Ok(Some(self.try_clone()?.into()))
    }
}

impl Stdout for File {
    fn stdio(&mut self) -> io::Result<Option<Stdio>> {
        Ok(Some(self.try_clone()?.into()))
    }
}

/// The three standard streams of one command invocation.
pub struct Streams {
    pub stdin: Box<dyn Stdin>,
    pub stdout: Box<dyn Stdout>,
    pub stderr: Box<dyn Stdout>,
}

impl Streams {
    pub fn new(stdin: Box<dyn Stdin>, stdout: Box<dyn Stdout>, stderr: Box<dyn Stdout>) -> Self {
        Self {
            stdin,
            stdout,
            stderr,
        }
    }

    /// The interpreter's own terminal streams.
    pub fn terminal() -> Self {
        use crate::io_adapters::{TerminalStderr, TerminalStdin, TerminalStdout};
        Self::new(
            Box::new(TerminalStdin),
            Box::new(TerminalStdout),
            Box::new(TerminalStderr),
        )
    }

    /// Flush both output streams.
    pub fn flush(&mut self) -> io::Result<()> {
        self.stdout.flush()?;
        self.stderr.flush()
    }
}

/// Cancellation handle threaded through dispatch and process execution.
///
/// Cloning shares the underlying token, so cancelling any clone cancels all
/// of them.
#[derive(Debug, Clone, Default)]
pub struct Context {
    token: CancellationToken,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// A context that is cancelled together with `self`, but can also be
    /// cancelled on its own.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
        }
    }
}

/// A built-in command that can be registered with the interpreter.
///
/// Implementations write their own diagnostics to `stderr` before returning
/// an error; the dispatcher never reports an execution error a second time.
pub trait Command: Send + Sync {
    /// Canonical name of the command, e.g. "echo" or "cd".
    fn name(&self) -> &str;

    /// Maximum number of arguments accepted, `None` for unlimited.
    fn max_arguments(&self) -> Option<usize>;

    /// One-line usage and description, printed for `--help`.
    fn help(&self) -> &str;

    fn execute(
        &self,
        ctx: &Context,
        args: &[String],
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
    ) -> Result<()>;
}
