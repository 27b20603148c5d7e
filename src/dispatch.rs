//! Resolution and invocation of a single command.
//!
//! Every invocation walks the same steps: resolve the name (builtin first,
//! then PATH), answer `--help`, validate the argument count (builtins only),
//! record history, execute. History is only written for invocations that
//! reach execution.

use crate::command::{Command, Context, Streams};
use crate::error::ShellError;
use crate::external::{EXTERNAL_HELP, ProcessRunner, find_command_path};
use crate::history::HistoryService;
use crate::registry::{CommandRegistry, RegistryError};
use crate::session::SessionStore;
use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

const HELP_FLAG: &str = "--help";

enum Resolved {
    Builtin(Arc<dyn Command>),
    External(PathBuf),
}

pub struct Dispatcher {
    registry: Arc<CommandRegistry>,
    history: Arc<HistoryService>,
    sessions: Arc<dyn SessionStore>,
    runner: ProcessRunner,
    search_path: OsString,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<CommandRegistry>,
        history: Arc<HistoryService>,
        sessions: Arc<dyn SessionStore>,
        search_path: impl Into<OsString>,
    ) -> Self {
        Self {
            registry,
            history,
            sessions,
            runner: ProcessRunner,
            search_path: search_path.into(),
        }
    }

    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.registry
    }

    /// Run `name` with `args` on `streams`.
    pub fn execute(
        &self,
        ctx: &Context,
        name: &str,
        args: &[String],
        streams: &mut Streams,
    ) -> Result<(), ShellError> {
        match self.resolve(name)? {
            Resolved::Builtin(cmd) => self.execute_builtin(ctx, cmd.as_ref(), args, streams),
            Resolved::External(path) => self.execute_external(ctx, name, &path, args, streams),
        }
    }

    fn resolve(&self, name: &str) -> Result<Resolved, ShellError> {
        match self.registry.get(name) {
            Ok(cmd) => Ok(Resolved::Builtin(cmd)),
            Err(RegistryError::CommandNotFound(_)) => {
                let cwd = self.sessions.get_session()?.working_dir;
                find_command_path(&self.search_path, name, &cwd)
                    .map(Resolved::External)
                    .ok_or_else(|| ShellError::CommandNotFound(name.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn execute_builtin(
        &self,
        ctx: &Context,
        cmd: &dyn Command,
        args: &[String],
        streams: &mut Streams,
    ) -> Result<(), ShellError> {
        if is_help_requested(args) {
            return print_help(cmd.help(), streams);
        }

        validate_args(cmd, args)?;
        self.save_history(cmd.name(), args)?;

        debug!(command = cmd.name(), "executing builtin");
        cmd.execute(
            ctx,
            args,
            &mut streams.stdin,
            &mut streams.stdout,
            &mut streams.stderr,
        )
        .map_err(ShellError::Execution)
    }

    fn execute_external(
        &self,
        ctx: &Context,
        name: &str,
        path: &Path,
        args: &[String],
        streams: &mut Streams,
    ) -> Result<(), ShellError> {
        if is_help_requested(args) {
            return print_help(EXTERNAL_HELP, streams);
        }

        self.save_history(name, args)?;

        let cwd = self.sessions.get_session()?.working_dir;
        debug!(command = name, path = %path.display(), "executing external");
        self.runner
            .run(ctx, path, args, &cwd, streams)
            .map_err(|err| {
                // Spawn failures never reached the child's own stderr.
                if err.downcast_ref::<std::io::Error>().is_some() {
                    let _ = writeln!(streams.stderr, "{name}: {err:#}");
                }
                ShellError::Execution(err)
            })
    }

    fn save_history(&self, name: &str, args: &[String]) -> Result<(), ShellError> {
        let actor = self.sessions.get_session()?.actor_id();
        let line = history_line(name, args);
        self.history
            .save_command_history(actor, &line)
            .map_err(|err| {
                warn!(error = %err, command = %line, "history write failed");
                ShellError::HistoryWrite(err)
            })
    }
}

fn is_help_requested(args: &[String]) -> bool {
    args.first().is_some_and(|a| a == HELP_FLAG)
}

fn print_help(text: &str, streams: &mut Streams) -> Result<(), ShellError> {
    streams.stdout.write_all(text.as_bytes())?;
    Ok(())
}

fn validate_args(cmd: &dyn Command, args: &[String]) -> Result<(), ShellError> {
    match cmd.max_arguments() {
        Some(max) if args.len() > max => Err(ShellError::TooManyArguments(cmd.name().to_string())),
        _ => Ok(()),
    }
}

fn history_line(name: &str, args: &[String]) -> String {
    std::iter::once(name)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}
