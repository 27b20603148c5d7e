//! Built-in commands executed inside the interpreter process.
//!
//! Each builtin writes its own diagnostics to the error stream before
//! returning an error, so the dispatcher never reports them twice.

mod account;
mod echo;
mod fs;
mod meta;

pub use account::{AddUser, Login, Logout, Users};
pub use echo::Echo;
pub use fs::{Cat, Cd, Ls, Pwd};
pub use meta::{Exit, ExitHook, Help, History, Type};

use crate::history::HistoryService;
use crate::registry::{CommandRegistry, RegistryError};
use crate::session::{Session, SessionStore};
use crate::user::UserService;
use anyhow::{Result, bail};
use argh::{EarlyExit, FromArgs};
use std::ffi::OsString;
use std::io::{self, Write};
use std::sync::Arc;

/// Services the builtins are wired to.
pub struct Dependencies {
    pub sessions: Arc<dyn SessionStore>,
    pub users: Arc<UserService>,
    pub history: Arc<HistoryService>,
    /// Value of `PATH` used by `type`.
    pub search_path: OsString,
    pub on_exit: ExitHook,
}

/// Register the standard set of builtins.
pub fn register_defaults(registry: &Arc<CommandRegistry>, deps: Dependencies) -> Result<(), RegistryError> {
    let Dependencies {
        sessions,
        users,
        history,
        search_path,
        on_exit,
    } = deps;

    registry.register(Arc::new(Echo::new()))?;
    registry.register(Arc::new(Cat::new(sessions.clone())))?;
    registry.register(Arc::new(Cd::new(sessions.clone())))?;
    registry.register(Arc::new(Ls::new(sessions.clone())))?;
    registry.register(Arc::new(Pwd::new(sessions.clone())))?;
    registry.register(Arc::new(Login::new(users.clone(), sessions.clone())))?;
    registry.register(Arc::new(Logout::new(sessions.clone())))?;
    registry.register(Arc::new(AddUser::new(users.clone())))?;
    registry.register(Arc::new(Users::new(users)))?;
    registry.register(Arc::new(Type::new(
        Arc::downgrade(registry),
        sessions.clone(),
        search_path,
    )))?;
    registry.register(Arc::new(Help::new(Arc::downgrade(registry))))?;
    registry.register(Arc::new(History::new(history, sessions)))?;
    registry.register(Arc::new(Exit::new(on_exit)))?;
    Ok(())
}

/// Parse `args` with argh.
///
/// Returns `Ok(None)` when argh produced a help screen, which is written to
/// `stdout`. Usage errors go to `stderr`.
fn parse_args<T: FromArgs>(
    name: &str,
    args: &[String],
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> Result<Option<T>> {
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    from_argh(name, &args, stdout, stderr)
}

/// Parse `args` as operands only.
///
/// File and user names such as `-notes` or `help` are taken literally;
/// the dispatcher has already answered `--help`.
fn parse_operands<T: FromArgs>(
    name: &str,
    args: &[String],
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> Result<T> {
    let args: Vec<&str> = std::iter::once("--")
        .chain(args.iter().map(String::as_str))
        .collect();
    match from_argh(name, &args, stdout, stderr)? {
        Some(parsed) => Ok(parsed),
        None => bail!("{name}: unexpected help request"),
    }
}

fn from_argh<T: FromArgs>(
    name: &str,
    args: &[&str],
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> Result<Option<T>> {
    match T::from_args(&[name], args) {
        Ok(parsed) => Ok(Some(parsed)),
        Err(EarlyExit { output, status }) => match status {
            Ok(()) => {
                writeln!(stdout, "{}", output.trim_end())?;
                Ok(None)
            }
            Err(()) => {
                writeln!(stderr, "{}", output.trim_end())?;
                bail!("{name}: invalid arguments")
            }
        },
    }
}

/// Write `err` to `stderr` as `<name>: <err>` and hand it back.
fn report(stderr: &mut dyn Write, name: &str, err: impl Into<anyhow::Error>) -> anyhow::Error {
    let err = err.into();
    let _ = writeln!(stderr, "{name}: {err:#}");
    err
}

fn current_session(sessions: &dyn SessionStore, name: &str, stderr: &mut dyn Write) -> Result<Session> {
    sessions.get_session().map_err(|e| report(stderr, name, e))
}

const COLUMN_PADDING: usize = 3;

/// Two-column table with a `---` rule under the header; the first column is
/// padded to its widest cell plus three spaces.
fn write_table<I>(out: &mut dyn Write, header: (&str, &str), rows: I) -> io::Result<()>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut lines = vec![
        (header.0.to_string(), header.1.to_string()),
        ("---".to_string(), "---".to_string()),
    ];
    lines.extend(rows);

    let width = lines
        .iter()
        .map(|(left, _)| left.chars().count())
        .max()
        .unwrap_or(0)
        + COLUMN_PADDING;
    for (left, right) in lines {
        writeln!(out, "{left:<width$}{right}")?;
    }
    Ok(())
}
