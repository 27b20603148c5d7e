use super::{current_session, parse_operands, report};
use crate::command::{Command, Context};
use crate::session::SessionStore;
use anyhow::{Result, anyhow};
use argh::FromArgs;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Resolve `.` and `..` without touching the filesystem.
pub(crate) fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[derive(FromArgs)]
/// Print the session working directory.
struct PwdArgs {}

pub struct Pwd {
    sessions: Arc<dyn SessionStore>,
}

impl Pwd {
    pub fn new(sessions: Arc<dyn SessionStore>) -> Self {
        Self { sessions }
    }
}

impl Command for Pwd {
    fn name(&self) -> &str {
        "pwd"
    }

    fn max_arguments(&self) -> Option<usize> {
        Some(0)
    }

    fn help(&self) -> &str {
        "pwd - Prints the current working directory"
    }

    fn execute(
        &self,
        _ctx: &Context,
        args: &[String],
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
    ) -> Result<()> {
        let PwdArgs {} = parse_operands(self.name(), args, stdout, stderr)?;
        let session = current_session(self.sessions.as_ref(), self.name(), stderr)?;
        writeln!(stdout, "{}", session.working_dir.display())?;
        Ok(())
    }
}

#[derive(FromArgs)]
/// Change the session working directory.
/// Without a target, changes to the directory named by $HOME.
struct CdArgs {
    #[argh(positional)]
    /// directory to switch to, absolute or relative to the working directory
    target: Option<String>,
}

pub struct Cd {
    sessions: Arc<dyn SessionStore>,
}

impl Cd {
    pub fn new(sessions: Arc<dyn SessionStore>) -> Self {
        Self { sessions }
    }
}

impl Command for Cd {
    fn name(&self) -> &str {
        "cd"
    }

    fn max_arguments(&self) -> Option<usize> {
        Some(1)
    }

    fn help(&self) -> &str {
        "cd [dir] - Changes the current working directory"
    }

    fn execute(
        &self,
        _ctx: &Context,
        args: &[String],
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
    ) -> Result<()> {
        let CdArgs { target } = parse_operands(self.name(), args, stdout, stderr)?;
        let mut session = current_session(self.sessions.as_ref(), self.name(), stderr)?;

        let target = match target.filter(|t| !t.is_empty()) {
            Some(t) => PathBuf::from(t),
            None => match std::env::var_os("HOME") {
                Some(home) => PathBuf::from(home),
                None => return Err(report(stderr, "cd", anyhow!("HOME not set"))),
            },
        };

        let new_dir = normalize(&session.working_dir.join(&target));
        let meta = fs::metadata(&new_dir)
            .map_err(|e| report(stderr, "cd", anyhow!("{}: {e}", target.display())))?;
        if !meta.is_dir() {
            return Err(report(
                stderr,
                "cd",
                anyhow!("{}: not a directory", target.display()),
            ));
        }

        debug!(from = %session.working_dir.display(), to = %new_dir.display(), "changing directory");
        session.working_dir = new_dir;
        self.sessions
            .set_session(session)
            .map_err(|e| report(stderr, "cd", e))
    }
}

#[derive(FromArgs)]
/// List a directory, sorted, with directories suffixed by '/'.
struct LsArgs {
    #[argh(positional)]
    /// directory to list; defaults to the working directory
    dir: Option<String>,
}

pub struct Ls {
    sessions: Arc<dyn SessionStore>,
}

impl Ls {
    pub fn new(sessions: Arc<dyn SessionStore>) -> Self {
        Self { sessions }
    }
}

impl Command for Ls {
    fn name(&self) -> &str {
        "ls"
    }

    fn max_arguments(&self) -> Option<usize> {
        Some(1)
    }

    fn help(&self) -> &str {
        "ls [dir] - Lists the contents of the specified directory (or current directory if none specified)"
    }

    fn execute(
        &self,
        _ctx: &Context,
        args: &[String],
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
    ) -> Result<()> {
        let LsArgs { dir } = parse_operands(self.name(), args, stdout, stderr)?;
        let session = current_session(self.sessions.as_ref(), self.name(), stderr)?;
        let path = match &dir {
            Some(d) => session.working_dir.join(d),
            None => session.working_dir,
        };

        let mut names = fs::read_dir(&path)
            .and_then(|entries| {
                entries
                    .map(|entry| -> io::Result<String> {
                        let entry = entry?;
                        let mut name = entry.file_name().to_string_lossy().into_owned();
                        if entry.file_type()?.is_dir() {
                            name.push('/');
                        }
                        Ok(name)
                    })
                    .collect::<io::Result<Vec<_>>>()
            })
            .map_err(|e| report(stderr, "ls", anyhow!("{}: {e}", path.display())))?;
        names.sort();

        for name in names {
            writeln!(stdout, "{name}")?;
        }
        Ok(())
    }
}

#[derive(FromArgs)]
/// Print a file, or standard input when no file is given.
struct CatArgs {
    #[argh(positional)]
    /// file to print, relative to the working directory
    file: Option<String>,
}

pub struct Cat {
    sessions: Arc<dyn SessionStore>,
}

impl Cat {
    pub fn new(sessions: Arc<dyn SessionStore>) -> Self {
        Self { sessions }
    }
}

impl Command for Cat {
    fn name(&self) -> &str {
        "cat"
    }

    fn max_arguments(&self) -> Option<usize> {
        Some(1)
    }

    fn help(&self) -> &str {
        "cat <filename> - Displays the content of the specified file"
    }

    fn execute(
        &self,
        _ctx: &Context,
        args: &[String],
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
    ) -> Result<()> {
        let CatArgs { file } = parse_operands(self.name(), args, stdout, stderr)?;
        let Some(file) = file else {
            io::copy(stdin, stdout)?;
            return Ok(());
        };

        let session = current_session(self.sessions.as_ref(), self.name(), stderr)?;
        let path = session.working_dir.join(&file);
        let mut f = fs::File::open(&path).map_err(|e| report(stderr, "cat", anyhow!("{file}: {e}")))?;
        io::copy(&mut f, stdout)?;
        Ok(())
    }
}
