//! Stream redirection: `<`, `>`, `>>`, `2>` and `2>>`.
//!
//! Redirection is best effort. A file that cannot be opened is reported on
//! the default error stream and that operator is skipped, the rest of the
//! line still runs.

use crate::command::{Stdin, Stdout, Streams};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Channel {
    Input,
    Output,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Operator {
    channel: Channel,
    append: bool,
}

impl Operator {
    fn parse(token: &str) -> Option<Self> {
        let (channel, append) = match token {
            "<" => (Channel::Input, false),
            ">" => (Channel::Output, false),
            ">>" => (Channel::Output, true),
            "2>" => (Channel::Error, false),
            "2>>" => (Channel::Error, true),
            _ => return None,
        };
        Some(Self { channel, append })
    }

    fn open(self, path: &Path) -> io::Result<File> {
        match self.channel {
            Channel::Input => File::open(path),
            Channel::Output | Channel::Error => {
                let mut opts = OpenOptions::new();
                opts.create(true);
                if self.append {
                    opts.append(true);
                } else {
                    opts.write(true).truncate(true);
                }
                opts.open(path)
            }
        }
    }
}

/// Streams of one invocation after redirection, plus the remaining words.
///
/// Owns every file opened for the invocation. They are flushed and closed by
/// [`Redirection::release`], or on drop if release was never reached.
pub struct Redirection {
    pub streams: Streams,
    pub args: Vec<String>,
    opened: Vec<PathBuf>,
}

impl Redirection {
    /// Paths of the files this invocation has open.
    pub fn opened(&self) -> &[PathBuf] {
        &self.opened
    }

    /// Flush and close every redirected file.
    pub fn release(mut self) {
        self.close();
    }

    fn close(&mut self) {
        if let Err(err) = self.streams.flush() {
            warn!(error = %err, "failed to flush redirected streams");
        }
        for path in self.opened.drain(..) {
            debug!(path = %path.display(), "closing redirection");
        }
    }
}

impl Drop for Redirection {
    fn drop(&mut self) {
        self.close();
    }
}

/// Scan `tokens` for redirection operators and rebind `defaults` accordingly.
///
/// Relative file names are resolved against `cwd`. An operator in last
/// position has no operand and is dropped. When a file cannot be opened the
/// error is written to the default error stream and the operator and its
/// operand are skipped.
pub fn resolve(tokens: Vec<String>, cwd: &Path, defaults: Streams) -> Redirection {
    let Streams {
        stdin: default_stdin,
        stdout: default_stdout,
        stderr: mut default_stderr,
    } = defaults;

    let mut stdin: Option<Box<dyn Stdin>> = None;
    let mut stdout: Option<Box<dyn Stdout>> = None;
    let mut stderr: Option<Box<dyn Stdout>> = None;
    let mut opened = Vec::new();
    let mut args = Vec::with_capacity(tokens.len());

    let mut tokens = tokens.into_iter();
    while let Some(token) = tokens.next() {
        let Some(op) = Operator::parse(&token) else {
            args.push(token);
            continue;
        };
        let Some(target) = tokens.next() else {
            debug!(operator = %token, "redirection without operand dropped");
            break;
        };

        let path = cwd.join(&target);
        let file = match op.open(&path) {
            Ok(file) => file,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "redirection failed");
                let _ = writeln!(default_stderr, "error: {}: {}", target, err);
                continue;
            }
        };

        match op.channel {
            Channel::Input => stdin = Some(Box::new(file)),
            Channel::Output => stdout = Some(Box::new(file)),
            Channel::Error => stderr = Some(Box::new(file)),
        }
        opened.push(path);
    }

    Redirection {
        streams: Streams {
            stdin: stdin.unwrap_or(default_stdin),
            stdout: stdout.unwrap_or(default_stdout),
            stderr: stderr.unwrap_or(default_stderr),
        },
        args,
        opened,
    }
}
