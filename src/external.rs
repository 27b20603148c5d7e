use crate::command::{Context, Streams};
use anyhow::{Context as _, Result, anyhow, bail};
use std::ffi::OsStr;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::debug;

/// Help text shown for `<external> --help`.
pub const EXTERNAL_HELP: &str = "<command> [args...] - Executes a system command";

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Resolve a command path the way a typical shell would.
///
/// Behavior:
/// - Absolute path: returns it if it is an executable file.
/// - Relative with a separator (e.g., `bin/sh`, `./foo`): resolved against `cwd`.
/// - Single path component: search each directory in `search_paths` (PATH)
///   and return the first executable match.
/// - Empty path: returns `None`.
pub fn find_command_path(search_paths: &OsStr, name: &str, cwd: &Path) -> Option<PathBuf> {
    let path = Path::new(name);
    if name.is_empty() {
        return None;
    }
    if path.is_absolute() {
        return find_by_path(path);
    }

    let mut components = path.components();
    match (components.next(), components.next()) {
        (Some(x), None) if !name.contains(std::path::MAIN_SEPARATOR) => {
            find_in_path(search_paths, x.as_os_str())
        }
        _ => find_by_path(&cwd.join(path)),
    }
}

fn find_in_path(search_paths: &OsStr, cmd: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(search_paths)
        .filter(|dir| !dir.as_os_str().is_empty())
        .find_map(|dir| find_by_path(&dir.join(cmd)))
}

fn find_by_path(path: &Path) -> Option<PathBuf> {
    is_executable(path).then(|| path.to_path_buf())
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(unix)]
fn terminated_by_signal(exit_status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    if let Some(signal) = exit_status.signal() {
        128 + signal
    } else if exit_status.core_dumped() {
        255
    } else {
        -1
    }
}

#[cfg(not(unix))]
fn terminated_by_signal(_exit_status: ExitStatus) -> i32 {
    -1
}

fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or_else(|| terminated_by_signal(status))
}

/// Runs resolved executables as child processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    /// Spawn `program` in `cwd` with the parent's environment and wait for it.
    ///
    /// Streams with a file descriptor are handed to the child directly,
    /// in-memory streams are piped. Cancelling `ctx` kills the child.
    pub fn run(
        &self,
        ctx: &Context,
        program: &Path,
        args: &[String],
        cwd: &Path,
        streams: &mut Streams,
    ) -> Result<()> {
        streams.flush()?;

        let mut cmd = std::process::Command::new(program);
        cmd.args(args).current_dir(cwd);

        let feed = match streams.stdin.stdio()? {
            Some(stdio) => {
                cmd.stdin(stdio);
                None
            }
            None => {
                let mut buf = Vec::new();
                streams.stdin.read_to_end(&mut buf)?;
                cmd.stdin(Stdio::piped());
                Some(buf)
            }
        };
        let capture_out = match streams.stdout.stdio()? {
            Some(stdio) => {
                cmd.stdout(stdio);
                false
            }
            None => {
                cmd.stdout(Stdio::piped());
                true
            }
        };
        let capture_err = match streams.stderr.stdio()? {
            Some(stdio) => {
                cmd.stderr(stdio);
                false
            }
            None => {
                cmd.stderr(Stdio::piped());
                true
            }
        };

        let mut child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn {}", program.display()))?;
        debug!(program = %program.display(), pid = child.id(), "spawned child");

        if let (Some(buf), Some(mut pipe)) = (feed, child.stdin.take()) {
            // Broken pipe just means the child stopped reading early.
            thread::spawn(move || {
                let _ = pipe.write_all(&buf);
            });
        }
        let out_reader = capture_out.then(|| child.stdout.take().map(drain)).flatten();
        let err_reader = capture_err.then(|| child.stderr.take().map(drain)).flatten();

        let status = wait_cancellable(ctx, &mut child);

        if let Some(handle) = out_reader {
            streams.stdout.write_all(&join_drain(handle))?;
        }
        if let Some(handle) = err_reader {
            streams.stderr.write_all(&join_drain(handle))?;
        }

        let status = status?;
        if !status.success() {
            bail!("{}: exit status {}", program.display(), exit_code(status));
        }
        Ok(())
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn join_drain(handle: JoinHandle<Vec<u8>>) -> Vec<u8> {
    handle.join().unwrap_or_default()
}

fn wait_cancellable(ctx: &Context, child: &mut Child) -> Result<ExitStatus> {
    loop {
        if ctx.is_cancelled() {
            debug!(pid = child.id(), "cancelled, killing child");
            // The child may already have exited on its own.
            let _ = child.kill();
            child.wait()?;
            return Err(anyhow!("cancelled"));
        }
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        thread::sleep(POLL_INTERVAL);
    }
}
