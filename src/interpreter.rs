use crate::command::{Context, Streams};
use crate::dispatch::Dispatcher;
use crate::error::ShellError;
use crate::lexer;
use crate::redirect::{self, Redirection};
use crate::session::SessionStore;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::io::{self, BufRead, Write};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Cancels whatever line the interpreter is currently executing.
///
/// Cheap to clone and safe to call from a signal handler thread.
#[derive(Clone, Default)]
pub struct InterruptHandle {
    current: Arc<Mutex<Option<Context>>>,
}

impl InterruptHandle {
    pub fn interrupt(&self) {
        if let Ok(current) = self.current.lock() {
            if let Some(ctx) = current.as_ref() {
                debug!("interrupting running command");
                ctx.cancel();
            }
        }
    }

    fn begin(&self, ctx: Context) {
        if let Ok(mut current) = self.current.lock() {
            *current = Some(ctx);
        }
    }

    fn end(&self) {
        if let Ok(mut current) = self.current.lock() {
            *current = None;
        }
    }
}

/// Line-oriented shell: lex, redirect, dispatch, report.
///
/// ```no_run
/// # fn demo(sh: minishell::Interpreter) -> anyhow::Result<()> {
/// sh.execute_line("echo hello > greeting.txt", minishell::Streams::terminal())?;
/// # Ok(())
/// # }
/// ```
pub struct Interpreter {
    dispatcher: Dispatcher,
    sessions: Arc<dyn SessionStore>,
    root: Context,
    interrupt: InterruptHandle,
}

impl Interpreter {
    pub fn new(dispatcher: Dispatcher, sessions: Arc<dyn SessionStore>) -> Self {
        Self {
            dispatcher,
            sessions,
            root: Context::new(),
            interrupt: InterruptHandle::default(),
        }
    }

    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    /// `user:$ ` when logged in, `$ ` for the guest.
    pub fn prompt(&self) -> Result<String, ShellError> {
        let session = self.sessions.get_session()?;
        Ok(match session.user {
            Some(user) => format!("{}:$ ", user.username),
            None => "$ ".to_string(),
        })
    }

    /// Execute one input line against `streams`.
    ///
    /// Errors are already reported on the line's error stream when this
    /// returns; the result only tells the caller what happened.
    pub fn execute_line(&self, line: &str, mut streams: Streams) -> Result<(), ShellError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(());
        }

        let prepared = lexer::tokenize(line)
            .map_err(ShellError::from)
            .and_then(|tokens| Ok((tokens, self.sessions.get_session()?.working_dir)));
        let (tokens, cwd) = match prepared {
            Ok(prepared) => prepared,
            Err(err) => {
                report(&mut streams.stderr, &err);
                return Err(err);
            }
        };

        let mut redirection = redirect::resolve(tokens, &cwd, streams);
        let result = self.dispatch(&mut redirection);
        if let Err(err) = &result {
            report(&mut redirection.streams.stderr, err);
        }
        redirection.release();
        result
    }

    fn dispatch(&self, redirection: &mut Redirection) -> Result<(), ShellError> {
        let Some((name, args)) = redirection.args.split_first() else {
            return Ok(());
        };

        let ctx = self.root.child();
        self.interrupt.begin(ctx.clone());
        let result = self
            .dispatcher
            .execute(&ctx, name, args, &mut redirection.streams);
        self.interrupt.end();
        result
    }

    /// Interactive loop on the terminal.
    ///
    /// Ctrl-C discards the current input, Ctrl-D leaves the loop.
    pub fn repl(&self) -> anyhow::Result<()> {
        let mut rl = DefaultEditor::new()?;

        loop {
            let prompt = self.prompt()?;
            match rl.readline(&prompt) {
                Ok(line) => {
                    if !line.trim().is_empty() {
                        rl.add_history_entry(line.as_str())?;
                    }
                    let _ = self.execute_line(&line, Streams::terminal());
                }
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => {
                    println!("\nExiting...");
                    return Ok(());
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Non-interactive loop over `input`, e.g. a script piped into stdin.
    pub fn run<R: BufRead>(&self, mut input: R) -> anyhow::Result<()> {
        let mut line = String::new();
        loop {
            print!("{}", self.prompt()?);
            io::stdout().flush()?;

            line.clear();
            if input.read_line(&mut line)? == 0 {
                println!("\nExiting...");
                return Ok(());
            }
            let _ = self.execute_line(&line, Streams::terminal());
        }
    }
}

fn report(stderr: &mut dyn Write, err: &ShellError) {
    if err.needs_report() {
        let _ = writeln!(stderr, "error: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::{self, Dependencies};
    use crate::history::{HistoryService, InMemoryHistoryRepository};
    use crate::io_adapters::{MemReader, MemWriter};
    use crate::registry::CommandRegistry;
    use crate::session::{MemorySessionStore, Session};
    use crate::store::SqliteStore;
    use crate::user::UserService;
    use std::path::Path;

    fn interpreter(cwd: &Path) -> Interpreter {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let sessions: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::with_session(Session::guest(cwd)));
        let history = Arc::new(HistoryService::new(
            store.clone(),
            Arc::new(InMemoryHistoryRepository::new(0)),
        ));
        let registry = Arc::new(CommandRegistry::new());
        builtin::register_defaults(
            &registry,
            Dependencies {
                sessions: sessions.clone(),
                users: Arc::new(UserService::new(store)),
                history: history.clone(),
                search_path: std::env::var_os("PATH").unwrap_or_default(),
                on_exit: Arc::new(|_: i32| {}),
            },
        )
        .unwrap();
        let search_path = std::env::var_os("PATH").unwrap_or_default();
        let dispatcher = Dispatcher::new(registry, history, sessions.clone(), search_path);
        Interpreter::new(dispatcher, sessions)
    }

    fn exec(sh: &Interpreter, line: &str) -> (Result<(), ShellError>, String, String) {
        let out = MemWriter::new();
        let err = MemWriter::new();
        let streams = Streams::new(
            Box::new(MemReader::empty()),
            Box::new(out.clone()),
            Box::new(err.clone()),
        );
        let result = sh.execute_line(line, streams);
        (result, out.contents(), err.contents())
    }

    #[test]
    fn blank_line_is_a_no_op() {
        let sh = interpreter(Path::new("/"));
        let (result, out, err) = exec(&sh, "   \t ");
        assert!(result.is_ok());
        assert!(out.is_empty() && err.is_empty());
    }

    #[test]
    fn parse_error_is_reported() {
        let sh = interpreter(Path::new("/"));
        let (result, _, err) = exec(&sh, "echo \"open");
        assert!(matches!(result, Err(ShellError::Parse(_))));
        assert_eq!(err, "error: unterminated quote detected\n");
    }

    #[test]
    fn unknown_command_is_reported() {
        let sh = interpreter(Path::new("/"));
        let (result, _, err) = exec(&sh, "no-such-command-xyz arg");
        assert!(matches!(result, Err(ShellError::CommandNotFound(_))));
        assert_eq!(err, "error: command not found: no-such-command-xyz\n");
    }

    #[test]
    fn too_many_arguments_is_reported() {
        let sh = interpreter(Path::new("/"));
        let (_, _, err) = exec(&sh, "pwd extra");
        assert_eq!(err, "error: too many arguments for command 'pwd'\n");
    }

    #[test]
    fn execution_errors_are_not_reported_twice() {
        let dir = tempfile::tempdir().unwrap();
        let sh = interpreter(dir.path());
        let (result, _, err) = exec(&sh, "cd missing");
        assert!(matches!(result, Err(ShellError::Execution(_))));
        assert_eq!(err.lines().count(), 1, "{err}");
        assert!(err.starts_with("cd: missing: "));
    }

    #[test]
    fn quoted_arguments_reach_the_command() {
        let sh = interpreter(Path::new("/"));
        let (_, out, _) = exec(&sh, r#"echo "a  b" c\ d"#);
        assert_eq!(out, "a  b c d\n");
    }

    #[test]
    fn only_redirections_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let sh = interpreter(dir.path());
        let (result, _, _) = exec(&sh, "> out.txt");
        assert!(result.is_ok());
        assert!(dir.path().join("out.txt").exists());
    }

    #[test]
    fn prompt_tracks_login() {
        let sh = interpreter(Path::new("/"));
        assert_eq!(sh.prompt().unwrap(), "$ ");

        exec(&sh, "adduser zoe");
        exec(&sh, "login zoe");
        assert_eq!(sh.prompt().unwrap(), "zoe:$ ");

        exec(&sh, "logout");
        assert_eq!(sh.prompt().unwrap(), "$ ");
    }

    #[test]
    fn interrupt_without_running_command_is_harmless() {
        let sh = interpreter(Path::new("/"));
        sh.interrupt_handle().interrupt();
        let (result, out, _) = exec(&sh, "echo still here");
        assert!(result.is_ok());
        assert_eq!(out, "still here\n");
    }
}
