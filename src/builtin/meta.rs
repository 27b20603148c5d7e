use super::{current_session, parse_args, report, write_table};
use crate::command::{Command, Context};
use crate::error::ShellError;
use crate::external::find_command_path;
use crate::history::HistoryService;
use crate::registry::CommandRegistry;
use crate::session::SessionStore;
use anyhow::{Result, anyhow, bail};
use argh::FromArgs;
use std::ffi::OsString;
use std::io::{Read, Write};
use std::sync::{Arc, Weak};
use tracing::info;

/// Called by `exit` with the requested status code.
pub type ExitHook = Arc<dyn Fn(i32) + Send + Sync>;

fn registry_of(registry: &Weak<CommandRegistry>) -> Result<Arc<CommandRegistry>> {
    registry
        .upgrade()
        .ok_or_else(|| anyhow!("command registry is gone"))
}

pub struct Help {
    registry: Weak<CommandRegistry>,
}

impl Help {
    pub fn new(registry: Weak<CommandRegistry>) -> Self {
        Self { registry }
    }
}

impl Command for Help {
    fn name(&self) -> &str {
        "help"
    }

    fn max_arguments(&self) -> Option<usize> {
        Some(0)
    }

    fn help(&self) -> &str {
        "help - Displays available commands and their usage in a formatted table."
    }

    fn execute(
        &self,
        _ctx: &Context,
        _args: &[String],
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
    ) -> Result<()> {
        let mut commands = registry_of(&self.registry)
            .and_then(|r| Ok(r.list()?))
            .map_err(|e| report(stderr, "error listing commands", e))?;
        commands.sort_by(|a, b| a.name().cmp(b.name()));

        let rows = commands
            .iter()
            .map(|c| (c.name().to_string(), c.help().to_string()));
        write_table(stdout, ("Command", "Description"), rows)?;
        Ok(())
    }
}

pub struct Type {
    registry: Weak<CommandRegistry>,
    sessions: Arc<dyn SessionStore>,
    search_path: OsString,
}

impl Type {
    pub fn new(registry: Weak<CommandRegistry>, sessions: Arc<dyn SessionStore>, search_path: OsString) -> Self {
        Self {
            registry,
            sessions,
            search_path,
        }
    }
}

impl Command for Type {
    fn name(&self) -> &str {
        "type"
    }

    fn max_arguments(&self) -> Option<usize> {
        Some(1)
    }

    fn help(&self) -> &str {
        "type <command> - Identifies if the command is a shell builtin or an external executable"
    }

    fn execute(
        &self,
        _ctx: &Context,
        args: &[String],
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
    ) -> Result<()> {
        let Some(name) = args.first() else {
            writeln!(stderr, "usage: type <command>")?;
            bail!("type: missing command name");
        };

        let registry = registry_of(&self.registry).map_err(|e| report(stderr, self.name(), e))?;
        if registry.get(name).is_ok() {
            writeln!(stdout, "{name} is a shell builtin")?;
            return Ok(());
        }

        let session = current_session(self.sessions.as_ref(), self.name(), stderr)?;
        match find_command_path(&self.search_path, name, &session.working_dir) {
            Some(path) => {
                writeln!(stdout, "{name} is {}", path.display())?;
                Ok(())
            }
            None => {
                let err = ShellError::CommandNotFound(name.clone());
                writeln!(stderr, "{err}")?;
                Err(err.into())
            }
        }
    }
}

#[derive(FromArgs)]
/// Show per-command usage counts for the current user.
struct HistoryArgs {
    #[argh(positional)]
    /// either `clear` to delete the recorded history or `list` to show recent lines
    action: Option<String>,
    #[argh(option, short = 'n')]
    /// show at most this many entries
    limit: Option<usize>,
}

pub struct History {
    history: Arc<HistoryService>,
    sessions: Arc<dyn SessionStore>,
}

impl History {
    pub fn new(history: Arc<HistoryService>, sessions: Arc<dyn SessionStore>) -> Self {
        Self { history, sessions }
    }
}

impl Command for History {
    fn name(&self) -> &str {
        "history"
    }

    fn max_arguments(&self) -> Option<usize> {
        Some(3)
    }

    fn help(&self) -> &str {
        "history [clear|list] [-n <limit>] - Show command history, clear history, list recent commands, or limit results"
    }

    fn execute(
        &self,
        _ctx: &Context,
        args: &[String],
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
    ) -> Result<()> {
        let Some(HistoryArgs { action, limit }) = parse_args(self.name(), args, stdout, stderr)? else {
            return Ok(());
        };
        let actor = current_session(self.sessions.as_ref(), self.name(), stderr)?.actor_id();

        match action.as_deref() {
            Some("clear") => {
                self.history
                    .clear_command_history(actor)
                    .map_err(|e| report(stderr, "error clearing history", e))?;
                info!(?actor, "history cleared");
                writeln!(stdout, "History cleared.")?;
                return Ok(());
            }
            Some("list") => {
                let records = self
                    .history
                    .recent_commands(actor, limit.unwrap_or(0))
                    .map_err(|e| report(stderr, "error retrieving history", e))?;
                let rows = records.into_iter().map(|r| {
                    (
                        r.created_at.format("%d %b %y %H:%M:%S UTC").to_string(),
                        r.command,
                    )
                });
                write_table(stdout, ("Time", "Command"), rows)?;
                return Ok(());
            }
            Some(other) => {
                return Err(report(stderr, self.name(), anyhow!("unknown action '{other}'")));
            }
            None => {}
        }

        let stats = self
            .history
            .command_history_stats(actor, limit.unwrap_or(0))
            .map_err(|e| report(stderr, "error retrieving history", e))?;
        let rows = stats.into_iter().map(|s| (s.command, s.count.to_string()));
        write_table(stdout, ("Command", "Count"), rows)?;
        Ok(())
    }
}

/// `exit [code]`: prints `exit status N` and hands the code to the exit hook.
pub struct Exit {
    on_exit: ExitHook,
}

impl Exit {
    pub fn new(on_exit: ExitHook) -> Self {
        Self { on_exit }
    }
}

impl Command for Exit {
    fn name(&self) -> &str {
        "exit"
    }

    fn max_arguments(&self) -> Option<usize> {
        Some(1)
    }

    fn help(&self) -> &str {
        "exit [code] - Exit the shell with optional exit code"
    }

    fn execute(
        &self,
        _ctx: &Context,
        args: &[String],
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
    ) -> Result<()> {
        let code = match args.first() {
            None => 0,
            Some(raw) => match raw.parse::<i32>() {
                Ok(code) => code,
                Err(_) => {
                    let err = ShellError::InvalidExitCode(raw.clone());
                    writeln!(stderr, "{err}")?;
                    return Err(err.into());
                }
            },
        };

        writeln!(stdout, "exit status {code}")?;
        stdout.flush()?;
        (self.on_exit)(code);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::testing::run;
    use crate::history::InMemoryHistoryRepository;
    use crate::session::{MemorySessionStore, Session};
    use crate::store::SqliteStore;
    use std::sync::Mutex;

    fn sessions() -> Arc<MemorySessionStore> {
        Arc::new(MemorySessionStore::with_session(Session::guest("/")))
    }

    fn registry_with(cmds: Vec<Arc<dyn Command>>) -> Arc<CommandRegistry> {
        let registry = Arc::new(CommandRegistry::new());
        for cmd in cmds {
            registry.register(cmd).unwrap();
        }
        registry
    }

    #[test]
    fn help_lists_commands_sorted() {
        let registry = registry_with(vec![]);
        registry
            .register(Arc::new(Help::new(Arc::downgrade(&registry))))
            .unwrap();
        registry
            .register(Arc::new(Exit::new(Arc::new(|_: i32| {}))))
            .unwrap();

        let out = run(registry.get("help").unwrap().as_ref(), &[]);
        assert!(out.result.is_ok());
        assert_eq!(
            out.stdout,
            "Command   Description\n\
             ---       ---\n\
             exit      exit [code] - Exit the shell with optional exit code\n\
             help      help - Displays available commands and their usage in a formatted table.\n"
        );
    }

    #[test]
    fn type_distinguishes_builtins_and_executables() {
        let exit: Arc<dyn Command> = Arc::new(Exit::new(Arc::new(|_: i32| {})));
        let registry = registry_with(vec![exit]);
        let search = std::env::var_os("PATH").unwrap_or_default();
        let ty = Type::new(Arc::downgrade(&registry), sessions(), search);

        let out = run(&ty, &["exit"]);
        assert_eq!(out.stdout, "exit is a shell builtin\n");

        let out = run(&ty, &["no-such-program-xyz"]);
        assert!(out.result.is_err());
        assert_eq!(out.stderr, "command not found: no-such-program-xyz\n");
    }

    #[test]
    #[cfg(unix)]
    fn type_prints_executable_path() {
        let registry = registry_with(vec![]);
        let ty = Type::new(Arc::downgrade(&registry), sessions(), OsString::from("/bin"));

        let out = run(&ty, &["sh"]);
        assert_eq!(out.stdout, "sh is /bin/sh\n");
    }

    fn history_command() -> (History, Arc<HistoryService>) {
        let service = Arc::new(HistoryService::new(
            Arc::new(SqliteStore::open_in_memory().unwrap()),
            Arc::new(InMemoryHistoryRepository::new(0)),
        ));
        (History::new(service.clone(), sessions()), service)
    }

    #[test]
    fn history_shows_counts() {
        let (history, service) = history_command();
        for line in ["echo a", "pwd", "echo a"] {
            service.save_command_history(None, line).unwrap();
        }

        let out = run(&history, &[]);
        assert_eq!(
            out.stdout,
            "Command   Count\n---       ---\necho a    2\npwd       1\n"
        );

        let out = run(&history, &["-n", "1"]);
        assert_eq!(out.stdout, "Command   Count\n---       ---\necho a    2\n");
    }

    #[test]
    fn history_clear_empties_the_log() {
        let (history, service) = history_command();
        service.save_command_history(None, "pwd").unwrap();

        let out = run(&history, &["clear"]);
        assert_eq!(out.stdout, "History cleared.\n");
        assert!(service.command_history_stats(None, 0).unwrap().is_empty());
    }

    #[test]
    fn history_list_shows_newest_first() {
        let (history, service) = history_command();
        for line in ["echo a", "pwd", "echo a"] {
            service.save_command_history(None, line).unwrap();
        }

        let out = run(&history, &["list", "-n", "2"]);
        assert!(out.result.is_ok(), "{}", out.stderr);
        let lines: Vec<&str> = out.stdout.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("Time"));
        assert!(lines[2].ends_with("   echo a"), "{}", lines[2]);
        assert!(lines[3].ends_with("   pwd"), "{}", lines[3]);
    }

    #[test]
    fn history_rejects_bad_input() {
        let (history, _) = history_command();
        assert!(run(&history, &["bogus"]).result.is_err());
        assert!(run(&history, &["-n", "many"]).result.is_err());
    }

    #[test]
    fn exit_passes_code_to_hook() {
        let seen = Arc::new(Mutex::new(None));
        let hook: ExitHook = {
            let seen = seen.clone();
            Arc::new(move |code| *seen.lock().unwrap() = Some(code))
        };
        let exit = Exit::new(hook);

        let out = run(&exit, &["3"]);
        assert!(out.result.is_ok());
        assert_eq!(out.stdout, "exit status 3\n");
        assert_eq!(*seen.lock().unwrap(), Some(3));

        run(&exit, &[]);
        assert_eq!(*seen.lock().unwrap(), Some(0));
    }

    #[test]
    fn exit_rejects_non_numeric_code() {
        let seen = Arc::new(Mutex::new(None::<i32>));
        let hook: ExitHook = {
            let seen = seen.clone();
            Arc::new(move |code| *seen.lock().unwrap() = Some(code))
        };

        let out = run(&Exit::new(hook), &["soon"]);
        let err = out.result.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ShellError>(),
            Some(ShellError::InvalidExitCode(code)) if code == "soon"
        ));
        assert_eq!(out.stderr, "invalid exit code: soon\n");
        assert!(seen.lock().unwrap().is_none());
    }
}
