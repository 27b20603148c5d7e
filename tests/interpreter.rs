use minishell::builtin::{self, Dependencies};
use minishell::dispatch::Dispatcher;
use minishell::history::{HistoryService, InMemoryHistoryRepository};
use minishell::io_adapters::{MemReader, MemWriter};
use minishell::registry::CommandRegistry;
use minishell::session::{MemorySessionStore, Session, SessionStore};
use minishell::store::SqliteStore;
use minishell::user::UserService;
use minishell::{Interpreter, ShellError, Streams};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

struct Shell {
    interpreter: Interpreter,
    sessions: Arc<dyn SessionStore>,
    exit_codes: Arc<Mutex<Vec<i32>>>,
}

struct Output {
    result: Result<(), ShellError>,
    stdout: String,
    stderr: String,
}

impl Shell {
    fn new(cwd: &Path) -> Self {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let sessions: Arc<dyn SessionStore> =
            Arc::new(MemorySessionStore::with_session(Session::guest(cwd)));
        let history = Arc::new(HistoryService::new(
            store.clone(),
            Arc::new(InMemoryHistoryRepository::new(100)),
        ));
        let exit_codes = Arc::new(Mutex::new(Vec::new()));
        let search_path = std::env::var_os("PATH").unwrap_or_default();

        let registry = Arc::new(CommandRegistry::new());
        let codes = exit_codes.clone();
        builtin::register_defaults(
            &registry,
            Dependencies {
                sessions: sessions.clone(),
                users: Arc::new(UserService::new(store)),
                history: history.clone(),
                search_path: search_path.clone(),
                on_exit: Arc::new(move |code: i32| codes.lock().unwrap().push(code)),
            },
        )
        .unwrap();

        let dispatcher = Dispatcher::new(registry, history, sessions.clone(), search_path);
        Self {
            interpreter: Interpreter::new(dispatcher, sessions.clone()),
            sessions,
            exit_codes,
        }
    }

    fn run(&self, line: &str) -> Output {
        self.run_with_input(line, "")
    }

    fn run_with_input(&self, line: &str, input: &str) -> Output {
        let out = MemWriter::new();
        let err = MemWriter::new();
        let streams = Streams::new(
            Box::new(MemReader::new(input)),
            Box::new(out.clone()),
            Box::new(err.clone()),
        );
        let result = self.interpreter.execute_line(line, streams);
        Output {
            result,
            stdout: out.contents(),
            stderr: err.contents(),
        }
    }

    fn cwd(&self) -> PathBuf {
        self.sessions.get_session().unwrap().working_dir
    }
}

#[test]
fn cd_then_pwd_prints_subdirectory() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("sub")).unwrap();
    let sh = Shell::new(dir.path());

    assert!(sh.run("cd sub").result.is_ok());
    let out = sh.run("pwd");
    assert_eq!(out.stdout, format!("{}\n", dir.path().join("sub").display()));
}

#[test]
fn cd_to_nonexistent_leaves_working_dir() {
    let dir = tempfile::tempdir().unwrap();
    let sh = Shell::new(dir.path());

    let out = sh.run("cd does-not-exist");
    assert!(out.result.is_err());
    assert!(out.stderr.contains("does-not-exist"), "{}", out.stderr);
    assert_eq!(sh.cwd(), dir.path());
}

#[test]
fn output_redirection_writes_file_in_working_dir() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("work")).unwrap();
    let sh = Shell::new(dir.path());

    sh.run("cd work");
    let out = sh.run("echo hello world > greeting.txt");
    assert!(out.result.is_ok());
    assert_eq!(out.stdout, "");

    sh.run("echo again >> greeting.txt");
    assert_eq!(
        fs::read_to_string(dir.path().join("work/greeting.txt")).unwrap(),
        "hello world\nagain\n"
    );

    let out = sh.run("cat < greeting.txt");
    assert_eq!(out.stdout, "hello world\nagain\n");
}

#[test]
fn dispatch_errors_follow_stderr_redirection() {
    let dir = tempfile::tempdir().unwrap();
    let sh = Shell::new(dir.path());

    let out = sh.run("pwd extra 2> errors.txt");
    assert!(matches!(out.result, Err(ShellError::TooManyArguments(_))));
    assert_eq!(out.stderr, "");
    assert_eq!(
        fs::read_to_string(dir.path().join("errors.txt")).unwrap(),
        "error: too many arguments for command 'pwd'\n"
    );
}

#[test]
fn failed_redirection_still_runs_the_command() {
    let dir = tempfile::tempdir().unwrap();
    let sh = Shell::new(dir.path());

    let out = sh.run("echo visible < missing.txt");
    assert!(out.result.is_ok());
    assert_eq!(out.stdout, "visible\n");
    assert!(out.stderr.starts_with("error: missing.txt:"), "{}", out.stderr);
}

#[test]
fn history_counts_repeated_commands() {
    let dir = tempfile::tempdir().unwrap();
    let sh = Shell::new(dir.path());

    sh.run("echo a");
    sh.run("echo a");
    sh.run("pwd --help");
    sh.run("pwd too many");

    // history records itself before it runs
    let out = sh.run("history");
    assert_eq!(
        out.stdout,
        "Command   Count\n---       ---\nhistory   1\necho a    2\n"
    );
}

#[test]
fn history_is_per_user() {
    let dir = tempfile::tempdir().unwrap();
    let sh = Shell::new(dir.path());

    sh.run("echo guest");
    sh.run("adduser alice secret");
    let out = sh.run("login alice wrong");
    assert!(out.result.is_err());
    assert_eq!(out.stderr, "login failed: invalid password\n");

    let out = sh.run("login alice secret");
    assert_eq!(out.stdout, "Logged in as: alice\n");
    assert_eq!(sh.interpreter.prompt().unwrap(), "alice:$ ");

    sh.run("echo mine");
    let out = sh.run("history");
    assert!(out.stdout.contains("echo mine"));
    assert!(!out.stdout.contains("echo guest"));

    sh.run("logout");
    let out = sh.run("history");
    assert!(out.stdout.contains("echo guest"));
    assert!(!out.stdout.contains("echo mine"));
}

#[test]
fn history_clear_and_limit() {
    let dir = tempfile::tempdir().unwrap();
    let sh = Shell::new(dir.path());

    sh.run("echo one");
    sh.run("echo two");
    let out = sh.run("history -n 1");
    assert_eq!(
        out.stdout,
        "Command        Count\n---            ---\nhistory -n 1   1\n"
    );

    let out = sh.run("history clear");
    assert_eq!(out.stdout, "History cleared.\n");
    let out = sh.run("history");
    assert_eq!(out.stdout, "Command   Count\n---       ---\nhistory   1\n");
}

#[test]
fn help_and_type_know_the_builtins() {
    let dir = tempfile::tempdir().unwrap();
    let sh = Shell::new(dir.path());

    let out = sh.run("help");
    let lines: Vec<&str> = out.stdout.lines().collect();
    assert!(lines[0].starts_with("Command"));
    let names: Vec<&str> = lines[2..]
        .iter()
        .map(|l| l.split_whitespace().next().unwrap())
        .collect();
    assert_eq!(
        names,
        vec![
            "adduser", "cat", "cd", "echo", "exit", "help", "history", "login", "logout", "ls",
            "pwd", "type", "users"
        ]
    );

    assert_eq!(sh.run("type cd").stdout, "cd is a shell builtin\n");
    assert_eq!(
        sh.run("cd --help").stdout,
        "cd [dir] - Changes the current working directory"
    );
}

#[test]
fn exit_reports_status_and_calls_hook() {
    let dir = tempfile::tempdir().unwrap();
    let sh = Shell::new(dir.path());

    let out = sh.run("exit 4");
    assert_eq!(out.stdout, "exit status 4\n");

    let out = sh.run("exit later");
    assert!(out.result.is_err());
    assert_eq!(out.stderr, "invalid exit code: later\n");

    assert_eq!(*sh.exit_codes.lock().unwrap(), vec![4]);
}

#[test]
#[cfg(unix)]
fn external_commands_run_in_session_directory() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("data.txt"), "b\na\n").unwrap();
    let sh = Shell::new(dir.path());

    let out = sh.run("sort data.txt");
    assert!(out.result.is_ok(), "{}", out.stderr);
    assert_eq!(out.stdout, "a\nb\n");

    let out = sh.run_with_input("tr a-z A-Z", "shout\n");
    assert_eq!(out.stdout, "SHOUT\n");

    sh.run("sort data.txt > sorted.txt");
    assert_eq!(
        fs::read_to_string(dir.path().join("sorted.txt")).unwrap(),
        "a\nb\n"
    );
}

#[test]
#[cfg(unix)]
fn failing_external_command_is_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let sh = Shell::new(dir.path());

    let out = sh.run("sh -c \"exit 3\"");
    assert!(matches!(out.result, Err(ShellError::Execution(_))));

    let out = sh.run("history");
    assert!(out.stdout.contains("sh -c exit 3"), "{}", out.stdout);
}

#[test]
fn dash_and_help_operands_are_plain_names() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("-notes"), "dashed\n").unwrap();
    fs::create_dir(dir.path().join("help")).unwrap();
    let sh = Shell::new(dir.path());

    let out = sh.run("cat -notes");
    assert!(out.result.is_ok(), "{}", out.stderr);
    assert_eq!(out.stdout, "dashed\n");

    let out = sh.run("cd help");
    assert!(out.result.is_ok(), "{}", out.stderr);
    assert_eq!(out.stdout, "");
    assert_eq!(sh.cwd(), dir.path().join("help"));

    assert_eq!(sh.run("adduser bob -pw").stdout, "User created successfully\n");
    assert_eq!(sh.run("adduser help").stdout, "User created successfully\n");
    assert_eq!(sh.run("login bob -pw").stdout, "Logged in as: bob\n");
}

#[test]
fn history_list_shows_recent_lines() {
    let dir = tempfile::tempdir().unwrap();
    let sh = Shell::new(dir.path());

    sh.run("echo one");
    sh.run("pwd");
    let out = sh.run("history list -n 2");
    assert!(out.result.is_ok(), "{}", out.stderr);
    let lines: Vec<&str> = out.stdout.lines().collect();
    assert_eq!(lines.len(), 4, "{}", out.stdout);
    assert!(lines[2].ends_with("   history list -n 2"), "{}", lines[2]);
    assert!(lines[3].ends_with("   pwd"), "{}", lines[3]);
}
