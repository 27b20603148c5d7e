use anyhow::{Context as _, Result};
use argh::FromArgs;
use minishell::builtin::{self, Dependencies};
use minishell::config::Config;
use minishell::dispatch::Dispatcher;
use minishell::history::{HistoryService, InMemoryHistoryRepository};
use minishell::registry::CommandRegistry;
use minishell::session::{MemorySessionStore, Session, SessionStore};
use minishell::store::SqliteStore;
use minishell::user::UserService;
use minishell::Interpreter;
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "config.toml";

#[derive(FromArgs)]
/// Interactive shell with user accounts and command history.
struct Args {
    #[argh(option)]
    /// path to the configuration file (default: config.toml)
    config: Option<PathBuf>,

    #[argh(switch, short = 'v')]
    /// enable debug logging
    verbose: bool,
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Ok(Config::load(path)?),
        None => {
            let path = Path::new(DEFAULT_CONFIG);
            if path.exists() {
                Ok(Config::load(path)?)
            } else {
                Ok(Config::default())
            }
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn main() -> Result<()> {
    let args: Args = argh::from_env();
    let mut config = load_config(args.config.as_deref())?;
    if args.verbose {
        config.shell.verbose = true;
    }
    init_logging(config.shell.verbose);

    let store = Arc::new(
        SqliteStore::open(&config.database.path)
            .with_context(|| format!("failed to open database {}", config.database.path.display()))?,
    );
    let history = Arc::new(HistoryService::new(
        store.clone(),
        Arc::new(InMemoryHistoryRepository::new(config.shell.history_size)),
    ));
    let users = Arc::new(UserService::new(store));

    let cwd = std::env::current_dir().context("failed to read the working directory")?;
    let sessions: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::with_session(Session::guest(cwd)));
    let search_path = std::env::var_os("PATH").unwrap_or_default();

    let registry = Arc::new(CommandRegistry::new());
    builtin::register_defaults(
        &registry,
        Dependencies {
            sessions: sessions.clone(),
            users,
            history: history.clone(),
            search_path: search_path.clone(),
            on_exit: Arc::new(|code: i32| {
                let _ = io::stdout().flush();
                std::process::exit(code);
            }),
        },
    )?;

    let dispatcher = Dispatcher::new(registry, history, sessions.clone(), search_path);
    let interpreter = Interpreter::new(dispatcher, sessions);

    let interrupt = interpreter.interrupt_handle();
    if let Err(err) = ctrlc::set_handler(move || interrupt.interrupt()) {
        warn!(error = %err, "failed to install interrupt handler");
    }

    info!("shell started");
    if io::stdin().is_terminal() {
        interpreter.repl()
    } else {
        interpreter.run(io::stdin().lock())
    }
}
