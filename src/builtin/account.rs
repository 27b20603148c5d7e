use super::{current_session, parse_operands, report};
use crate::command::{Command, Context};
use crate::session::SessionStore;
use crate::user::UserService;
use anyhow::Result;
use argh::FromArgs;
use std::io::{Read, Write};
use std::sync::Arc;
use tracing::info;

#[derive(FromArgs)]
/// Log in as a registered user.
struct LoginArgs {
    #[argh(positional)]
    /// account name
    username: String,
    #[argh(positional)]
    /// password, required only when the account has one
    password: Option<String>,
}

#[derive(FromArgs)]
/// Register a new user.
struct AddUserArgs {
    #[argh(positional)]
    /// account name
    username: String,
    #[argh(positional)]
    /// password; an account without one logs in freely
    password: Option<String>,
}

pub struct Login {
    users: Arc<UserService>,
    sessions: Arc<dyn SessionStore>,
}

impl Login {
    pub fn new(users: Arc<UserService>, sessions: Arc<dyn SessionStore>) -> Self {
        Self { users, sessions }
    }
}

impl Command for Login {
    fn name(&self) -> &str {
        "login"
    }

    fn max_arguments(&self) -> Option<usize> {
        Some(2)
    }

    fn help(&self) -> &str {
        "login <username> [password] - Login as specified user. Password is optional."
    }

    fn execute(
        &self,
        _ctx: &Context,
        args: &[String],
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
    ) -> Result<()> {
        let LoginArgs { username, password } = parse_operands(self.name(), args, stdout, stderr)?;

        let user = self
            .users
            .login_user(&username, password.as_deref().unwrap_or_default())
            .map_err(|e| report(stderr, "login failed", e))?;

        let mut session = current_session(self.sessions.as_ref(), self.name(), stderr)?;
        session.user = Some(user);
        self.sessions
            .set_session(session)
            .map_err(|e| report(stderr, self.name(), e))?;

        info!(user = %username, "logged in");
        writeln!(stdout, "Logged in as: {username}")?;
        Ok(())
    }
}

pub struct Logout {
    sessions: Arc<dyn SessionStore>,
}

impl Logout {
    pub fn new(sessions: Arc<dyn SessionStore>) -> Self {
        Self { sessions }
    }
}

impl Command for Logout {
    fn name(&self) -> &str {
        "logout"
    }

    fn max_arguments(&self) -> Option<usize> {
        Some(0)
    }

    fn help(&self) -> &str {
        "logout - Logout current user and return to guest"
    }

    fn execute(
        &self,
        _ctx: &Context,
        _args: &[String],
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
    ) -> Result<()> {
        let mut session = current_session(self.sessions.as_ref(), self.name(), stderr)?;
        session.user = None;
        self.sessions
            .set_session(session)
            .map_err(|e| report(stderr, self.name(), e))?;
        writeln!(stdout, "Logged out.")?;
        Ok(())
    }
}

pub struct AddUser {
    users: Arc<UserService>,
}

impl AddUser {
    pub fn new(users: Arc<UserService>) -> Self {
        Self { users }
    }
}

impl Command for AddUser {
    fn name(&self) -> &str {
        "adduser"
    }

    fn max_arguments(&self) -> Option<usize> {
        Some(2)
    }

    fn help(&self) -> &str {
        "adduser <username> [password] - Add a new user. Password is optional."
    }

    fn execute(
        &self,
        _ctx: &Context,
        args: &[String],
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
    ) -> Result<()> {
        let AddUserArgs { username, password } = parse_operands(self.name(), args, stdout, stderr)?;

        self.users
            .create_user(&username, password.as_deref().unwrap_or_default())
            .map_err(|e| report(stderr, "error creating user", e))?;
        writeln!(stdout, "User created successfully")?;
        Ok(())
    }
}

pub struct Users {
    users: Arc<UserService>,
}

impl Users {
    pub fn new(users: Arc<UserService>) -> Self {
        Self { users }
    }
}

impl Command for Users {
    fn name(&self) -> &str {
        "users"
    }

    fn max_arguments(&self) -> Option<usize> {
        Some(0)
    }

    fn help(&self) -> &str {
        "users - List all registered users"
    }

    fn execute(
        &self,
        _ctx: &Context,
        _args: &[String],
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
    ) -> Result<()> {
        let users = self
            .users
            .list_users()
            .map_err(|e| report(stderr, self.name(), e))?;

        writeln!(stdout, "Registered users:")?;
        writeln!(stdout, "----------------")?;
        for user in users {
            let last_login = user
                .last_login
                .map(|t| t.format("%d %b %y %H:%M UTC").to_string())
                .unwrap_or_else(|| "Never".to_string());
            writeln!(stdout, "{:<15} Last login: {last_login}", user.username)?;
        }
        Ok(())
    }
}
