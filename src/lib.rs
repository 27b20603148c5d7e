//! A small interactive shell with user accounts and per-user command history.
//!
//! A line goes through the [`lexer`], then [`redirect`] rebinds the standard
//! streams, and the [`dispatch`] engine runs either a builtin from the
//! [`registry`] or an external program. Sessions, users and history live
//! behind the [`session`], [`user`] and [`history`] modules, with
//! [`store::SqliteStore`] as the persistent backend.
//!
//! The main entry point is [`Interpreter`].

pub mod builtin;
pub mod command;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod external;
pub mod history;
pub mod io_adapters;
pub mod lexer;
pub mod redirect;
pub mod registry;
pub mod session;
pub mod store;
pub mod user;
mod interpreter;

pub use command::{Command, Context, Streams};
pub use error::ShellError;
pub use interpreter::{InterruptHandle, Interpreter};
