use crate::command::{Command, Context};
use anyhow::Result;
use regex::{Captures, Regex};
use std::io::{BufRead, BufReader, Read, Write};
use std::sync::OnceLock;

/// `$` followed by a possibly empty variable name.
fn variable_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$([A-Za-z0-9_]*)").expect("variable pattern is valid"))
}

type Lookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// `echo [args...]`: prints its arguments separated by spaces.
///
/// `$NAME` is replaced by the environment variable (empty when unset, and a
/// `$` without a name expands to nothing).
/// An argument wrapped in single quotes is printed verbatim without the
/// quotes. Without arguments, stdin is copied line by line.
pub struct Echo {
    lookup: Lookup,
}

impl Echo {
    pub fn new() -> Self {
        Self::with_lookup(|name| std::env::var(name).ok())
    }

    pub fn with_lookup(lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        Self {
            lookup: Box::new(lookup),
        }
    }

    fn expand(&self, arg: &str) -> String {
        if let Some(quoted) = single_quoted(arg) {
            return quoted.to_string();
        }
        variable_pattern().replace_all(arg, |caps: &Captures| (self.lookup)(&caps[1]).unwrap_or_default())
            .into_owned()
    }
}

impl Default for Echo {
    fn default() -> Self {
        Self::new()
    }
}

fn single_quoted(arg: &str) -> Option<&str> {
    (arg.len() >= 2 && arg.starts_with('\'') && arg.ends_with('\'')).then(|| &arg[1..arg.len() - 1])
}

impl Command for Echo {
    fn name(&self) -> &str {
        "echo"
    }

    fn max_arguments(&self) -> Option<usize> {
        None
    }

    fn help(&self) -> &str {
        "echo [args...] - Prints the provided arguments to the output, supports environment variables and multiple expressions"
    }

    fn execute(
        &self,
        _ctx: &Context,
        args: &[String],
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        _stderr: &mut dyn Write,
    ) -> Result<()> {
        if args.is_empty() {
            for line in BufReader::new(stdin).lines() {
                writeln!(stdout, "{}", line?)?;
            }
            return Ok(());
        }

        let words: Vec<String> = args.iter().map(|arg| self.expand(arg)).collect();
        writeln!(stdout, "{}", words.join(" "))?;
        Ok(())
    }
}
