use crate::command::Command;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("command already exists: {0}")]
    DuplicateCommand(String),
    #[error("command cannot be nil")]
    NilCommand,
    #[error("command not found: {0}")]
    CommandNotFound(String),
    #[error("no commands registered")]
    NoCommandsRegistered,
}

/// Name to implementation mapping of the built-in commands.
///
/// Filled once at startup and read on every dispatch.
#[derive(Default)]
pub struct CommandRegistry {
    commands: RwLock<HashMap<String, Arc<dyn Command>>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `cmd` under its own name. A command without a name counts as
    /// absent.
    pub fn register(&self, cmd: Arc<dyn Command>) -> Result<(), RegistryError> {
        let name = cmd.name().to_string();
        if name.is_empty() {
            return Err(RegistryError::NilCommand);
        }

        let mut commands = self.commands.write().unwrap_or_else(|e| e.into_inner());
        if commands.contains_key(&name) {
            return Err(RegistryError::DuplicateCommand(name));
        }
        debug!(command = %name, "registered builtin");
        commands.insert(name, cmd);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Command>, RegistryError> {
        let commands = self.commands.read().unwrap_or_else(|e| e.into_inner());
        commands
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::CommandNotFound(name.to_string()))
    }

    /// All registered commands in no particular order; callers sort.
    pub fn list(&self) -> Result<Vec<Arc<dyn Command>>, RegistryError> {
        let commands = self.commands.read().unwrap_or_else(|e| e.into_inner());
        if commands.is_empty() {
            return Err(RegistryError::NoCommandsRegistered);
        }
        Ok(commands.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Context;
    use std::io::{Read, Write};

    struct Named(&'static str);

    impl Command for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn max_arguments(&self) -> Option<usize> {
            Some(0)
        }

        fn help(&self) -> &str {
            "test command"
        }

        fn execute(
            &self,
            _ctx: &Context,
            _args: &[String],
            _stdin: &mut dyn Read,
            _stdout: &mut dyn Write,
            _stderr: &mut dyn Write,
        ) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn register_and_get() {
        let registry = CommandRegistry::new();
        registry.register(Arc::new(Named("pwd"))).unwrap();
        assert_eq!(registry.get("pwd").unwrap().name(), "pwd");
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let registry = CommandRegistry::new();
        registry.register(Arc::new(Named("pwd"))).unwrap();
        assert_eq!(
            registry.register(Arc::new(Named("pwd"))).unwrap_err(),
            RegistryError::DuplicateCommand("pwd".to_string())
        );
    }

    #[test]
    fn nameless_command_is_rejected() {
        let registry = CommandRegistry::new();
        assert_eq!(
            registry.register(Arc::new(Named(""))).unwrap_err(),
            RegistryError::NilCommand
        );
    }

    #[test]
    fn unknown_name_is_not_found() {
        let registry = CommandRegistry::new();
        assert_eq!(
            registry.get("nope").err(),
            Some(RegistryError::CommandNotFound("nope".to_string()))
        );
    }

    #[test]
    fn list_requires_commands() {
        let registry = CommandRegistry::new();
        assert_eq!(registry.list().err(), Some(RegistryError::NoCommandsRegistered));

        registry.register(Arc::new(Named("b"))).unwrap();
        registry.register(Arc::new(Named("a"))).unwrap();
        let mut names: Vec<_> = registry
            .list()
            .unwrap()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["a", "b"]);
    }
}
