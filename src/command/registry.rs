//! Command lookup table.
//!
//! # Design Decisions
//! - Populated once at startup, then shared read-only (no locks)
//! - Last registration for a name wins
//! - Explicit object instead of a global so tests can run independent servers

use std::collections::HashMap;
use std::sync::Arc;

use crate::command::{Command, FetchCommand};
use crate::config::FetchConfig;

/// Maps command names to handlers.
#[derive(Default, Clone)]
pub struct CommandRegistry {
    commands: HashMap<String, Arc<dyn Command>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in command.
    pub fn with_builtins(fetch: &FetchConfig) -> Self {
        let mut registry = Self::new();
        registry.register("fetch", FetchCommand::new(fetch.chunk_size));
        registry
    }

    /// Bind `handler` to `name`, replacing any previous handler.
    pub fn register(&mut self, name: impl Into<String>, handler: impl Command + 'static) {
        let name = name.into();
        if self.commands.insert(name.clone(), Arc::new(handler)).is_some() {
            tracing::warn!(command = %name, "Replacing previously registered command");
        } else {
            tracing::debug!(command = %name, "Command registered");
        }
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<dyn Command>> {
        self.commands.get(name).cloned()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.commands.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl std::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("commands", &self.names())
            .finish()
    }
}
