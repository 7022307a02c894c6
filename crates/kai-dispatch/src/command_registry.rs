//! Command name to handler table with per-command policy.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use kai_transport::InboundEvent;

use crate::handler_context::{HandlerContext, HandlerError};

/// Behavior behind one command name.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn run(
        &self,
        ctx: &HandlerContext,
        event: &InboundEvent,
        args: &[String],
    ) -> Result<(), HandlerError>;
}

#[derive(Clone)]
/// Registered command. Immutable once inserted.
pub struct CommandDefinition {
    pub name: String,
    pub description: String,
    pub usage: Option<String>,
    pub requires_owner: bool,
    pub handler: Arc<dyn CommandHandler>,
}

impl fmt::Debug for CommandDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDefinition")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("usage", &self.usage)
            .field("requires_owner", &self.requires_owner)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default)]
/// Case-insensitive command table, built once at startup. Prefix handling
/// belongs to the dispatcher.
pub struct CommandRegistry {
    commands: BTreeMap<String, CommandDefinition>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a command. Registering an existing name replaces it.
    pub fn register(
        &mut self,
        name: &str,
        handler: Arc<dyn CommandHandler>,
        description: &str,
        usage: Option<&str>,
        requires_owner: bool,
    ) {
        let key = normalize_command_name(name);
        if self.commands.contains_key(&key) {
            tracing::debug!(command = %key, "replacing registered command");
        }
        let definition = CommandDefinition {
            name: key.clone(),
            description: description.to_string(),
            usage: usage
                .map(str::trim)
                .filter(|usage| !usage.is_empty())
                .map(str::to_string),
            requires_owner,
            handler,
        };
        self.commands.insert(key, definition);
    }

    pub fn lookup(&self, name: &str) -> Option<&CommandDefinition> {
        self.commands.get(&normalize_command_name(name))
    }

    /// Registered names in lexical order.
    pub fn names(&self) -> Vec<&str> {
        self.commands.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Canonical form of a command name, shared by the registry, the reaction
/// table and command-line parsing.
pub fn normalize_command_name(name: &str) -> String {
    name.trim().to_lowercase()
}
