//! Command table.
//!
//! Slash commands and context-menu commands share one name-keyed table. The
//! definitions are published to the platform once at boot; inbound command
//! interactions are routed to the handler registered under their name.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::events::{Interaction, Transport};
use crate::types::{CallbackResult, Error, Result};
use crate::validation::validate_name;

/// Platform command type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    ChatInput,
    User,
    Message,
}

/// Definition published to the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub kind: CommandKind,
    /// Platform-specific options, passed through untouched.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub options: Value,
}

impl CommandDefinition {
    pub fn slash(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            kind: CommandKind::ChatInput,
            options: Value::Null,
        }
    }

    pub fn message_menu(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            kind: CommandKind::Message,
            options: Value::Null,
        }
    }

    pub fn user_menu(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            kind: CommandKind::User,
            options: Value::Null,
        }
    }

    pub fn with_options(mut self, options: Value) -> Self {
        self.options = options;
        self
    }
}

/// Handler for a command interaction.
pub type CommandHandler = dyn Fn(Interaction) -> BoxFuture<'static, CallbackResult> + Send + Sync;

struct CommandEntry {
    definition: CommandDefinition,
    handler: Arc<CommandHandler>,
}

/// Name-keyed command table. Cheap to clone; clones share the table.
#[derive(Clone, Default)]
pub struct Commands {
    entries: Arc<Mutex<BTreeMap<String, CommandEntry>>>,
}

impl fmt::Debug for Commands {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Commands")
            .field("names", &self.names())
            .finish()
    }
}

impl Commands {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, CommandEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a slash command. A later registration under the same name
    /// replaces the earlier one.
    pub fn create<F, Fut>(&self, definition: CommandDefinition, handler: F) -> Result<()>
    where
        F: Fn(Interaction) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CallbackResult> + Send + 'static,
    {
        if definition.kind != CommandKind::ChatInput {
            return Err(Error::validation(format!(
                "slash command '{}' must be of kind chat_input",
                definition.name
            )));
        }
        self.insert(definition, handler)
    }

    /// Register a user or message context-menu command.
    pub fn create_in_context_menu<F, Fut>(
        &self,
        definition: CommandDefinition,
        handler: F,
    ) -> Result<()>
    where
        F: Fn(Interaction) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CallbackResult> + Send + 'static,
    {
        if definition.kind == CommandKind::ChatInput {
            return Err(Error::validation(format!(
                "context-menu command '{}' cannot be of kind chat_input",
                definition.name
            )));
        }
        self.insert(definition, handler)
    }

    fn insert<F, Fut>(&self, definition: CommandDefinition, handler: F) -> Result<()>
    where
        F: Fn(Interaction) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CallbackResult> + Send + 'static,
    {
        validate_name(&definition.name, "command name")?;

        let name = definition.name.clone();
        let handler: Arc<CommandHandler> =
            Arc::new(move |interaction: Interaction| -> BoxFuture<'static, CallbackResult> {
                Box::pin(handler(interaction))
            });

        tracing::debug!("command_created: name={}, kind={:?}", name, definition.kind);
        self.lock().insert(
            name,
            CommandEntry {
                definition,
                handler,
            },
        );
        Ok(())
    }

    /// Definitions of every registered command, ordered by name.
    pub fn definitions(&self) -> Vec<CommandDefinition> {
        self.lock()
            .values()
            .map(|entry| entry.definition.clone())
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Publish every definition through `transport`.
    pub async fn register(&self, transport: &dyn Transport) -> Result<usize> {
        let definitions = self.definitions();
        tracing::info!("commands_registering: count={}", definitions.len());
        let refreshed = transport.register_commands(&definitions).await?;
        tracing::info!("commands_registered: refreshed={}", refreshed);
        Ok(refreshed)
    }

    /// Route a command interaction to its handler.
    ///
    /// Returns `Ok(false)` for an interaction without a known command name.
    pub async fn handle(&self, interaction: Interaction) -> Result<bool> {
        let Some(name) = interaction.command_name.clone() else {
            return Ok(false);
        };
        let handler = self.lock().get(&name).map(|entry| entry.handler.clone());
        let Some(handler) = handler else {
            tracing::warn!("command_unknown: name={}", name);
            return Ok(false);
        };

        tracing::debug!("command_executing: name={}", name);
        handler(interaction)
            .await
            .map_err(|e| Error::callback(name, e))?;
        Ok(true)
    }
}
