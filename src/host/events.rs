//! Inbound interaction events and the transport they reply through.
//!
//! The chat client itself is external: it implements [`Transport`] and turns
//! every platform event into an [`Interaction`] handed to the host.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use super::commands::CommandDefinition;
use crate::types::Result;

// =============================================================================
// Transport
// =============================================================================

/// Outbound half of the chat platform client.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send the initial response to an interaction.
    async fn reply(&self, interaction_id: &str, reply: Reply) -> Result<()>;

    /// Acknowledge an interaction now and respond later via `edit_reply`.
    async fn defer(&self, interaction_id: &str, ephemeral: bool) -> Result<()>;

    /// Replace the content of an acknowledged interaction's response.
    async fn edit_reply(&self, interaction_id: &str, content: &str) -> Result<()>;

    /// Publish command definitions. Returns how many the platform refreshed.
    async fn register_commands(&self, definitions: &[CommandDefinition]) -> Result<usize>;
}

/// Response content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub content: String,
    /// Visible only to the actor who triggered the interaction.
    #[serde(default)]
    pub ephemeral: bool,
}

impl Reply {
    pub fn public(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ephemeral: false,
        }
    }

    pub fn ephemeral(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ephemeral: true,
        }
    }
}

// =============================================================================
// Interaction
// =============================================================================

/// Kind of inbound interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    Button,
    ModalSubmit,
    SlashCommand,
    ContextMenu,
    /// Anything else the platform delivers (autocomplete, pings).
    Other,
}

impl InteractionKind {
    /// Component events carry a handler token in their custom id.
    pub fn is_component(&self) -> bool {
        matches!(self, InteractionKind::Button | InteractionKind::ModalSubmit)
    }

    pub fn is_command(&self) -> bool {
        matches!(
            self,
            InteractionKind::SlashCommand | InteractionKind::ContextMenu
        )
    }

    pub fn is_repliable(&self) -> bool {
        self.is_component() || self.is_command()
    }
}

const ACK_NONE: u8 = 0;
const ACK_DEFERRED: u8 = 1;
const ACK_REPLIED: u8 = 2;

/// One inbound interaction event.
///
/// Clones share the acknowledgement state, so a callback that defers is seen
/// as deferred by the top-level handler.
#[derive(Clone)]
pub struct Interaction {
    pub id: String,
    pub kind: InteractionKind,
    /// Handler token for component events.
    pub custom_id: Option<String>,
    /// Command name for command events.
    pub command_name: Option<String>,
    pub author_id: String,
    pub author_roles: Vec<String>,
    /// Platform payload (modal fields, command options, target message).
    pub data: Value,
    transport: Arc<dyn Transport>,
    acknowledged: Arc<AtomicU8>,
}

impl fmt::Debug for Interaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interaction")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("custom_id", &self.custom_id)
            .field("command_name", &self.command_name)
            .field("author_id", &self.author_id)
            .field("acknowledged", &self.acknowledged.load(Ordering::SeqCst))
            .finish()
    }
}

impl Interaction {
    pub fn new(id: impl Into<String>, kind: InteractionKind, transport: Arc<dyn Transport>) -> Self {
        Self {
            id: id.into(),
            kind,
            custom_id: None,
            command_name: None,
            author_id: String::new(),
            author_roles: Vec::new(),
            data: Value::Null,
            transport,
            acknowledged: Arc::new(AtomicU8::new(ACK_NONE)),
        }
    }

    /// Button click carrying `token` as its custom id.
    pub fn button(
        id: impl Into<String>,
        token: impl Into<String>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self::new(id, InteractionKind::Button, transport).with_custom_id(token)
    }

    /// Modal submission carrying `token` as its custom id.
    pub fn modal_submit(
        id: impl Into<String>,
        token: impl Into<String>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self::new(id, InteractionKind::ModalSubmit, transport).with_custom_id(token)
    }

    pub fn slash_command(
        id: impl Into<String>,
        name: impl Into<String>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self::new(id, InteractionKind::SlashCommand, transport).with_command_name(name)
    }

    pub fn context_menu(
        id: impl Into<String>,
        name: impl Into<String>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self::new(id, InteractionKind::ContextMenu, transport).with_command_name(name)
    }

    pub fn with_custom_id(mut self, custom_id: impl Into<String>) -> Self {
        self.custom_id = Some(custom_id.into());
        self
    }

    pub fn with_command_name(mut self, name: impl Into<String>) -> Self {
        self.command_name = Some(name.into());
        self
    }

    pub fn with_author(mut self, author_id: impl Into<String>, roles: Vec<String>) -> Self {
        self.author_id = author_id.into();
        self.author_roles = roles;
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    /// True if the author holds the role with `role_id`.
    pub fn author_has_role(&self, role_id: &str) -> bool {
        self.author_roles.iter().any(|role| role == role_id)
    }

    pub async fn reply(&self, reply: Reply) -> Result<()> {
        self.transport.reply(&self.id, reply).await?;
        self.acknowledged.store(ACK_REPLIED, Ordering::SeqCst);
        Ok(())
    }

    pub async fn defer(&self, ephemeral: bool) -> Result<()> {
        self.transport.defer(&self.id, ephemeral).await?;
        self.acknowledged.store(ACK_DEFERRED, Ordering::SeqCst);
        Ok(())
    }

    pub async fn edit_reply(&self, content: &str) -> Result<()> {
        self.transport.edit_reply(&self.id, content).await
    }

    pub fn is_deferred(&self) -> bool {
        self.acknowledged.load(Ordering::SeqCst) == ACK_DEFERRED
    }

    pub fn is_replied(&self) -> bool {
        self.acknowledged.load(Ordering::SeqCst) == ACK_REPLIED
    }

    /// Deferred or replied.
    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged.load(Ordering::SeqCst) != ACK_NONE
    }
}
