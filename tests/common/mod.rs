//! Shared helpers for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use plugin_host::host::CommandDefinition;
use plugin_host::{Config, Error, Reply, Result, Transport};

/// One call the host made on the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Reply { id: String, reply: Reply },
    Defer { id: String, ephemeral: bool },
    Edit { id: String, content: String },
}

/// Transport that records every call instead of talking to a platform.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Sent>>,
    registered: Mutex<Vec<String>>,
    fail_replies: AtomicBool,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every subsequent `reply` fail.
    pub fn fail_replies(&self) {
        self.fail_replies.store(true, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn registered(&self) -> Vec<String> {
        self.registered.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn reply(&self, interaction_id: &str, reply: Reply) -> Result<()> {
        if self.fail_replies.load(Ordering::SeqCst) {
            return Err(Error::transport("interaction already acknowledged"));
        }
        self.sent.lock().unwrap().push(Sent::Reply {
            id: interaction_id.to_string(),
            reply,
        });
        Ok(())
    }

    async fn defer(&self, interaction_id: &str, ephemeral: bool) -> Result<()> {
        self.sent.lock().unwrap().push(Sent::Defer {
            id: interaction_id.to_string(),
            ephemeral,
        });
        Ok(())
    }

    async fn edit_reply(&self, interaction_id: &str, content: &str) -> Result<()> {
        self.sent.lock().unwrap().push(Sent::Edit {
            id: interaction_id.to_string(),
            content: content.to_string(),
        });
        Ok(())
    }

    async fn register_commands(&self, definitions: &[CommandDefinition]) -> Result<usize> {
        let mut registered = self.registered.lock().unwrap();
        *registered = definitions.iter().map(|d| d.name.clone()).collect();
        Ok(registered.len())
    }
}

/// Config pointing the registry file at `path`, feature data beside it.
pub fn config_with_store(path: &Path) -> Config {
    let mut config = Config::default();
    config.storage.registry_path = path.to_path_buf();
    config.storage.data_path = path.with_file_name("state.json");
    config
}

/// Raw JSON document currently on disk.
pub fn read_registry(path: &Path) -> serde_json::Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}
