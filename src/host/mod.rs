//! Plugin host.
//!
//! Wires the registries to the durable store, boots features, reconciles jobs
//! persisted by an earlier run and routes inbound interactions.
//!
//! Boot order:
//!
//! ```text
//!   load stores ─► interaction table + hook ─► features init
//!              ─► reconcile jobs ─► save once ─► scheduler hook
//!              ─► register commands ─► ready
//! ```

pub mod boot;
pub mod commands;
pub mod data;
pub mod events;
pub mod features;
pub mod persistence;
pub mod recovery;
pub mod services;

use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::clock::{system_clock, SharedClock};
use crate::registry::{DispatchOutcome, Interactions};
use crate::scheduler::Scheduler;
use crate::types::{Config, Result};

pub use boot::{reconcile_jobs, ReconcileReport};
pub use commands::{CommandDefinition, CommandHandler, CommandKind, Commands};
pub use data::FeatureData;
pub use events::{Interaction, InteractionKind, Reply, Transport};
pub use features::{Feature, FeatureContext, FeatureFactory, FeatureRegistry, FeatureReport};
pub use persistence::{RegistryState, RegistryStore};
pub use services::{Services, ServicesBuilder};

use features::LoadedFeatures;
use recovery::with_recovery_async;

/// Summary of a completed boot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootReport {
    pub features: FeatureReport,
    pub jobs: ReconcileReport,
    /// Interaction handlers restored from the store (after expiry sweep).
    pub restored_handlers: usize,
    /// Commands the platform refreshed.
    pub registered_commands: usize,
}

/// How the top-level handler resolved an interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleOutcome {
    /// A component event reached its interaction callback.
    Dispatched,
    /// A component event carried an unknown or expired token; the actor was
    /// told so.
    Stale,
    /// A command event reached its handler.
    Command,
    /// A command event named no registered command.
    UnknownCommand,
    /// Neither a component nor a command event.
    Ignored,
    /// Handling failed; the actor got an apology.
    Failed,
}

/// Collects everything [`Host::boot`] needs.
pub struct HostBuilder {
    config: Config,
    clock: SharedClock,
    services: Option<Arc<Services>>,
    features: FeatureRegistry,
    data_defaults: Map<String, Value>,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for HostBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostBuilder")
            .field("config", &self.config)
            .field("features", &self.features)
            .finish()
    }
}

impl HostBuilder {
    pub fn new(config: Config, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            clock: system_clock(),
            services: None,
            features: FeatureRegistry::new(),
            data_defaults: Map::new(),
            transport,
        }
    }

    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn services(mut self, services: Arc<Services>) -> Self {
        self.services = Some(services);
        self
    }

    pub fn features(mut self, features: FeatureRegistry) -> Self {
        self.features = features;
        self
    }

    /// Initial feature data; keys already in the data file take precedence.
    pub fn data_defaults(mut self, defaults: Map<String, Value>) -> Self {
        self.data_defaults = defaults;
        self
    }

    pub async fn boot(self) -> Result<(Host, BootReport)> {
        Host::boot(self).await
    }
}

/// A booted plugin host.
pub struct Host {
    config: Arc<Config>,
    clock: SharedClock,
    interactions: Interactions<Interaction>,
    scheduler: Scheduler,
    commands: Commands,
    services: Arc<Services>,
    store: RegistryStore,
    data: FeatureData,
    transport: Arc<dyn Transport>,
    features: LoadedFeatures,
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("interactions", &self.interactions)
            .field("scheduler", &self.scheduler)
            .field("commands", &self.commands)
            .field("features", &self.features)
            .field("store", &self.store)
            .finish()
    }
}

impl Host {
    pub fn builder(config: Config, transport: Arc<dyn Transport>) -> HostBuilder {
        HostBuilder::new(config, transport)
    }

    async fn boot(builder: HostBuilder) -> Result<(Self, BootReport)> {
        let HostBuilder {
            config,
            clock,
            services,
            features,
            data_defaults,
            transport,
        } = builder;
        let config = Arc::new(config);

        tracing::info!(
            "host_booting: registry_path={}",
            config.storage.registry_path.display()
        );
        let store = RegistryStore::open(config.storage.registry_path.clone())?;
        let persisted = store.snapshot();
        let data = FeatureData::open(config.storage.data_path.clone(), data_defaults)?;
        if !config.channels.is_empty() {
            tracing::info!("named_channels: count={}", config.channels.len());
        }

        let interactions: Interactions<Interaction> = Interactions::with_clock(clock.clone());
        interactions.set_handlers(&persisted.interaction_handlers);
        persistence::persist_interactions(&interactions, &store);
        let restored_handlers = interactions.handlers().len();

        let scheduler = Scheduler::with_clock(clock.clone());
        let commands = Commands::new();
        let services = services.unwrap_or_default();

        let ctx = FeatureContext::new(
            interactions.clone(),
            scheduler.clone(),
            commands.clone(),
            services.clone(),
            data.clone(),
            config.clone(),
        );
        let (loaded, feature_report) = features.init_all(&ctx);

        let jobs = reconcile_jobs(&scheduler, persisted.cron_jobs, clock.now()).await;

        store.sync_all(&interactions, &scheduler)?;
        persistence::persist_jobs(&scheduler, &store);

        let registered_commands = commands.register(transport.as_ref()).await?;

        tracing::info!(
            "host_ready: features={}, handlers={}, jobs={}, commands={}",
            loaded.len(),
            restored_handlers,
            scheduler.handlers().len(),
            commands.len()
        );

        let host = Self {
            config,
            clock,
            interactions,
            scheduler,
            commands,
            services,
            store,
            data,
            transport,
            features: loaded,
        };
        let report = BootReport {
            features: feature_report,
            jobs,
            restored_handlers,
            registered_commands,
        };
        Ok((host, report))
    }

    pub fn interactions(&self) -> &Interactions<Interaction> {
        &self.interactions
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn commands(&self) -> &Commands {
        &self.commands
    }

    pub fn services(&self) -> &Arc<Services> {
        &self.services
    }

    pub fn store(&self) -> &RegistryStore {
        &self.store
    }

    pub fn data(&self) -> &FeatureData {
        &self.data
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Context equivalent to the one features were initialized with.
    pub fn context(&self) -> FeatureContext {
        FeatureContext::new(
            self.interactions.clone(),
            self.scheduler.clone(),
            self.commands.clone(),
            self.services.clone(),
            self.data.clone(),
            self.config.clone(),
        )
    }

    /// Top-level interaction handler. Never fails: errors and panics are
    /// logged and answered with an apology.
    pub async fn handle_interaction(&self, interaction: Interaction) -> HandleOutcome {
        let operation = format!("interaction:{}", interaction.id);
        match with_recovery_async(self.route(interaction.clone()), &operation).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(
                    "interaction_failed: id={}, kind={:?}, error={}",
                    interaction.id,
                    interaction.kind,
                    e
                );
                self.apologize(&interaction).await;
                HandleOutcome::Failed
            }
        }
    }

    async fn route(&self, interaction: Interaction) -> Result<HandleOutcome> {
        let kind = interaction.kind;
        if kind.is_component() {
            let token = interaction.custom_id.clone().unwrap_or_default();
            let outcome = self
                .interactions
                .dispatch_outcome(&token, interaction.clone())
                .await?;
            if let DispatchOutcome::Handled = outcome {
                return Ok(HandleOutcome::Dispatched);
            }

            tracing::info!(
                "interaction_stale: id={}, token={}, outcome={:?}",
                interaction.id,
                token,
                outcome
            );
            interaction
                .reply(Reply::ephemeral(&self.config.interactions.stale_message))
                .await?;
            return Ok(HandleOutcome::Stale);
        }

        if kind.is_command() {
            return Ok(if self.commands.handle(interaction).await? {
                HandleOutcome::Command
            } else {
                HandleOutcome::UnknownCommand
            });
        }

        tracing::debug!("interaction_ignored: id={}, kind={:?}", interaction.id, kind);
        Ok(HandleOutcome::Ignored)
    }

    /// Send the generic apology: edit in place when already deferred,
    /// otherwise reply, falling back to an edit if the reply fails.
    async fn apologize(&self, interaction: &Interaction) {
        if !interaction.kind.is_repliable() {
            return;
        }
        let message = &self.config.interactions.apology_message;

        let result = if interaction.is_deferred() {
            interaction.edit_reply(message).await
        } else {
            match interaction.reply(Reply::ephemeral(message)).await {
                Ok(()) => Ok(()),
                Err(e) => {
                    tracing::warn!(
                        "apology_reply_failed: id={}, error={}, falling back to edit",
                        interaction.id,
                        e
                    );
                    interaction.edit_reply(message).await
                }
            }
        };

        if let Err(e) = result {
            tracing::error!("apology_failed: id={}, error={}", interaction.id, e);
        }
    }

    /// Handle interactions one at a time until the channel closes or
    /// `shutdown` is cancelled.
    pub async fn run(&self, mut events: mpsc::Receiver<Interaction>, shutdown: CancellationToken) {
        tracing::info!("host_event_loop_started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("host_event_loop_cancelled");
                    break;
                }
                event = events.recv() => match event {
                    Some(interaction) => {
                        self.handle_interaction(interaction).await;
                    }
                    None => {
                        tracing::info!("host_event_channel_closed");
                        break;
                    }
                },
            }
        }
    }

    /// Persist the final snapshot and detach the registries from the store.
    ///
    /// Pending jobs stay armed until the host is dropped; they are re-armed
    /// from the saved snapshot on the next boot.
    pub fn shutdown(&self) -> Result<()> {
        self.interactions.clear_on_modified();
        self.scheduler.clear_on_modified();
        self.store.sync_all(&self.interactions, &self.scheduler)?;
        tracing::info!(
            "host_shutdown: registry_path={}",
            self.store.path().display()
        );
        Ok(())
    }
}
