//! Feature registration and initialization.
//!
//! Features are listed explicitly: each entry pairs a name with a factory
//! closure that captures whatever the feature's constructor needs. At boot the
//! disabled names are skipped, every other entry is built and `init`-ed once,
//! and a failing or panicking entry is logged without affecting the others.

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use super::commands::Commands;
use super::data::FeatureData;
use super::events::Interaction;
use super::recovery::with_recovery;
use super::services::Services;
use crate::registry::Interactions;
use crate::scheduler::Scheduler;
use crate::types::{Config, Error, HandlerToken, Result};
use crate::validation::validate_name;

/// A unit of application behavior plugged into the host.
///
/// `init` registers callbacks and commands; it runs once, before jobs
/// persisted by an earlier run are reconciled.
pub trait Feature: Send + Sync {
    fn init(&mut self, ctx: &FeatureContext) -> Result<()>;
}

/// Builds one feature instance.
pub type FeatureFactory = Box<dyn FnOnce() -> Box<dyn Feature> + Send>;

/// Everything a feature can reach during and after `init`.
#[derive(Clone)]
pub struct FeatureContext {
    interactions: Interactions<Interaction>,
    scheduler: Scheduler,
    commands: Commands,
    services: Arc<Services>,
    data: FeatureData,
    config: Arc<Config>,
    disabled: Arc<BTreeSet<String>>,
}

impl fmt::Debug for FeatureContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureContext")
            .field("commands", &self.commands)
            .field("services", &self.services)
            .field("data", &self.data)
            .field("disabled", &self.disabled)
            .finish()
    }
}

impl FeatureContext {
    pub fn new(
        interactions: Interactions<Interaction>,
        scheduler: Scheduler,
        commands: Commands,
        services: Arc<Services>,
        data: FeatureData,
        config: Arc<Config>,
    ) -> Self {
        let disabled = config.features.disabled.iter().cloned().collect();
        Self {
            interactions,
            scheduler,
            commands,
            services,
            data,
            config,
            disabled: Arc::new(disabled),
        }
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

    /// Application data shared by every feature.
    pub fn data(&self) -> &FeatureData {
        &self.data
    }

    /// Platform channel id configured under `name`.
    pub fn channel(&self, name: &str) -> Option<&str> {
        self.config.channels.get(name).map(String::as_str)
    }

    pub fn channels(&self) -> &BTreeMap<String, String> {
        &self.config.channels
    }

    /// Opaque configuration shared by every feature.
    pub fn shared_config(&self) -> &Value {
        &self.config.shared
    }

    pub fn feature_disabled(&self, name: &str) -> bool {
        self.disabled.contains(name)
    }

    /// Create an interaction handler, falling back to the configured default
    /// time-to-live when `time_to_live` is `None`.
    pub fn create_handler(
        &self,
        intent_type: &str,
        arg: Value,
        time_to_live: Option<u64>,
    ) -> HandlerToken {
        let time_to_live = time_to_live.or_else(|| {
            self.config
                .interactions
                .default_time_to_live
                .map(|ttl| ttl.as_secs())
        });
        self.interactions.create_handler(intent_type, arg, time_to_live)
    }
}

/// Outcome of initializing the registered features.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureReport {
    pub initialized: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<(String, String)>,
}

/// Features that initialized successfully, kept alive for the host's lifetime.
pub struct LoadedFeatures {
    features: Vec<(String, Box<dyn Feature>)>,
}

impl fmt::Debug for LoadedFeatures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.features.iter().map(|(name, _)| name))
            .finish()
    }
}

impl LoadedFeatures {
    pub fn names(&self) -> Vec<&str> {
        self.features.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// Ordered feature registration list.
#[derive(Default)]
pub struct FeatureRegistry {
    entries: Vec<(String, FeatureFactory)>,
}

impl fmt::Debug for FeatureRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(name, _)| name))
            .finish()
    }
}

impl FeatureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a feature. Names are unique.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> Result<()>
    where
        F: FnOnce() -> Box<dyn Feature> + Send + 'static,
    {
        let name = name.into();
        validate_name(&name, "feature name")?;
        if self.entries.iter().any(|(existing, _)| existing == &name) {
            return Err(Error::validation(format!(
                "feature '{}' registered twice",
                name
            )));
        }
        self.entries.push((name, Box::new(factory)));
        Ok(())
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Build and initialize every enabled feature, in registration order.
    pub fn init_all(self, ctx: &FeatureContext) -> (LoadedFeatures, FeatureReport) {
        let mut loaded = Vec::new();
        let mut report = FeatureReport::default();

        for (name, factory) in self.entries {
            if ctx.feature_disabled(&name) {
                tracing::info!("feature_skipped: name={}, reason=disabled", name);
                report.skipped.push(name);
                continue;
            }

            tracing::info!("feature_initializing: name={}", name);
            let operation = format!("feature_init:{}", name);
            let result = with_recovery(
                || {
                    let mut feature = factory();
                    feature.init(ctx)?;
                    Ok(feature)
                },
                &operation,
            );

            match result {
                Ok(feature) => {
                    tracing::info!("feature_initialized: name={}", name);
                    report.initialized.push(name.clone());
                    loaded.push((name, feature));
                }
                Err(e) => {
                    tracing::error!("feature_init_failed: name={}, error={}", name, e);
                    report.failed.push((name, e.to_string()));
                }
            }
        }

        (LoadedFeatures { features: loaded }, report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::events::{InteractionKind, MockTransport};
    use crate::types::{BoxError, FeaturesConfig};
    use std::time::Duration;

    struct Polls;

    impl Feature for Polls {
        fn init(&mut self, ctx: &FeatureContext) -> Result<()> {
            ctx.interactions().on("poll", |_, _| async { Ok(()) });
            Ok(())
        }
    }

    struct Broken;

    impl Feature for Broken {
        fn init(&mut self, _: &FeatureContext) -> Result<()> {
            Err(Error::config("missing channel id"))
        }
    }

    struct Panics;

    impl Feature for Panics {
        fn init(&mut self, _: &FeatureContext) -> Result<()> {
            panic!("init exploded");
        }
    }

    fn context(config: Config) -> FeatureContext {
        let data = FeatureData::open(&config.storage.data_path, serde_json::Map::new()).unwrap();
        FeatureContext::new(
            Interactions::new(),
            Scheduler::new(),
            Commands::new(),
            Services::builder().build(),
            data,
            Arc::new(config),
        )
    }

    #[test]
    fn test_failures_are_isolated() {
        let mut registry = FeatureRegistry::new();
        registry.register("broken", || Box::new(Broken)).unwrap();
        registry.register("panics", || Box::new(Panics)).unwrap();
        registry.register("polls", || Box::new(Polls)).unwrap();

        let ctx = context(Config::default());
        let (loaded, report) = registry.init_all(&ctx);

        assert_eq!(loaded.names(), vec!["polls"]);
        assert_eq!(report.initialized, vec!["polls".to_string()]);
        assert_eq!(report.failed.len(), 2);
        assert!(report.failed[1].1.contains("init exploded"));
        assert_eq!(ctx.interactions().callback_types(), vec!["poll".to_string()]);
    }

    #[test]
    fn test_disabled_features_are_skipped() {
        let mut registry = FeatureRegistry::new();
        registry.register("polls", || Box::new(Polls)).unwrap();

        let ctx = context(Config {
            features: FeaturesConfig {
                disabled: vec!["polls".to_string()],
            },
            ..Config::default()
        });
        assert!(ctx.feature_disabled("polls"));

        let (loaded, report) = registry.init_all(&ctx);
        assert!(loaded.is_empty());
        assert_eq!(report.skipped, vec!["polls".to_string()]);
        assert!(ctx.interactions().callback_types().is_empty());
    }

    #[test]
    fn test_duplicate_feature_name_rejected() {
        let mut registry = FeatureRegistry::new();
        registry.register("polls", || Box::new(Polls)).unwrap();
        assert!(registry.register("polls", || Box::new(Polls)).is_err());
        assert_eq!(registry.names(), vec!["polls"]);
    }

    #[test]
    fn test_create_handler_applies_default_ttl() {
        let mut config = Config::default();
        config.interactions.default_time_to_live = Some(Duration::from_secs(900));
        let ctx = context(config);

        let defaulted = ctx.create_handler("poll", Value::Null, None);
        let explicit = ctx.create_handler("poll", Value::Null, Some(5));

        let handlers = ctx.interactions().handlers();
        assert_eq!(handlers[&defaulted].time_to_live, Some(900.0));
        assert_eq!(handlers[&explicit].time_to_live, Some(5.0));
    }

    /// Counts invocations in the shared data and saves after each one.
    struct Tally;

    impl Feature for Tally {
        fn init(&mut self, ctx: &FeatureContext) -> Result<()> {
            let data = ctx.data().clone();
            ctx.interactions().on("tally", move |_, _| {
                let data = data.clone();
                async move {
                    data.update(|map| {
                        let next = map.get("tally").and_then(Value::as_i64).unwrap_or(0) + 1;
                        map.insert("tally".to_string(), Value::from(next));
                    });
                    data.save()?;
                    Ok::<(), BoxError>(())
                }
            });
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_feature_updates_and_persists_data() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.data_path = dir.path().join("state.json");
        let ctx = context(config.clone());

        let mut registry = FeatureRegistry::new();
        registry.register("tally", || Box::new(Tally)).unwrap();
        registry.init_all(&ctx);

        let token = ctx.interactions().create_handler("tally", Value::Null, None);
        let event = Interaction::new("i-1", InteractionKind::Button, Arc::new(MockTransport::new()));
        assert!(ctx.interactions().dispatch(token.as_str(), event.clone()).await.unwrap());
        assert!(ctx.interactions().dispatch(token.as_str(), event).await.unwrap());

        let reloaded = FeatureData::open(&config.storage.data_path, serde_json::Map::new()).unwrap();
        assert_eq!(reloaded.get("tally"), Some(Value::from(2)));
    }

    #[test]
    fn test_named_channel_lookup() {
        let mut config = Config::default();
        config
            .channels
            .insert("announcements".to_string(), "1180000000000000001".to_string());
        let ctx = context(config);

        assert_eq!(ctx.channel("announcements"), Some("1180000000000000001"));
        assert_eq!(ctx.channel("general"), None);
        assert_eq!(ctx.channels().len(), 1);
    }
}
