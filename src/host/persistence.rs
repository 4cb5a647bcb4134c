//! Registry snapshot persistence.
//!
//! Both registries write into one [`DurableStore`] document: the interaction
//! table under `interactionHandlers`, the job table under `cronJobs`. The host
//! installs a modified-hook on each registry that copies the fresh snapshot in
//! and saves the whole file. Any other top-level key is carried through
//! untouched.
//!
//! Hooks read the registry while holding the store lock, so concurrent
//! mutations are written in the order they were snapshotted and the last save
//! always reflects the last applied mutation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::registry::{InteractionTable, Interactions};
use crate::scheduler::{JobTable, Scheduler};
use crate::store::DurableStore;
use crate::types::Result;

/// Persisted registry document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryState {
    #[serde(rename = "interactionHandlers", default)]
    pub interaction_handlers: InteractionTable,
    #[serde(rename = "cronJobs", default)]
    pub cron_jobs: JobTable,
    /// Top-level keys written by someone else.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Shared handle to the registry file. Cheap to clone.
#[derive(Debug, Clone)]
pub struct RegistryStore {
    store: Arc<Mutex<DurableStore<RegistryState>>>,
}

impl RegistryStore {
    /// Load the registry file at `path`; a missing file yields empty tables.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let store = DurableStore::load(path, RegistryState::default())?;
        tracing::info!(
            "registry_store_loaded: path={}, handlers={}, jobs={}",
            store.path().display(),
            store.data().interaction_handlers.len(),
            store.data().cron_jobs.len()
        );
        Ok(Self {
            store: Arc::new(Mutex::new(store)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, DurableStore<RegistryState>> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn path(&self) -> PathBuf {
        self.lock().path().to_path_buf()
    }

    /// Copy of the document as last loaded or synced.
    pub fn snapshot(&self) -> RegistryState {
        self.lock().data().clone()
    }

    /// Copy the interaction table in and save.
    pub fn save_interactions(&self, handlers: InteractionTable) -> Result<()> {
        let mut store = self.lock();
        store.data_mut().interaction_handlers = handlers;
        store.save()
    }

    /// Snapshot `interactions` under the store lock and save.
    pub fn sync_interactions<E: Send + 'static>(&self, interactions: &Interactions<E>) -> Result<()> {
        let mut store = self.lock();
        store.data_mut().interaction_handlers = interactions.handlers();
        store.save()
    }

    /// Snapshot `scheduler` under the store lock and save.
    pub fn sync_jobs(&self, scheduler: &Scheduler) -> Result<()> {
        let mut store = self.lock();
        store.data_mut().cron_jobs = scheduler.handlers();
        store.save()
    }

    /// Snapshot both registries under the store lock and save once.
    pub fn sync_all<E: Send + 'static>(
        &self,
        interactions: &Interactions<E>,
        scheduler: &Scheduler,
    ) -> Result<()> {
        let mut store = self.lock();
        let data = store.data_mut();
        data.interaction_handlers = interactions.handlers();
        data.cron_jobs = scheduler.handlers();
        store.save()
    }
}

/// Save the interaction table after every mutation.
pub fn persist_interactions<E: Send + 'static>(interactions: &Interactions<E>, store: &RegistryStore) {
    let registry = interactions.clone();
    let store = store.clone();
    interactions.set_on_modified(move || {
        tracing::debug!("interaction_handlers_modified");
        if let Err(e) = store.sync_interactions(&registry) {
            log_save_failure(&store.path(), &e);
        }
    });
}

/// Save the job table after every mutation.
pub fn persist_jobs(scheduler: &Scheduler, store: &RegistryStore) {
    let registry = scheduler.clone();
    let store = store.clone();
    scheduler.set_on_modified(move || {
        tracing::debug!("cron_jobs_modified");
        if let Err(e) = store.sync_jobs(&registry) {
            log_save_failure(&store.path(), &e);
        }
    });
}

fn log_save_failure(path: &Path, error: &crate::types::Error) {
    tracing::error!(
        "registry_save_failed: path={}, error={}",
        path.display(),
        error
    );
}
