//! Feature-owned application data.
//!
//! A single JSON object shared by every feature, kept in its own file next to
//! the registry. Features read and update it through [`FeatureData`]; nothing
//! is written until [`FeatureData::save`] is called.

use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::store::DurableStore;
use crate::types::Result;

/// Shared handle to the feature data file. Cheap to clone.
#[derive(Debug, Clone)]
pub struct FeatureData {
    store: Arc<Mutex<DurableStore<Map<String, Value>>>>,
}

impl FeatureData {
    /// Load `path`, merging its top-level keys over `defaults`.
    pub fn open(path: impl Into<PathBuf>, defaults: Map<String, Value>) -> Result<Self> {
        let store = DurableStore::load(path, defaults)?;
        tracing::info!(
            "feature_data_loaded: path={}, keys={}",
            store.path().display(),
            store.data().len()
        );
        Ok(Self {
            store: Arc::new(Mutex::new(store)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, DurableStore<Map<String, Value>>> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn path(&self) -> PathBuf {
        self.lock().path().to_path_buf()
    }

    /// Copy of the whole document.
    pub fn data(&self) -> Map<String, Value> {
        self.lock().data().clone()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.lock().data().get(key).cloned()
    }

    /// Mutate the document in place. Call [`save`](Self::save) to persist.
    pub fn update<R>(&self, f: impl FnOnce(&mut Map<String, Value>) -> R) -> R {
        f(self.lock().data_mut())
    }

    /// Overwrite the backing file with the current document.
    pub fn save(&self) -> Result<()> {
        let store = self.lock();
        store.save()?;
        tracing::debug!("feature_data_saved: path={}", store.path().display());
        Ok(())
    }
}
