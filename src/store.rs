//! Durable key-value store.
//!
//! One JSON document per file. On load the persisted top-level object is
//! merged over the serialized defaults (keys present on disk win, missing keys
//! keep their default). Nothing is written until [`DurableStore::save`] is
//! called, and a save always overwrites the whole file. No transactions, and a
//! single writer per file is assumed.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::types::{Error, Result};

/// A typed document persisted as pretty-printed JSON.
#[derive(Debug)]
pub struct DurableStore<T> {
    path: PathBuf,
    data: T,
}

impl<T> DurableStore<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Load `path`, merging its contents over `defaults`.
    ///
    /// A missing file yields the defaults untouched.
    pub fn load(path: impl Into<PathBuf>, defaults: T) -> Result<Self> {
        let path = path.into();

        let data = match std::fs::read_to_string(&path) {
            Ok(content) => merge_over_defaults(defaults, &content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("store_file_missing: path={}", path.display());
                defaults
            }
            Err(e) => return Err(e.into()),
        };

        tracing::debug!("store_loaded: path={}", path.display());
        Ok(Self { path, data })
    }

    /// Overwrite the backing file with the current document.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(&self.data)?;
        std::fs::write(&self.path, json)?;

        tracing::debug!("store_saved: path={}", self.path.display());
        Ok(())
    }
}

impl<T> DurableStore<T> {
    pub fn data(&self) -> &T {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut T {
        &mut self.data
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn into_inner(self) -> T {
        self.data
    }
}

/// Shallow merge of the persisted object over the defaults.
fn merge_over_defaults<T>(defaults: T, content: &str) -> Result<T>
where
    T: Serialize + DeserializeOwned,
{
    let persisted: Value = serde_json::from_str(content)?;
    let Value::Object(persisted) = persisted else {
        return Err(Error::validation(
            "persisted document must be a JSON object",
        ));
    };

    let mut merged = serde_json::to_value(defaults)?;
    match merged.as_object_mut() {
        Some(base) => {
            for (key, value) in persisted {
                base.insert(key, value);
            }
        }
        None => merged = Value::Object(persisted),
    }

    Ok(serde_json::from_value(merged)?)
}
