//! Name-keyed service container.
//!
//! Populated once at boot through [`ServicesBuilder`], then frozen behind an
//! `Arc<Services>` and only read. Features look services up by name and get
//! them back typed.

use std::any::{type_name, Any};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::types::{Error, Result};
use crate::validation::validate_name;

type ServiceInstance = Arc<dyn Any + Send + Sync>;

/// Collects services before boot.
#[derive(Default)]
pub struct ServicesBuilder {
    services: BTreeMap<String, (ServiceInstance, &'static str)>,
}

impl fmt::Debug for ServicesBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServicesBuilder")
            .field("names", &self.services.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ServicesBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `instance` under its short type name. Returns that name.
    pub fn inject<T: Any + Send + Sync>(&mut self, instance: T) -> Result<String> {
        self.inject_named(short_type_name::<T>(), instance)
    }

    /// Register `instance` under `name`. Names are unique.
    pub fn inject_named<T: Any + Send + Sync>(
        &mut self,
        name: impl Into<String>,
        instance: T,
    ) -> Result<String> {
        let name = name.into();
        validate_name(&name, "service name")?;
        if self.services.contains_key(&name) {
            return Err(Error::validation(format!(
                "service named '{}' registered twice",
                name
            )));
        }

        tracing::debug!("service_injected: name={}, type={}", name, type_name::<T>());
        self.services
            .insert(name.clone(), (Arc::new(instance), type_name::<T>()));
        Ok(name)
    }

    pub fn build(self) -> Arc<Services> {
        Arc::new(Services {
            services: self.services,
        })
    }
}

/// Frozen service container.
#[derive(Default)]
pub struct Services {
    services: BTreeMap<String, (ServiceInstance, &'static str)>,
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.services.iter().map(|(name, (_, ty))| (name, ty)))
            .finish()
    }
}

impl Services {
    pub fn builder() -> ServicesBuilder {
        ServicesBuilder::new()
    }

    /// Look up the service registered under `name` as a `T`.
    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>> {
        let (instance, registered_as) = self
            .services
            .get(name)
            .ok_or_else(|| Error::not_found(format!("service named '{}'", name)))?;

        instance.clone().downcast::<T>().map_err(|_| {
            Error::validation(format!(
                "service '{}' is a {}, not a {}",
                name,
                registered_as,
                type_name::<T>()
            ))
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.services.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

/// `crate::path::Name<Generic>` → `Name`.
fn short_type_name<T>() -> String {
    let full = type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}
