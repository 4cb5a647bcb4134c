//! Core types for the plugin host.
//!
//! This module provides foundational types used throughout the system:
//! - **IDs**: Strongly-typed identifiers (HandlerToken, JobId)
//! - **Errors**: Application error types with thiserror derives
//! - **Config**: Configuration structures for storage, logging and features

mod config;
mod errors;
mod ids;

pub use config::{Config, FeaturesConfig, InteractionConfig, ObservabilityConfig, StorageConfig};
pub use errors::{BoxError, CallbackResult, Error, Result};
pub use ids::{intent_type_of, HandlerToken, JobId, ID_SEPARATOR};
