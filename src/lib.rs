//! # Plugin Host - persistent callback registry
//!
//! Host for an event-driven chat application whose features react to
//! short-lived interaction events and to time-scheduled callbacks, across
//! process restarts:
//! - Interaction handlers: opaque token → intent, dispatched when an inbound
//!   event carries the token, with lazy time-to-live expiry
//! - Scheduled jobs: job id → intent, one tokio timer per pending job
//! - A durable JSON store both registries are snapshotted into after every
//!   mutation
//! - Boot reconciliation: overdue jobs replayed once, future jobs re-armed
//!
//! ## Architecture
//!
//! ```text
//!                     ┌──────────────────────────────────────┐
//!   transport  ─────► │                Host                  │
//!   events            │  ┌──────────────┐  ┌──────────────┐  │
//!                     │  │ Interactions │  │  Scheduler   │◄─┼── timers
//!                     │  └──────┬───────┘  └──────┬───────┘  │
//!                     │         └── modified-hook ┘          │
//!                     │                  ▼                   │
//!                     │           RegistryStore              │
//!                     └──────────────────┬───────────────────┘
//!                                        ▼
//!                                 registry.json
//! ```

// Enforce strict safety at compile time
#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

pub mod clock;
pub mod host;
pub mod registry;
pub mod scheduler;
pub mod store;
pub mod types;

// Internal utilities
pub mod observability;
pub mod validation;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use host::{
    BootReport, Feature, FeatureContext, FeatureData, FeatureRegistry, HandleOutcome, Host,
    HostBuilder, Interaction, InteractionKind, Reply, Services, Transport,
};
pub use registry::{DispatchOutcome, InteractionIntent, InteractionTable, Interactions};
pub use scheduler::{JobTable, ScheduledIntent, Scheduler};
pub use store::DurableStore;
pub use types::{BoxError, CallbackResult, Config, Error, HandlerToken, JobId, Result};
