//! Persistent callback registries.
//!
//! - [`Interactions`]: opaque token → intent, dispatched when an inbound event
//!   carrying that token arrives, with lazy time-to-live expiry.
//! - [`CallbackTable`]: the type → callback mapping both registries use.
//!
//! Every registry mutation fires a single zero-argument modified-hook after the
//! change is fully applied. The host uses it to write the registry snapshot to
//! the durable store.

pub mod callbacks;
pub mod interactions;

use std::sync::Arc;

pub use callbacks::CallbackTable;
pub use interactions::{
    DispatchOutcome, InteractionCallback, InteractionIntent, InteractionTable, Interactions,
};

/// Hook fired after every registry mutation.
pub type ModifiedHook = Arc<dyn Fn() + Send + Sync>;

/// Run the hook, if one is installed. Must be called without holding any
/// registry lock, since hooks read the registry snapshot back.
pub(crate) fn fire_modified(hook: Option<ModifiedHook>) {
    if let Some(hook) = hook {
        hook();
    }
}
