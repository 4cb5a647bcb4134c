//! Interaction handler registry.
//!
//! Correlates an inbound event, identified by an opaque token chosen when the
//! handler was created, with the intent registered for it. Handlers may carry a
//! time-to-live; expiry is evaluated lazily on access, never by a timer:
//!
//! ```text
//!   visible(intent) ⇔ time_to_live is None ∨ now < creation_date + time_to_live
//! ```

use chrono::{DateTime, Duration, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{fire_modified, CallbackTable, ModifiedHook};
use crate::clock::{system_clock, SharedClock};
use crate::types::{CallbackResult, Error, HandlerToken, Result};

/// Callback invoked with the stored argument and the native event.
pub type InteractionCallback<E> =
    dyn Fn(Value, E) -> BoxFuture<'static, CallbackResult> + Send + Sync;

/// Persisted interaction handler table, keyed by token.
pub type InteractionTable = BTreeMap<HandlerToken, InteractionIntent>;

/// A registered intent waiting for an inbound event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionIntent {
    #[serde(rename = "type")]
    pub intent_type: String,
    #[serde(default)]
    pub arg: Value,
    pub creation_date: DateTime<Utc>,
    /// Seconds after `creation_date` at which the handler expires. Files
    /// written by other hosts may carry fractional values.
    #[serde(default, with = "ttl_seconds")]
    pub time_to_live: Option<f64>,
}

impl InteractionIntent {
    /// Instant at which the handler stops being visible, if it expires at all.
    ///
    /// A time-to-live too large to represent never expires.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let millis = (self.time_to_live? * 1000.0).round();
        if !millis.is_finite() || millis.abs() >= i64::MAX as f64 {
            return None;
        }
        let ttl = Duration::try_milliseconds(millis as i64)?;
        self.creation_date.checked_add_signed(ttl)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|expires_at| expires_at <= now)
    }
}

/// Whole seconds are written as integers so files stay readable by hosts that
/// only understand integral time-to-live values.
mod ttl_seconds {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ttl: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error> {
        match *ttl {
            Some(secs) if secs.fract() == 0.0 && (0.0..=u64::MAX as f64).contains(&secs) => {
                serializer.serialize_u64(secs as u64)
            }
            Some(secs) => serializer.serialize_f64(secs),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
        Option::<f64>::deserialize(deserializer)
    }
}

/// How a dispatch attempt was resolved.
///
/// `UnknownToken` and `NoCallback` both surface as `false` from
/// [`Interactions::dispatch`]; they stay distinct here for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Handled,
    /// Token never existed, was removed, or has expired.
    UnknownToken,
    /// Token is live but nothing is registered for its type.
    NoCallback { intent_type: String },
}

impl DispatchOutcome {
    pub fn is_handled(&self) -> bool {
        matches!(self, DispatchOutcome::Handled)
    }
}

struct InteractionState<E> {
    handlers: InteractionTable,
    callbacks: CallbackTable<InteractionCallback<E>>,
    on_modified: Option<ModifiedHook>,
}

impl<E> InteractionState<E> {
    /// Drop every handler whose time-to-live has elapsed.
    fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.handlers.len();
        self.handlers.retain(|_, intent| !intent.is_expired_at(now));
        let removed = before - self.handlers.len();
        if removed > 0 {
            tracing::debug!("interaction_handlers_expired: count={}", removed);
        }
        removed
    }
}

/// Interaction handler registry.
///
/// Cheap to clone; clones share the same table. `E` is the native event type
/// handed to callbacks alongside the stored argument.
pub struct Interactions<E> {
    state: Arc<Mutex<InteractionState<E>>>,
    clock: SharedClock,
}

impl<E> Clone for Interactions<E> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            clock: self.clock.clone(),
        }
    }
}

impl<E> Interactions<E> {
    fn lock(&self) -> MutexGuard<'_, InteractionState<E>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<E> fmt::Debug for Interactions<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("Interactions")
            .field("handlers", &state.handlers.len())
            .field("callbacks", &state.callbacks)
            .field("clock", &self.clock)
            .finish()
    }
}

impl<E: Send + 'static> Default for Interactions<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Send + 'static> Interactions<E> {
    pub fn new() -> Self {
        Self::with_clock(system_clock())
    }

    pub fn with_clock(clock: SharedClock) -> Self {
        Self {
            state: Arc::new(Mutex::new(InteractionState {
                handlers: InteractionTable::new(),
                callbacks: CallbackTable::new(),
                on_modified: None,
            })),
            clock,
        }
    }

    /// Install the hook fired after every mutation.
    pub fn set_on_modified(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.lock().on_modified = Some(Arc::new(hook));
    }

    pub fn clear_on_modified(&self) {
        self.lock().on_modified = None;
    }

    /// Register the callback for `intent_type`. Last writer wins.
    pub fn on<F, Fut>(&self, intent_type: impl Into<String>, callback: F)
    where
        F: Fn(Value, E) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CallbackResult> + Send + 'static,
    {
        let intent_type = intent_type.into();
        let boxed: Arc<InteractionCallback<E>> =
            Arc::new(move |arg: Value, event: E| -> BoxFuture<'static, CallbackResult> {
                Box::pin(callback(arg, event))
            });

        if self.lock().callbacks.register(intent_type.clone(), boxed) {
            tracing::debug!("interaction_callback_replaced: type={}", intent_type);
        } else {
            tracing::debug!("interaction_callback_registered: type={}", intent_type);
        }
    }

    /// Create a handler and return the token to embed in an outbound event.
    pub fn create_handler(
        &self,
        intent_type: &str,
        arg: Value,
        time_to_live: Option<u64>,
    ) -> HandlerToken {
        let now = self.clock.now();
        let (token, hook) = {
            let mut state = self.lock();
            state.sweep(now);

            let mut token = HandlerToken::generate(intent_type);
            while state.handlers.contains_key(&token) {
                token = HandlerToken::generate(intent_type);
            }

            state.handlers.insert(
                token.clone(),
                InteractionIntent {
                    intent_type: intent_type.to_string(),
                    arg,
                    creation_date: now,
                    time_to_live: time_to_live.map(|secs| secs as f64),
                },
            );
            (token, state.on_modified.clone())
        };

        tracing::debug!(
            "interaction_handler_created: token={}, ttl={:?}",
            token,
            time_to_live
        );
        fire_modified(hook);
        token
    }

    /// Remove handlers. Absent tokens are ignored; the hook fires once.
    pub fn remove_handlers<I, S>(&self, tokens: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let now = self.clock.now();
        let hook = {
            let mut state = self.lock();
            state.sweep(now);
            for token in tokens {
                if state.handlers.remove(token.as_ref()).is_some() {
                    tracing::debug!("interaction_handler_removed: token={}", token.as_ref());
                }
            }
            state.on_modified.clone()
        };
        fire_modified(hook);
    }

    /// Replace the stored argument of a live handler.
    pub fn set_argument(&self, token: &str, arg: Value) -> Result<()> {
        let now = self.clock.now();
        let hook = {
            let mut state = self.lock();
            state.sweep(now);
            let intent = state
                .handlers
                .get_mut(token)
                .ok_or_else(|| Error::not_found(format!("interaction handler: {}", token)))?;
            intent.arg = arg;
            state.on_modified.clone()
        };

        tracing::debug!("interaction_argument_set: token={}", token);
        fire_modified(hook);
        Ok(())
    }

    /// Dispatch an inbound event to the handler registered under `token`.
    ///
    /// Returns `Ok(false)` when the token is unknown, expired, or its type has
    /// no callback; the caller should tell the actor the interaction is stale.
    /// A failing callback is returned as [`Error::Callback`].
    pub async fn dispatch(&self, token: &str, event: E) -> Result<bool> {
        Ok(self.dispatch_outcome(token, event).await?.is_handled())
    }

    /// Like [`dispatch`](Self::dispatch), keeping the miss reasons apart.
    pub async fn dispatch_outcome(&self, token: &str, event: E) -> Result<DispatchOutcome> {
        let now = self.clock.now();
        let (intent, callback) = {
            let state = self.lock();
            let Some(intent) = state
                .handlers
                .get(token)
                .filter(|intent| !intent.is_expired_at(now))
            else {
                tracing::debug!("interaction_dispatch_miss: token={}, reason=unknown", token);
                return Ok(DispatchOutcome::UnknownToken);
            };
            let Some(callback) = state.callbacks.get(&intent.intent_type) else {
                tracing::warn!(
                    "interaction_dispatch_miss: token={}, reason=no_callback, type={}",
                    token,
                    intent.intent_type
                );
                return Ok(DispatchOutcome::NoCallback {
                    intent_type: intent.intent_type.clone(),
                });
            };
            (intent.clone(), callback)
        };

        tracing::debug!(
            "interaction_dispatch: token={}, type={}",
            token,
            intent.intent_type
        );
        callback(intent.arg, event)
            .await
            .map_err(|e| Error::callback(intent.intent_type, e))?;
        Ok(DispatchOutcome::Handled)
    }

    /// True if `token` is registered and not expired.
    pub fn contains(&self, token: &str) -> bool {
        let now = self.clock.now();
        self.lock()
            .handlers
            .get(token)
            .is_some_and(|intent| !intent.is_expired_at(now))
    }

    /// Deep copy of the live handler table (expired entries swept first).
    pub fn handlers(&self) -> InteractionTable {
        let now = self.clock.now();
        let mut state = self.lock();
        state.sweep(now);
        state.handlers.clone()
    }

    /// Replace the whole table with a copy of `handlers`, then sweep.
    ///
    /// This is the load path used at boot: it does not fire the modified-hook.
    pub fn set_handlers(&self, handlers: &InteractionTable) {
        let now = self.clock.now();
        let mut state = self.lock();
        state.handlers = handlers.clone();
        state.sweep(now);
        tracing::debug!("interaction_handlers_loaded: count={}", state.handlers.len());
    }

    /// Registered callback types.
    pub fn callback_types(&self) -> Vec<String> {
        self.lock().callbacks.types()
    }
}
