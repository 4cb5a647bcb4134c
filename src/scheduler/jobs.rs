//! Job scheduler.
//!
//! Each pending job owns exactly one armed timer. The job id → timer map and
//! the job id → metadata map stay in lock-step: a job is either pending in
//! both, or in neither.

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use super::timer::{self, Rejection, TimerHandle};
use crate::clock::{system_clock, SharedClock};
use crate::registry::{fire_modified, CallbackTable, ModifiedHook};
use crate::types::{CallbackResult, Error, JobId, Result};

/// Callback invoked with the stored argument when a job comes due.
pub type JobCallback = dyn Fn(Value) -> BoxFuture<'static, CallbackResult> + Send + Sync;

/// Persisted job table, keyed by job id.
pub type JobTable = BTreeMap<JobId, ScheduledIntent>;

/// A job waiting for its execution time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledIntent {
    #[serde(rename = "type")]
    pub intent_type: String,
    #[serde(default)]
    pub arg: Value,
    pub execution_time: DateTime<Utc>,
}

impl ScheduledIntent {
    pub fn is_due_at(&self, now: DateTime<Utc>) -> bool {
        self.execution_time <= now
    }
}

// =============================================================================
// State
// =============================================================================

/// Timer plus the sequence number it was armed with. A timer that wakes up
/// and finds a different sequence under its id has been superseded.
#[derive(Debug)]
struct ArmedTimer {
    seq: u64,
    handle: TimerHandle,
}

struct SchedulerState {
    intents: JobTable,
    timers: HashMap<JobId, ArmedTimer>,
    callbacks: CallbackTable<JobCallback>,
    on_modified: Option<ModifiedHook>,
    next_seq: u64,
}

impl SchedulerState {
    fn next_seq(&mut self) -> u64 {
        self.next_seq = self.next_seq.wrapping_add(1);
        self.next_seq
    }
}

struct SchedulerInner {
    state: Mutex<SchedulerState>,
    clock: SharedClock,
}

impl SchedulerInner {
    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// =============================================================================
// Scheduler
// =============================================================================

/// Job scheduler. Cheap to clone; clones share the same jobs.
///
/// Timers hold only a weak reference, so dropping every clone lets pending
/// timers wake up to nothing.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("Scheduler")
            .field("jobs", &state.intents.len())
            .field("armed", &state.timers.len())
            .field("callbacks", &state.callbacks)
            .finish()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self::with_clock(system_clock())
    }

    pub fn with_clock(clock: SharedClock) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                state: Mutex::new(SchedulerState {
                    intents: JobTable::new(),
                    timers: HashMap::new(),
                    callbacks: CallbackTable::new(),
                    on_modified: None,
                    next_seq: 0,
                }),
                clock,
            }),
        }
    }

    /// Install the hook fired after every mutation.
    pub fn set_on_modified(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.inner.lock().on_modified = Some(Arc::new(hook));
    }

    pub fn clear_on_modified(&self) {
        self.inner.lock().on_modified = None;
    }

    /// Register the callback for `intent_type`. Last writer wins.
    pub fn on<F, Fut>(&self, intent_type: impl Into<String>, callback: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CallbackResult> + Send + 'static,
    {
        let intent_type = intent_type.into();
        let boxed: Arc<JobCallback> =
            Arc::new(move |arg: Value| -> BoxFuture<'static, CallbackResult> {
                Box::pin(callback(arg))
            });

        if self.inner.lock().callbacks.register(intent_type.clone(), boxed) {
            tracing::debug!("job_callback_replaced: type={}", intent_type);
        } else {
            tracing::debug!("job_callback_registered: type={}", intent_type);
        }
    }

    /// Schedule a job for `execution_time`.
    ///
    /// Returns `None` without storing anything when the execution time is
    /// rejected. Passing the id of a pending job replaces it.
    pub fn create_job(
        &self,
        intent_type: &str,
        execution_time: DateTime<Utc>,
        arg: Value,
        job_id: Option<JobId>,
    ) -> Option<JobId> {
        let now = self.inner.clock.now();
        let (job_id, hook) = {
            let mut state = self.inner.lock();

            let job_id = match job_id {
                Some(job_id) => job_id,
                None => {
                    let mut job_id = JobId::generate(intent_type);
                    while state.intents.contains_key(&job_id) {
                        job_id = JobId::generate(intent_type);
                    }
                    job_id
                }
            };

            let armed = match self.arm(&mut state, &job_id, execution_time, now) {
                Ok(armed) => armed,
                Err(rejection) => {
                    tracing::warn!(
                        "job_rejected: id={}, execution_time={}, reason={}",
                        job_id,
                        execution_time,
                        rejection
                    );
                    return None;
                }
            };

            if let Some(previous) = state.timers.insert(job_id.clone(), armed) {
                tracing::debug!("job_replaced: id={}", job_id);
                previous.handle.cancel();
            }
            state.intents.insert(
                job_id.clone(),
                ScheduledIntent {
                    intent_type: intent_type.to_string(),
                    arg,
                    execution_time,
                },
            );
            (job_id, state.on_modified.clone())
        };

        tracing::debug!(
            "job_created: id={}, execution_time={}",
            job_id,
            execution_time
        );
        fire_modified(hook);
        Some(job_id)
    }

    /// Cancel jobs. Absent ids are ignored; the hook fires once.
    pub fn cancel_jobs<I, S>(&self, job_ids: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let hook = {
            let mut state = self.inner.lock();
            for job_id in job_ids {
                let job_id = job_id.as_ref();
                if let Some(armed) = state.timers.remove(job_id) {
                    armed.handle.cancel();
                }
                if state.intents.remove(job_id).is_some() {
                    tracing::debug!("job_cancelled: id={}", job_id);
                }
            }
            state.on_modified.clone()
        };
        fire_modified(hook);
    }

    /// Move a pending job to `execution_time`.
    ///
    /// `Ok(false)` leaves the job untouched when the new time is rejected.
    pub fn reschedule_job(&self, job_id: &str, execution_time: DateTime<Utc>) -> Result<bool> {
        let now = self.inner.clock.now();
        let hook = {
            let mut state = self.inner.lock();
            let Some(key) = state.timers.get_key_value(job_id).map(|(key, _)| key.clone())
            else {
                return Err(Error::not_found(format!("job: {}", job_id)));
            };
            if !state.intents.contains_key(job_id) {
                return Err(Error::internal(format!(
                    "job {} has a timer but no metadata",
                    job_id
                )));
            }

            let armed = match self.arm(&mut state, &key, execution_time, now) {
                Ok(armed) => armed,
                Err(rejection) => {
                    tracing::warn!(
                        "job_reschedule_rejected: id={}, execution_time={}, reason={}",
                        job_id,
                        execution_time,
                        rejection
                    );
                    return Ok(false);
                }
            };

            if let Some(previous) = state.timers.insert(key, armed) {
                previous.handle.cancel();
            }
            if let Some(intent) = state.intents.get_mut(job_id) {
                intent.execution_time = execution_time;
            }
            state.on_modified.clone()
        };

        tracing::debug!(
            "job_rescheduled: id={}, execution_time={}",
            job_id,
            execution_time
        );
        fire_modified(hook);
        Ok(true)
    }

    /// Replace the stored argument of a pending job.
    pub fn set_argument(&self, job_id: &str, arg: Value) -> Result<()> {
        let hook = {
            let mut state = self.inner.lock();
            let intent = state
                .intents
                .get_mut(job_id)
                .ok_or_else(|| Error::not_found(format!("job: {}", job_id)))?;
            intent.arg = arg;
            state.on_modified.clone()
        };

        tracing::debug!("job_argument_set: id={}", job_id);
        fire_modified(hook);
        Ok(())
    }

    /// Run the callback for `intent_type` directly, outside any job.
    pub async fn invoke_callback(&self, intent_type: &str, arg: Value) -> Result<()> {
        let callback = self
            .inner
            .lock()
            .callbacks
            .get(intent_type)
            .ok_or_else(|| Error::missing_callback(intent_type))?;

        callback(arg)
            .await
            .map_err(|e| Error::callback(intent_type, e))
    }

    /// Consume a pending job now: cancel its timer, drop its metadata, fire
    /// the hook, then run its callback.
    pub async fn invoke(&self, job_id: &str) -> Result<()> {
        let intent = self.claim(job_id, None)?;
        self.run(job_id, intent).await
    }

    /// Deep copy of the pending job table.
    pub fn handlers(&self) -> JobTable {
        self.inner.lock().intents.clone()
    }

    /// True if `job_id` has an armed timer.
    pub fn is_armed(&self, job_id: &str) -> bool {
        self.inner.lock().timers.contains_key(job_id)
    }

    pub fn armed_count(&self) -> usize {
        self.inner.lock().timers.len()
    }

    /// Execution time the timer for `job_id` was armed for.
    pub fn armed_for(&self, job_id: &str) -> Option<DateTime<Utc>> {
        self.inner
            .lock()
            .timers
            .get(job_id)
            .map(|armed| armed.handle.due())
    }

    pub fn callback_types(&self) -> Vec<String> {
        self.inner.lock().callbacks.types()
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn arm(
        &self,
        state: &mut SchedulerState,
        job_id: &JobId,
        execution_time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> std::result::Result<ArmedTimer, Rejection> {
        let seq = state.next_seq();
        let weak = Arc::downgrade(&self.inner);
        let fire = fire_job(weak, job_id.clone(), seq);
        let handle = timer::arm(execution_time, now, fire)?;
        Ok(ArmedTimer { seq, handle })
    }

    /// Remove a job from both maps.
    ///
    /// With `from_timer` set, the claim succeeds only if the timer armed with
    /// that sequence is still the current one, and the timer is left to finish
    /// instead of being aborted.
    fn claim(&self, job_id: &str, from_timer: Option<u64>) -> Result<ScheduledIntent> {
        let (intent, hook) = {
            let mut state = self.inner.lock();
            if let Some(seq) = from_timer {
                let current = state.timers.get(job_id).map(|armed| armed.seq);
                if current != Some(seq) {
                    return Err(Error::not_found(format!("job: {} (superseded)", job_id)));
                }
            }

            let intent = state
                .intents
                .remove(job_id)
                .ok_or_else(|| Error::not_found(format!("job: {}", job_id)))?;
            if let Some(armed) = state.timers.remove(job_id) {
                if from_timer.is_none() {
                    armed.handle.cancel();
                }
            }
            (intent, state.on_modified.clone())
        };

        fire_modified(hook);
        Ok(intent)
    }

    async fn run(&self, job_id: &str, intent: ScheduledIntent) -> Result<()> {
        tracing::debug!("job_invoked: id={}, type={}", job_id, intent.intent_type);
        self.invoke_callback(&intent.intent_type, intent.arg).await
    }
}

/// Body of a job's timer task.
async fn fire_job(inner: Weak<SchedulerInner>, job_id: JobId, seq: u64) {
    let Some(inner) = inner.upgrade() else {
        return;
    };
    let scheduler = Scheduler { inner };

    let intent = match scheduler.claim(job_id.as_str(), Some(seq)) {
        Ok(intent) => intent,
        Err(_) => {
            tracing::debug!("job_timer_stale: id={}", job_id);
            return;
        }
    };

    if let Err(e) = scheduler.run(job_id.as_str(), intent).await {
        tracing::error!("job_failed: id={}, error={}", job_id, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::types::BoxError;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn scheduler() -> (Scheduler, ManualClock) {
        let clock = ManualClock::new(Utc::now());
        (Scheduler::with_clock(Arc::new(clock.clone())), clock)
    }

    fn counting(scheduler: &Scheduler, intent_type: &str) -> Arc<Mutex<Vec<Value>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        scheduler.on(intent_type, move |arg| {
            let sink = sink.clone();
            async move {
                sink.lock().unwrap().push(arg);
                Ok(())
            }
        });
        seen
    }

    fn hook_counter(scheduler: &Scheduler) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        scheduler.set_on_modified(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        count
    }

    fn secs(n: i64) -> chrono::Duration {
        chrono::Duration::seconds(n)
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_fires_once_at_execution_time() {
        let (scheduler, clock) = scheduler();
        let seen = counting(&scheduler, "reminder");

        let id = scheduler
            .create_job("reminder", clock.now() + secs(60), json!("hi"), None)
            .unwrap();
        assert!(id.as_str().starts_with("reminder:"));
        assert!(scheduler.is_armed(id.as_str()));

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert!(seen.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(*seen.lock().unwrap(), vec![json!("hi")]);
        assert!(scheduler.handlers().is_empty());
        assert_eq!(scheduler.armed_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_reminder_never_fires() {
        let (scheduler, clock) = scheduler();
        let seen = counting(&scheduler, "reminder");

        let id = scheduler
            .create_job("reminder", clock.now() + secs(60), json!("hi"), None)
            .unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
        scheduler.cancel_jobs([&id]);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(seen.lock().unwrap().is_empty());
        assert!(scheduler.handlers().is_empty());
        assert!(!scheduler.is_armed(id.as_str()));
    }

    #[tokio::test]
    async fn test_rejected_time_stores_nothing() {
        let (scheduler, clock) = scheduler();
        let hooks = hook_counter(&scheduler);

        assert!(scheduler
            .create_job("reminder", clock.now(), Value::Null, None)
            .is_none());
        assert!(scheduler
            .create_job("reminder", clock.now() - secs(5), Value::Null, None)
            .is_none());

        assert!(scheduler.handlers().is_empty());
        assert_eq!(scheduler.armed_count(), 0);
        assert_eq!(hooks.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_create_job_outside_runtime_is_rejected() {
        let (scheduler, clock) = scheduler();
        assert!(scheduler
            .create_job("reminder", clock.now() + secs(60), Value::Null, None)
            .is_none());
        assert!(scheduler.handlers().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_id_replaces_pending_job() {
        let (scheduler, clock) = scheduler();
        let seen = counting(&scheduler, "reminder");

        let id = JobId::from_string("reminder:fixed".to_string()).unwrap();
        scheduler.create_job("reminder", clock.now() + secs(10), json!(1), Some(id.clone()));
        scheduler.create_job("reminder", clock.now() + secs(20), json!(2), Some(id.clone()));

        assert_eq!(scheduler.armed_count(), 1);
        assert_eq!(scheduler.handlers()[&id].arg, json!(2));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(*seen.lock().unwrap(), vec![json!(2)]);
    }

    #[tokio::test]
    async fn test_invoke_consumes_job() {
        let (scheduler, clock) = scheduler();
        let seen = counting(&scheduler, "reminder");
        let hooks = hook_counter(&scheduler);

        let id = scheduler
            .create_job("reminder", clock.now() + secs(60), json!("now"), None)
            .unwrap();
        scheduler.invoke(id.as_str()).await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![json!("now")]);
        assert!(!scheduler.is_armed(id.as_str()));
        assert!(scheduler.handlers().is_empty());
        assert_eq!(hooks.load(Ordering::SeqCst), 2);

        let err = scheduler.invoke(id.as_str()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invoked_job_timer_does_not_fire_again() {
        let (scheduler, clock) = scheduler();
        let seen = counting(&scheduler, "reminder");

        let id = scheduler
            .create_job("reminder", clock.now() + secs(60), json!("once"), None)
            .unwrap();
        scheduler.invoke(id.as_str()).await.unwrap();

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invoke_missing_callback() {
        let (scheduler, clock) = scheduler();
        let id = scheduler
            .create_job("orphan", clock.now() + secs(60), Value::Null, None)
            .unwrap();

        let err = scheduler.invoke(id.as_str()).await.unwrap_err();
        assert!(matches!(err, Error::MissingCallback(ref t) if t == "orphan"));
        // The job is consumed before the callback lookup.
        assert!(scheduler.handlers().is_empty());
    }

    #[tokio::test]
    async fn test_invoke_callback_propagates_failure() {
        let (scheduler, _) = scheduler();
        scheduler.on("explode", |_| async { Err::<(), BoxError>("boom".into()) });

        let err = scheduler
            .invoke_callback("explode", Value::Null)
            .await
            .unwrap_err();
        match err {
            Error::Callback { intent_type, source } => {
                assert_eq!(intent_type, "explode");
                assert_eq!(source.to_string(), "boom");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_moves_timer() {
        let (scheduler, clock) = scheduler();
        let seen = counting(&scheduler, "reminder");
        let hooks = hook_counter(&scheduler);

        let id = scheduler
            .create_job("reminder", clock.now() + secs(10), json!("moved"), None)
            .unwrap();
        let later = clock.now() + secs(100);
        assert!(scheduler.reschedule_job(id.as_str(), later).unwrap());
        assert_eq!(scheduler.handlers()[&id].execution_time, later);
        assert_eq!(scheduler.armed_for(id.as_str()), Some(later));
        assert_eq!(scheduler.armed_count(), 1);
        assert_eq!(hooks.load(Ordering::SeqCst), 2);

        tokio::time::sleep(Duration::from_secs(50)).await;
        assert!(seen.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reschedule_rejected_leaves_job_untouched() {
        let (scheduler, clock) = scheduler();
        let due = clock.now() + secs(10);
        let id = scheduler
            .create_job("reminder", due, Value::Null, None)
            .unwrap();
        let hooks = hook_counter(&scheduler);

        assert!(!scheduler
            .reschedule_job(id.as_str(), clock.now() - secs(1))
            .unwrap());
        assert_eq!(scheduler.handlers()[&id].execution_time, due);
        assert_eq!(scheduler.armed_for(id.as_str()), Some(due));
        assert_eq!(hooks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_reschedule_unknown_job() {
        let (scheduler, clock) = scheduler();
        let err = scheduler
            .reschedule_job("reminder:nope", clock.now() + secs(10))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_set_argument() {
        let (scheduler, clock) = scheduler();
        let id = scheduler
            .create_job("reminder", clock.now() + secs(10), json!("old"), None)
            .unwrap();
        let hooks = hook_counter(&scheduler);

        scheduler.set_argument(id.as_str(), json!("new")).unwrap();
        assert_eq!(scheduler.handlers()[&id].arg, json!("new"));
        assert_eq!(hooks.load(Ordering::SeqCst), 1);

        assert!(scheduler
            .set_argument("reminder:nope", Value::Null)
            .unwrap_err()
            .is_not_found());
        assert_eq!(hooks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_fires_hook_once() {
        let (scheduler, clock) = scheduler();
        let a = scheduler
            .create_job("reminder", clock.now() + secs(10), Value::Null, None)
            .unwrap();
        let b = scheduler
            .create_job("reminder", clock.now() + secs(20), Value::Null, None)
            .unwrap();
        let hooks = hook_counter(&scheduler);

        scheduler.cancel_jobs([a.as_str(), b.as_str(), "reminder:absent"]);
        assert_eq!(hooks.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.armed_count(), 0);
    }

    #[tokio::test]
    async fn test_hook_sees_applied_mutation() {
        let (scheduler, clock) = scheduler();
        let observed = Arc::new(Mutex::new(Vec::new()));
        let reader = scheduler.clone();
        let sink = observed.clone();
        scheduler.set_on_modified(move || {
            sink.lock().unwrap().push(reader.handlers().len());
        });

        let id = scheduler
            .create_job("reminder", clock.now() + secs(10), Value::Null, None)
            .unwrap();
        scheduler.cancel_jobs([id]);

        assert_eq!(*observed.lock().unwrap(), vec![1, 0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_timer_job_is_still_consumed() {
        let (scheduler, clock) = scheduler();
        scheduler.on("explode", |_| async { Err::<(), BoxError>("boom".into()) });

        scheduler
            .create_job("explode", clock.now() + secs(5), Value::Null, None)
            .unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert!(scheduler.handlers().is_empty());
        assert_eq!(scheduler.armed_count(), 0);
    }

    #[test]
    fn test_scheduled_intent_serializes_camel_case() {
        let intent = ScheduledIntent {
            intent_type: "reminder".to_string(),
            arg: json!("hi"),
            execution_time: "2026-01-01T00:01:00Z".parse().unwrap(),
        };
        let value = serde_json::to_value(&intent).unwrap();
        assert_eq!(
            value,
            json!({"type": "reminder", "arg": "hi", "executionTime": "2026-01-01T00:01:00Z"})
        );
        assert!(intent.is_due_at("2026-01-01T00:01:00Z".parse().unwrap()));
    }
}
