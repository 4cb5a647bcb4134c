//! Single-fire timers on the tokio runtime.
//!
//! A timer is a spawned task that sleeps until its deadline and then runs the
//! supplied future once. Cancelling aborts the task; a timer whose future has
//! already started keeps running (cancellation racing a firing timer is
//! tolerated by callers).

use chrono::{DateTime, Utc};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

/// Longest single sleep. Far deadlines are reached in steps of this size so no
/// single sleep exceeds what the tokio timer wheel can represent.
const MAX_SLEEP_STEP: Duration = Duration::from_secs(30 * 24 * 3600);

/// Why the timer facility refused an execution time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Execution time is not strictly in the future.
    NotInFuture,
    /// Execution time cannot be expressed as a runtime deadline.
    Unrepresentable,
    /// No tokio runtime is available to drive the timer.
    NoRuntime,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::NotInFuture => write!(f, "execution time is not in the future"),
            Rejection::Unrepresentable => write!(f, "execution time is out of range"),
            Rejection::NoRuntime => write!(f, "no tokio runtime available"),
        }
    }
}

/// Handle to an armed timer.
#[derive(Debug)]
pub struct TimerHandle {
    task: JoinHandle<()>,
    due: DateTime<Utc>,
}

impl TimerHandle {
    /// Wall-clock instant the timer was armed for.
    pub fn due(&self) -> DateTime<Utc> {
        self.due
    }

    /// Abort the timer task.
    pub fn cancel(self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Arm a timer that runs `fire` once `due` is reached.
///
/// `now` is the wall-clock reading `due` is measured against; the remaining
/// delay is converted to a monotonic runtime deadline.
pub fn arm<F>(due: DateTime<Utc>, now: DateTime<Utc>, fire: F) -> Result<TimerHandle, Rejection>
where
    F: Future<Output = ()> + Send + 'static,
{
    if due <= now {
        return Err(Rejection::NotInFuture);
    }

    let delay = (due - now).to_std().map_err(|_| Rejection::Unrepresentable)?;
    let deadline = Instant::now()
        .checked_add(delay)
        .ok_or(Rejection::Unrepresentable)?;
    let runtime = tokio::runtime::Handle::try_current().map_err(|_| Rejection::NoRuntime)?;

    let task = runtime.spawn(async move {
        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let step = now
                .checked_add(MAX_SLEEP_STEP)
                .map_or(deadline, |step| step.min(deadline));
            sleep_until(step).await;
        }
        fire.await;
    });

    Ok(TimerHandle { task, due })
}
