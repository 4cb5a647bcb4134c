//! Time-scheduled callbacks.
//!
//! - [`Scheduler`]: job id → scheduled intent, one tokio timer per pending job
//! - [`timer`]: the single-fire timer facility jobs are armed with
//!
//! Jobs are one-shot. A job is removed from the table before its callback
//! runs, so a given id is dispatched at most once.

mod jobs;
pub mod timer;

pub use jobs::{JobCallback, JobTable, ScheduledIntent, Scheduler};
pub use timer::Rejection;
