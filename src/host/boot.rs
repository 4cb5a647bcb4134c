//! Boot-time job reconciliation.
//!
//! Jobs persisted by an earlier run are either overdue (their execution time
//! passed while the process was down) or still in the future. Overdue jobs
//! are replayed once and dropped; future jobs are re-armed under their
//! original id. Only scheduler primitives are used, and the scheduler's
//! modified-hook must not be installed yet.

use chrono::{DateTime, Utc};

use crate::scheduler::{JobTable, Scheduler};
use crate::types::JobId;

/// What reconciliation did with each persisted job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Overdue jobs whose callback ran successfully.
    pub fired: Vec<JobId>,
    /// Future jobs armed again under the same id.
    pub rearmed: Vec<JobId>,
    /// Overdue jobs whose replay failed, with the error message. Dropped
    /// like the fired ones.
    pub failed: Vec<(JobId, String)>,
}

impl ReconcileReport {
    pub fn total(&self) -> usize {
        self.fired.len() + self.rearmed.len() + self.failed.len()
    }
}

/// Replay overdue jobs and re-arm future ones.
pub async fn reconcile_jobs(
    scheduler: &Scheduler,
    jobs: JobTable,
    now: DateTime<Utc>,
) -> ReconcileReport {
    let mut report = ReconcileReport::default();

    for (job_id, intent) in jobs {
        if !intent.is_due_at(now) {
            let rearmed = scheduler.create_job(
                &intent.intent_type,
                intent.execution_time,
                intent.arg.clone(),
                Some(job_id.clone()),
            );
            if rearmed.is_some() {
                tracing::debug!(
                    "job_rearmed: id={}, execution_time={}",
                    job_id,
                    intent.execution_time
                );
                report.rearmed.push(job_id);
                continue;
            }
            tracing::warn!("job_rearm_rejected: id={}, replaying as overdue", job_id);
        }

        tracing::info!(
            "job_overdue: id={}, execution_time={}",
            job_id,
            intent.execution_time
        );
        match scheduler
            .invoke_callback(&intent.intent_type, intent.arg)
            .await
        {
            Ok(()) => report.fired.push(job_id),
            Err(e) => {
                tracing::error!("job_replay_failed: id={}, error={}", job_id, e);
                report.failed.push((job_id, e.to_string()));
            }
        }
    }

    tracing::info!(
        "jobs_reconciled: fired={}, rearmed={}, failed={}",
        report.fired.len(),
        report.rearmed.len(),
        report.failed.len()
    );
    report
}
