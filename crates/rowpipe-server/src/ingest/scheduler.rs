//! Job scheduler
//!
//! Bounded-concurrency, in-process FIFO queue in front of a [`JobProcessor`].
//!
//! Admission is gated by a semaphore with one permit per worker slot. Dispatch never
//! waits: it takes permits with `try_acquire_owned` and stops when none are left. Each
//! admitted job runs on its own task, which gives back the permit, delivers the outcome
//! to subscribers and dispatches again.
//!
//! The durable job record is the source of truth. On startup [`JobScheduler::recover`]
//! re-queues every job still `queued` or `running`, so a job interrupted mid-run is
//! processed again from the start of its stream. A `running` record is put back to
//! `queued` before its entry is added, which keeps it cancellable like any other
//! pending job.

use chrono::Utc;
use futures::FutureExt;
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::{oneshot, Semaphore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::store::{JobStore, StoreError};
use super::types::{JobOutcome, JobPatch, JobStatus, QueueEntry};
use super::worker::JobProcessor;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Job {0} is not queued in this scheduler")]
    NotFound(Uuid),

    #[error("Job {0} is already running and cannot be cancelled")]
    AlreadyRunning(Uuid),

    #[error("Job {0} is no longer queued and cannot be cancelled")]
    NotCancellable(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One-time handle resolving to a job's outcome
#[derive(Debug)]
pub struct Completion {
    rx: oneshot::Receiver<JobOutcome>,
}

impl Completion {
    /// Wait for the job to finish. `None` if the scheduler went away first.
    pub async fn wait(self) -> Option<JobOutcome> {
        self.rx.await.ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStats {
    pub pending: usize,
    pub running: usize,
    pub concurrency: usize,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<QueueEntry>,
    pending_ids: HashSet<Uuid>,
    admitted: HashSet<Uuid>,
    waiters: HashMap<Uuid, Vec<oneshot::Sender<JobOutcome>>>,
}

impl QueueState {
    fn is_tracked(&self, job_id: &Uuid) -> bool {
        self.pending_ids.contains(job_id) || self.admitted.contains(job_id)
    }

    fn enqueue(&mut self, entry: QueueEntry) -> bool {
        if self.is_tracked(&entry.job_id) {
            return false;
        }
        self.pending_ids.insert(entry.job_id);
        self.pending.push_back(entry);
        true
    }

    /// Pop the oldest pending entry that is not already running and mark it admitted
    fn admit_next(&mut self) -> Option<QueueEntry> {
        while let Some(entry) = self.pending.pop_front() {
            self.pending_ids.remove(&entry.job_id);
            if self.admitted.insert(entry.job_id) {
                return Some(entry);
            }
        }
        None
    }

    fn subscribe(&mut self, job_id: Uuid) -> Completion {
        let (tx, rx) = oneshot::channel();
        self.waiters.entry(job_id).or_default().push(tx);
        Completion { rx }
    }
}

struct Inner {
    processor: Arc<dyn JobProcessor>,
    jobs: Arc<dyn JobStore>,
    permits: Arc<Semaphore>,
    concurrency: usize,
    state: Mutex<QueueState>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dispatch(self: &Arc<Self>) {
        loop {
            let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() else {
                return;
            };
            let Some(entry) = self.state().admit_next() else {
                return;
            };

            info!(job_id = %entry.job_id, blob_ref = %entry.blob_ref, "Job admitted");

            let inner = Arc::clone(self);
            tokio::spawn(async move {
                let job_id = entry.job_id;
                let outcome = AssertUnwindSafe(inner.processor.process(entry))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| {
                        error!(job_id = %job_id, "Worker panicked");
                        JobOutcome::Failed {
                            error: "worker panicked".to_string(),
                        }
                    });

                let waiters = {
                    let mut state = inner.state();
                    state.admitted.remove(&job_id);
                    state.waiters.remove(&job_id).unwrap_or_default()
                };
                drop(permit);

                notify(waiters, &outcome);
                inner.dispatch();
            });
        }
    }
}

fn notify(waiters: Vec<oneshot::Sender<JobOutcome>>, outcome: &JobOutcome) {
    for waiter in waiters {
        // receiver dropped means nobody is waiting any more
        let _ = waiter.send(outcome.clone());
    }
}

/// Owned scheduler handle; clones share the same queue
#[derive(Clone)]
pub struct JobScheduler {
    inner: Arc<Inner>,
}

impl JobScheduler {
    pub fn new(
        processor: Arc<dyn JobProcessor>,
        jobs: Arc<dyn JobStore>,
        concurrency: usize,
    ) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            inner: Arc::new(Inner {
                processor,
                jobs,
                permits: Arc::new(Semaphore::new(concurrency)),
                concurrency,
                state: Mutex::new(QueueState::default()),
            }),
        }
    }

    /// Re-queue every unfinished job, oldest first. Returns how many entries were added.
    ///
    /// Jobs this scheduler already tracks are left alone. An untracked `running` job was
    /// interrupted and is moved back to `queued` in the store first; if its status changed
    /// in the meantime it is skipped.
    pub async fn recover(&self) -> Result<usize, SchedulerError> {
        let unfinished = self
            .inner
            .jobs
            .find_by_status(&JobStatus::unfinished(), None)
            .await?;
        let found = unfinished.len();

        let mut entries = Vec::with_capacity(found);
        for job in unfinished {
            if self.is_queued(job.id) {
                continue;
            }

            if job.status == JobStatus::Running {
                if self.inner.jobs.update(job.id, &JobPatch::requeued()).await?.is_none() {
                    debug!(job_id = %job.id, "Job status changed during recovery, skipping");
                    continue;
                }
                info!(job_id = %job.id, attempts = job.attempts, "Requeued interrupted job");
            }

            entries.push(job.queue_entry());
        }

        let enqueued = {
            let mut state = self.inner.state();
            entries
                .into_iter()
                .map(|entry| state.enqueue(entry))
                .filter(|added| *added)
                .count()
        };

        info!(found, enqueued, "Recovered unfinished jobs");
        self.inner.dispatch();

        Ok(enqueued)
    }

    /// Queue a job and return a handle to its outcome. A job that is already pending or
    /// running is not queued twice; the handle still resolves when it finishes.
    pub fn submit(&self, entry: QueueEntry) -> Completion {
        let completion = {
            let mut state = self.inner.state();
            let completion = state.subscribe(entry.job_id);
            let job_id = entry.job_id;
            if !state.enqueue(entry) {
                debug!(job_id = %job_id, "Job already queued or running, not enqueued again");
            }
            completion
        };

        self.inner.dispatch();
        completion
    }

    /// Completion handle for a pending or running job
    pub fn subscribe(&self, job_id: Uuid) -> Option<Completion> {
        let mut state = self.inner.state();
        state
            .is_tracked(&job_id)
            .then(|| state.subscribe(job_id))
    }

    /// Cancel a job that has not been admitted yet.
    ///
    /// The entry leaves the queue and subscribers receive [`JobOutcome::Cancelled`] even
    /// if persisting the cancellation fails; that failure is logged and returned. A stored
    /// record that is no longer `queued` gives [`SchedulerError::NotCancellable`].
    pub async fn cancel(&self, job_id: Uuid) -> Result<(), SchedulerError> {
        let waiters = {
            let mut state = self.inner.state();
            if state.admitted.contains(&job_id) {
                warn!(job_id = %job_id, "Refusing to cancel a running job");
                return Err(SchedulerError::AlreadyRunning(job_id));
            }
            if !state.pending_ids.remove(&job_id) {
                return Err(SchedulerError::NotFound(job_id));
            }
            state.pending.retain(|entry| entry.job_id != job_id);
            state.waiters.remove(&job_id).unwrap_or_default()
        };

        notify(waiters, &JobOutcome::Cancelled);

        match self
            .inner
            .jobs
            .update(job_id, &JobPatch::cancelled(Utc::now()))
            .await
        {
            Ok(Some(_)) => {
                info!(job_id = %job_id, "Job cancelled");
                Ok(())
            }
            Ok(None) => {
                warn!(job_id = %job_id, "Job record was no longer queued, cancellation not persisted");
                Err(SchedulerError::NotCancellable(job_id))
            }
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Failed to persist cancellation");
                Err(e.into())
            }
        }
    }

    pub fn stats(&self) -> SchedulerStats {
        let state = self.inner.state();
        SchedulerStats {
            pending: state.pending.len(),
            running: state.admitted.len(),
            concurrency: self.inner.concurrency,
        }
    }

    pub fn is_queued(&self, job_id: Uuid) -> bool {
        self.inner.state().is_tracked(&job_id)
    }
}
