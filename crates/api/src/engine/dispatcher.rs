//! Background job dispatcher.
//!
//! A fixed pool of `max_concurrent` worker tasks pulls job ids from an
//! unbounded FIFO queue. Each worker holds the queue lock from dequeue until
//! its job owns an execution slot, so jobs are admitted in submission order.
//! The same slots are handed to synchronous requests through
//! [`Dispatcher::acquire_slot`], keeping the ceiling global.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use voxgate_core::error::CoreError;
use voxgate_core::job::JobUpdate;
use voxgate_core::types::JobId;
use voxgate_store::JobRegistry;

use super::executor::JobExecutor;
use super::progress::MSG_SHUTDOWN;

/// Ceiling actually used for a backend.
///
/// Backends that are not re-entrant across adapters are limited to one job.
pub fn effective_ceiling(requested: usize, reentrant: bool) -> usize {
    let requested = requested.max(1);
    if requested > 1 && !reentrant {
        tracing::warn!(
            requested,
            "Inference backend is not re-entrant, limiting concurrency to 1",
        );
        return 1;
    }
    requested
}

/// State shared between the dispatcher handle and its workers.
struct Shared {
    tx: mpsc::UnboundedSender<JobId>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<JobId>>,
    slots: Arc<Semaphore>,
    /// Jobs accepted but not yet holding an execution slot, plus
    /// reservations.
    depth: AtomicUsize,
    max_queue_depth: Option<usize>,
    registry: Arc<JobRegistry>,
    executor: Arc<JobExecutor>,
    cancel: CancellationToken,
}

impl Shared {
    fn fail_unstarted(&self, job_id: &JobId) {
        if self.registry.update(
            job_id,
            JobUpdate::Fail {
                error: MSG_SHUTDOWN.to_string(),
            },
        ) {
            tracing::info!(job_id = %job_id, "Queued job failed on shutdown");
        }
    }
}

/// Handle to the worker pool.
pub struct Dispatcher {
    shared: Arc<Shared>,
    max_concurrent: usize,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Spawn the worker pool. Must be called within a Tokio runtime.
    pub fn start(
        registry: Arc<JobRegistry>,
        executor: Arc<JobExecutor>,
        max_concurrent: usize,
        max_queue_depth: Option<usize>,
    ) -> Self {
        let max_concurrent =
            effective_ceiling(max_concurrent, executor.synthesizer().is_reentrant());
        let (tx, rx) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            tx,
            rx: tokio::sync::Mutex::new(rx),
            slots: Arc::new(Semaphore::new(max_concurrent)),
            depth: AtomicUsize::new(0),
            max_queue_depth,
            registry,
            executor,
            cancel: CancellationToken::new(),
        });

        let workers = (0..max_concurrent)
            .map(|worker_id| tokio::spawn(worker_loop(worker_id, Arc::clone(&shared))))
            .collect();

        tracing::info!(
            max_concurrent,
            max_queue_depth = ?max_queue_depth,
            "Job dispatcher started",
        );

        Self {
            shared,
            max_concurrent,
            workers: Mutex::new(workers),
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Jobs waiting for an execution slot (including reservations).
    ///
    /// A dequeued job still counts until its slot is granted.
    pub fn queue_depth(&self) -> usize {
        self.shared.depth.load(Ordering::SeqCst)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    /// Reserve queue capacity ahead of creating a job.
    ///
    /// Fails with [`CoreError::Capacity`] when the queue is full or the
    /// dispatcher is shutting down. Dropping the reservation releases it.
    pub fn reserve(&self) -> Result<QueueReservation, CoreError> {
        if self.is_shutting_down() {
            return Err(shutting_down());
        }

        let shared = &self.shared;
        let reserved = shared
            .depth
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |depth| {
                match shared.max_queue_depth {
                    Some(max) if depth >= max => None,
                    _ => Some(depth + 1),
                }
            });
        if reserved.is_err() {
            return Err(CoreError::Capacity(format!(
                "Task queue is full ({} waiting)",
                self.queue_depth()
            )));
        }

        Ok(QueueReservation {
            shared: Arc::clone(&self.shared),
            armed: true,
        })
    }

    /// Enqueue `job_id` regardless of the queue-depth limit.
    pub fn submit(&self, job_id: JobId) -> Result<(), CoreError> {
        self.shared.depth.fetch_add(1, Ordering::SeqCst);
        enqueue(&self.shared, job_id)
    }

    /// Wait for one of the shared execution slots.
    ///
    /// Used by synchronous requests; fails once shutdown has begun.
    pub async fn acquire_slot(&self) -> Result<OwnedSemaphorePermit, CoreError> {
        tokio::select! {
            _ = self.shared.cancel.cancelled() => Err(shutting_down()),
            permit = Arc::clone(&self.shared.slots).acquire_owned() => {
                permit.map_err(|_| shutting_down())
            }
        }
    }

    /// Stop admitting work, fail every job still queued, and wait up to
    /// `timeout` for in-flight jobs to finish.
    pub async fn shutdown(&self, timeout: Duration) {
        let shared = &self.shared;
        shared.cancel.cancel();

        let mut drained = 0usize;
        {
            let mut rx = shared.rx.lock().await;
            rx.close();
            while let Ok(job_id) = rx.try_recv() {
                shared.depth.fetch_sub(1, Ordering::SeqCst);
                shared.fail_unstarted(&job_id);
                drained += 1;
            }
        }
        shared.slots.close();

        let workers = std::mem::take(
            &mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner),
        );
        let join_all = async {
            for worker in workers {
                let _ = worker.await;
            }
        };
        if tokio::time::timeout(timeout, join_all).await.is_err() {
            tracing::warn!(
                timeout_secs = timeout.as_secs(),
                "Dispatcher workers did not finish before the shutdown timeout",
            );
        }

        tracing::info!(drained, "Job dispatcher stopped");
    }
}

/// Queue capacity held between validation and enqueue.
pub struct QueueReservation {
    shared: Arc<Shared>,
    armed: bool,
}

impl QueueReservation {
    /// Enqueue `job_id` into the reserved slot.
    pub fn submit(mut self, job_id: JobId) -> Result<(), CoreError> {
        self.armed = false;
        enqueue(&self.shared, job_id)
    }
}

impl Drop for QueueReservation {
    fn drop(&mut self) {
        if self.armed {
            self.shared.depth.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// Send an already-counted job to the workers.
fn enqueue(shared: &Shared, job_id: JobId) -> Result<(), CoreError> {
    if shared.cancel.is_cancelled() || shared.tx.send(job_id).is_err() {
        shared.depth.fetch_sub(1, Ordering::SeqCst);
        shared.fail_unstarted(&job_id);
        return Err(shutting_down());
    }
    tracing::debug!(job_id = %job_id, "Job enqueued");
    Ok(())
}

fn shutting_down() -> CoreError {
    CoreError::Capacity("Server is shutting down".into())
}

async fn worker_loop(worker_id: usize, shared: Arc<Shared>) {
    tracing::debug!(worker_id, "Dispatcher worker started");
    let cancel = &shared.cancel;

    loop {
        let (job_id, slot) = {
            let mut rx = tokio::select! {
                _ = cancel.cancelled() => break,
                rx = shared.rx.lock() => rx,
            };

            let job_id = tokio::select! {
                _ = cancel.cancelled() => break,
                next = rx.recv() => match next {
                    Some(id) => id,
                    None => break,
                },
            };

            // Still holding the queue lock: the next job waits behind this one.
            let slot = tokio::select! {
                _ = cancel.cancelled() => None,
                permit = Arc::clone(&shared.slots).acquire_owned() => permit.ok(),
            };
            shared.depth.fetch_sub(1, Ordering::SeqCst);
            let Some(slot) = slot else {
                shared.fail_unstarted(&job_id);
                break;
            };
            (job_id, slot)
        };

        tracing::debug!(worker_id, job_id = %job_id, "Worker picked up job");
        // Outcome is recorded in the registry by the executor.
        let _ = shared.executor.run(job_id, slot).await;
    }

    tracing::debug!(worker_id, "Dispatcher worker stopped");
}
