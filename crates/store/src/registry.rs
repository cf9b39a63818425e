//! Thread-safe, in-memory job registry.
//!
//! The index (`id -> entry`) sits behind a read-mostly `RwLock`; each job has
//! its own `Mutex`. Updates take the index lock in shared mode just long
//! enough to clone the entry handle, so updates to different jobs never
//! contend on an exclusive lock. The index is written only by `create` and
//! `prune_finished_before`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use chrono::Utc;
use voxgate_core::job::{Job, JobStatus, JobUpdate};
use voxgate_core::synthesis::SynthesisRequest;
use voxgate_core::types::{JobId, Timestamp};

/// One registry slot. `seq` records insertion order for stable listing.
#[derive(Debug)]
struct Entry {
    seq: u64,
    job: Job,
}

type EntryHandle = Arc<Mutex<Entry>>;

/// Result of [`JobRegistry::snapshot`].
#[derive(Debug, Clone)]
pub struct RegistrySnapshot {
    /// Matching jobs, most recent first.
    pub jobs: Vec<Job>,
    /// Jobs in `processing` across the whole registry.
    pub processing: usize,
    /// Jobs in `pending` across the whole registry.
    pub pending: usize,
}

/// Authoritative store of every job known to the process.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, EntryHandle>>,
    next_seq: AtomicU64,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new `pending` job and return its id.
    pub fn create(&self, request: SynthesisRequest, estimated_duration: f64) -> JobId {
        let id = JobId::new();
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let job = Job::new(id, request, estimated_duration, Utc::now());

        let entry = Arc::new(Mutex::new(Entry { seq, job }));
        self.jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, entry);

        tracing::debug!(job_id = %id, "Job registered");
        id
    }

    /// Snapshot of the job, or `None` if the id is unknown.
    pub fn get(&self, id: &JobId) -> Option<Job> {
        let entry = self.entry(id)?;
        let job = lock(&entry).job.clone();
        Some(job)
    }

    /// Jobs ordered most-recent-first, optionally filtered by exact status,
    /// truncated to `limit`.
    pub fn list(&self, filter: Option<JobStatus>, limit: usize) -> Vec<Job> {
        self.snapshot(filter, limit).jobs
    }

    /// A listing and the active-state counts taken at a single instant.
    ///
    /// Every job lock is held at once while the view is built, so no
    /// transition can land between counting and listing. Locks are taken in
    /// address order to keep concurrent snapshots from deadlocking.
    pub fn snapshot(&self, filter: Option<JobStatus>, limit: usize) -> RegistrySnapshot {
        let mut handles = self.handles();
        handles.sort_by_key(|entry| Arc::as_ptr(entry) as usize);
        let guards: Vec<MutexGuard<'_, Entry>> = handles.iter().map(|e| lock(e)).collect();

        let mut processing = 0;
        let mut pending = 0;
        let mut matched: Vec<(u64, &Job)> = Vec::new();
        for entry in &guards {
            match entry.job.status {
                JobStatus::Processing => processing += 1,
                JobStatus::Pending => pending += 1,
                _ => {}
            }
            if filter.map_or(true, |status| entry.job.status == status) {
                matched.push((entry.seq, &entry.job));
            }
        }

        matched.sort_by(|(seq_a, a), (seq_b, b)| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| seq_b.cmp(seq_a))
        });
        let jobs = matched
            .into_iter()
            .take(limit)
            .map(|(_, job)| job.clone())
            .collect();

        RegistrySnapshot {
            jobs,
            processing,
            pending,
        }
    }

    /// Apply `update` to the job atomically.
    ///
    /// Returns `false` (and logs) when the id is unknown or the transition is
    /// illegal; the job is left untouched in both cases.
    pub fn update(&self, id: &JobId, update: JobUpdate) -> bool {
        let Some(entry) = self.entry(id) else {
            tracing::warn!(job_id = %id, "Update for unknown job ignored");
            return false;
        };

        let mut entry = lock(&entry);
        match entry.job.apply(update, Utc::now()) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(job_id = %id, error = %e, "Job update rejected");
                false
            }
        }
    }

    /// Number of jobs currently in `status`.
    pub fn count_by_state(&self, status: JobStatus) -> usize {
        self.handles()
            .iter()
            .filter(|entry| lock(entry).job.status == status)
            .count()
    }

    /// Total number of registered jobs.
    pub fn len(&self) -> usize {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop terminal jobs last updated before `cutoff`. Returns the number
    /// of jobs removed. Non-terminal jobs are never pruned.
    pub fn prune_finished_before(&self, cutoff: Timestamp) -> usize {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        let before = jobs.len();
        jobs.retain(|_, entry| {
            let entry = lock(entry);
            !(entry.job.status.is_terminal() && entry.job.updated_at < cutoff)
        });
        before - jobs.len()
    }

    fn entry(&self, id: &JobId) -> Option<EntryHandle> {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Clone every entry handle so per-job locks are taken without holding
    /// the index lock.
    fn handles(&self) -> Vec<EntryHandle> {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}

fn lock(entry: &Mutex<Entry>) -> MutexGuard<'_, Entry> {
    entry.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
