//! In-memory job store
//!
//! Keeps records in a mutex-guarded map. Each call holds the lock for its
//! whole read-check-write, which gives the same per-call atomicity as a single
//! Postgres statement.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shipyard_core::domain::job::{Job, JobKind, JobStatus};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::{JobPatch, JobStore, Precondition, Result, StoreError, UpdateOutcome};

#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<Uuid, Job>>,
    unavailable: AtomicBool,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail with `StoreError::Unavailable`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<Uuid, Job>>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store marked unavailable".to_string()));
        }
        self.jobs
            .lock()
            .map_err(|_| StoreError::Unavailable("job map lock poisoned".to_string()))
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, job: &Job) -> Result<()> {
        let mut jobs = self.lock()?;
        if jobs.contains_key(&job.id) {
            return Err(StoreError::Duplicate(job.id));
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn find_by_id(&self, kind: JobKind, id: Uuid) -> Result<Option<Job>> {
        let jobs = self.lock()?;
        Ok(jobs.get(&id).filter(|job| job.kind == kind).cloned())
    }

    async fn find_by_status(&self, kind: JobKind, status: JobStatus) -> Result<Vec<Job>> {
        let jobs = self.lock()?;
        let mut found: Vec<Job> = jobs
            .values()
            .filter(|job| job.kind == kind && job.status == status)
            .cloned()
            .collect();
        found.sort_by_key(|job| job.created_at);
        Ok(found)
    }

    async fn find_by_subject(&self, kind: JobKind, subject_id: Uuid) -> Result<Vec<Job>> {
        let jobs = self.lock()?;
        let mut found: Vec<Job> = jobs
            .values()
            .filter(|job| job.kind == kind && job.subject_id == subject_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn update(
        &self,
        kind: JobKind,
        id: Uuid,
        patch: &JobPatch,
        precondition: &Precondition,
    ) -> Result<UpdateOutcome> {
        let mut jobs = self.lock()?;
        let Some(job) = jobs.get_mut(&id).filter(|job| job.kind == kind) else {
            return Ok(UpdateOutcome::NotFound);
        };

        if !precondition.holds(job) {
            return Ok(UpdateOutcome::Rejected(job.clone()));
        }

        patch.apply(job);
        Ok(UpdateOutcome::Updated(job.clone()))
    }

    async fn cancel_active(
        &self,
        kind: JobKind,
        subject_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Vec<Job>> {
        let mut jobs = self.lock()?;
        let patch = JobPatch::new(at)
            .status(JobStatus::Cancelled)
            .completed_at(Some(at))
            .error(None);

        let mut cancelled = Vec::new();
        for job in jobs.values_mut() {
            if job.kind == kind && job.subject_id == subject_id && job.is_active() {
                patch.apply(job);
                cancelled.push(job.clone());
            }
        }
        Ok(cancelled)
    }
}
