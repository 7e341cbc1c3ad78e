//! Repository Module
//!
//! Data access layer for job records. `JobStore` is the seam the lifecycle
//! controller writes through; `PgJobStore` backs it with Postgres and
//! `MemoryJobStore` keeps records in process (tests, local runs).

pub mod job;
pub mod memory;

pub use job::PgJobStore;
pub use memory::MemoryJobStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shipyard_core::domain::job::{Job, JobKind, JobStatus};
use uuid::Uuid;

/// Store error type
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("job store unavailable: {0}")]
    Unavailable(String),

    #[error("job {0} already exists")]
    Duplicate(Uuid),

    #[error("corrupt job record {id}: {reason}")]
    Corrupt { id: Uuid, reason: String },
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Persistent record of build and deployment jobs
///
/// Every call is a single store transaction. `update` and `cancel_active`
/// apply their precondition and their writes atomically.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert(&self, job: &Job) -> Result<()>;

    async fn find_by_id(&self, kind: JobKind, id: Uuid) -> Result<Option<Job>>;

    /// Oldest first
    async fn find_by_status(&self, kind: JobKind, status: JobStatus) -> Result<Vec<Job>>;

    /// Newest first
    async fn find_by_subject(&self, kind: JobKind, subject_id: Uuid) -> Result<Vec<Job>>;

    /// Applies a field-scoped patch to one record if `precondition` holds
    async fn update(
        &self,
        kind: JobKind,
        id: Uuid,
        patch: &JobPatch,
        precondition: &Precondition,
    ) -> Result<UpdateOutcome>;

    /// Moves every non-terminal job of a subject to `Cancelled`
    ///
    /// Returns the records that changed.
    async fn cancel_active(
        &self,
        kind: JobKind,
        subject_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Vec<Job>>;
}

/// Result of a conditional update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated(Job),
    NotFound,
    /// Precondition failed; carries the record as it currently stands
    Rejected(Job),
}

/// Field-scoped change to a job record
///
/// Unset fields are left as stored. `updated_at` and `version` are always
/// refreshed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub started_at: Option<DateTime<Utc>>,
    /// `Some(None)` clears the stored completion time
    pub completed_at: Option<Option<DateTime<Utc>>>,
    /// `Some(None)` clears the stored error
    pub error: Option<Option<String>>,
    pub kubernetes_job_name: Option<String>,
    pub kubernetes_job_status: Option<String>,
    pub increment_attempts: bool,
    pub updated_at: DateTime<Utc>,
}

impl JobPatch {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            status: None,
            started_at: None,
            completed_at: None,
            error: None,
            kubernetes_job_name: None,
            kubernetes_job_status: None,
            increment_attempts: false,
            updated_at: at,
        }
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn started_at(mut self, at: DateTime<Utc>) -> Self {
        self.started_at = Some(at);
        self
    }

    pub fn completed_at(mut self, at: Option<DateTime<Utc>>) -> Self {
        self.completed_at = Some(at);
        self
    }

    pub fn error(mut self, error: Option<String>) -> Self {
        self.error = Some(error);
        self
    }

    pub fn kubernetes_job_name(mut self, name: impl Into<String>) -> Self {
        self.kubernetes_job_name = Some(name.into());
        self
    }

    pub fn kubernetes_job_status(mut self, status: impl Into<String>) -> Self {
        self.kubernetes_job_status = Some(status.into());
        self
    }

    pub fn increment_attempts(mut self) -> Self {
        self.increment_attempts = true;
        self
    }

    /// Applies the patch to an in-memory record
    pub fn apply(&self, job: &mut Job) {
        if let Some(status) = self.status {
            job.status = status;
        }
        if let Some(at) = self.started_at {
            job.started_at = Some(at);
        }
        if let Some(at) = self.completed_at {
            job.completed_at = at;
        }
        if let Some(error) = &self.error {
            job.error = error.clone();
        }
        if let Some(name) = &self.kubernetes_job_name {
            job.kubernetes_job_name = Some(name.clone());
        }
        if let Some(status) = &self.kubernetes_job_status {
            job.kubernetes_job_status = Some(status.clone());
        }
        if self.increment_attempts {
            job.attempts += 1;
        }
        job.updated_at = self.updated_at;
        job.version += 1;
    }
}

/// Conditions checked by the store before applying a patch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Precondition {
    /// Current status must be one of these
    pub status_in: Option<Vec<JobStatus>>,
    /// No execution handle may be recorded yet
    pub handle_unassigned: bool,
}

impl Precondition {
    /// Unconditional write
    pub fn none() -> Self {
        Self::default()
    }

    pub fn status_in(statuses: &[JobStatus]) -> Self {
        Self {
            status_in: Some(statuses.to_vec()),
            handle_unassigned: false,
        }
    }

    pub fn handle_unassigned() -> Self {
        Self {
            status_in: None,
            handle_unassigned: true,
        }
    }

    pub fn holds(&self, job: &Job) -> bool {
        let status_ok = self
            .status_in
            .as_ref()
            .is_none_or(|allowed| allowed.contains(&job.status));
        let handle_ok = !self.handle_unassigned || job.kubernetes_job_name.is_none();
        status_ok && handle_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_apply_touches_only_set_fields() {
        let mut job = Job::queued(JobKind::Build, Uuid::new_v4());
        let before = job.clone();
        let at = Utc::now();

        JobPatch::new(at).kubernetes_job_status("Running").apply(&mut job);

        assert_eq!(job.kubernetes_job_status.as_deref(), Some("Running"));
        assert_eq!(job.status, before.status);
        assert_eq!(job.started_at, before.started_at);
        assert_eq!(job.error, before.error);
        assert_eq!(job.updated_at, at);
        assert_eq!(job.version, before.version + 1);
    }

    #[test]
    fn test_patch_clears_error() {
        let mut job = Job::queued(JobKind::Build, Uuid::new_v4());
        job.error = Some("boom".to_string());

        JobPatch::new(Utc::now()).error(None).apply(&mut job);
        assert!(job.error.is_none());
    }

    #[test]
    fn test_patch_clears_completed_at() {
        let mut job = Job::queued(JobKind::Build, Uuid::new_v4());
        job.completed_at = Some(Utc::now());

        JobPatch::new(Utc::now()).apply(&mut job);
        assert!(job.completed_at.is_some());

        JobPatch::new(Utc::now()).completed_at(None).apply(&mut job);
        assert!(job.completed_at.is_none());
    }

    #[test]
    fn test_precondition_holds() {
        let mut job = Job::queued(JobKind::Deployment, Uuid::new_v4());

        assert!(Precondition::none().holds(&job));
        assert!(Precondition::status_in(&[JobStatus::Queued]).holds(&job));
        assert!(!Precondition::status_in(&[JobStatus::Running]).holds(&job));
        assert!(Precondition::handle_unassigned().holds(&job));

        job.kubernetes_job_name = Some("deploy-1".to_string());
        assert!(!Precondition::handle_unassigned().holds(&job));
    }
}
