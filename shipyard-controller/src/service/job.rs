//! Job Service
//!
//! Lifecycle controller for build and deployment jobs. It is the only writer
//! of `status`, `started_at`, `completed_at` and `error`, and the bridge that
//! records which Kubernetes Job backs a record.

use chrono::Utc;
use shipyard_core::domain::job::{Job, JobKind, JobStatus};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use crate::repository::{JobPatch, JobStore, Precondition, StoreError, UpdateOutcome};

/// Longest execution handle accepted (Kubernetes object name limit)
const MAX_HANDLE_LEN: usize = 253;

/// Used when a failure is reported without any detail
const DEFAULT_FAILURE_MESSAGE: &str = "job failed without a reported reason";

/// Service error type
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("{kind} job {id} not found")]
    NotFound { kind: JobKind, id: Uuid },

    #[error("cannot move job {id} from {from} to {to}")]
    InvalidTransition {
        id: Uuid,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("job {id} is already backed by '{existing}'")]
    HandleAlreadyAssigned { id: Uuid, existing: String },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("persistence error: {0}")]
    Persistence(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, ControllerError>;

/// How transitions treat a record that is not in the expected source state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransitionPolicy {
    /// Write regardless of current status; the last writer wins
    #[default]
    LastWriteWins,
    /// Compare-and-swap on status; illegal transitions are rejected
    Strict,
}

impl fmt::Display for TransitionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionPolicy::LastWriteWins => f.write_str("last-write-wins"),
            TransitionPolicy::Strict => f.write_str("strict"),
        }
    }
}

impl FromStr for TransitionPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "last-write-wins" | "lww" => Ok(TransitionPolicy::LastWriteWins),
            "strict" => Ok(TransitionPolicy::Strict),
            other => Err(format!("unknown transition policy '{}'", other)),
        }
    }
}

/// Lifecycle controller for one job kind
#[derive(Clone)]
pub struct JobController {
    kind: JobKind,
    store: Arc<dyn JobStore>,
    policy: TransitionPolicy,
}

impl JobController {
    pub fn new(kind: JobKind, store: Arc<dyn JobStore>, policy: TransitionPolicy) -> Self {
        Self {
            kind,
            store,
            policy,
        }
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    /// Create a new `Queued` job for a subject
    ///
    /// No check is made for other active jobs of the same subject; callers
    /// wanting supersede semantics call `mark_cancelled` first.
    pub async fn create(&self, subject_id: Uuid) -> Result<Job> {
        let job = Job::queued(self.kind, subject_id);
        self.store.insert(&job).await?;

        tracing::info!(
            "{} job created: {} for subject: {}",
            self.kind,
            job.id,
            subject_id
        );

        Ok(job)
    }

    /// Get a job by ID
    pub async fn get(&self, id: Uuid) -> Result<Job> {
        self.store
            .find_by_id(self.kind, id)
            .await?
            .ok_or(ControllerError::NotFound {
                kind: self.kind,
                id,
            })
    }

    /// Move a job to `Running` and stamp `started_at`
    ///
    /// Not idempotent: a repeated call moves `started_at` forward.
    pub async fn mark_started(&self, id: Uuid) -> Result<Job> {
        self.transition(id, JobStatus::Running, &[JobStatus::Queued], started_patch())
            .await
    }

    /// Move a job to `Completed` and stamp `completed_at`
    pub async fn mark_completed(&self, id: Uuid) -> Result<Job> {
        self.transition(id, JobStatus::Completed, &[JobStatus::Running], completed_patch())
            .await
    }

    /// Move a job to `Failed`, stamp `completed_at` and store the reason
    pub async fn mark_failed(&self, id: Uuid, message: impl Into<String>) -> Result<Job> {
        self.transition(
            id,
            JobStatus::Failed,
            &[JobStatus::Running],
            failed_patch(message.into()),
        )
        .await
    }

    /// `mark_started`, but only while the job is still `Queued`
    ///
    /// Always status-guarded whatever the policy. Returns `None` when the job
    /// has moved on, e.g. it was cancelled concurrently.
    pub async fn try_mark_started(&self, id: Uuid) -> Result<Option<Job>> {
        self.try_transition(id, JobStatus::Running, &[JobStatus::Queued], &started_patch())
            .await
    }

    /// `mark_completed`, but only while the job is `Running`
    pub async fn try_mark_completed(&self, id: Uuid) -> Result<Option<Job>> {
        self.try_transition(
            id,
            JobStatus::Completed,
            &[JobStatus::Running],
            &completed_patch(),
        )
        .await
    }

    /// `mark_failed`, but only while the job is `Running`
    pub async fn try_mark_failed(
        &self,
        id: Uuid,
        message: impl Into<String>,
    ) -> Result<Option<Job>> {
        self.try_transition(
            id,
            JobStatus::Failed,
            &[JobStatus::Running],
            &failed_patch(message.into()),
        )
        .await
    }

    /// Cancel every non-terminal job of a subject
    ///
    /// Already-terminal jobs are left untouched. The backing Kubernetes Jobs
    /// are not deleted here.
    pub async fn mark_cancelled(&self, subject_id: Uuid) -> Result<Vec<Job>> {
        let cancelled = self
            .store
            .cancel_active(self.kind, subject_id, Utc::now())
            .await?;

        if cancelled.is_empty() {
            tracing::debug!(
                "No active {} jobs to cancel for subject {}",
                self.kind,
                subject_id
            );
        } else {
            tracing::info!(
                "Cancelled {} {} job(s) for subject {}",
                cancelled.len(),
                self.kind,
                subject_id
            );
        }

        Ok(cancelled)
    }

    /// Record the name of the Kubernetes Job backing this record
    ///
    /// A handle is assigned once. Repeating the same name is a no-op; a
    /// different name is rejected.
    pub async fn assign_execution_handle(&self, id: Uuid, handle: &str) -> Result<Job> {
        validate_handle(handle)?;

        let patch = JobPatch::new(Utc::now()).kubernetes_job_name(handle);
        let outcome = self
            .store
            .update(self.kind, id, &patch, &Precondition::handle_unassigned())
            .await?;

        match outcome {
            UpdateOutcome::Updated(job) => {
                tracing::info!("Job {} assigned execution handle {}", id, handle);
                Ok(job)
            }
            UpdateOutcome::Rejected(current) => {
                if current.kubernetes_job_name.as_deref() == Some(handle) {
                    return Ok(current);
                }
                match current.kubernetes_job_name {
                    Some(existing) => Err(ControllerError::HandleAlreadyAssigned { id, existing }),
                    // Handle was cleared between the update and the re-read
                    None => Err(ControllerError::Persistence(StoreError::Unavailable(
                        format!("concurrent modification of job {}", id),
                    ))),
                }
            }
            UpdateOutcome::NotFound => Err(ControllerError::NotFound {
                kind: self.kind,
                id,
            }),
        }
    }

    /// Store the raw status last reported by the execution backend
    ///
    /// Purely observational: lifecycle fields are never touched.
    pub async fn record_execution_status(&self, id: Uuid, raw_status: &str) -> Result<Job> {
        let patch = JobPatch::new(Utc::now()).kubernetes_job_status(raw_status);
        let job = self.update_unconditionally(id, &patch).await?;

        tracing::debug!("Job {} execution status: {}", id, raw_status);

        Ok(job)
    }

    /// Count one more execution attempt
    ///
    /// Called by the scheduler when it (re)launches work; retry decisions stay
    /// with the scheduler.
    pub async fn record_attempt(&self, id: Uuid) -> Result<Job> {
        let patch = JobPatch::new(Utc::now()).increment_attempts();
        let job = self.update_unconditionally(id, &patch).await?;

        tracing::info!("Job {} attempt {}", id, job.attempts);

        Ok(job)
    }

    /// List jobs by status, oldest first
    pub async fn list_by_status(&self, status: JobStatus) -> Result<Vec<Job>> {
        let jobs = self.store.find_by_status(self.kind, status).await?;
        Ok(jobs)
    }

    /// List every job of a subject, newest first
    pub async fn list_by_subject(&self, subject_id: Uuid) -> Result<Vec<Job>> {
        let jobs = self.store.find_by_subject(self.kind, subject_id).await?;
        Ok(jobs)
    }

    /// Jobs of a subject that are `Queued` or `Running`
    pub async fn active_for_subject(&self, subject_id: Uuid) -> Result<Vec<Job>> {
        let jobs = self.list_by_subject(subject_id).await?;
        Ok(jobs.into_iter().filter(Job::is_active).collect())
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn transition(
        &self,
        id: Uuid,
        to: JobStatus,
        expected_from: &[JobStatus],
        patch: JobPatch,
    ) -> Result<Job> {
        let guarded = self
            .store
            .update(self.kind, id, &patch, &Precondition::status_in(expected_from))
            .await?;

        let job = match guarded {
            UpdateOutcome::Updated(job) => job,
            UpdateOutcome::NotFound => {
                return Err(ControllerError::NotFound {
                    kind: self.kind,
                    id,
                });
            }
            UpdateOutcome::Rejected(current) => match self.policy {
                TransitionPolicy::Strict => {
                    tracing::warn!(
                        "Rejected transition of job {} from {} to {}",
                        id,
                        current.status,
                        to
                    );
                    return Err(ControllerError::InvalidTransition {
                        id,
                        from: current.status,
                        to,
                    });
                }
                TransitionPolicy::LastWriteWins => {
                    tracing::warn!(
                        "Moving job {} to {} from unexpected state {}",
                        id,
                        to,
                        current.status
                    );
                    self.update_unconditionally(id, &patch).await?
                }
            },
        };

        tracing::info!("Job {} transitioned to {}", id, to);

        Ok(job)
    }

    async fn try_transition(
        &self,
        id: Uuid,
        to: JobStatus,
        expected_from: &[JobStatus],
        patch: &JobPatch,
    ) -> Result<Option<Job>> {
        let outcome = self
            .store
            .update(self.kind, id, patch, &Precondition::status_in(expected_from))
            .await?;

        match outcome {
            UpdateOutcome::Updated(job) => {
                tracing::info!("Job {} transitioned to {}", id, to);
                Ok(Some(job))
            }
            UpdateOutcome::Rejected(current) => {
                tracing::debug!(
                    "Job {} is {}, leaving it instead of moving to {}",
                    id,
                    current.status,
                    to
                );
                Ok(None)
            }
            UpdateOutcome::NotFound => Err(ControllerError::NotFound {
                kind: self.kind,
                id,
            }),
        }
    }

    async fn update_unconditionally(&self, id: Uuid, patch: &JobPatch) -> Result<Job> {
        match self
            .store
            .update(self.kind, id, patch, &Precondition::none())
            .await?
        {
            UpdateOutcome::Updated(job) | UpdateOutcome::Rejected(job) => Ok(job),
            UpdateOutcome::NotFound => Err(ControllerError::NotFound {
                kind: self.kind,
                id,
            }),
        }
    }
}

// =============================================================================
// Patches
// =============================================================================

/// `completed_at` is cleared so a forced move out of a terminal state keeps
/// it set only on terminal records
fn started_patch() -> JobPatch {
    let now = Utc::now();
    JobPatch::new(now)
        .status(JobStatus::Running)
        .started_at(now)
        .completed_at(None)
        .error(None)
}

fn completed_patch() -> JobPatch {
    let now = Utc::now();
    JobPatch::new(now)
        .status(JobStatus::Completed)
        .completed_at(Some(now))
        .error(None)
}

fn failed_patch(message: String) -> JobPatch {
    let message = if message.trim().is_empty() {
        DEFAULT_FAILURE_MESSAGE.to_string()
    } else {
        message
    };

    let now = Utc::now();
    JobPatch::new(now)
        .status(JobStatus::Failed)
        .completed_at(Some(now))
        .error(Some(message))
}

// =============================================================================
// Validation
// =============================================================================

fn validate_handle(handle: &str) -> Result<()> {
    if handle.trim().is_empty() {
        return Err(ControllerError::Validation(
            "Execution handle cannot be empty".to_string(),
        ));
    }

    if handle.len() > MAX_HANDLE_LEN {
        return Err(ControllerError::Validation(format!(
            "Execution handle is too long (max {} characters)",
            MAX_HANDLE_LEN
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryJobStore;
    use std::time::Duration;

    fn controller(policy: TransitionPolicy) -> (JobController, Arc<MemoryJobStore>) {
        let store = Arc::new(MemoryJobStore::new());
        let controller = JobController::new(JobKind::Build, store.clone(), policy);
        (controller, store)
    }

    fn assert_invariants(job: &Job) {
        assert_eq!(job.completed_at.is_some(), job.status.is_terminal());
        assert_eq!(
            job.status == JobStatus::Failed,
            job.error.as_deref().is_some_and(|e| !e.is_empty())
        );
        if job.status == JobStatus::Running {
            assert!(job.started_at.is_some());
        }
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!("strict".parse(), Ok(TransitionPolicy::Strict));
        assert_eq!(
            "Last-Write-Wins".parse(),
            Ok(TransitionPolicy::LastWriteWins)
        );
        assert!("optimistic".parse::<TransitionPolicy>().is_err());
        assert_eq!(TransitionPolicy::default().to_string(), "last-write-wins");
    }

    #[test]
    fn test_validate_handle() {
        assert!(validate_handle("build-7f3a").is_ok());
        assert!(validate_handle("  ").is_err());
        assert!(validate_handle(&"x".repeat(MAX_HANDLE_LEN + 1)).is_err());
    }

    #[tokio::test]
    async fn test_create_yields_fresh_queued_job() {
        let (controller, _) = controller(TransitionPolicy::default());
        let subject = Uuid::new_v4();

        let job = controller.create(subject).await.unwrap();

        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.attempts, 0);
        assert!(job.started_at.is_none());
        assert!(job.completed_at.is_none());
        assert!(job.error.is_none());

        let jobs = controller.list_by_subject(subject).await.unwrap();
        assert_eq!(jobs, vec![job]);
    }

    #[tokio::test]
    async fn test_create_surfaces_persistence_error() {
        let (controller, store) = controller(TransitionPolicy::default());
        store.set_unavailable(true);

        let err = controller.create(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ControllerError::Persistence(_)));
    }

    #[tokio::test]
    async fn test_start_then_complete() {
        let (controller, _) = controller(TransitionPolicy::default());
        let job = controller.create(Uuid::new_v4()).await.unwrap();

        let running = controller.mark_started(job.id).await.unwrap();
        assert_eq!(running.status, JobStatus::Running);
        assert_invariants(&running);

        tokio::time::sleep(Duration::from_millis(5)).await;

        let done = controller.mark_completed(job.id).await.unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert!(done.started_at.unwrap() < done.completed_at.unwrap());
        assert_invariants(&done);
    }

    #[tokio::test]
    async fn test_start_then_fail() {
        let (controller, _) = controller(TransitionPolicy::default());
        let job = controller.create(Uuid::new_v4()).await.unwrap();

        controller.mark_started(job.id).await.unwrap();
        let failed = controller.mark_failed(job.id, "x").await.unwrap();

        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("x"));
        assert!(failed.completed_at.is_some());
        assert_invariants(&failed);
    }

    #[tokio::test]
    async fn test_empty_failure_message_is_replaced() {
        let (controller, _) = controller(TransitionPolicy::default());
        let job = controller.create(Uuid::new_v4()).await.unwrap();
        controller.mark_started(job.id).await.unwrap();

        let failed = controller.mark_failed(job.id, "").await.unwrap();
        assert_eq!(failed.error.as_deref(), Some(DEFAULT_FAILURE_MESSAGE));
        assert_invariants(&failed);
    }

    #[tokio::test]
    async fn test_mark_started_twice_moves_started_at() {
        let (controller, _) = controller(TransitionPolicy::LastWriteWins);
        let job = controller.create(Uuid::new_v4()).await.unwrap();

        let first = controller.mark_started(job.id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = controller.mark_started(job.id).await.unwrap();

        assert!(second.started_at > first.started_at);
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let (controller, _) = controller(TransitionPolicy::default());
        let id = Uuid::new_v4();

        assert!(matches!(
            controller.mark_started(id).await,
            Err(ControllerError::NotFound { .. })
        ));
        assert!(matches!(
            controller.record_execution_status(id, "Running").await,
            Err(ControllerError::NotFound { .. })
        ));
        assert!(matches!(
            controller.get(id).await,
            Err(ControllerError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_other_kind_is_not_visible() {
        let store = Arc::new(MemoryJobStore::new());
        let builds = JobController::new(JobKind::Build, store.clone(), TransitionPolicy::default());
        let deploys = JobController::new(JobKind::Deployment, store, TransitionPolicy::default());

        let build = builds.create(Uuid::new_v4()).await.unwrap();
        assert!(matches!(
            deploys.mark_started(build.id).await,
            Err(ControllerError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_cancel_skips_terminal_jobs() {
        let (controller, _) = controller(TransitionPolicy::default());
        let subject = Uuid::new_v4();

        let done = controller.create(subject).await.unwrap();
        controller.mark_started(done.id).await.unwrap();
        let done = controller.mark_completed(done.id).await.unwrap();

        let queued = controller.create(subject).await.unwrap();
        let running = controller.create(subject).await.unwrap();
        controller.mark_started(running.id).await.unwrap();

        let other_subject = controller.create(Uuid::new_v4()).await.unwrap();

        let cancelled = controller.mark_cancelled(subject).await.unwrap();
        let mut ids: Vec<Uuid> = cancelled.iter().map(|j| j.id).collect();
        ids.sort();
        let mut expected = vec![queued.id, running.id];
        expected.sort();
        assert_eq!(ids, expected);

        for job in &cancelled {
            assert_eq!(job.status, JobStatus::Cancelled);
            assert_invariants(job);
        }

        let queued = controller.get(queued.id).await.unwrap();
        assert!(queued.started_at.is_none());

        assert_eq!(controller.get(done.id).await.unwrap(), done);
        assert_eq!(
            controller.get(other_subject.id).await.unwrap().status,
            JobStatus::Queued
        );
        assert!(controller.active_for_subject(subject).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let (controller, _) = controller(TransitionPolicy::default());
        let subject = Uuid::new_v4();
        controller.create(subject).await.unwrap();

        assert_eq!(controller.mark_cancelled(subject).await.unwrap().len(), 1);
        assert!(controller.mark_cancelled(subject).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_by_status() {
        let (controller, _) = controller(TransitionPolicy::default());
        let a = controller.create(Uuid::new_v4()).await.unwrap();
        let b = controller.create(Uuid::new_v4()).await.unwrap();
        let c = controller.create(Uuid::new_v4()).await.unwrap();
        controller.mark_started(b.id).await.unwrap();

        let queued = controller.list_by_status(JobStatus::Queued).await.unwrap();
        let mut ids: Vec<Uuid> = queued.iter().map(|j| j.id).collect();
        ids.sort();
        let mut expected = vec![a.id, c.id];
        expected.sort();
        assert_eq!(ids, expected);

        let running = controller.list_by_status(JobStatus::Running).await.unwrap();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].id, b.id);
    }

    #[tokio::test]
    async fn test_record_execution_status_is_observational() {
        let (controller, _) = controller(TransitionPolicy::default());
        let job = controller.create(Uuid::new_v4()).await.unwrap();
        let running = controller.mark_started(job.id).await.unwrap();

        let observed = controller
            .record_execution_status(job.id, "Failed")
            .await
            .unwrap();

        assert_eq!(observed.kubernetes_job_status.as_deref(), Some("Failed"));
        assert_eq!(observed.status, running.status);
        assert_eq!(observed.started_at, running.started_at);
        assert_eq!(observed.completed_at, running.completed_at);
        assert_eq!(observed.error, running.error);
        assert!(observed.version > running.version);
    }

    #[tokio::test]
    async fn test_assign_handle_once() {
        let (controller, _) = controller(TransitionPolicy::default());
        let job = controller.create(Uuid::new_v4()).await.unwrap();

        let assigned = controller
            .assign_execution_handle(job.id, "build-1")
            .await
            .unwrap();
        assert_eq!(assigned.kubernetes_job_name.as_deref(), Some("build-1"));
        assert_eq!(assigned.status, JobStatus::Queued);

        let again = controller
            .assign_execution_handle(job.id, "build-1")
            .await
            .unwrap();
        assert_eq!(again.version, assigned.version);

        let err = controller
            .assign_execution_handle(job.id, "build-2")
            .await
            .unwrap_err();
        match err {
            ControllerError::HandleAlreadyAssigned { existing, .. } => {
                assert_eq!(existing, "build-1")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_record_attempt_increments() {
        let (controller, _) = controller(TransitionPolicy::default());
        let job = controller.create(Uuid::new_v4()).await.unwrap();

        controller.record_attempt(job.id).await.unwrap();
        let job = controller.record_attempt(job.id).await.unwrap();

        assert_eq!(job.attempts, 2);
        assert_eq!(job.status, JobStatus::Queued);
    }

    #[tokio::test]
    async fn test_last_write_wins_overwrites_terminal() {
        let (controller, _) = controller(TransitionPolicy::LastWriteWins);
        let subject = Uuid::new_v4();
        let job = controller.create(subject).await.unwrap();
        controller.mark_started(job.id).await.unwrap();
        controller.mark_cancelled(subject).await.unwrap();

        let completed = controller.mark_completed(job.id).await.unwrap();
        assert_eq!(completed.status, JobStatus::Completed);
        assert_invariants(&completed);
    }

    #[tokio::test]
    async fn test_last_write_wins_restart_clears_completed_at() {
        let (controller, _) = controller(TransitionPolicy::LastWriteWins);
        let subject = Uuid::new_v4();
        let job = controller.create(subject).await.unwrap();
        controller.mark_cancelled(subject).await.unwrap();

        let restarted = controller.mark_started(job.id).await.unwrap();
        assert_eq!(restarted.status, JobStatus::Running);
        assert!(restarted.completed_at.is_none());
        assert_invariants(&restarted);
    }

    #[tokio::test]
    async fn test_guarded_marks_leave_cancelled_job_alone() {
        let (controller, _) = controller(TransitionPolicy::LastWriteWins);
        let subject = Uuid::new_v4();
        let job = controller.create(subject).await.unwrap();
        controller.mark_cancelled(subject).await.unwrap();
        let before = controller.get(job.id).await.unwrap();

        assert!(controller.try_mark_started(job.id).await.unwrap().is_none());
        assert!(controller.try_mark_completed(job.id).await.unwrap().is_none());
        assert!(
            controller
                .try_mark_failed(job.id, "late")
                .await
                .unwrap()
                .is_none()
        );

        let after = controller.get(job.id).await.unwrap();
        assert_eq!(after, before);
        assert_invariants(&after);
    }

    #[tokio::test]
    async fn test_guarded_marks_follow_lifecycle() {
        let (controller, _) = controller(TransitionPolicy::LastWriteWins);
        let job = controller.create(Uuid::new_v4()).await.unwrap();

        // Not yet running
        assert!(controller.try_mark_completed(job.id).await.unwrap().is_none());

        let running = controller.try_mark_started(job.id).await.unwrap().unwrap();
        assert_eq!(running.status, JobStatus::Running);

        let failed = controller
            .try_mark_failed(job.id, "")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(failed.error.as_deref(), Some(DEFAULT_FAILURE_MESSAGE));
        assert_invariants(&failed);

        assert!(matches!(
            controller.try_mark_started(Uuid::new_v4()).await,
            Err(ControllerError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_strict_rejects_illegal_transitions() {
        let (controller, _) = controller(TransitionPolicy::Strict);
        let subject = Uuid::new_v4();
        let job = controller.create(subject).await.unwrap();

        // Queued -> Completed skips Running
        match controller.mark_completed(job.id).await {
            Err(ControllerError::InvalidTransition { from, to, .. }) => {
                assert_eq!(from, JobStatus::Queued);
                assert_eq!(to, JobStatus::Completed);
            }
            other => panic!("unexpected result: {other:?}"),
        }

        controller.mark_started(job.id).await.unwrap();
        assert!(controller.mark_started(job.id).await.is_err());

        controller.mark_cancelled(subject).await.unwrap();
        let before = controller.get(job.id).await.unwrap();

        assert!(controller.mark_completed(job.id).await.is_err());
        assert!(controller.mark_failed(job.id, "late").await.is_err());

        let after = controller.get(job.id).await.unwrap();
        assert_eq!(after, before);
        assert_eq!(after.status, JobStatus::Cancelled);
    }
}
