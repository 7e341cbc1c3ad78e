//! Job DTOs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::job::{Job, JobKind, JobStatus};

/// Compact view of a job for listings and log lines
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: Uuid,
    pub kind: JobKind,
    pub subject_id: Uuid,
    pub status: JobStatus,
    pub kubernetes_job_name: Option<String>,
    pub attempts: i32,
}

impl From<&Job> for JobSummary {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id,
            kind: job.kind,
            subject_id: job.subject_id,
            status: job.status,
            kubernetes_job_name: job.kubernetes_job_name.clone(),
            attempts: job.attempts,
        }
    }
}
