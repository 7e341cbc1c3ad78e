//! Job domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Build or deployment job record
///
/// Builds and deployments share this shape. The `kind` field keeps the two
/// record families apart inside one store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub kind: JobKind,
    /// Service (or other deployable unit) the job belongs to
    pub subject_id: Uuid,
    pub status: JobStatus,
    /// Diagnostic message, present only while `status` is `Failed`
    pub error: Option<String>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Name of the backing Kubernetes Job
    pub kubernetes_job_name: Option<String>,
    /// Last raw status reported by the execution backend (not authoritative)
    pub kubernetes_job_status: Option<String>,
    pub attempts: i32,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    /// Incremented on every mutation
    pub version: i64,
}

impl Job {
    /// Builds a fresh `Queued` record for a subject
    pub fn queued(kind: JobKind, subject_id: Uuid) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind,
            subject_id,
            status: JobStatus::Queued,
            error: None,
            started_at: None,
            completed_at: None,
            kubernetes_job_name: None,
            kubernetes_job_status: None,
            attempts: 0,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }
}

/// Family a job record belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobKind {
    Build,
    Deployment,
}

impl JobKind {
    pub const ALL: [JobKind; 2] = [JobKind::Build, JobKind::Deployment];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Build => "Build",
            JobKind::Deployment => "Deployment",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Build" => Ok(JobKind::Build),
            "Deployment" => Ok(JobKind::Deployment),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// Lifecycle position of a job
///
/// ```text
/// Queued -> Running -> {Completed, Failed, Cancelled}
/// Queued -> Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Statuses from which no transition is expected
    pub const TERMINAL: [JobStatus; 3] =
        [JobStatus::Completed, JobStatus::Failed, JobStatus::Cancelled];

    /// Statuses counted as "active" for a subject
    pub const ACTIVE: [JobStatus; 2] = [JobStatus::Queued, JobStatus::Running];

    pub fn is_terminal(&self) -> bool {
        Self::TERMINAL.contains(self)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "Queued",
            JobStatus::Running => "Running",
            JobStatus::Completed => "Completed",
            JobStatus::Failed => "Failed",
            JobStatus::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Queued" => Ok(JobStatus::Queued),
            "Running" => Ok(JobStatus::Running),
            "Completed" => Ok(JobStatus::Completed),
            "Failed" => Ok(JobStatus::Failed),
            "Cancelled" => Ok(JobStatus::Cancelled),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// A stored enum column held a value this build does not know
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognised value: '{0}'")]
pub struct ParseStatusError(pub String);
