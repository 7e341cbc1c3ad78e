//! Execution backend status vocabulary
//!
//! The backend's own vocabulary is not controlled by the control plane, so
//! anything outside the recognised outcomes lands in `Unknown` with the raw
//! string preserved.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a backing execution resource as reported by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// Created but no pod is active yet
    Pending,
    Running,
    Succeeded,
    /// Failed after exhausting the backend's own retry budget
    Failed,
    Unknown(String),
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionStatus::Pending => f.write_str("Pending"),
            ExecutionStatus::Running => f.write_str("Running"),
            ExecutionStatus::Succeeded => f.write_str("Succeeded"),
            ExecutionStatus::Failed => f.write_str("Failed"),
            ExecutionStatus::Unknown(raw) => f.write_str(raw),
        }
    }
}

/// One observation of a backing execution resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionObservation {
    pub status: ExecutionStatus,
    /// Human-readable detail, typically the failure condition's message
    pub message: Option<String>,
}

impl ExecutionObservation {
    pub fn new(status: ExecutionStatus) -> Self {
        Self {
            status,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}
