//! Execution backend
//!
//! The controller never runs build or deploy work itself. It only reads the
//! identity and status of the resource doing the work, through
//! `ExecutionBackend`.

pub mod kubernetes;

pub use kubernetes::KubernetesBackend;

use async_trait::async_trait;
use shipyard_core::domain::execution::ExecutionObservation;

/// Errors raised while polling the execution backend
///
/// All of them are transient from the controller's point of view: the job is
/// left as is and polled again on the next pass.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("execution backend unreachable: {0}")]
    Unreachable(String),

    #[error("execution backend did not answer within {0:?}")]
    Timeout(std::time::Duration),

    #[error("execution resource '{0}' not found")]
    NotFound(String),

    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
}

/// Read-only view of the system that executes jobs
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Observes the resource named `handle`
    ///
    /// Returns `Ok(None)` when the backend has no such resource.
    async fn observe(&self, handle: &str) -> Result<Option<ExecutionObservation>, BackendError>;
}
