//! Kubernetes execution backend
//!
//! Reads `batch/v1` Jobs from a single namespace and folds their status
//! counters and conditions into an `ExecutionStatus`.

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::{Job as KubeJob, JobCondition, JobStatus as KubeJobStatus};
use kube::{Api, Client};
use shipyard_core::domain::execution::{ExecutionObservation, ExecutionStatus};

use super::{BackendError, ExecutionBackend};

pub struct KubernetesBackend {
    jobs: Api<KubeJob>,
}

impl KubernetesBackend {
    /// Creates a backend bound to one namespace
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            jobs: Api::namespaced(client, namespace),
        }
    }

    /// Creates a backend from the ambient kubeconfig or in-cluster config
    pub async fn try_default(namespace: &str) -> Result<Self, BackendError> {
        let client = Client::try_default().await?;
        Ok(Self::new(client, namespace))
    }
}

#[async_trait]
impl ExecutionBackend for KubernetesBackend {
    async fn observe(&self, handle: &str) -> Result<Option<ExecutionObservation>, BackendError> {
        let job = self.jobs.get_opt(handle).await?;
        Ok(job.map(|job| observe_status(job.status.as_ref())))
    }
}

/// Maps a Kubernetes Job status onto the backend vocabulary
///
/// Conditions win over counters: a `Failed=True` condition means the Job's
/// backoff limit or deadline was exhausted even if pods are still terminating.
pub fn observe_status(status: Option<&KubeJobStatus>) -> ExecutionObservation {
    let Some(status) = status else {
        return ExecutionObservation::new(ExecutionStatus::Pending);
    };

    let conditions = status.conditions.as_deref().unwrap_or_default();

    if let Some(failed) = true_condition(conditions, "Failed") {
        let observation = ExecutionObservation::new(ExecutionStatus::Failed);
        return match condition_detail(failed) {
            Some(detail) => observation.with_message(detail),
            None => observation,
        };
    }

    if true_condition(conditions, "Complete").is_some() || status.succeeded.unwrap_or(0) > 0 {
        return ExecutionObservation::new(ExecutionStatus::Succeeded);
    }

    if true_condition(conditions, "Suspended").is_some() {
        return ExecutionObservation::new(ExecutionStatus::Unknown("Suspended".to_string()));
    }

    if status.active.unwrap_or(0) > 0 || status.ready.unwrap_or(0) > 0 {
        return ExecutionObservation::new(ExecutionStatus::Running);
    }

    ExecutionObservation::new(ExecutionStatus::Pending)
}

fn true_condition<'a>(conditions: &'a [JobCondition], type_: &str) -> Option<&'a JobCondition> {
    conditions
        .iter()
        .find(|c| c.type_ == type_ && c.status == "True")
}

fn condition_detail(condition: &JobCondition) -> Option<String> {
    match (condition.reason.as_deref(), condition.message.as_deref()) {
        (Some(reason), Some(message)) if !message.is_empty() => {
            Some(format!("{}: {}", reason, message))
        }
        (_, Some(message)) if !message.is_empty() => Some(message.to_string()),
        (Some(reason), _) if !reason.is_empty() => Some(reason.to_string()),
        _ => None,
    }
}
