//! Status reconciler
//!
//! Periodically polls the execution backend for every non-terminal job that
//! has a backing Kubernetes Job, mirrors the raw status onto the record and
//! folds recognised outcomes into lifecycle transitions.
//! Each job is reconciled in its own task; one failing job never stops the
//! sweep.

use shipyard_core::domain::execution::ExecutionStatus;
use shipyard_core::domain::job::{Job, JobStatus};
use shipyard_core::dto::job::JobSummary;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tokio::time::{self, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::backend::{BackendError, ExecutionBackend};
use crate::config::Config;
use crate::service::{ControllerError, JobController};

/// Reconciliation error type
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// Backend could not give a usable answer; retried next pass
    #[error("transient error reconciling job {job_id}: {source}")]
    Transient {
        job_id: Uuid,
        #[source]
        source: BackendError,
    },

    #[error(transparent)]
    Controller(#[from] ControllerError),
}

/// What reconciling one job did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    Unchanged,
    Transitioned(JobStatus),
}

/// Totals for one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub examined: usize,
    pub transitioned: usize,
    pub failed: usize,
}

/// Reconciler for one job kind
#[derive(Clone)]
pub struct Reconciler {
    controller: JobController,
    backend: Arc<dyn ExecutionBackend>,
    interval: Duration,
    poll_timeout: Duration,
    semaphore: Arc<Semaphore>,
}

impl Reconciler {
    pub fn new(
        controller: JobController,
        backend: Arc<dyn ExecutionBackend>,
        config: &Config,
    ) -> Self {
        Self {
            controller,
            backend,
            interval: config.reconcile_interval,
            poll_timeout: config.poll_timeout,
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_polls)),
        }
    }

    /// Runs sweeps on the configured interval until `shutdown` flips to true
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Starting {} reconciler (interval: {:?}, poll timeout: {:?})",
            self.controller.kind(),
            self.interval,
            self.poll_timeout
        );

        let mut interval = time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            match self.reconcile_once().await {
                Ok(report) => {
                    if report.transitioned > 0 || report.failed > 0 {
                        info!(
                            "{} reconcile pass: examined={}, transitioned={}, failed={}",
                            self.controller.kind(),
                            report.examined,
                            report.transitioned,
                            report.failed
                        );
                    }
                }
                Err(e) => {
                    error!("Error during {} reconcile pass: {}", self.controller.kind(), e);
                }
            }
        }

        info!("{} reconciler stopped", self.controller.kind());
    }

    /// Performs a single sweep over every tracked job
    ///
    /// Fails only when the tracked set cannot be listed.
    pub async fn reconcile_once(&self) -> Result<ReconcileReport, ControllerError> {
        let mut tracked = Vec::new();
        for status in JobStatus::ACTIVE {
            tracked.extend(self.controller.list_by_status(status).await?);
        }
        // A job moving Queued -> Running between the two listings shows up twice
        let mut seen = HashSet::new();
        tracked.retain(|job| job.kubernetes_job_name.is_some() && seen.insert(job.id));

        let mut report = ReconcileReport {
            examined: tracked.len(),
            ..Default::default()
        };

        if tracked.is_empty() {
            debug!("No tracked {} jobs", self.controller.kind());
            return Ok(report);
        }

        let mut tasks = JoinSet::new();

        for job in tracked {
            let permit = match self.semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!("Poll semaphore closed: {}", e);
                    report.failed += 1;
                    continue;
                }
            };

            let this = self.clone();
            tasks.spawn(async move {
                let job_id = job.id;
                let result = this.reconcile_tracked(job).await;
                drop(permit);
                (job_id, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(Reconciled::Transitioned(_)))) => report.transitioned += 1,
                Ok((_, Ok(Reconciled::Unchanged))) => {}
                Ok((job_id, Err(e))) => {
                    report.failed += 1;
                    warn!("Failed to reconcile job {}: {}", job_id, e);
                }
                Err(e) => {
                    report.failed += 1;
                    warn!("Reconcile task panicked: {}", e);
                }
            }
        }

        Ok(report)
    }

    /// Reconciles one job on demand
    pub async fn reconcile_job(&self, id: Uuid) -> Result<Reconciled, ReconcileError> {
        let job = self.controller.get(id).await?;
        if job.is_terminal() {
            return Ok(Reconciled::Unchanged);
        }
        self.reconcile_tracked(job).await
    }

    async fn reconcile_tracked(&self, job: Job) -> Result<Reconciled, ReconcileError> {
        let Some(handle) = job.kubernetes_job_name.clone() else {
            return Ok(Reconciled::Unchanged);
        };

        debug!("Reconciling {:?}", JobSummary::from(&job));

        let transient = |source: BackendError| ReconcileError::Transient {
            job_id: job.id,
            source,
        };

        let polled = time::timeout(self.poll_timeout, self.backend.observe(&handle)).await;
        let observation = match polled {
            Err(_) => return Err(transient(BackendError::Timeout(self.poll_timeout))),
            Ok(Err(e)) => return Err(transient(e)),
            Ok(Ok(None)) => return Err(transient(BackendError::NotFound(handle))),
            Ok(Ok(Some(observation))) => observation,
        };

        // The returned record is fresher than the listed one; decide on it
        let current = self
            .controller
            .record_execution_status(job.id, &observation.status.to_string())
            .await?;

        if current.is_terminal() {
            debug!(
                "Job {} became {} during reconciliation",
                current.id, current.status
            );
            return Ok(Reconciled::Unchanged);
        }

        // Transitions from here on are status-guarded whatever the policy, so
        // a user cancellation racing this pass is never overwritten
        match observation.status {
            ExecutionStatus::Succeeded => {
                if !self.ensure_started(&current).await? {
                    return Ok(Reconciled::Unchanged);
                }
                let done = self.controller.try_mark_completed(current.id).await?;
                Ok(transitioned(done, JobStatus::Completed))
            }
            ExecutionStatus::Failed => {
                if !self.ensure_started(&current).await? {
                    return Ok(Reconciled::Unchanged);
                }
                let message = observation
                    .message
                    .unwrap_or_else(|| format!("Kubernetes Job {} failed", handle));
                let failed = self.controller.try_mark_failed(current.id, message).await?;
                Ok(transitioned(failed, JobStatus::Failed))
            }
            ExecutionStatus::Running if current.status == JobStatus::Queued => {
                let started = self.controller.try_mark_started(current.id).await?;
                Ok(transitioned(started, JobStatus::Running))
            }
            ExecutionStatus::Running | ExecutionStatus::Pending => Ok(Reconciled::Unchanged),
            ExecutionStatus::Unknown(raw) => {
                debug!("Job {} has unmapped execution status '{}'", current.id, raw);
                Ok(Reconciled::Unchanged)
            }
        }
    }

    /// Work that finished before we ever saw it running still gets a start time
    ///
    /// Returns false when the job left `Queued` for anything but `Running`.
    async fn ensure_started(&self, job: &Job) -> Result<bool, ControllerError> {
        if job.status != JobStatus::Queued {
            return Ok(true);
        }
        Ok(self.controller.try_mark_started(job.id).await?.is_some())
    }
}

fn transitioned(job: Option<Job>, to: JobStatus) -> Reconciled {
    match job {
        Some(_) => Reconciled::Transitioned(to),
        None => Reconciled::Unchanged,
    }
}
