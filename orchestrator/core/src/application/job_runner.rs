// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Job Runner
//!
//! Owns the queue of [`ProvisioningJob`]s and drives each one through
//! [`BridgeJobExecutor`] under a [`RetryPolicy`].
//!
//! Jobs of different bridges run concurrently. Jobs of the same bridge run
//! strictly in submission order: the dispatcher hands each new job the
//! completion signal of the previous one for that bridge, and the job waits on
//! it before its first attempt.

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::application::provisioning::BridgeJobExecutor;
use crate::domain::bridge::BridgeId;
use crate::domain::events::BridgeEvent;
use crate::domain::job::{JobId, ProvisioningJob, RetryPolicy};
use crate::domain::repository::{JobRepository, RepositoryError};
use crate::infrastructure::event_bus::EventBus;

pub struct JobRunner {
    jobs: Arc<dyn JobRepository>,
    executor: Arc<BridgeJobExecutor>,
    policy: RetryPolicy,
    event_bus: Arc<EventBus>,
    sender: mpsc::UnboundedSender<ProvisioningJob>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<ProvisioningJob>>>,
    /// Completion signal of the most recently dispatched job per bridge
    tails: DashMap<BridgeId, (JobId, oneshot::Receiver<()>)>,
}

impl JobRunner {
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        executor: Arc<BridgeJobExecutor>,
        policy: RetryPolicy,
        event_bus: Arc<EventBus>,
    ) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            jobs,
            executor,
            policy,
            event_bus,
            sender,
            receiver: Mutex::new(Some(receiver)),
            tails: DashMap::new(),
        }
    }

    /// Persist `job` as pending and queue it.
    ///
    /// Jobs queued before [`JobRunner::start`] run once the dispatcher starts.
    pub async fn submit(&self, job: ProvisioningJob) -> Result<JobId, RepositoryError> {
        self.jobs.save(&job).await?;
        let job_id = job.id;
        info!(
            job_id = %job_id,
            bridge_id = %job.bridge_id,
            kind = job.kind.as_str(),
            "Job submitted"
        );
        if self.sender.send(job).is_err() {
            // Dispatcher is gone; the job stays pending and is recovered at next startup.
            warn!(job_id = %job_id, "Job queue closed, job left pending");
        }
        Ok(job_id)
    }

    /// Re-queue jobs left pending or running by a previous process.
    pub async fn recover(&self) -> Result<usize, RepositoryError> {
        let unfinished = self.jobs.find_unfinished().await?;
        let count = unfinished.len();
        for job in unfinished {
            info!(
                job_id = %job.id,
                bridge_id = %job.bridge_id,
                kind = job.kind.as_str(),
                "Recovering unfinished job"
            );
            if self.sender.send(job).is_err() {
                warn!("Job queue closed during recovery");
                break;
            }
        }
        Ok(count)
    }

    /// Spawn the dispatcher. Only the first call starts one; later calls
    /// return `None`.
    pub fn start(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let mut receiver = self.receiver.lock().take()?;
        let runner = Arc::clone(self);
        Some(tokio::spawn(async move {
            info!("Job dispatcher started");
            while let Some(job) = receiver.recv().await {
                runner.dispatch(job);
            }
            info!("Job dispatcher stopped");
        }))
    }

    fn dispatch(self: &Arc<Self>, job: ProvisioningJob) {
        let (done_tx, done_rx) = oneshot::channel::<()>();
        let bridge_id = job.bridge_id;
        let job_id = job.id;
        let previous = self
            .tails
            .insert(bridge_id, (job_id, done_rx))
            .map(|(_, rx)| rx);

        let runner = Arc::clone(self);
        tokio::spawn(async move {
            if let Some(previous) = previous {
                // Resolves on completion or when the previous task is dropped.
                let _ = previous.await;
            }
            runner.run(job).await;
            runner
                .tails
                .remove_if(&bridge_id, |_, (tail, _)| *tail == job_id);
            drop(done_tx);
        });
    }

    async fn run(&self, mut job: ProvisioningJob) {
        loop {
            job.start_attempt();
            self.persist(&job).await;

            match self.executor.execute(&job).await {
                Ok(()) => {
                    job.succeed();
                    self.persist(&job).await;
                    metrics::counter!(
                        "bridge_jobs_completed_total",
                        "kind" => job.kind.as_str(),
                        "outcome" => "succeeded"
                    )
                    .increment(1);
                    info!(
                        job_id = %job.id,
                        bridge_id = %job.bridge_id,
                        kind = job.kind.as_str(),
                        attempt = job.attempts,
                        "Job succeeded"
                    );
                    return;
                }
                Err(step) => {
                    error!(
                        tag = step.tag,
                        bridge_id = %job.bridge_id,
                        job_id = %job.id,
                        attempt = job.attempts,
                        error = %step.message,
                        "Background step failed"
                    );
                    job.record_failure(step.to_string());

                    if job.attempts >= self.policy.max_attempts {
                        job.fail();
                        self.persist(&job).await;
                        metrics::counter!(
                            "bridge_jobs_completed_total",
                            "kind" => job.kind.as_str(),
                            "outcome" => "failed"
                        )
                        .increment(1);
                        self.event_bus.publish(BridgeEvent::JobFailed {
                            bridge_id: job.bridge_id,
                            job_id: job.id,
                            kind: job.kind,
                            tag: step.tag.to_string(),
                            error: step.message,
                            attempts: job.attempts,
                            failed_at: Utc::now(),
                        });
                        return;
                    }

                    self.persist(&job).await;
                    tokio::time::sleep(self.policy.backoff(job.attempts)).await;
                }
            }
        }
    }

    async fn persist(&self, job: &ProvisioningJob) {
        if let Err(e) = self.jobs.save(job).await {
            warn!(job_id = %job.id, error = %e, "Failed to persist job state");
        }
    }
}
