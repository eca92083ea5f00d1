use crate::executor::check_target;
use crate::ProbeSink;
use anyhow::Result;
use apiwatch_common::types::MonitoringTarget;
use apiwatch_storage::ProbeStore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing;

/// Fires HTTP probes on per-target cron schedules (seconds precision).
///
/// One scheduler entry exists per live target id; re-adding a target
/// replaces its previous entry. Overlapping firings for the same target
/// run concurrently, the scheduler does not serialize them.
pub struct ProbeScheduler {
    scheduler: Mutex<JobScheduler>,
    /// target id -> scheduler job handle
    jobs: Mutex<HashMap<String, uuid::Uuid>>,
    client: reqwest::Client,
    store: Arc<dyn ProbeStore>,
    sink: Arc<dyn ProbeSink>,
}

impl ProbeScheduler {
    pub async fn new(store: Arc<dyn ProbeStore>, sink: Arc<dyn ProbeSink>) -> Result<Self> {
        Ok(Self {
            scheduler: Mutex::new(JobScheduler::new().await?),
            jobs: Mutex::new(HashMap::new()),
            client: reqwest::Client::new(),
            store,
            sink,
        })
    }

    pub async fn start(&self) -> Result<()> {
        self.scheduler.lock().await.start().await?;
        tracing::info!("Probe scheduler started");
        Ok(())
    }

    /// Stops firing new probes; in-flight probes finish or time out on
    /// their own.
    pub async fn stop(&self) -> Result<()> {
        self.scheduler.lock().await.shutdown().await?;
        tracing::info!("Probe scheduler stopped");
        Ok(())
    }

    /// Registers a target's cron entry, replacing any previous entry for
    /// the same id.
    pub async fn add_target(&self, target: MonitoringTarget) -> Result<()> {
        self.remove_target(&target.id).await?;

        let target = Arc::new(target);
        let client = self.client.clone();
        let store = self.store.clone();
        let sink = self.sink.clone();

        let job_target = target.clone();
        let job = Job::new_async(target.frequency.as_str(), move |_uuid, _lock| {
            let target = job_target.clone();
            let client = client.clone();
            let store = store.clone();
            let sink = sink.clone();

            Box::pin(async move {
                let result = check_target(&client, &target).await;

                if let Err(e) = store.save_probe_result(&result).await {
                    tracing::error!(
                        target_id = %target.id,
                        error = %e,
                        "Failed to store probe result"
                    );
                }

                if result.success {
                    tracing::debug!(
                        target_id = %target.id,
                        status = result.status_code,
                        response_time = result.response_time,
                        "Probe succeeded"
                    );
                } else {
                    tracing::warn!(
                        target_id = %target.id,
                        status = result.status_code,
                        error = %result.error,
                        "Probe failed"
                    );
                }

                sink.publish(&result).await;
            })
        })?;

        let job_id = self.scheduler.lock().await.add(job).await?;
        self.jobs.lock().await.insert(target.id.clone(), job_id);

        tracing::info!(
            target_id = %target.id,
            url = %target.url,
            frequency = %target.frequency,
            "Monitoring target scheduled"
        );
        Ok(())
    }

    /// Removes a target's cron entry. Returns false when the id was not
    /// registered.
    pub async fn remove_target(&self, target_id: &str) -> Result<bool> {
        let job_id = self.jobs.lock().await.remove(target_id);
        match job_id {
            Some(job_id) => {
                self.scheduler.lock().await.remove(&job_id).await?;
                tracing::info!(target_id, "Monitoring target unscheduled");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn target_count(&self) -> usize {
        self.jobs.lock().await.len()
    }
}
