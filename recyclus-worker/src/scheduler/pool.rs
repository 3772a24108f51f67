//! Worker pool
//!
//! Starts a fixed number of independent worker units. Each unit owns one
//! work directory and loops forever: reset the directory, claim a job, run
//! its tasks, publish the final status, move the job to the done list.
//!
//! Nothing is shared between units except the job store handle and the
//! pipeline, which holds no per-job state.

use anyhow::{Context, Result};
use recyclus_client::JobStore;
use recyclus_core::domain::job::{Control, JobStatus, fields};
use recyclus_core::domain::outcome::OutcomeStatus;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::{Config, unit_name};
use crate::service::TaskPipeline;
use crate::workdir::WorkDir;

/// Summary of one processed job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub key: String,
    pub jobid: String,
    pub status: OutcomeStatus,
}

/// Fixed set of worker units
pub struct WorkerPool {
    config: Config,
    store: Arc<dyn JobStore>,
    pipeline: Arc<TaskPipeline>,
}

impl WorkerPool {
    pub fn new(config: Config, store: Arc<dyn JobStore>, pipeline: Arc<TaskPipeline>) -> Self {
        Self {
            config,
            store,
            pipeline,
        }
    }

    /// Builds the unit with the given index
    pub fn unit(&self, index: usize) -> WorkerUnit {
        WorkerUnit {
            name: format!("{}/{}", self.config.worker_name, unit_name(index)),
            workdir: WorkDir::new(self.config.unit_dir(index)),
            store: Arc::clone(&self.store),
            pipeline: Arc::clone(&self.pipeline),
            retry_delay: self.config.retry_delay,
        }
    }

    /// Starts every unit on its own task
    pub fn start(&self) -> JoinSet<()> {
        let mut units = JoinSet::new();
        for index in 0..self.config.num_units {
            let unit = self.unit(index);
            info!("Started unit {} in {}", unit.name, unit.workdir.path().display());
            units.spawn(unit.run());
        }
        units
    }
}

/// One sequential claim-to-done loop bound to its own work directory
pub struct WorkerUnit {
    name: String,
    workdir: WorkDir,
    store: Arc<dyn JobStore>,
    pipeline: Arc<TaskPipeline>,
    retry_delay: Duration,
}

impl WorkerUnit {
    #[cfg(test)]
    pub fn workdir(&self) -> &WorkDir {
        &self.workdir
    }

    /// Processes jobs until the task is dropped
    ///
    /// A failed iteration is logged and followed by a back-off; the unit
    /// never exits on its own.
    pub async fn run(self) {
        loop {
            match self.process_one().await {
                Ok(report) => {
                    info!(
                        "[{}] job {} ({}) ended {}",
                        self.name, report.jobid, report.key, report.status
                    );
                }
                Err(e) => {
                    error!("[{}] iteration failed: {:#}", self.name, e);
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
        }
    }

    /// Runs one job from claim to the done list
    pub async fn process_one(&self) -> Result<JobReport> {
        if let Err(e) = self.workdir.reset() {
            // Carry on with what is left rather than starve the pool
            warn!("[{}] {}", self.name, e);
        }

        let key = self.store.claim().await.context("Failed to claim job")?;
        debug!("[{}] claimed {}", self.name, key);

        self.store
            .set_fields(
                &key,
                &[
                    (fields::CTRL.to_string(), Control::Run.as_str().to_string()),
                    (fields::STATUS.to_string(), JobStatus::Running.to_string()),
                ],
            )
            .await
            .context("Failed to mark job running")?;

        let job = self.store.load_job(&key).await.context("Failed to load job")?;
        info!("[{}] job {} started", self.name, job.jobid);

        let verdict = self.pipeline.run(&job, &self.workdir).await?;

        self.store
            .set_fields(&key, &verdict.fields())
            .await
            .context("Failed to publish final status")?;
        self.store
            .requeue_to_done(&key)
            .await
            .context("Failed to move job to done list")?;

        Ok(JobReport {
            key,
            jobid: job.jobid,
            status: verdict.status,
        })
    }
}
