//! Recyclus Worker
//!
//! Executes simulation jobs submitted to the shared job store.
//!
//! Architecture:
//! - Configuration: Load settings from environment or defaults
//! - Workdir: One private directory per worker unit, emptied before each job
//! - Services: Process supervision, artifact upload, task sequencing
//! - Scheduler: Fixed pool of units, each claiming and running one job at a time
//!
//! A unit claims a job from the submit queue, runs its `simulation` and
//! `post` tasks, uploads their artifacts to the datastore, publishes the
//! final status and moves the job to the done list.

mod config;
mod scheduler;
mod service;
mod workdir;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::scheduler::WorkerPool;
use crate::service::{ArtifactUploader, PipelineSettings, TaskPipeline};
use recyclus_client::{ArtifactClient, JobStore, RedisStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "recyclus_worker=info,recyclus_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Recyclus Worker");

    let config = Config::from_env();
    config.validate().context("Invalid configuration")?;
    info!(
        "Loaded configuration: worker_name={}, redis_url={}, datastore_url={}",
        config.worker_name, config.redis_url, config.datastore_url
    );

    let store: Arc<dyn JobStore> = Arc::new(connect_with_retry(&config).await?);

    let uploader: Arc<dyn ArtifactUploader> =
        Arc::new(ArtifactClient::new(config.datastore_url.clone()));
    info!("Artifact client initialized");

    let pipeline = Arc::new(TaskPipeline::new(
        Arc::clone(&store),
        uploader,
        PipelineSettings::from(&config),
    ));

    info!(
        "Work root: {}, units: {}, poll interval: {:?}",
        config.work_root.display(),
        config.num_units,
        config.poll_interval
    );

    let pool = WorkerPool::new(config, store, pipeline);
    let mut units = pool.start();

    // Units never return on their own; one finishing means it panicked
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            info!("Shutdown requested, stopping {} unit(s)", units.len());
        }
        Some(result) = units.join_next() => {
            error!("A worker unit stopped unexpectedly: {:?}", result);
        }
    }

    units.shutdown().await;

    Ok(())
}

/// Connect to the job store with exponential backoff
///
/// The store may not be reachable yet when the worker starts
/// (common in container environments).
async fn connect_with_retry(config: &Config) -> Result<RedisStore> {
    const MAX_RETRIES: u32 = 10;
    const INITIAL_DELAY_MS: u64 = 500;
    const MAX_DELAY_MS: u64 = 30_000;

    let mut attempt = 0;
    let mut delay_ms = INITIAL_DELAY_MS;

    loop {
        attempt += 1;

        match RedisStore::connect(&config.redis_url, config.claim_timeout).await {
            Ok(store) => {
                if attempt > 1 {
                    info!("Connected to job store after {} attempt(s)", attempt);
                }
                return Ok(store);
            }
            Err(e) => {
                if attempt >= MAX_RETRIES {
                    error!("Failed to connect to job store after {} attempts", MAX_RETRIES);
                    return Err(anyhow::anyhow!("Failed to connect to job store: {}", e));
                }

                warn!(
                    "Failed to connect to job store (attempt {}/{}): {}",
                    attempt, MAX_RETRIES, e
                );
                warn!("Retrying in {} ms...", delay_ms);

                tokio::time::sleep(Duration::from_millis(delay_ms)).await;

                delay_ms = (delay_ms * 2).min(MAX_DELAY_MS);
            }
        }
    }
}
