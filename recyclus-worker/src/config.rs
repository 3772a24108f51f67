//! Worker configuration
//!
//! Defines all configurable parameters for the worker: where the job store
//! and artifact store live, how many worker units run, where their work
//! directories are, and how the supervised programs are invoked.

use std::path::PathBuf;
use std::time::Duration;

/// Worker configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Name of this worker process, used as a log prefix for its units
    pub worker_name: String,

    /// Job store URL (e.g., "redis://redis/0")
    pub redis_url: String,

    /// Artifact store upload endpoint
    pub datastore_url: String,

    /// Parent of the per-unit work directories
    pub work_root: PathBuf,

    /// Number of independent worker units
    pub num_units: usize,

    /// How often a running task is checked for exit or cancellation
    pub poll_interval: Duration,

    /// How long one blocking claim waits on the store before it is reissued
    pub claim_timeout: Duration,

    /// Back-off after an iteration failed on infrastructure
    pub retry_delay: Duration,

    /// Simulator program, invoked as `<simulator> -o <output> <scenario>`
    pub simulator: String,

    /// Interpreter for post-processing scripts
    pub post_interpreter: String,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new(worker_name: String) -> Self {
        Self {
            worker_name,
            redis_url: "redis://redis/0".to_string(),
            datastore_url: "http://datastore:5020/api/internal/store".to_string(),
            work_root: PathBuf::from("/jobs"),
            num_units: 1,
            poll_interval: Duration::from_secs(5),
            claim_timeout: Duration::from_secs(5),
            retry_delay: Duration::from_secs(5),
            simulator: "cyclus".to_string(),
            post_interpreter: "python".to_string(),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Every variable is optional:
    /// - WORKER_NAME (default: worker-<hostname>)
    /// - REDIS_URL (default: redis://redis/0)
    /// - DATASTORE_URL (default: http://datastore:5020/api/internal/store)
    /// - WORK_ROOT (default: /jobs)
    /// - NUM_THREADS (default: 1)
    /// - POLL_INTERVAL (seconds, default: 5)
    /// - CLAIM_TIMEOUT (seconds, default: 5)
    /// - RETRY_DELAY (seconds, default: 5)
    /// - SIMULATOR (default: cyclus)
    /// - POST_INTERPRETER (default: python)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            worker_name: env_string("WORKER_NAME").unwrap_or(defaults.worker_name),
            redis_url: env_string("REDIS_URL").unwrap_or(defaults.redis_url),
            datastore_url: env_string("DATASTORE_URL").unwrap_or(defaults.datastore_url),
            work_root: env_string("WORK_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_root),
            num_units: env_parse("NUM_THREADS").unwrap_or(defaults.num_units),
            poll_interval: env_parse("POLL_INTERVAL")
                .map(Duration::from_secs)
                .unwrap_or(defaults.poll_interval),
            claim_timeout: env_parse("CLAIM_TIMEOUT")
                .map(Duration::from_secs)
                .unwrap_or(defaults.claim_timeout),
            retry_delay: env_parse("RETRY_DELAY")
                .map(Duration::from_secs)
                .unwrap_or(defaults.retry_delay),
            simulator: env_string("SIMULATOR").unwrap_or(defaults.simulator),
            post_interpreter: env_string("POST_INTERPRETER").unwrap_or(defaults.post_interpreter),
        }
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.worker_name.is_empty() {
            anyhow::bail!("worker_name cannot be empty");
        }

        if !self.redis_url.starts_with("redis://") && !self.redis_url.starts_with("rediss://") {
            anyhow::bail!("redis_url must start with redis:// or rediss://");
        }

        if !self.datastore_url.starts_with("http://") && !self.datastore_url.starts_with("https://")
        {
            anyhow::bail!("datastore_url must start with http:// or https://");
        }

        if self.num_units == 0 {
            anyhow::bail!("num_units must be greater than 0");
        }

        if self.poll_interval.is_zero() {
            anyhow::bail!("poll_interval must be greater than 0");
        }

        if self.simulator.trim().is_empty() || self.post_interpreter.trim().is_empty() {
            anyhow::bail!("simulator and post_interpreter cannot be empty");
        }

        Ok(())
    }

    /// Work directory of the unit with the given index
    pub fn unit_dir(&self, index: usize) -> PathBuf {
        self.work_root.join(unit_name(index))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(format!("worker-{}", hostname()))
    }
}

/// Name of the unit with the given index
pub fn unit_name(index: usize) -> String {
    format!("thread-{}", index)
}

fn hostname() -> String {
    nix::unistd::gethostname()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse::<T>().ok())
}
