//! Job store
//!
//! The job store is the only state shared between workers. It holds three
//! lists of job keys (`q:submit`, `q:running`, `q:done`) and one hash per
//! job. Moving a key between lists is always atomic, so a submitted job is
//! delivered to exactly one worker.

mod memory;
mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use async_trait::async_trait;
use recyclus_core::domain::job::{JobRecord, TaskName, fields};
use std::collections::HashMap;
use std::fmt;

use crate::error::StoreResult;

/// The job lists kept by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Queue {
    Submit,
    Running,
    Done,
}

impl Queue {
    /// Store key of the list
    pub fn key(&self) -> &'static str {
        match self {
            Queue::Submit => "q:submit",
            Queue::Running => "q:running",
            Queue::Done => "q:done",
        }
    }
}

impl fmt::Display for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Key of the per-task status record of a job
pub fn task_status_key(job_key: &str, task: TaskName) -> String {
    format!("{}:status:{}", job_key, task)
}

/// Operations the worker needs from the job store
///
/// One instance is created at startup and shared by every worker unit.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Blocks until a job is submitted, then moves its key from the submit
    /// list to the running list and returns it
    async fn claim(&self) -> StoreResult<String>;

    /// Reads one field of a hash
    async fn get_field(&self, key: &str, name: &str) -> StoreResult<Option<String>>;

    /// Reads several fields of a hash; absent fields are left out of the map
    async fn get_fields(&self, key: &str, names: &[&str]) -> StoreResult<HashMap<String, String>>;

    /// Writes one field of a hash
    async fn set_field(&self, key: &str, name: &str, value: &str) -> StoreResult<()>;

    /// Writes several fields of a hash
    ///
    /// Readers may observe the hash between two of these writes.
    async fn set_fields(&self, key: &str, values: &[(String, String)]) -> StoreResult<()>;

    /// Moves a key from the running list to the done list
    async fn requeue_to_done(&self, key: &str) -> StoreResult<()>;

    /// Reads the content of a list, head first
    async fn list(&self, queue: Queue) -> StoreResult<Vec<String>>;

    /// Loads the job record stored under `key`
    async fn load_job(&self, key: &str) -> StoreResult<JobRecord> {
        let values = self
            .get_fields(
                key,
                &[fields::JOBID, fields::USER, fields::NAME, fields::TASKS],
            )
            .await?;
        Ok(JobRecord::from_fields(key, values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_keys() {
        assert_eq!(Queue::Submit.key(), "q:submit");
        assert_eq!(Queue::Running.to_string(), "q:running");
        assert_eq!(Queue::Done.key(), "q:done");
    }

    #[test]
    fn test_task_status_key() {
        assert_eq!(
            task_status_key("job:42", TaskName::Simulation),
            "job:42:status:simulation"
        );
        assert_eq!(task_status_key("job:42", TaskName::Post), "job:42:status:post");
    }
}
