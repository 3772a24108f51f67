//! Job domain types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::domain::outcome::OutcomeStatus;
use crate::domain::task::JobTasks;

/// Names of the hash fields a job record is stored under
pub mod fields {
    pub const JOBID: &str = "jobid";
    pub const STATUS: &str = "status";
    pub const REASON: &str = "reason";
    pub const CTRL: &str = "ctrl";
    pub const TASKS: &str = "tasks";
    pub const USER: &str = "user";
    pub const NAME: &str = "name";
}

/// Job record as read from the job store
///
/// Created by the submitter; the worker that claimed the job is the only
/// writer until the job reaches a terminal status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRecord {
    /// Queue key the record is stored under
    pub key: String,
    pub jobid: String,
    pub user: String,
    pub name: String,
    /// Raw `tasks` field, decoded on demand with [`JobRecord::tasks`]
    pub tasks_json: Option<String>,
}

impl JobRecord {
    /// Builds a record from the hash fields stored under `key`
    ///
    /// Missing metadata fields are treated as empty strings; they are
    /// display-only and never drive the lifecycle.
    pub fn from_fields(key: impl Into<String>, mut values: HashMap<String, String>) -> Self {
        Self {
            key: key.into(),
            jobid: values.remove(fields::JOBID).unwrap_or_default(),
            user: values.remove(fields::USER).unwrap_or_default(),
            name: values.remove(fields::NAME).unwrap_or_default(),
            tasks_json: values.remove(fields::TASKS),
        }
    }

    /// Decodes the declared tasks
    ///
    /// A job without a `tasks` field declares no tasks.
    pub fn tasks(&self) -> Result<JobTasks, serde_json::Error> {
        match self.tasks_json.as_deref() {
            Some(raw) if !raw.trim().is_empty() => serde_json::from_str(raw),
            _ => Ok(JobTasks::default()),
        }
    }
}

/// Task names a job may declare, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskName {
    Simulation,
    Post,
}

impl TaskName {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskName::Simulation => "simulation",
            TaskName::Post => "post",
        }
    }
}

impl fmt::Display for TaskName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskName {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "simulation" => Ok(TaskName::Simulation),
            "post" => Ok(TaskName::Post),
            other => Err(UnknownValue(other.to_string())),
        }
    }
}

/// Job status as stored in the `status` field
///
/// Lifecycle: `running` -> `running:<task>` -> `done` | `failed` | `canceled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    RunningTask(TaskName),
    Done,
    Failed,
    Canceled,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Running => f.write_str("running"),
            JobStatus::RunningTask(task) => write!(f, "running:{}", task),
            JobStatus::Done => f.write_str("done"),
            JobStatus::Failed => f.write_str("failed"),
            JobStatus::Canceled => f.write_str("canceled"),
        }
    }
}

impl FromStr for JobStatus {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(JobStatus::Running),
            "done" => Ok(JobStatus::Done),
            "failed" => Ok(JobStatus::Failed),
            "canceled" => Ok(JobStatus::Canceled),
            other => match other.strip_prefix("running:") {
                Some(task) => Ok(JobStatus::RunningTask(task.parse()?)),
                None => Err(UnknownValue(other.to_string())),
            },
        }
    }
}

impl From<OutcomeStatus> for JobStatus {
    fn from(status: OutcomeStatus) -> Self {
        match status {
            OutcomeStatus::Done => JobStatus::Done,
            OutcomeStatus::Failed => JobStatus::Failed,
            OutcomeStatus::Canceled => JobStatus::Canceled,
        }
    }
}

/// Control flag an external actor writes to the `ctrl` field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Run,
    Cancel,
}

impl Control {
    pub fn as_str(&self) -> &'static str {
        match self {
            Control::Run => "run",
            Control::Cancel => "cancel",
        }
    }

    /// Reads a stored `ctrl` value; anything other than `cancel` keeps the job running
    pub fn from_field(value: Option<&str>) -> Self {
        match value {
            Some("cancel") => Control::Cancel,
            _ => Control::Run,
        }
    }
}

/// A stored string that is not part of a closed vocabulary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownValue(pub String);

impl fmt::Display for UnknownValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown value '{}'", self.0)
    }
}

impl std::error::Error for UnknownValue {}
