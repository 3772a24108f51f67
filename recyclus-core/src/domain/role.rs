//! File roles
//!
//! A role names the purpose of a file a task reads or produces. The set is
//! closed so "which files belong to this task" is always checkable.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Scenario input handed to the simulator
    Scenario,
    /// Simulator output database
    Output,
    /// Combined stdout/stderr of the task
    Stdio,
    /// Post-processing script
    Script,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Scenario => "scenario",
            Role::Output => "output",
            Role::Stdio => "stdio",
            Role::Script => "script",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file on disk playing a role for the current task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleFile {
    pub role: Role,
    pub path: PathBuf,
}

impl RoleFile {
    pub fn new(role: Role, path: impl Into<PathBuf>) -> Self {
        Self {
            role,
            path: path.into(),
        }
    }

    /// File name sent along with the upload
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.role.as_str().to_string())
    }
}
