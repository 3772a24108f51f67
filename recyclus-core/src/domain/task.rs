//! Task specifications
//!
//! The `tasks` field of a job is a JSON object mapping task names to their
//! parameters. Only `simulation` and `post` are understood; anything else is
//! kept aside so the worker can report it.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

use crate::domain::role::Role;

/// Tasks declared by a job
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JobTasks {
    pub simulation: Option<SimulationTask>,
    pub post: Option<PostTask>,
    /// Task names this worker does not know how to run
    #[serde(flatten)]
    pub unknown: BTreeMap<String, JsonValue>,
}

impl JobTasks {
    /// Whether the job declares nothing this worker can run
    pub fn is_empty(&self) -> bool {
        self.simulation.is_none() && self.post.is_none()
    }
}

/// Options common to every task
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskOptions {
    /// Seconds to sleep inside the monitored process before the command runs
    #[serde(default)]
    pub sleep: f64,

    /// Roles whose files are uploaded once the task ends
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<Role>>,
}

/// Parameters of the `simulation` task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationTask {
    /// Scenario definition; strings are written verbatim, anything else as JSON
    pub scenario: JsonValue,

    /// Output format, used as the extension of the output database
    #[serde(default = "default_format")]
    pub format: String,

    #[serde(default = "default_scenario_filename")]
    pub scenario_filename: String,

    #[serde(flatten)]
    pub options: TaskOptions,
}

impl SimulationTask {
    pub const DEFAULT_FILES: [Role; 3] = [Role::Scenario, Role::Output, Role::Stdio];

    /// Content written to the scenario file
    pub fn scenario_content(&self) -> String {
        match &self.scenario {
            JsonValue::String(text) => text.clone(),
            other => other.to_string(),
        }
    }

    /// Name of the output database inside the work directory
    pub fn output_filename(&self) -> String {
        format!("cyclus.{}", self.format)
    }

    pub fn files(&self) -> Vec<Role> {
        self.options
            .files
            .clone()
            .unwrap_or_else(|| Self::DEFAULT_FILES.to_vec())
    }
}

/// Parameters of the `post` task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostTask {
    /// Source of the post-processing script
    #[serde(default)]
    pub script: String,

    #[serde(default = "default_script_filename")]
    pub script_filename: String,

    #[serde(flatten)]
    pub options: TaskOptions,
}

impl PostTask {
    pub const DEFAULT_FILES: [Role; 2] = [Role::Script, Role::Stdio];

    pub fn files(&self) -> Vec<Role> {
        self.options
            .files
            .clone()
            .unwrap_or_else(|| Self::DEFAULT_FILES.to_vec())
    }
}

fn default_format() -> String {
    "sqlite".to_string()
}

fn default_scenario_filename() -> String {
    "scenario.json".to_string()
}

fn default_script_filename() -> String {
    "post.py".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_simulation_defaults() {
        let tasks: JobTasks = serde_json::from_value(json!({
            "simulation": { "scenario": "{\"simulation\": {}}" }
        }))
        .unwrap();

        let sim = tasks.simulation.unwrap();
        assert_eq!(sim.format, "sqlite");
        assert_eq!(sim.output_filename(), "cyclus.sqlite");
        assert_eq!(sim.scenario_filename, "scenario.json");
        assert_eq!(sim.options.sleep, 0.0);
        assert_eq!(sim.files(), vec![Role::Scenario, Role::Output, Role::Stdio]);
        assert_eq!(sim.scenario_content(), "{\"simulation\": {}}");
        assert!(tasks.post.is_none());
    }

    #[test]
    fn test_structured_scenario_is_written_as_json() {
        let sim: SimulationTask = serde_json::from_value(json!({
            "scenario": { "simulation": { "control": { "duration": 12 } } },
            "format": "h5"
        }))
        .unwrap();

        let content: JsonValue = serde_json::from_str(&sim.scenario_content()).unwrap();
        assert_eq!(content["simulation"]["control"]["duration"], 12);
        assert_eq!(sim.output_filename(), "cyclus.h5");
    }

    #[test]
    fn test_post_options() {
        let tasks: JobTasks = serde_json::from_value(json!({
            "post": {
                "script": "print('hi')",
                "script_filename": "analyze.py",
                "sleep": 2,
                "files": ["stdio"]
            }
        }))
        .unwrap();

        let post = tasks.post.unwrap();
        assert_eq!(post.script_filename, "analyze.py");
        assert_eq!(post.options.sleep, 2.0);
        assert_eq!(post.files(), vec![Role::Stdio]);
        assert!(tasks.simulation.is_none());
    }

    #[test]
    fn test_unknown_tasks_are_kept_aside() {
        let tasks: JobTasks = serde_json::from_value(json!({
            "render": { "frames": 10 }
        }))
        .unwrap();

        assert!(tasks.is_empty());
        assert!(tasks.unknown.contains_key("render"));
    }
}
