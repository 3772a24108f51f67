//! Task pipeline
//!
//! Runs the tasks a job declares, in order: `simulation`, then `post`.
//! Each step returns `None` when its task is not declared. A simulation
//! that does not finish `done` stops the pipeline before `post`.
//!
//! Every task that ran gets its artifacts uploaded, whatever its outcome,
//! and its own status record under `<jobkey>:status:<task>`.

use anyhow::{Context, Result};
use chrono::{Local, Utc};
use recyclus_client::{JobStore, task_status_key};
use recyclus_core::domain::job::{JobRecord, JobStatus, TaskName, fields};
use recyclus_core::domain::outcome::{OutcomeStatus, ProcessOutcome, format_timestamp};
use recyclus_core::domain::role::{Role, RoleFile};
use recyclus_core::domain::task::{JobTasks, PostTask, SimulationTask, TaskOptions};
use recyclus_core::dto::upload::JobMetadata;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::service::supervisor::{ProcessSupervisor, StoreCancelCheck, TaskCommand};
use crate::service::upload::{self, ArtifactUploader};
use crate::workdir::{InvalidFileName, WorkDir};

/// Programs the pipeline invokes
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub simulator: String,
    pub post_interpreter: String,
    pub poll_interval: Duration,
}

impl From<&Config> for PipelineSettings {
    fn from(config: &Config) -> Self {
        Self {
            simulator: config.simulator.clone(),
            post_interpreter: config.post_interpreter.clone(),
            poll_interval: config.poll_interval,
        }
    }
}

/// One executed task
#[derive(Debug, Clone)]
pub struct TaskRun {
    pub task: TaskName,
    pub outcome: ProcessOutcome,
}

/// Final status of a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub status: OutcomeStatus,
    pub reason: Option<String>,
}

impl Verdict {
    pub fn done() -> Self {
        Self {
            status: OutcomeStatus::Done,
            reason: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Failed,
            reason: Some(reason.into()),
        }
    }

    /// Fields written to the job record
    pub fn fields(&self) -> Vec<(String, String)> {
        let mut values = vec![(
            fields::STATUS.to_string(),
            JobStatus::from(self.status).to_string(),
        )];
        if let Some(reason) = &self.reason {
            values.push((fields::REASON.to_string(), reason.clone()));
        }
        values
    }
}

impl From<&TaskRun> for Verdict {
    fn from(run: &TaskRun) -> Self {
        Self {
            status: run.outcome.status,
            reason: run.outcome.reason.clone(),
        }
    }
}

/// Everything needed to run one task
struct TaskPlan {
    command: TaskCommand,
    /// Input file to write before starting: (name, content)
    input: (String, String),
    role_files: Vec<RoleFile>,
    declared: Vec<Role>,
}

/// Sequences a job's tasks
pub struct TaskPipeline {
    store: Arc<dyn JobStore>,
    uploader: Arc<dyn ArtifactUploader>,
    supervisor: ProcessSupervisor,
    settings: PipelineSettings,
}

impl TaskPipeline {
    pub fn new(
        store: Arc<dyn JobStore>,
        uploader: Arc<dyn ArtifactUploader>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            store,
            uploader,
            supervisor: ProcessSupervisor::new(settings.poll_interval),
            settings,
        }
    }

    /// Runs every declared task and decides the job's final status
    ///
    /// Errors are job store failures only; everything that goes wrong with
    /// the job itself ends up in the verdict.
    pub async fn run(&self, job: &JobRecord, workdir: &WorkDir) -> Result<Verdict> {
        let tasks = match job.tasks() {
            Ok(tasks) => tasks,
            Err(e) => {
                warn!("Job {}: cannot decode tasks: {}", job.jobid, e);
                return Ok(Verdict::failed(format!("invalid tasks: {}", e)));
            }
        };

        for name in tasks.unknown.keys() {
            warn!("Job {}: ignoring unknown task '{}'", job.jobid, name);
        }
        if tasks.is_empty() {
            info!("Job {}: no tasks declared", job.jobid);
            return Ok(Verdict::done());
        }

        let simulation = self.run_simulation(job, &tasks, workdir).await?;
        if let Some(run) = &simulation {
            if !run.outcome.is_done() {
                info!(
                    "Job {}: {} {}, skipping post",
                    job.jobid, run.task, run.outcome.status
                );
                return Ok(Verdict::from(run));
            }
        }

        let post = self.run_post(job, &tasks, workdir).await?;

        Ok(match post.or(simulation) {
            Some(run) => Verdict::from(&run),
            None => Verdict::done(),
        })
    }

    /// Runs the `simulation` task, if declared
    pub async fn run_simulation(
        &self,
        job: &JobRecord,
        tasks: &JobTasks,
        workdir: &WorkDir,
    ) -> Result<Option<TaskRun>> {
        let Some(spec) = &tasks.simulation else {
            return Ok(None);
        };
        let plan = self.plan_simulation(spec, workdir);
        self.run_task(job, TaskName::Simulation, plan, &spec.options, workdir)
            .await
            .map(Some)
    }

    /// Runs the `post` task, if declared
    pub async fn run_post(
        &self,
        job: &JobRecord,
        tasks: &JobTasks,
        workdir: &WorkDir,
    ) -> Result<Option<TaskRun>> {
        let Some(spec) = &tasks.post else {
            return Ok(None);
        };
        let plan = self.plan_post(spec, workdir);
        self.run_task(job, TaskName::Post, plan, &spec.options, workdir)
            .await
            .map(Some)
    }

    fn plan_simulation(
        &self,
        spec: &SimulationTask,
        workdir: &WorkDir,
    ) -> Result<TaskPlan, InvalidFileName> {
        let task = TaskName::Simulation;
        let scenario = workdir.entry(&spec.scenario_filename)?;
        let output = workdir.entry(&spec.output_filename())?;
        let stdio = workdir.entry(&stdio_filename(task))?;

        let line = format!(
            "{} -o {} {}",
            self.settings.simulator,
            quote(&output),
            quote(&scenario)
        );

        Ok(TaskPlan {
            command: TaskCommand::new(line, workdir.path(), &stdio),
            input: (spec.scenario_filename.clone(), spec.scenario_content()),
            role_files: vec![
                RoleFile::new(Role::Scenario, scenario),
                RoleFile::new(Role::Output, output),
                RoleFile::new(Role::Stdio, stdio),
            ],
            declared: spec.files(),
        })
    }

    fn plan_post(&self, spec: &PostTask, workdir: &WorkDir) -> Result<TaskPlan, InvalidFileName> {
        let script = workdir.entry(&spec.script_filename)?;
        let stdio = workdir.entry(&stdio_filename(TaskName::Post))?;

        let line = format!("{} {}", self.settings.post_interpreter, quote(&script));

        Ok(TaskPlan {
            command: TaskCommand::new(line, workdir.path(), &stdio),
            input: (spec.script_filename.clone(), spec.script.clone()),
            role_files: vec![
                RoleFile::new(Role::Script, script),
                RoleFile::new(Role::Stdio, stdio),
            ],
            declared: spec.files(),
        })
    }

    async fn run_task(
        &self,
        job: &JobRecord,
        task: TaskName,
        plan: Result<TaskPlan, InvalidFileName>,
        options: &TaskOptions,
        workdir: &WorkDir,
    ) -> Result<TaskRun> {
        let status_key = task_status_key(&job.key, task);

        debug!("Job {}: running {}", job.jobid, task);
        self.store
            .set_field(&job.key, fields::STATUS, &JobStatus::RunningTask(task).to_string())
            .await
            .context("Failed to publish task status")?;
        self.store
            .set_field(&status_key, "start time", &format_timestamp(&Local::now()))
            .await
            .context("Failed to record task start")?;

        let plan = match plan {
            Ok(plan) => plan,
            Err(e) => {
                warn!("Job {}: {} not started: {}", job.jobid, task, e);
                let now = Utc::now();
                let outcome = ProcessOutcome::failed(e.to_string(), now, now);
                self.store
                    .set_fields(&status_key, &outcome.status_fields())
                    .await
                    .context("Failed to record task outcome")?;
                return Ok(TaskRun { task, outcome });
            }
        };

        let (name, content) = &plan.input;
        let outcome = match workdir.write_input(name, content) {
            Ok(_) => {
                let command = plan.command.with_delay(options.sleep);
                let cancel = StoreCancelCheck::new(Arc::clone(&self.store), job.key.clone());
                self.supervisor.execute(&command, &cancel).await
            }
            Err(e) => {
                warn!("Job {}: cannot write {}: {}", job.jobid, name, e);
                let now = Utc::now();
                ProcessOutcome::failed(format!("cannot write {}: {}", name, e), now, now)
            }
        };

        info!(
            "Job {}: {} {} after {}s",
            job.jobid,
            task,
            outcome.status,
            outcome.duration.num_seconds()
        );

        let files: Vec<Role> = plan
            .role_files
            .iter()
            .map(|file| file.role)
            .filter(|role| plan.declared.contains(role))
            .collect();

        let package = upload::collect(JobMetadata::from(job), &plan.role_files, &plan.declared);
        upload::ship(self.uploader.as_ref(), package).await;

        let outcome = outcome.with_files(files);
        self.store
            .set_fields(&status_key, &outcome.status_fields())
            .await
            .context("Failed to record task outcome")?;

        Ok(TaskRun { task, outcome })
    }
}

/// Quotes a path for the `sh -c` command line
fn quote(path: &Path) -> String {
    shell_escape::escape(path.to_string_lossy()).into_owned()
}

/// Name of the file receiving a task's stdout and stderr
pub fn stdio_filename(task: TaskName) -> String {
    format!("{}_output.txt", task)
}
