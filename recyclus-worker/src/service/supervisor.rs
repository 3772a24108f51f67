//! Process supervisor
//!
//! Runs one task's command line as a child process and watches it on a
//! fixed tick. On every tick the child is checked for exit first; only a
//! child that is still running is checked for a cancel request. A canceled
//! child receives SIGTERM (its whole process group, so a `sleep` prefix or a
//! program forked by the shell goes with it) and is waited on.
//!
//! Exit codes are signed: `status.code()` when the process exited, minus the
//! signal number when a signal ended it.

use async_trait::async_trait;
use chrono::Utc;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use recyclus_client::JobStore;
use recyclus_core::domain::job::{Control, fields};
use recyclus_core::domain::outcome::{OutcomeStatus, ProcessOutcome};
use std::io;
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// Command line of one task, run through `sh -c`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskCommand {
    pub line: String,
    /// Working directory of the process
    pub cwd: PathBuf,
    /// File receiving stdout and stderr
    pub stdio: PathBuf,
}

impl TaskCommand {
    pub fn new(line: impl Into<String>, cwd: impl Into<PathBuf>, stdio: impl Into<PathBuf>) -> Self {
        Self {
            line: line.into(),
            cwd: cwd.into(),
            stdio: stdio.into(),
        }
    }

    /// Prefixes the command with a shell-level delay
    ///
    /// The delay runs inside the supervised process, so it counts toward the
    /// task's duration.
    pub fn with_delay(mut self, seconds: f64) -> Self {
        if seconds > 0.0 {
            self.line = format!("sleep {}; {}", seconds, self.line);
        }
        self
    }
}

/// Answers whether the running task should be canceled
#[async_trait]
pub trait CancelCheck: Send + Sync {
    async fn should_cancel(&self) -> bool;
}

/// Reads the job's `ctrl` field from the job store
pub struct StoreCancelCheck {
    store: Arc<dyn JobStore>,
    key: String,
}

impl StoreCancelCheck {
    pub fn new(store: Arc<dyn JobStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }
}

#[async_trait]
impl CancelCheck for StoreCancelCheck {
    async fn should_cancel(&self) -> bool {
        match self.store.get_field(&self.key, fields::CTRL).await {
            Ok(value) => Control::from_field(value.as_deref()) == Control::Cancel,
            Err(e) => {
                // Keep running; the next tick asks again
                warn!("Failed to read ctrl of {}: {}", self.key, e);
                false
            }
        }
    }
}

/// A started process as the supervisor sees it
#[async_trait]
pub trait ProcessHandle: Send {
    /// Signed exit code if the process has exited, without blocking
    fn try_wait(&mut self) -> io::Result<Option<i32>>;

    /// Asks the process to terminate
    fn terminate(&mut self) -> io::Result<()>;

    /// Blocks until the process has exited
    async fn wait(&mut self) -> io::Result<i32>;
}

/// A real child process, leader of its own process group
pub struct ChildProcess {
    child: Child,
}

impl ChildProcess {
    /// Starts the command with stdout and stderr going to its stdio file
    pub fn spawn(command: &TaskCommand) -> io::Result<Self> {
        let stdout = std::fs::File::create(&command.stdio)?;
        let stderr = stdout.try_clone()?;

        let child = Command::new("sh")
            .arg("-c")
            .arg(&command.line)
            .current_dir(&command.cwd)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .process_group(0)
            .kill_on_drop(true)
            .spawn()?;

        debug!("Spawned pid {:?}: {}", child.id(), command.line);
        Ok(Self { child })
    }

    /// Process id, or `None` once the child has been reaped
    #[cfg(test)]
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }
}

#[async_trait]
impl ProcessHandle for ChildProcess {
    fn try_wait(&mut self) -> io::Result<Option<i32>> {
        Ok(self.child.try_wait()?.map(signed_exit_code))
    }

    fn terminate(&mut self) -> io::Result<()> {
        let Some(pid) = self.child.id() else {
            return Ok(());
        };
        killpg(Pid::from_raw(pid as i32), Signal::SIGTERM).map_err(io::Error::from)
    }

    async fn wait(&mut self) -> io::Result<i32> {
        Ok(signed_exit_code(self.child.wait().await?))
    }
}

/// Exit code, or minus the terminating signal
pub fn signed_exit_code(status: ExitStatus) -> i32 {
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signal)) => -signal,
        (None, None) => -1,
    }
}

/// How the poll loop ended
enum Polled {
    Exited(i32),
    Canceled,
}

/// Supervises task processes on a fixed poll interval
#[derive(Debug, Clone)]
pub struct ProcessSupervisor {
    poll_interval: Duration,
}

impl ProcessSupervisor {
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }

    /// Runs a command to completion or cancellation
    ///
    /// Never fails: a process that cannot be started or waited on yields a
    /// `Failed` outcome carrying the error text.
    pub async fn execute(&self, command: &TaskCommand, cancel: &dyn CancelCheck) -> ProcessOutcome {
        let started_at = Utc::now();

        match ChildProcess::spawn(command) {
            Ok(child) => self.supervise(child, cancel, started_at).await,
            Err(e) => {
                warn!("Failed to start '{}': {}", command.line, e);
                ProcessOutcome::failed(e.to_string(), started_at, Utc::now())
            }
        }
    }

    /// Watches an already started process
    pub async fn supervise<P: ProcessHandle>(
        &self,
        mut process: P,
        cancel: &dyn CancelCheck,
        started_at: chrono::DateTime<Utc>,
    ) -> ProcessOutcome {
        let polled = self.poll(&mut process, cancel).await;
        let ended_at = Utc::now();

        match polled {
            Ok(Polled::Exited(code)) => ProcessOutcome::from_exit_code(code, started_at, ended_at),
            Ok(Polled::Canceled) => {
                ProcessOutcome::new(OutcomeStatus::Canceled, None, started_at, ended_at)
            }
            Err(e) => {
                warn!("Failed while waiting on process: {}", e);
                ProcessOutcome::failed(e.to_string(), started_at, ended_at)
            }
        }
    }

    async fn poll<P: ProcessHandle>(
        &self,
        process: &mut P,
        cancel: &dyn CancelCheck,
    ) -> io::Result<Polled> {
        loop {
            tokio::time::sleep(self.poll_interval).await;

            if let Some(code) = process.try_wait()? {
                debug!("Process exited with {}", code);
                return Ok(Polled::Exited(code));
            }

            if cancel.should_cancel().await {
                info!("Cancel requested, terminating process");
                if let Err(e) = process.terminate() {
                    warn!("Failed to signal process: {}", e);
                }
                let code = process.wait().await?;
                debug!("Canceled process exited with {}", code);
                return Ok(Polled::Canceled);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recyclus_client::MemoryStore;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Instant;

    const TICK: Duration = Duration::from_millis(20);

    /// Cancel check driven by a flag
    #[derive(Default)]
    struct Flag {
        cancel: AtomicBool,
        asked: AtomicUsize,
    }

    #[async_trait]
    impl CancelCheck for Flag {
        async fn should_cancel(&self) -> bool {
            self.asked.fetch_add(1, Ordering::SeqCst);
            self.cancel.load(Ordering::SeqCst)
        }
    }

    /// Process that exits with `code` after `ticks` polls
    struct FakeProcess {
        ticks: usize,
        code: i32,
        polls: usize,
        terminated: bool,
        fail_wait: bool,
    }

    impl FakeProcess {
        fn exits_after(ticks: usize, code: i32) -> Self {
            Self {
                ticks,
                code,
                polls: 0,
                terminated: false,
                fail_wait: false,
            }
        }
    }

    #[async_trait]
    impl ProcessHandle for FakeProcess {
        fn try_wait(&mut self) -> io::Result<Option<i32>> {
            self.polls += 1;
            Ok((self.polls >= self.ticks).then_some(self.code))
        }

        fn terminate(&mut self) -> io::Result<()> {
            self.terminated = true;
            Ok(())
        }

        async fn wait(&mut self) -> io::Result<i32> {
            if self.fail_wait {
                return Err(io::Error::new(io::ErrorKind::Other, "wait failed"));
            }
            Ok(if self.terminated { -15 } else { self.code })
        }
    }

    fn command(dir: &std::path::Path, line: &str) -> TaskCommand {
        TaskCommand::new(line, dir, dir.join("simulation_output.txt"))
    }

    #[tokio::test]
    async fn test_exit_zero_is_done() {
        let supervisor = ProcessSupervisor::new(TICK);
        let flag = Flag::default();

        let outcome = supervisor
            .supervise(FakeProcess::exits_after(3, 0), &flag, Utc::now())
            .await;

        assert_eq!(outcome.status, OutcomeStatus::Done);
        assert_eq!(outcome.reason, None);
        // Asked on the two ticks where the process was still running
        assert_eq!(flag.asked.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_exit_code_is_failed_with_reason() {
        let supervisor = ProcessSupervisor::new(TICK);

        let outcome = supervisor
            .supervise(FakeProcess::exits_after(1, 2), &Flag::default(), Utc::now())
            .await;

        assert_eq!(outcome.status, OutcomeStatus::Failed);
        assert_eq!(outcome.reason.as_deref(), Some("exit code:2"));
    }

    #[tokio::test]
    async fn test_signal_exit_is_canceled() {
        let supervisor = ProcessSupervisor::new(TICK);

        let outcome = supervisor
            .supervise(FakeProcess::exits_after(1, -9), &Flag::default(), Utc::now())
            .await;

        assert_eq!(outcome.status, OutcomeStatus::Canceled);
    }

    #[tokio::test]
    async fn test_cancel_terminates_running_process() {
        let supervisor = ProcessSupervisor::new(TICK);
        let flag = Flag::default();
        flag.cancel.store(true, Ordering::SeqCst);

        let outcome = supervisor
            .supervise(FakeProcess::exits_after(usize::MAX, 0), &flag, Utc::now())
            .await;

        assert_eq!(outcome.status, OutcomeStatus::Canceled);
        assert_eq!(flag.asked.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exit_wins_over_pending_cancel() {
        let supervisor = ProcessSupervisor::new(TICK);
        let flag = Flag::default();
        flag.cancel.store(true, Ordering::SeqCst);

        let outcome = supervisor
            .supervise(FakeProcess::exits_after(1, 0), &flag, Utc::now())
            .await;

        assert_eq!(outcome.status, OutcomeStatus::Done);
        assert_eq!(flag.asked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_wait_error_is_failed() {
        let supervisor = ProcessSupervisor::new(TICK);
        let flag = Flag::default();
        flag.cancel.store(true, Ordering::SeqCst);
        let mut process = FakeProcess::exits_after(usize::MAX, 0);
        process.fail_wait = true;

        let outcome = supervisor.supervise(process, &flag, Utc::now()).await;

        assert_eq!(outcome.status, OutcomeStatus::Failed);
        assert_eq!(outcome.reason.as_deref(), Some("wait failed"));
    }

    #[test]
    fn test_delay_prefix() {
        let cmd = TaskCommand::new("cyclus -o out.sqlite in.json", "/jobs", "/jobs/log")
            .with_delay(3.0);
        assert_eq!(cmd.line, "sleep 3; cyclus -o out.sqlite in.json");

        let cmd = TaskCommand::new("python post.py", "/jobs", "/jobs/log").with_delay(0.0);
        assert_eq!(cmd.line, "python post.py");
    }

    #[tokio::test]
    async fn test_real_process_exit_codes() {
        let tmp = tempfile::tempdir().unwrap();
        let supervisor = ProcessSupervisor::new(TICK);
        let flag = Flag::default();

        let done = supervisor.execute(&command(tmp.path(), "true"), &flag).await;
        assert_eq!(done.status, OutcomeStatus::Done);

        let failed = supervisor.execute(&command(tmp.path(), "exit 3"), &flag).await;
        assert_eq!(failed.status, OutcomeStatus::Failed);
        assert_eq!(failed.reason.as_deref(), Some("exit code:3"));
    }

    #[tokio::test]
    async fn test_real_process_output_goes_to_stdio_file() {
        let tmp = tempfile::tempdir().unwrap();
        let supervisor = ProcessSupervisor::new(TICK);
        let cmd = command(tmp.path(), "echo out; echo err >&2");

        let outcome = supervisor.execute(&cmd, &Flag::default()).await;

        assert_eq!(outcome.status, OutcomeStatus::Done);
        let log = std::fs::read_to_string(&cmd.stdio).unwrap();
        assert!(log.contains("out"));
        assert!(log.contains("err"));
    }

    #[tokio::test]
    async fn test_launch_error_is_failed() {
        let tmp = tempfile::tempdir().unwrap();
        let supervisor = ProcessSupervisor::new(TICK);
        let cmd = TaskCommand::new(
            "true",
            tmp.path().join("missing"),
            tmp.path().join("simulation_output.txt"),
        );

        let outcome = supervisor.execute(&cmd, &Flag::default()).await;

        assert_eq!(outcome.status, OutcomeStatus::Failed);
        assert!(outcome.reason.is_some());
    }

    #[tokio::test]
    async fn test_delay_counts_toward_duration() {
        let tmp = tempfile::tempdir().unwrap();
        let supervisor = ProcessSupervisor::new(TICK);
        let cmd = command(tmp.path(), "true").with_delay(0.3);

        let outcome = supervisor.execute(&cmd, &Flag::default()).await;

        assert_eq!(outcome.status, OutcomeStatus::Done);
        assert!(outcome.duration >= chrono::TimeDelta::milliseconds(300));
    }

    #[tokio::test]
    async fn test_cancel_from_store_stops_real_process() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        store.submit("job:1", &[("ctrl", "run")]);
        let cancel = StoreCancelCheck::new(store.clone(), "job:1");
        let supervisor = ProcessSupervisor::new(Duration::from_millis(100));

        let mut child = ChildProcess::spawn(&command(tmp.path(), "sleep 30")).unwrap();
        let pid = child.id().unwrap();
        assert!(child.try_wait().unwrap().is_none());

        let flip = {
            let store = store.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(150)).await;
                store.set_field("job:1", "ctrl", "cancel").await.unwrap();
                Instant::now()
            })
        };

        let outcome = supervisor.supervise(child, &cancel, Utc::now()).await;
        let finished = Instant::now();
        let flipped = flip.await.unwrap();

        assert_eq!(outcome.status, OutcomeStatus::Canceled);
        assert!(finished.duration_since(flipped) < Duration::from_secs(1));
        assert!(nix::sys::signal::kill(Pid::from_raw(pid as i32), None).is_err());
    }

    #[test]
    fn test_signed_exit_code() {
        assert_eq!(signed_exit_code(ExitStatus::from_raw(0)), 0);
        assert_eq!(signed_exit_code(ExitStatus::from_raw(2 << 8)), 2);
        assert_eq!(signed_exit_code(ExitStatus::from_raw(15)), -15);
    }
}
