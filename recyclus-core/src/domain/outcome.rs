//! Process outcomes
//!
//! Exit codes follow the signed convention: a non-negative value is the
//! code the process exited with, a negative value is minus the signal that
//! terminated it.
//!
//! Instants are kept in UTC and rendered in the host's local time.

use chrono::{DateTime, Local, TimeDelta, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::role::Role;

/// Terminal status of one task execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Done,
    Failed,
    Canceled,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeStatus::Done => "done",
            OutcomeStatus::Failed => "failed",
            OutcomeStatus::Canceled => "canceled",
        }
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies a signed exit code
///
/// Returns the status and, for failures, the human-readable reason.
pub fn classify_exit_code(code: i32) -> (OutcomeStatus, Option<String>) {
    match code {
        0 => (OutcomeStatus::Done, None),
        c if c > 0 => (OutcomeStatus::Failed, Some(format!("exit code:{}", c))),
        _ => (OutcomeStatus::Canceled, None),
    }
}

/// Result of supervising one task's process
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessOutcome {
    pub status: OutcomeStatus,
    pub reason: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration: TimeDelta,
    /// Roles whose files belong to this task
    pub files: Vec<Role>,
}

impl ProcessOutcome {
    /// Outcome for a process whose exit code was observed
    pub fn from_exit_code(code: i32, started_at: DateTime<Utc>, ended_at: DateTime<Utc>) -> Self {
        let (status, reason) = classify_exit_code(code);
        Self::new(status, reason, started_at, ended_at)
    }

    /// Outcome for a task that could not be started or waited on
    pub fn failed(
        reason: impl Into<String>,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
    ) -> Self {
        Self::new(OutcomeStatus::Failed, Some(reason.into()), started_at, ended_at)
    }

    pub fn new(
        status: OutcomeStatus,
        reason: Option<String>,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
    ) -> Self {
        Self {
            status,
            reason,
            started_at,
            ended_at,
            duration: ended_at - started_at,
            files: Vec::new(),
        }
    }

    /// Attaches the roles uploaded for this task
    pub fn with_files(mut self, files: Vec<Role>) -> Self {
        self.files = files;
        self
    }

    pub fn is_done(&self) -> bool {
        self.status == OutcomeStatus::Done
    }

    /// Fields of the per-task status record
    pub fn status_fields(&self) -> Vec<(String, String)> {
        let files: Vec<&str> = self.files.iter().map(Role::as_str).collect();

        let mut fields = vec![
            (
                "started at".to_string(),
                format_timestamp(&self.started_at.with_timezone(&Local)),
            ),
            (
                "ended at".to_string(),
                format_timestamp(&self.ended_at.with_timezone(&Local)),
            ),
            ("duration".to_string(), format_duration(self.duration)),
            ("status".to_string(), self.status.to_string()),
        ];
        if let Some(reason) = &self.reason {
            fields.push(("reason".to_string(), reason.clone()));
        }
        fields.push((
            "files".to_string(),
            serde_json::to_string(&files).unwrap_or_else(|_| "[]".to_string()),
        ));
        fields
    }
}

/// Timestamp with second precision, e.g. `2024-03-01 12:00:05`
pub fn format_timestamp<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Duration with second precision, e.g. `0:01:05` or `2 days, 3:00:07`
pub fn format_duration(duration: TimeDelta) -> String {
    let total = duration.num_seconds().max(0);
    let days = total / 86_400;
    let rest = total % 86_400;
    let clock = format!("{}:{:02}:{:02}", rest / 3600, (rest % 3600) / 60, rest % 60);

    match days {
        0 => clock,
        1 => format!("1 day, {}", clock),
        n => format!("{} days, {}", n, clock),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_zero_is_done() {
        assert_eq!(classify_exit_code(0), (OutcomeStatus::Done, None));
    }

    #[test]
    fn test_classify_positive_is_failed_with_code() {
        for code in [1, 2, 127, 255] {
            let (status, reason) = classify_exit_code(code);
            assert_eq!(status, OutcomeStatus::Failed);
            assert_eq!(reason, Some(format!("exit code:{}", code)));
        }
    }

    #[test]
    fn test_classify_negative_is_canceled() {
        for code in [-1, -9, -15, i32::MIN] {
            assert_eq!(classify_exit_code(code), (OutcomeStatus::Canceled, None));
        }
    }

    #[test]
    fn test_duration_formatting() {
        assert_eq!(format_duration(TimeDelta::seconds(0)), "0:00:00");
        assert_eq!(format_duration(TimeDelta::seconds(65)), "0:01:05");
        assert_eq!(format_duration(TimeDelta::seconds(3 * 3600 + 7)), "3:00:07");
        assert_eq!(format_duration(TimeDelta::milliseconds(1999)), "0:00:01");
    }

    #[test]
    fn test_duration_over_a_day() {
        assert_eq!(format_duration(TimeDelta::hours(26)), "1 day, 2:00:00");
        assert_eq!(format_duration(TimeDelta::seconds(2 * 86_400 + 7)), "2 days, 0:00:07");
    }

    #[test]
    fn test_timestamp_formatting() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 9, 5, 7).unwrap();
        assert_eq!(format_timestamp(&at), "2024-03-01 09:05:07");
    }

    #[test]
    fn test_status_fields() {
        let started = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let ended = Utc.with_ymd_and_hms(2024, 3, 1, 12, 1, 5).unwrap();
        let outcome = ProcessOutcome::from_exit_code(2, started, ended)
            .with_files(vec![Role::Output, Role::Stdio]);

        let fields: std::collections::HashMap<_, _> =
            outcome.status_fields().into_iter().collect();
        assert_eq!(fields["started at"], format_timestamp(&started.with_timezone(&Local)));
        assert_eq!(fields["ended at"], format_timestamp(&ended.with_timezone(&Local)));
        assert_eq!(fields["duration"], "0:01:05");
        assert_eq!(fields["status"], "failed");
        assert_eq!(fields["reason"], "exit code:2");
        assert_eq!(fields["files"], r#"["output","stdio"]"#);
    }

    #[test]
    fn test_done_outcome_has_no_reason_field() {
        let now = Utc::now();
        let outcome = ProcessOutcome::from_exit_code(0, now, now);
        assert!(outcome.is_done());
        assert!(outcome.status_fields().iter().all(|(k, _)| k != "reason"));
    }
}
