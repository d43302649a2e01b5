//! Scheduler and execution-history types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A recurring inference policy bound to one deployed version.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scheduler {
    pub id: i64,
    pub version_id: i64,
    pub datasource_id: i64,
    pub start_time: DateTime<Utc>,
    /// Seconds between firings; 0 fires exactly once.
    pub interval_seconds: i64,
    pub enabled: bool,
    pub last_fired_at: Option<DateTime<Utc>>,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
}

impl Scheduler {
    /// Index of the firing slot containing `at`, or `None` before the start.
    pub fn slot_at(&self, at: DateTime<Utc>) -> Option<i64> {
        if at < self.start_time {
            return None;
        }
        if self.interval_seconds == 0 {
            return Some(0);
        }
        Some((at - self.start_time).num_seconds() / self.interval_seconds)
    }

    /// True when a slot has opened since the last firing.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if !self.enabled {
            return false;
        }
        let Some(current) = self.slot_at(now) else {
            return false;
        };
        match self.last_fired_at.and_then(|fired| self.slot_at(fired)) {
            Some(last) => current > last,
            None => true,
        }
    }
}

/// Input for creating a scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewScheduler {
    pub version_id: i64,
    pub datasource_id: i64,
    pub start_time: DateTime<Utc>,
    pub interval_seconds: i64,
    #[serde(default)]
    pub created_by: Option<i64>,
}

/// Status of one scheduled execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Preparing,
    Running,
    Failed,
    Successful,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Preparing => "PREPARING",
            TaskStatus::Running => "RUNNING",
            TaskStatus::Failed => "FAILED",
            TaskStatus::Successful => "SUCCESSFUL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(TaskStatus::Pending),
            "PREPARING" => Some(TaskStatus::Preparing),
            "RUNNING" => Some(TaskStatus::Running),
            "FAILED" => Some(TaskStatus::Failed),
            "SUCCESSFUL" => Some(TaskStatus::Successful),
            _ => None,
        }
    }

    #[cfg(test)]
    pub fn is_finished(&self) -> bool {
        matches!(self, TaskStatus::Failed | TaskStatus::Successful)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One scheduled execution record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerHistory {
    pub id: i64,
    pub scheduler_id: i64,
    /// 1-based ordinal of this record within its scheduler.
    pub counter: i64,
    pub status: TaskStatus,
    pub start_execution: Option<DateTime<Utc>>,
    pub end_execution: Option<DateTime<Utc>>,
    pub execution_duration_ms: Option<i64>,
    pub successful_run: bool,
    pub anomaly_detected: Option<bool>,
    pub anomaly_count: Option<i64>,
    pub failure_reason: Option<String>,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn scheduler(interval_seconds: i64) -> Scheduler {
        let start = Utc.with_ymd_and_hms(2024, 5, 8, 10, 0, 0).unwrap();
        Scheduler {
            id: 1,
            version_id: 1,
            datasource_id: 1,
            start_time: start,
            interval_seconds,
            enabled: true,
            last_fired_at: None,
            created_by: 1,
            created_at: start,
        }
    }

    #[test]
    fn test_not_due_before_start() {
        let s = scheduler(300);
        assert!(!s.is_due(s.start_time - Duration::seconds(1)));
        assert!(s.is_due(s.start_time));
    }

    #[test]
    fn test_due_once_per_slot() {
        let mut s = scheduler(300);
        s.last_fired_at = Some(s.start_time + Duration::seconds(10));
        assert!(!s.is_due(s.start_time + Duration::seconds(299)));
        assert!(s.is_due(s.start_time + Duration::seconds(300)));
    }

    #[test]
    fn test_missed_slots_fire_once() {
        let mut s = scheduler(60);
        s.last_fired_at = Some(s.start_time);
        let late = s.start_time + Duration::seconds(600);
        assert!(s.is_due(late));
        s.last_fired_at = Some(late);
        assert!(!s.is_due(late + Duration::seconds(30)));
    }

    #[test]
    fn test_zero_interval_fires_once() {
        let mut s = scheduler(0);
        assert!(s.is_due(s.start_time + Duration::hours(1)));
        s.last_fired_at = Some(s.start_time + Duration::hours(1));
        assert!(!s.is_due(s.start_time + Duration::days(3)));
    }

    #[test]
    fn test_disabled_is_never_due() {
        let mut s = scheduler(60);
        s.enabled = false;
        assert!(!s.is_due(s.start_time + Duration::hours(1)));
    }
}
