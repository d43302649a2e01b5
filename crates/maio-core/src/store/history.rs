//! Rows of the `scheduler_history` table.

use super::{conversion_error, time};
use crate::error::Result;
use crate::models::{Cursor, SchedulerHistory, TaskStatus};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

const COLUMNS: &str = "id, scheduler_id, counter, status, start_execution, end_execution, \
                       execution_duration_ms, successful_run, anomaly_detected, anomaly_count, \
                       failure_reason, created_by, created_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<SchedulerHistory> {
    let status: String = row.get(3)?;
    Ok(SchedulerHistory {
        id: row.get(0)?,
        scheduler_id: row.get(1)?,
        counter: row.get(2)?,
        status: TaskStatus::parse(&status)
            .ok_or_else(|| conversion_error(3, format!("unknown task status '{}'", status)))?,
        start_execution: time::column_opt(row, 4)?,
        end_execution: time::column_opt(row, 5)?,
        execution_duration_ms: row.get(6)?,
        successful_run: row.get(7)?,
        anomaly_detected: row.get(8)?,
        anomaly_count: row.get(9)?,
        failure_reason: row.get(10)?,
        created_by: row.get(11)?,
        created_at: time::column(row, 12)?,
    })
}

/// Append a record with the next counter value for its scheduler.
pub(crate) fn append(
    conn: &Connection,
    scheduler_id: i64,
    status: TaskStatus,
    created_by: i64,
    at: &DateTime<Utc>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO scheduler_history (scheduler_id, counter, status, created_by, created_at)
         VALUES (?1,
                 (SELECT COALESCE(MAX(counter), 0) + 1 FROM scheduler_history
                  WHERE scheduler_id = ?1),
                 ?2, ?3, ?4)",
        params![scheduler_id, status.as_str(), created_by, time::to_sql(at)],
    )?;
    Ok(conn.last_insert_rowid())
}

pub(crate) fn get(conn: &Connection, id: i64) -> Result<Option<SchedulerHistory>> {
    let record = conn
        .query_row(
            &format!("SELECT {} FROM scheduler_history WHERE id = ?1", COLUMNS),
            params![id],
            from_row,
        )
        .optional()?;
    Ok(record)
}

/// Oldest record still waiting to run.
pub(crate) fn oldest_pending(conn: &Connection, scheduler_id: i64) -> Result<Option<i64>> {
    let id = conn
        .query_row(
            "SELECT id FROM scheduler_history
             WHERE scheduler_id = ?1 AND status = ?2
             ORDER BY created_at, id LIMIT 1",
            params![scheduler_id, TaskStatus::Pending.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

/// True while an execution of this scheduler is preparing or running.
pub(crate) fn has_in_flight(conn: &Connection, scheduler_id: i64) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM scheduler_history
             WHERE scheduler_id = ?1 AND status IN (?2, ?3) LIMIT 1",
            params![
                scheduler_id,
                TaskStatus::Preparing.as_str(),
                TaskStatus::Running.as_str()
            ],
            |_| Ok(()),
        )
        .optional()?
        .is_some();
    Ok(found)
}

pub(crate) fn mark_running(conn: &Connection, id: i64, start: &DateTime<Utc>) -> Result<()> {
    conn.execute(
        "UPDATE scheduler_history SET status = ?1, start_execution = ?2 WHERE id = ?3",
        params![TaskStatus::Running.as_str(), time::to_sql(start), id],
    )?;
    Ok(())
}

/// Fail every preparing or running record. Returns how many were changed.
pub(crate) fn fail_in_flight(conn: &Connection, reason: &str, at: &DateTime<Utc>) -> Result<usize> {
    let rows = conn.execute(
        "UPDATE scheduler_history
         SET status = ?1, successful_run = 0, failure_reason = ?2, end_execution = ?3
         WHERE status IN (?4, ?5)",
        params![
            TaskStatus::Failed.as_str(),
            reason,
            time::to_sql(at),
            TaskStatus::Preparing.as_str(),
            TaskStatus::Running.as_str()
        ],
    )?;
    Ok(rows)
}

/// Write the outcome columns of a finished execution.
pub(crate) fn save_outcome(conn: &Connection, record: &SchedulerHistory) -> Result<bool> {
    let rows = conn.execute(
        "UPDATE scheduler_history
         SET status = ?1, end_execution = ?2, execution_duration_ms = ?3, successful_run = ?4,
             anomaly_detected = ?5, anomaly_count = ?6, failure_reason = ?7
         WHERE id = ?8",
        params![
            record.status.as_str(),
            record.end_execution.as_ref().map(time::to_sql),
            record.execution_duration_ms,
            record.successful_run,
            record.anomaly_detected,
            record.anomaly_count,
            record.failure_reason,
            record.id,
        ],
    )?;
    Ok(rows > 0)
}

/// Up to `limit` records of a scheduler strictly after `after`, in
/// `(created_at, id)` order.
pub(crate) fn page_after(
    conn: &Connection,
    scheduler_id: i64,
    after: Option<&Cursor>,
    limit: usize,
) -> Result<Vec<SchedulerHistory>> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let records = match after {
        Some(cursor) => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM scheduler_history
                 WHERE scheduler_id = ?1 AND (created_at, id) > (?2, ?3)
                 ORDER BY created_at, id LIMIT ?4",
                COLUMNS
            ))?;
            let rows = stmt.query_map(
                params![scheduler_id, time::to_sql(&cursor.created_at), cursor.id, limit],
                from_row,
            )?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        }
        None => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM scheduler_history
                 WHERE scheduler_id = ?1
                 ORDER BY created_at, id LIMIT ?2",
                COLUMNS
            ))?;
            let rows = stmt.query_map(params![scheduler_id, limit], from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        }
    };
    Ok(records)
}

#[cfg(test)]
pub(crate) fn count_by_scheduler(conn: &Connection, scheduler_id: i64) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM scheduler_history WHERE scheduler_id = ?1",
        params![scheduler_id],
        |row| row.get(0),
    )?;
    Ok(count)
}
