//! Rows of the `schedulers` table.

use super::time;
use crate::error::Result;
use crate::models::Scheduler;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

const COLUMNS: &str = "id, version_id, datasource_id, start_time, interval_seconds, enabled, \
                       last_fired_at, created_by, created_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Scheduler> {
    Ok(Scheduler {
        id: row.get(0)?,
        version_id: row.get(1)?,
        datasource_id: row.get(2)?,
        start_time: time::column(row, 3)?,
        interval_seconds: row.get(4)?,
        enabled: row.get(5)?,
        last_fired_at: time::column_opt(row, 6)?,
        created_by: row.get(7)?,
        created_at: time::column(row, 8)?,
    })
}

/// Insert a scheduler and return its id. `scheduler.id` is ignored.
pub(crate) fn insert(conn: &Connection, scheduler: &Scheduler) -> Result<i64> {
    conn.execute(
        "INSERT INTO schedulers (version_id, datasource_id, start_time, interval_seconds,
                                 enabled, last_fired_at, created_by, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            scheduler.version_id,
            scheduler.datasource_id,
            time::to_sql(&scheduler.start_time),
            scheduler.interval_seconds,
            scheduler.enabled,
            scheduler.last_fired_at.as_ref().map(time::to_sql),
            scheduler.created_by,
            time::to_sql(&scheduler.created_at),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub(crate) fn get(conn: &Connection, id: i64) -> Result<Option<Scheduler>> {
    let scheduler = conn
        .query_row(
            &format!("SELECT {} FROM schedulers WHERE id = ?1", COLUMNS),
            params![id],
            from_row,
        )
        .optional()?;
    Ok(scheduler)
}

pub(crate) fn list_by_version(conn: &Connection, version_id: i64) -> Result<Vec<Scheduler>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM schedulers WHERE version_id = ?1 ORDER BY id",
        COLUMNS
    ))?;
    let schedulers = stmt
        .query_map(params![version_id], from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(schedulers)
}

pub(crate) fn list_enabled(conn: &Connection) -> Result<Vec<Scheduler>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM schedulers WHERE enabled = 1 ORDER BY id",
        COLUMNS
    ))?;
    let schedulers = stmt
        .query_map([], from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(schedulers)
}

pub(crate) fn set_enabled(conn: &Connection, id: i64, enabled: bool) -> Result<bool> {
    let rows = conn.execute(
        "UPDATE schedulers SET enabled = ?1 WHERE id = ?2",
        params![enabled, id],
    )?;
    Ok(rows > 0)
}

/// Disable every enabled scheduler of a version, returning how many changed.
pub(crate) fn disable_for_version(conn: &Connection, version_id: i64) -> Result<usize> {
    let rows = conn.execute(
        "UPDATE schedulers SET enabled = 0 WHERE version_id = ?1 AND enabled = 1",
        params![version_id],
    )?;
    Ok(rows)
}

pub(crate) fn set_last_fired(conn: &Connection, id: i64, at: &DateTime<Utc>) -> Result<()> {
    conn.execute(
        "UPDATE schedulers SET last_fired_at = ?1 WHERE id = ?2",
        params![time::to_sql(at), id],
    )?;
    Ok(())
}

/// Delete a scheduler; its history cascades.
pub(crate) fn delete(conn: &Connection, id: i64) -> Result<bool> {
    let rows = conn.execute("DELETE FROM schedulers WHERE id = ?1", params![id])?;
    Ok(rows > 0)
}
