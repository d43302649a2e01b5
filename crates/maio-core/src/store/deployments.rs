//! Rows of the `deployments` table. At most one row per version.

use super::time;
use crate::error::Result;
use crate::models::Deployment;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

pub(crate) fn insert(conn: &Connection, version_id: i64, at: &DateTime<Utc>) -> Result<()> {
    conn.execute(
        "INSERT INTO deployments (version_id, endpoint_ref, created_at) VALUES (?1, NULL, ?2)",
        params![version_id, time::to_sql(at)],
    )?;
    Ok(())
}

pub(crate) fn get(conn: &Connection, version_id: i64) -> Result<Option<Deployment>> {
    let deployment = conn
        .query_row(
            "SELECT version_id, endpoint_ref, created_at FROM deployments WHERE version_id = ?1",
            params![version_id],
            |row| {
                Ok(Deployment {
                    version_id: row.get(0)?,
                    endpoint_ref: row.get(1)?,
                    created_at: time::column(row, 2)?,
                })
            },
        )
        .optional()?;
    Ok(deployment)
}

/// Record the provider's endpoint. Returns false if the row is gone.
pub(crate) fn set_endpoint(conn: &Connection, version_id: i64, endpoint_ref: &str) -> Result<bool> {
    let rows = conn.execute(
        "UPDATE deployments SET endpoint_ref = ?1 WHERE version_id = ?2",
        params![endpoint_ref, version_id],
    )?;
    Ok(rows > 0)
}

pub(crate) fn delete(conn: &Connection, version_id: i64) -> Result<bool> {
    let rows = conn.execute(
        "DELETE FROM deployments WHERE version_id = ?1",
        params![version_id],
    )?;
    Ok(rows > 0)
}
