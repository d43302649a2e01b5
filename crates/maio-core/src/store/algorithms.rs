//! Rows of the `algorithms` table.
//!
//! `canonical_parameters` holds the canonical serialization computed by the
//! registry; fork uniqueness is enforced on it per family.

use super::{json_column, time};
use crate::error::Result;
use crate::models::Algorithm;
use rusqlite::{params, Connection, OptionalExtension, Row};

const COLUMNS: &str =
    "id, name, description, parameters_json, base_algorithm_id, created_at, updated_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Algorithm> {
    Ok(Algorithm {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        parameters: json_column(row, 3)?,
        base_algorithm_id: row.get(4)?,
        created_at: time::column(row, 5)?,
        updated_at: time::column(row, 6)?,
    })
}

/// Insert an algorithm record and return its id. `algorithm.id` is ignored.
///
/// Forks go through `ON CONFLICT DO NOTHING`: when an identical fork already
/// exists, `None` is returned and the caller re-reads it.
pub(crate) fn insert(
    conn: &Connection,
    algorithm: &Algorithm,
    canonical: &str,
) -> Result<Option<i64>> {
    let rows = conn.execute(
        "INSERT INTO algorithms (name, description, parameters_json, canonical_parameters,
                                 base_algorithm_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT DO NOTHING",
        params![
            algorithm.name,
            algorithm.description,
            serde_json::to_string(&algorithm.parameters)?,
            canonical,
            algorithm.base_algorithm_id,
            time::to_sql(&algorithm.created_at),
            time::to_sql(&algorithm.updated_at),
        ],
    )?;
    Ok((rows > 0).then(|| conn.last_insert_rowid()))
}

pub(crate) fn get(conn: &Connection, id: i64) -> Result<Option<Algorithm>> {
    let algorithm = conn
        .query_row(
            &format!("SELECT {} FROM algorithms WHERE id = ?1", COLUMNS),
            params![id],
            from_row,
        )
        .optional()?;
    Ok(algorithm)
}

pub(crate) fn list(conn: &Connection) -> Result<Vec<Algorithm>> {
    let mut stmt = conn.prepare(&format!("SELECT {} FROM algorithms ORDER BY id", COLUMNS))?;
    let algorithms = stmt
        .query_map([], from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(algorithms)
}

/// Find the member of a fork family (root or fork) with these parameters.
pub(crate) fn find_in_family(
    conn: &Connection,
    root_id: i64,
    canonical: &str,
) -> Result<Option<i64>> {
    let id = conn
        .query_row(
            "SELECT id FROM algorithms
             WHERE (id = ?1 OR base_algorithm_id = ?1) AND canonical_parameters = ?2
             ORDER BY id LIMIT 1",
            params![root_id, canonical],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

/// True if another root algorithm already uses `name`.
pub(crate) fn root_name_taken(
    conn: &Connection,
    name: &str,
    except_id: Option<i64>,
) -> Result<bool> {
    let taken = conn
        .query_row(
            "SELECT 1 FROM algorithms
             WHERE name = ?1 AND base_algorithm_id IS NULL AND id != ?2",
            params![name, except_id.unwrap_or(-1)],
            |_| Ok(()),
        )
        .optional()?
        .is_some();
    Ok(taken)
}

pub(crate) fn save(conn: &Connection, algorithm: &Algorithm, canonical: &str) -> Result<()> {
    conn.execute(
        "UPDATE algorithms
         SET name = ?1, description = ?2, parameters_json = ?3, canonical_parameters = ?4,
             updated_at = ?5
         WHERE id = ?6",
        params![
            algorithm.name,
            algorithm.description,
            serde_json::to_string(&algorithm.parameters)?,
            canonical,
            time::to_sql(&algorithm.updated_at),
            algorithm.id,
        ],
    )?;
    Ok(())
}

pub(crate) fn delete(conn: &Connection, id: i64) -> Result<bool> {
    let rows = conn.execute("DELETE FROM algorithms WHERE id = ?1", params![id])?;
    Ok(rows > 0)
}

/// Number of versions that reference this record.
pub(crate) fn reference_count(conn: &Connection, id: i64) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM model_versions WHERE algorithm_id = ?1",
        params![id],
        |row| row.get(0),
    )?;
    Ok(count)
}

pub(crate) fn fork_count(conn: &Connection, id: i64) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM algorithms WHERE base_algorithm_id = ?1",
        params![id],
        |row| row.get(0),
    )?;
    Ok(count)
}
