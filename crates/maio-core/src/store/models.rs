//! Rows of the `models` table.

use super::{json_column, time};
use crate::error::Result;
use crate::models::Model;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

const COLUMNS: &str = "id, name, description, use_case, usage_guidelines, datasource_id, \
                       output_tag_json, input_tags_json, created_by, created_at, updated_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Model> {
    Ok(Model {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        use_case: row.get(3)?,
        usage_guidelines: row.get(4)?,
        datasource_id: row.get(5)?,
        output_tag: json_column(row, 6)?,
        input_tags: json_column(row, 7)?,
        created_by: row.get(8)?,
        created_at: time::column(row, 9)?,
        updated_at: time::column(row, 10)?,
        versions: Vec::new(),
    })
}

/// Insert a model and return its id. `model.id` is ignored.
pub(crate) fn insert(conn: &Connection, model: &Model) -> Result<i64> {
    conn.execute(
        "INSERT INTO models (name, description, use_case, usage_guidelines, datasource_id,
                             output_tag_json, input_tags_json, created_by, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            model.name,
            model.description,
            model.use_case,
            model.usage_guidelines,
            model.datasource_id,
            serde_json::to_string(&model.output_tag)?,
            serde_json::to_string(&model.input_tags)?,
            model.created_by,
            time::to_sql(&model.created_at),
            time::to_sql(&model.updated_at),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Get a model without its versions.
pub(crate) fn get(conn: &Connection, id: i64) -> Result<Option<Model>> {
    let model = conn
        .query_row(
            &format!("SELECT {} FROM models WHERE id = ?1", COLUMNS),
            params![id],
            from_row,
        )
        .optional()?;
    Ok(model)
}

pub(crate) fn list(conn: &Connection) -> Result<Vec<Model>> {
    let mut stmt = conn.prepare(&format!("SELECT {} FROM models ORDER BY id", COLUMNS))?;
    let models = stmt
        .query_map([], from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(models)
}

/// Write every mutable column of an existing model.
pub(crate) fn save(conn: &Connection, model: &Model) -> Result<()> {
    conn.execute(
        "UPDATE models
         SET name = ?1, description = ?2, use_case = ?3, usage_guidelines = ?4,
             datasource_id = ?5, output_tag_json = ?6, input_tags_json = ?7, updated_at = ?8
         WHERE id = ?9",
        params![
            model.name,
            model.description,
            model.use_case,
            model.usage_guidelines,
            model.datasource_id,
            serde_json::to_string(&model.output_tag)?,
            serde_json::to_string(&model.input_tags)?,
            time::to_sql(&model.updated_at),
            model.id,
        ],
    )?;
    Ok(())
}

/// Delete a model; versions and everything below them cascade.
pub(crate) fn delete(conn: &Connection, id: i64) -> Result<bool> {
    let rows = conn.execute("DELETE FROM models WHERE id = ?1", params![id])?;
    Ok(rows > 0)
}

/// True if another model already uses `name`.
pub(crate) fn name_taken(conn: &Connection, name: &str, except_id: Option<i64>) -> Result<bool> {
    let taken = conn
        .query_row(
            "SELECT 1 FROM models WHERE name = ?1 AND id != ?2",
            params![name, except_id.unwrap_or(-1)],
            |_| Ok(()),
        )
        .optional()?
        .is_some();
    Ok(taken)
}

/// Reserve the next version number for a model.
///
/// The counter only ever grows, so numbers of deleted versions are not
/// handed out again.
pub(crate) fn next_version_number(conn: &Connection, model_id: i64) -> Result<Option<i64>> {
    let next = conn
        .query_row(
            "UPDATE models SET version_seq = version_seq + 1 WHERE id = ?1 RETURNING version_seq",
            params![model_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(next)
}

pub(crate) fn touch(conn: &Connection, id: i64, at: &DateTime<Utc>) -> Result<()> {
    conn.execute(
        "UPDATE models SET updated_at = ?1 WHERE id = ?2",
        params![time::to_sql(at), id],
    )?;
    Ok(())
}
