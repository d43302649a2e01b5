//! Rows of the `model_versions` table.

use super::{conversion_error, json_column_opt, time};
use crate::error::Result;
use crate::models::{DatasourceMapping, ModelVersion, VersionStatus, VersionType};
use rusqlite::{params, Connection, OptionalExtension, Row};

const COLUMNS: &str = "id, model_id, name, description, version, status, version_type, \
                       algorithm_id, parameters_json, mapping_datasource_id, mapping_start, \
                       mapping_end, training_percentage, artifact_ref, failure_reason, archived, \
                       created_at, updated_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<ModelVersion> {
    let status: String = row.get(5)?;
    let version_type: String = row.get(6)?;
    let mapping_datasource: Option<i64> = row.get(9)?;
    let mapping_start = time::column_opt(row, 10)?;
    let mapping_end = time::column_opt(row, 11)?;

    let datasource_mapping = match (mapping_datasource, mapping_start, mapping_end) {
        (Some(datasource_id), Some(start_time), Some(end_time)) => Some(DatasourceMapping {
            datasource_id,
            start_time,
            end_time,
        }),
        _ => None,
    };

    Ok(ModelVersion {
        id: row.get(0)?,
        model_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        version: row.get(4)?,
        status: VersionStatus::parse(&status)
            .ok_or_else(|| conversion_error(5, format!("unknown version status '{}'", status)))?,
        version_type: VersionType::parse(&version_type).ok_or_else(|| {
            conversion_error(6, format!("unknown version type '{}'", version_type))
        })?,
        algorithm_id: row.get(7)?,
        parameters: json_column_opt(row, 8)?,
        datasource_mapping,
        training_percentage: row.get(12)?,
        artifact_ref: row.get(13)?,
        failure_reason: row.get(14)?,
        archived: row.get(15)?,
        created_at: time::column(row, 16)?,
        updated_at: time::column(row, 17)?,
    })
}

fn mapping_params(
    mapping: Option<&DatasourceMapping>,
) -> (Option<i64>, Option<String>, Option<String>) {
    match mapping {
        Some(m) => (
            Some(m.datasource_id),
            Some(time::to_sql(&m.start_time)),
            Some(time::to_sql(&m.end_time)),
        ),
        None => (None, None, None),
    }
}

/// Insert a version and return its id. `version.id` is ignored.
pub(crate) fn insert(conn: &Connection, version: &ModelVersion) -> Result<i64> {
    let (mapping_ds, mapping_start, mapping_end) =
        mapping_params(version.datasource_mapping.as_ref());
    let parameters = version
        .parameters
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    conn.execute(
        "INSERT INTO model_versions (model_id, name, description, version, status, version_type,
                                     algorithm_id, parameters_json, mapping_datasource_id,
                                     mapping_start, mapping_end, training_percentage,
                                     artifact_ref, failure_reason, archived, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
        params![
            version.model_id,
            version.name,
            version.description,
            version.version,
            version.status.as_str(),
            version.version_type.as_str(),
            version.algorithm_id,
            parameters,
            mapping_ds,
            mapping_start,
            mapping_end,
            version.training_percentage,
            version.artifact_ref,
            version.failure_reason,
            version.archived,
            time::to_sql(&version.created_at),
            time::to_sql(&version.updated_at),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub(crate) fn get(conn: &Connection, id: i64) -> Result<Option<ModelVersion>> {
    let version = conn
        .query_row(
            &format!("SELECT {} FROM model_versions WHERE id = ?1", COLUMNS),
            params![id],
            from_row,
        )
        .optional()?;
    Ok(version)
}

/// Versions of a model ordered by version number.
pub(crate) fn list_by_model(conn: &Connection, model_id: i64) -> Result<Vec<ModelVersion>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM model_versions WHERE model_id = ?1 ORDER BY version",
        COLUMNS
    ))?;
    let versions = stmt
        .query_map(params![model_id], from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(versions)
}

pub(crate) fn count_by_model(conn: &Connection, model_id: i64) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM model_versions WHERE model_id = ?1",
        params![model_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Write every mutable column of an existing version.
pub(crate) fn save(conn: &Connection, version: &ModelVersion) -> Result<()> {
    let (mapping_ds, mapping_start, mapping_end) =
        mapping_params(version.datasource_mapping.as_ref());
    let parameters = version
        .parameters
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    conn.execute(
        "UPDATE model_versions
         SET name = ?1, description = ?2, status = ?3, version_type = ?4, algorithm_id = ?5,
             parameters_json = ?6, mapping_datasource_id = ?7, mapping_start = ?8,
             mapping_end = ?9, training_percentage = ?10, artifact_ref = ?11,
             failure_reason = ?12, archived = ?13, updated_at = ?14
         WHERE id = ?15",
        params![
            version.name,
            version.description,
            version.status.as_str(),
            version.version_type.as_str(),
            version.algorithm_id,
            parameters,
            mapping_ds,
            mapping_start,
            mapping_end,
            version.training_percentage,
            version.artifact_ref,
            version.failure_reason,
            version.archived,
            time::to_sql(&version.updated_at),
            version.id,
        ],
    )?;
    Ok(())
}

/// Delete a version; its deployment, schedulers and history cascade.
pub(crate) fn delete(conn: &Connection, id: i64) -> Result<bool> {
    let rows = conn.execute("DELETE FROM model_versions WHERE id = ?1", params![id])?;
    Ok(rows > 0)
}
