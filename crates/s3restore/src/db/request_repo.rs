//! Request repository: persistence for the `restore_requests` table.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{Database, DatabaseError};
use crate::request::{Metadata, RequestId, RequestStatus, RestoreRequest};

const ACTIVE_CLAUSE: &str = "status >= 0 AND status <= 4";

/// Query filter parameters for request listing.
#[derive(Debug, Default, Clone)]
pub struct RequestFilter {
    pub status: Option<RequestStatus>,
    pub target_entity_id: Option<i64>,
    pub active_only: bool,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn conversion_error<E>(row: &Row<'_>, column: &str, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    let index = row.as_ref().column_index(column).unwrap_or(0);
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(err))
}

fn parse_timestamp(row: &Row<'_>, column: &str) -> Result<DateTime<Utc>, rusqlite::Error> {
    let raw: String = row.get(column)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(row, column, e))
}

fn from_row(row: &Row<'_>) -> Result<RestoreRequest, rusqlite::Error> {
    let metadata_raw: String = row.get("metadata")?;
    let metadata: Metadata =
        serde_json::from_str(&metadata_raw).map_err(|e| conversion_error(row, "metadata", e))?;

    Ok(RestoreRequest {
        id: Some(row.get("id")?),
        status: RequestStatus::from_code(row.get("status")?),
        target_entity_id: row.get("target_entity_id")?,
        remote_key: row.get("remote_key")?,
        job_id: row.get("job_id")?,
        apply_run_id: row.get("apply_run_id")?,
        progress: row.get("progress")?,
        error_message: row.get("error_message")?,
        metadata,
        created_at: parse_timestamp(row, "created_at")?,
        modified_at: parse_timestamp(row, "modified_at")?,
    })
}

fn encode_metadata(metadata: &Metadata) -> String {
    // A map of JSON values always serializes.
    serde_json::to_string(metadata).unwrap_or_else(|_| "{}".to_string())
}

/// Maps a unique-index violation onto the domain error for the target.
fn map_write_error(err: rusqlite::Error, target_entity_id: i64) -> DatabaseError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            DatabaseError::ActiveRequestExists { target_entity_id }
        }
        _ => DatabaseError::Sqlite(err),
    }
}

fn find_in(conn: &Connection, id: RequestId) -> Result<Option<RestoreRequest>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT * FROM restore_requests WHERE id = ?1",
            params![id],
            from_row,
        )
        .optional()?;
    Ok(row)
}

fn insert_in(conn: &Connection, request: &mut RestoreRequest) -> Result<RequestId, DatabaseError> {
    request.modified_at = Utc::now();
    conn.execute(
        "INSERT INTO restore_requests (status, target_entity_id, remote_key, job_id,
         apply_run_id, progress, error_message, metadata, created_at, modified_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            request.status.code(),
            request.target_entity_id,
            request.remote_key,
            request.job_id,
            request.apply_run_id,
            request.progress,
            request.error_message,
            encode_metadata(&request.metadata),
            format_timestamp(&request.created_at),
            format_timestamp(&request.modified_at),
        ],
    )
    .map_err(|e| map_write_error(e, request.target_entity_id))?;

    let id = conn.last_insert_rowid();
    request.id = Some(id);
    Ok(id)
}

fn update_in(conn: &Connection, request: &mut RestoreRequest) -> Result<(), DatabaseError> {
    let id = request.id.ok_or(DatabaseError::NotPersisted)?;
    request.modified_at = Utc::now();
    conn.execute(
        "UPDATE restore_requests SET status=?2, target_entity_id=?3, remote_key=?4, job_id=?5,
         apply_run_id=?6, progress=?7, error_message=?8, metadata=?9, modified_at=?10
         WHERE id=?1",
        params![
            id,
            request.status.code(),
            request.target_entity_id,
            request.remote_key,
            request.job_id,
            request.apply_run_id,
            request.progress,
            request.error_message,
            encode_metadata(&request.metadata),
            format_timestamp(&request.modified_at),
        ],
    )
    .map_err(|e| map_write_error(e, request.target_entity_id))?;
    Ok(())
}

/// Inserts a new request and assigns its id.
pub fn insert(db: &Database, request: &mut RestoreRequest) -> Result<RequestId, DatabaseError> {
    db.with_conn(|conn| insert_in(conn, request))
}

/// Overwrites every mutable column of an existing request.
pub fn update(db: &Database, request: &mut RestoreRequest) -> Result<(), DatabaseError> {
    db.with_conn(|conn| update_in(conn, request))
}

/// Inserts or updates depending on whether the request has an id yet.
pub fn save(db: &Database, request: &mut RestoreRequest) -> Result<RequestId, DatabaseError> {
    db.with_conn(|conn| match request.id {
        Some(id) => update_in(conn, request).map(|_| id),
        None => insert_in(conn, request),
    })
}

/// Persists the request only when it differs from the stored row.
///
/// Returns whether a write happened. Progress is not compared, so a
/// progress-only change is never written through this path. A job id
/// recorded after the caller loaded the request is adopted, not cleared.
pub fn save_if_changed(
    db: &Database,
    request: &mut RestoreRequest,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let Some(id) = request.id else {
            insert_in(conn, request)?;
            return Ok(true);
        };
        let stored = find_in(conn, id)?;
        if request.job_id.is_none() {
            if let Some(stored) = &stored {
                request.job_id = stored.job_id.clone();
            }
        }
        match stored {
            Some(stored) if !request.differs_from(&stored) => Ok(false),
            _ => {
                update_in(conn, request)?;
                Ok(true)
            }
        }
    })
}

/// Finds a request by its id.
pub fn find_by_id(db: &Database, id: RequestId) -> Result<Option<RestoreRequest>, DatabaseError> {
    db.with_conn(|conn| find_in(conn, id))
}

/// Whether the target already has a request that is not yet terminal.
pub fn exists_active_for_target(
    db: &Database,
    target_entity_id: i64,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let exists: bool = conn.query_row(
            &format!(
                "SELECT EXISTS(SELECT 1 FROM restore_requests WHERE target_entity_id = ?1 AND {})",
                ACTIVE_CLAUSE
            ),
            params![target_entity_id],
            |r| r.get(0),
        )?;
        Ok(exists)
    })
}

/// Returns the active request for a target, if any.
pub fn find_active_for_target(
    db: &Database,
    target_entity_id: i64,
) -> Result<Option<RestoreRequest>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                &format!(
                    "SELECT * FROM restore_requests WHERE target_entity_id = ?1 AND {} LIMIT 1",
                    ACTIVE_CLAUSE
                ),
                params![target_entity_id],
                from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Queries requests with filters, returning (rows, total_count).
pub fn query(
    db: &Database,
    filter: &RequestFilter,
) -> Result<(Vec<RestoreRequest>, u64), DatabaseError> {
    db.with_conn(|conn| {
        let mut conditions: Vec<String> = Vec::new();
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(status) = filter.status {
            conditions.push(format!("status = ?{}", param_values.len() + 1));
            param_values.push(Box::new(status.code()));
        }
        if let Some(target) = filter.target_entity_id {
            conditions.push(format!("target_entity_id = ?{}", param_values.len() + 1));
            param_values.push(Box::new(target));
        }
        if filter.active_only {
            conditions.push(ACTIVE_CLAUSE.to_string());
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let count_sql = format!("SELECT COUNT(*) FROM restore_requests {}", where_clause);
        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let total: u64 = conn.query_row(&count_sql, params_ref.as_slice(), |r| r.get(0))?;

        let limit = filter.limit.unwrap_or(100) as i64;
        let offset = filter.offset.unwrap_or(0) as i64;
        param_values.push(Box::new(limit));
        param_values.push(Box::new(offset));
        let query_sql = format!(
            "SELECT * FROM restore_requests {} ORDER BY id DESC LIMIT ?{} OFFSET ?{}",
            where_clause,
            param_values.len() - 1,
            param_values.len()
        );

        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&query_sql)?;
        let rows = stmt
            .query_map(params_ref.as_slice(), from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok((rows, total))
    })
}

/// Counts requests with the given status.
pub fn count_by_status(db: &Database, status: RequestStatus) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM restore_requests WHERE status = ?1",
            params![status.code()],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

/// Writes a progress value onto a request that is currently restoring.
///
/// The write is skipped when the request is in any other status or when
/// the value would move progress backwards. Returns whether a row changed.
pub fn update_progress(
    db: &Database,
    id: RequestId,
    progress: f64,
) -> Result<bool, DatabaseError> {
    let progress = progress.clamp(0.0, 1.0);
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE restore_requests SET progress = ?2, modified_at = ?3
             WHERE id = ?1 AND status = ?4 AND (progress IS NULL OR progress <= ?2)",
            params![
                id,
                progress,
                format_timestamp(&Utc::now()),
                RequestStatus::Restoring.code()
            ],
        )?;
        Ok(changed > 0)
    })
}

/// Records the executor's job id after a successful enqueue.
///
/// Moves a still-pending request to `TaskWaiting`. A worker that already
/// picked the job up keeps its own status; only the job id is written.
pub fn mark_dispatched(db: &Database, id: RequestId, job_id: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE restore_requests
             SET job_id = ?2,
                 status = CASE WHEN status <= ?3 THEN ?3 ELSE status END,
                 modified_at = ?4
             WHERE id = ?1",
            params![
                id,
                job_id,
                RequestStatus::TaskWaiting.code(),
                format_timestamp(&Utc::now())
            ],
        )?;
        Ok(changed > 0)
    })
}
