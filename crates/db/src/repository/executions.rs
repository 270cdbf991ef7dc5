//! Execution repository functions.

use engine::ExecutionUpdate;
use sqlx::PgPool;

use crate::{models::ExecutionRow, DbError};

const COLUMNS: &str = "id, workflow_id, status, started_at, finished_at, data, error";

/// Create a new execution record in `pending` status.
pub async fn create_execution(pool: &PgPool, workflow_id: i64) -> Result<ExecutionRow, DbError> {
    let row = sqlx::query_as::<_, ExecutionRow>(&format!(
        "INSERT INTO executions (workflow_id, status) \
         VALUES ($1, 'pending') RETURNING {COLUMNS}"
    ))
    .bind(workflow_id)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Fetch a single execution by its primary key.
pub async fn get_execution(pool: &PgPool, id: i64) -> Result<ExecutionRow, DbError> {
    let row = sqlx::query_as::<_, ExecutionRow>(&format!(
        "SELECT {COLUMNS} FROM executions WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(row)
}

/// All executions for one workflow, newest first.
pub async fn list_executions(pool: &PgPool, workflow_id: i64) -> Result<Vec<ExecutionRow>, DbError> {
    let rows = sqlx::query_as::<_, ExecutionRow>(&format!(
        "SELECT {COLUMNS} FROM executions WHERE workflow_id = $1 ORDER BY started_at DESC"
    ))
    .bind(workflow_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Apply a partial update. `None` fields leave the column untouched, so
/// re-applying an identical payload is idempotent.
pub async fn update_execution(
    pool: &PgPool,
    id: i64,
    update: &ExecutionUpdate,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE executions SET \
           status = COALESCE($2, status), \
           finished_at = COALESCE($3, finished_at), \
           data = COALESCE($4, data), \
           error = COALESCE($5, error) \
         WHERE id = $1",
    )
    .bind(id)
    .bind(update.status.map(|s| s.to_string()))
    .bind(update.finished_at)
    .bind(update.data.as_ref())
    .bind(update.error.as_deref())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}
