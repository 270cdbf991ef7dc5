//! Workflow CRUD operations.

use sqlx::PgPool;

use crate::{models::WorkflowRow, DbError};

const COLUMNS: &str = "id, name, description, is_active, nodes, edges, created_at, updated_at";

/// Insert a new workflow.
///
/// `nodes` and `edges` are the editor's JSON documents, stored verbatim.
pub async fn create_workflow(
    pool: &PgPool,
    name: &str,
    description: &str,
    nodes: &serde_json::Value,
    edges: &serde_json::Value,
) -> Result<WorkflowRow, DbError> {
    let row = sqlx::query_as::<_, WorkflowRow>(&format!(
        "INSERT INTO workflows (name, description, nodes, edges) \
         VALUES ($1, $2, $3, $4) RETURNING {COLUMNS}"
    ))
    .bind(name)
    .bind(description)
    .bind(nodes)
    .bind(edges)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Fetch a single workflow by its primary key.
pub async fn get_workflow(pool: &PgPool, id: i64) -> Result<WorkflowRow, DbError> {
    let row = sqlx::query_as::<_, WorkflowRow>(&format!(
        "SELECT {COLUMNS} FROM workflows WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(row)
}

/// Return all workflows ordered by creation time (newest first).
pub async fn list_workflows(pool: &PgPool) -> Result<Vec<WorkflowRow>, DbError> {
    let rows = sqlx::query_as::<_, WorkflowRow>(&format!(
        "SELECT {COLUMNS} FROM workflows ORDER BY created_at DESC"
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Replace a workflow's definition and bump `updated_at`.
pub async fn update_workflow(
    pool: &PgPool,
    id: i64,
    name: &str,
    description: &str,
    is_active: bool,
    nodes: &serde_json::Value,
    edges: &serde_json::Value,
) -> Result<WorkflowRow, DbError> {
    let row = sqlx::query_as::<_, WorkflowRow>(&format!(
        "UPDATE workflows \
         SET name = $2, description = $3, is_active = $4, nodes = $5, edges = $6, updated_at = now() \
         WHERE id = $1 RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(name)
    .bind(description)
    .bind(is_active)
    .bind(nodes)
    .bind(edges)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(row)
}

/// Permanently delete a workflow. Executions cascade at the schema level
/// (parents before children).
///
/// Returns `DbError::NotFound` if no row was deleted.
pub async fn delete_workflow(pool: &PgPool, id: i64) -> Result<(), DbError> {
    let result = sqlx::query("DELETE FROM workflows WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}
