//! Credential repository functions.
//!
//! `data` is always ciphertext; encryption happens above this layer.

use engine::CredentialUpdate;
use sqlx::PgPool;

use crate::{models::CredentialRow, DbError};

const COLUMNS: &str = "id, name, kind, data, created_at";

/// Insert a new credential (ciphertext `data`).
pub async fn create_credential(
    pool: &PgPool,
    name: &str,
    kind: &str,
    data: &str,
) -> Result<CredentialRow, DbError> {
    let row = sqlx::query_as::<_, CredentialRow>(&format!(
        "INSERT INTO credentials (name, kind, data) \
         VALUES ($1, $2, $3) RETURNING {COLUMNS}"
    ))
    .bind(name)
    .bind(kind)
    .bind(data)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Fetch a single credential by its primary key.
pub async fn get_credential(pool: &PgPool, id: i64) -> Result<CredentialRow, DbError> {
    let row = sqlx::query_as::<_, CredentialRow>(&format!(
        "SELECT {COLUMNS} FROM credentials WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(row)
}

/// All credentials, newest first.
pub async fn list_credentials(pool: &PgPool) -> Result<Vec<CredentialRow>, DbError> {
    let rows = sqlx::query_as::<_, CredentialRow>(&format!(
        "SELECT {COLUMNS} FROM credentials ORDER BY created_at DESC"
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Apply a partial update (used for OAuth token refresh persistence).
pub async fn update_credential(
    pool: &PgPool,
    id: i64,
    update: &CredentialUpdate,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE credentials SET \
           name = COALESCE($2, name), \
           data = COALESCE($3, data) \
         WHERE id = $1",
    )
    .bind(id)
    .bind(update.name.as_deref())
    .bind(update.data.as_deref())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}

/// Permanently delete a credential.
pub async fn delete_credential(pool: &PgPool, id: i64) -> Result<(), DbError> {
    let result = sqlx::query("DELETE FROM credentials WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}
