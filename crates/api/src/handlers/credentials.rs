use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde_json::Value;

use super::AppState;
use db::repository::credentials as cred_repo;

#[derive(serde::Deserialize)]
pub struct CreateCredentialDto {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// Plaintext credential blob; encrypted before it reaches storage.
    pub data: Value,
}

/// What the API returns for a credential — never the (even encrypted)
/// `data` column.
#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialSummary {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub created_at: DateTime<Utc>,
}

impl From<db::models::CredentialRow> for CredentialSummary {
    fn from(row: db::models::CredentialRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            kind: row.kind,
            created_at: row.created_at,
        }
    }
}

pub async fn list(
    State(state): State<AppState>,
) -> Result<Json<Vec<CredentialSummary>>, StatusCode> {
    let rows = cred_repo::list_credentials(state.store.pool())
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

pub async fn create(
    State(state): State<AppState>,
    Json(payload): Json<CreateCredentialDto>,
) -> Result<(StatusCode, Json<CredentialSummary>), StatusCode> {
    let ciphertext = state
        .cipher
        .encrypt(&payload.data)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let row = cred_repo::create_credential(state.store.pool(), &payload.name, &payload.kind, &ciphertext)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok((StatusCode::CREATED, Json(row.into())))
}

pub async fn delete(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> Result<StatusCode, StatusCode> {
    match cred_repo::delete_credential(state.store.pool(), id).await {
        Ok(_) => Ok(StatusCode::NO_CONTENT),
        Err(db::DbError::NotFound) => Err(StatusCode::NOT_FOUND),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}
