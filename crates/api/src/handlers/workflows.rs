use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::Value;

use super::AppState;
use db::repository::workflows as wf_repo;
use engine::{Edge, Node, Workflow};

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDto {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
    pub nodes: Value,
    pub edges: Value,
}

fn default_active() -> bool {
    true
}

impl WorkflowDto {
    /// Reject documents whose nodes/edges don't parse as graph elements.
    fn validate(&self) -> Result<(), StatusCode> {
        serde_json::from_value::<Vec<Node>>(self.nodes.clone())
            .map_err(|_| StatusCode::BAD_REQUEST)?;
        serde_json::from_value::<Vec<Edge>>(self.edges.clone())
            .map_err(|_| StatusCode::BAD_REQUEST)?;
        Ok(())
    }
}

fn to_domain(row: db::models::WorkflowRow) -> Result<Workflow, StatusCode> {
    row.try_into().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<Workflow>>, StatusCode> {
    let rows = wf_repo::list_workflows(state.store.pool())
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    let workflows = rows
        .into_iter()
        .map(to_domain)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(workflows))
}

pub async fn get(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<Workflow>, StatusCode> {
    match wf_repo::get_workflow(state.store.pool(), id).await {
        Ok(row) => Ok(Json(to_domain(row)?)),
        Err(db::DbError::NotFound) => Err(StatusCode::NOT_FOUND),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

pub async fn create(
    State(state): State<AppState>,
    Json(payload): Json<WorkflowDto>,
) -> Result<(StatusCode, Json<Workflow>), StatusCode> {
    payload.validate()?;

    let row = wf_repo::create_workflow(
        state.store.pool(),
        &payload.name,
        &payload.description,
        &payload.nodes,
        &payload.edges,
    )
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok((StatusCode::CREATED, Json(to_domain(row)?)))
}

pub async fn update(
    Path(id): Path<i64>,
    State(state): State<AppState>,
    Json(payload): Json<WorkflowDto>,
) -> Result<Json<Workflow>, StatusCode> {
    payload.validate()?;

    match wf_repo::update_workflow(
        state.store.pool(),
        id,
        &payload.name,
        &payload.description,
        payload.is_active,
        &payload.nodes,
        &payload.edges,
    )
    .await
    {
        Ok(row) => Ok(Json(to_domain(row)?)),
        Err(db::DbError::NotFound) => Err(StatusCode::NOT_FOUND),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

pub async fn delete(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> Result<StatusCode, StatusCode> {
    match wf_repo::delete_workflow(state.store.pool(), id).await {
        Ok(_) => Ok(StatusCode::NO_CONTENT),
        Err(db::DbError::NotFound) => Err(StatusCode::NOT_FOUND),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}
