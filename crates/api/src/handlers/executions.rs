use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tracing::warn;

use super::AppState;
use db::repository::executions as exec_repo;
use engine::{Execution, ExecutionProgress, NodeProgress, NodeRunStatus};

#[derive(serde::Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteWorkflowDto {
    #[serde(default)]
    pub trigger_data: Option<Value>,
}

fn to_domain(row: db::models::ExecutionRow) -> Result<Execution, StatusCode> {
    row.try_into().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

/// Create a `pending` execution row and hand the workflow to the
/// scheduler on its own task. Responds immediately with the id; clients
/// follow progress on the stream endpoint.
pub async fn execute(
    Path(workflow_id): Path<i64>,
    State(state): State<AppState>,
    payload: Option<Json<ExecuteWorkflowDto>>,
) -> Result<(StatusCode, Json<Value>), StatusCode> {
    let workflow_row = match db::repository::workflows::get_workflow(state.store.pool(), workflow_id).await
    {
        Ok(row) => row,
        Err(db::DbError::NotFound) => return Err(StatusCode::NOT_FOUND),
        Err(_) => return Err(StatusCode::INTERNAL_SERVER_ERROR),
    };
    let workflow: engine::Workflow = workflow_row
        .try_into()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let execution_row = exec_repo::create_execution(state.store.pool(), workflow_id)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    let execution_id = execution_row.id;

    let trigger_data = payload.and_then(|Json(dto)| dto.trigger_data);
    let scheduler = state.scheduler.clone();
    tokio::spawn(async move {
        scheduler.run(workflow, execution_id, trigger_data).await;
    });

    Ok((StatusCode::ACCEPTED, Json(json!({ "executionId": execution_id }))))
}

pub async fn get(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<Execution>, StatusCode> {
    match exec_repo::get_execution(state.store.pool(), id).await {
        Ok(row) => Ok(Json(to_domain(row)?)),
        Err(db::DbError::NotFound) => Err(StatusCode::NOT_FOUND),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

pub async fn list(
    Path(workflow_id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<Vec<Execution>>, StatusCode> {
    let rows = exec_repo::list_executions(state.store.pool(), workflow_id)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    let executions = rows
        .into_iter()
        .map(to_domain)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(executions))
}

/// SSE progress stream: one `data:` frame per scheduler emit, closed
/// after the terminal frame. Client disconnects drop the broadcast
/// receiver, which deregisters the subscriber.
pub async fn stream(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Sse<BoxStream<'static, Result<Event, Infallible>>>, StatusCode> {
    // Subscribe before reading the row: an execution finishing between
    // the read and the subscription would otherwise leave the stream
    // waiting on emits that already happened.
    let rx = state.bus.subscribe(id).await;

    let row = match exec_repo::get_execution(state.store.pool(), id).await {
        Ok(row) => row,
        Err(db::DbError::NotFound) => return Err(StatusCode::NOT_FOUND),
        Err(_) => return Err(StatusCode::INTERNAL_SERVER_ERROR),
    };
    let execution = to_domain(row)?;

    let stream: BoxStream<'static, Result<Event, Infallible>> = if execution.status.is_terminal() {
        // Already finished: replay a single synthesized terminal frame.
        drop(rx);
        state.bus.cleanup_idle().await;
        let snapshot = terminal_snapshot(&execution);
        let event = Event::default()
            .json_data(&snapshot)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        stream::iter(vec![Ok(event)]).boxed()
    } else {
        stream::unfold(Some(rx), |rx| async move {
            let mut rx = rx?;
            loop {
                match rx.recv().await {
                    Ok(progress) => {
                        let terminal = progress.status.is_terminal();
                        let event = match Event::default().json_data(&progress) {
                            Ok(event) => event,
                            Err(err) => {
                                warn!("unserializable progress snapshot: {err}");
                                continue;
                            }
                        };
                        return Some((Ok(event), if terminal { None } else { Some(rx) }));
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // Snapshots are cumulative; dropping some is fine.
                        warn!(skipped, "slow SSE consumer lagged behind progress stream");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .boxed()
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    ))
}

/// Best-effort progress snapshot for an execution that finished before
/// the client connected. Per-node history is not persisted; successful
/// nodes are reconstructed from the final context.
fn terminal_snapshot(execution: &Execution) -> ExecutionProgress {
    let nodes = execution
        .data
        .as_ref()
        .and_then(Value::as_object)
        .map(|context| {
            context
                .iter()
                .map(|(node_id, output)| NodeProgress {
                    node_id: node_id.clone(),
                    status: NodeRunStatus::Success,
                    output: Some(output.clone()),
                    error: None,
                    started_at: None,
                    finished_at: None,
                })
                .collect()
        })
        .unwrap_or_default();

    ExecutionProgress {
        execution_id: execution.id,
        workflow_id: execution.workflow_id,
        status: execution.status,
        nodes,
        error: execution.error.clone(),
    }
}
