//! Row structs that map 1-to-1 onto database tables.
//!
//! These are *persistence* models — they carry no domain behaviour.
//! Domain types live in the `engine` crate; the `TryFrom` impls here do
//! the row → domain conversion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::DbError;

// ---------------------------------------------------------------------------
// workflows
// ---------------------------------------------------------------------------

/// A persisted workflow row. `nodes` and `edges` hold the editor's JSON
/// documents verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkflowRow {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub is_active: bool,
    pub nodes: serde_json::Value,
    pub edges: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<WorkflowRow> for engine::Workflow {
    type Error = DbError;

    fn try_from(row: WorkflowRow) -> Result<Self, Self::Error> {
        let nodes = serde_json::from_value(row.nodes)
            .map_err(|e| DbError::Corrupt(format!("workflow {} nodes: {e}", row.id)))?;
        let edges = serde_json::from_value(row.edges)
            .map_err(|e| DbError::Corrupt(format!("workflow {} edges: {e}", row.id)))?;

        Ok(engine::Workflow {
            id: row.id,
            name: row.name,
            description: row.description,
            is_active: row.is_active,
            nodes,
            edges,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

// ---------------------------------------------------------------------------
// executions
// ---------------------------------------------------------------------------

/// A persisted execution row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ExecutionRow {
    pub id: i64,
    pub workflow_id: i64,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl TryFrom<ExecutionRow> for engine::Execution {
    type Error = DbError;

    fn try_from(row: ExecutionRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse()
            .map_err(|e: String| DbError::Corrupt(format!("execution {}: {e}", row.id)))?;

        Ok(engine::Execution {
            id: row.id,
            workflow_id: row.workflow_id,
            status,
            started_at: row.started_at,
            finished_at: row.finished_at,
            data: row.data,
            error: row.error,
        })
    }
}

// ---------------------------------------------------------------------------
// credentials
// ---------------------------------------------------------------------------

/// A persisted credential row. `data` is ciphertext produced by the
/// `crypto` crate; this layer never sees plaintext.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CredentialRow {
    pub id: i64,
    pub name: String,
    pub kind: String,
    pub data: String,
    pub created_at: DateTime<Utc>,
}

impl From<CredentialRow> for engine::Credential {
    fn from(row: CredentialRow) -> Self {
        engine::Credential {
            id: row.id,
            name: row.name,
            kind: row.kind,
            data: row.data,
            created_at: row.created_at,
        }
    }
}
