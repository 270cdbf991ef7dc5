//! The store facade — the only persistence surface the scheduler touches.
//!
//! Production wires in the Postgres implementation from the `db` crate;
//! tests use [`MemoryStore`]. The scheduler never issues raw queries.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

use crate::models::{Credential, Execution, ExecutionStatus, Workflow};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("row not found")]
    NotFound,

    #[error("store backend error: {0}")]
    Backend(String),
}

// ---------------------------------------------------------------------------
// Partial updates
// ---------------------------------------------------------------------------

/// Partial update applied to an execution row. `None` fields are left
/// untouched; applying the same payload twice is idempotent.
#[derive(Debug, Clone, Default)]
pub struct ExecutionUpdate {
    pub status: Option<ExecutionStatus>,
    pub finished_at: Option<DateTime<Utc>>,
    pub data: Option<Value>,
    pub error: Option<String>,
}

impl ExecutionUpdate {
    pub fn running() -> Self {
        Self {
            status: Some(ExecutionStatus::Running),
            ..Self::default()
        }
    }

    pub fn completed(data: Value) -> Self {
        Self {
            status: Some(ExecutionStatus::Completed),
            finished_at: Some(Utc::now()),
            data: Some(data),
            ..Self::default()
        }
    }

    pub fn failed(error: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            status: Some(ExecutionStatus::Failed),
            finished_at: Some(Utc::now()),
            data,
            error: Some(error.into()),
        }
    }
}

/// Partial update applied to a credential row.
#[derive(Debug, Clone, Default)]
pub struct CredentialUpdate {
    pub name: Option<String>,
    /// New ciphertext. Callers encrypt before constructing the update.
    pub data: Option<String>,
}

// ---------------------------------------------------------------------------
// Store trait
// ---------------------------------------------------------------------------

/// Abstract persistence boundary used by the scheduler and node handlers.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get_workflow(&self, id: i64) -> Result<Workflow, StoreError>;

    /// Create an execution row in `pending` status.
    async fn create_execution(&self, workflow_id: i64) -> Result<Execution, StoreError>;

    async fn update_execution(&self, id: i64, update: ExecutionUpdate) -> Result<(), StoreError>;

    async fn get_credential(&self, id: i64) -> Result<Credential, StoreError>;

    async fn update_credential(&self, id: i64, update: CredentialUpdate)
        -> Result<(), StoreError>;

    async fn list_credentials(&self) -> Result<Vec<Credential>, StoreError>;
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// In-memory store backing engine and handler tests.
#[derive(Default)]
pub struct MemoryStore {
    workflows: Mutex<HashMap<i64, Workflow>>,
    executions: Mutex<HashMap<i64, Execution>>,
    credentials: Mutex<HashMap<i64, Credential>>,
    next_id: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            ..Self::default()
        }
    }

    pub fn insert_workflow(&self, workflow: Workflow) {
        self.workflows.lock().unwrap().insert(workflow.id, workflow);
    }

    pub fn insert_credential(
        &self,
        name: impl Into<String>,
        kind: impl Into<String>,
        data: impl Into<String>,
    ) -> i64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let credential = Credential {
            id,
            name: name.into(),
            kind: kind.into(),
            data: data.into(),
            created_at: Utc::now(),
        };
        self.credentials.lock().unwrap().insert(id, credential);
        id
    }

    /// Snapshot of an execution row, for assertions.
    pub fn execution(&self, id: i64) -> Option<Execution> {
        self.executions.lock().unwrap().get(&id).cloned()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_workflow(&self, id: i64) -> Result<Workflow, StoreError> {
        self.workflows
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn create_execution(&self, workflow_id: i64) -> Result<Execution, StoreError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let execution = Execution {
            id,
            workflow_id,
            status: ExecutionStatus::Pending,
            started_at: Utc::now(),
            finished_at: None,
            data: None,
            error: None,
        };
        self.executions.lock().unwrap().insert(id, execution.clone());
        Ok(execution)
    }

    async fn update_execution(&self, id: i64, update: ExecutionUpdate) -> Result<(), StoreError> {
        let mut executions = self.executions.lock().unwrap();
        let execution = executions.get_mut(&id).ok_or(StoreError::NotFound)?;

        if let Some(status) = update.status {
            execution.status = status;
        }
        if update.finished_at.is_some() {
            execution.finished_at = update.finished_at;
        }
        if update.data.is_some() {
            execution.data = update.data;
        }
        if update.error.is_some() {
            execution.error = update.error;
        }
        Ok(())
    }

    async fn get_credential(&self, id: i64) -> Result<Credential, StoreError> {
        self.credentials
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn update_credential(
        &self,
        id: i64,
        update: CredentialUpdate,
    ) -> Result<(), StoreError> {
        let mut credentials = self.credentials.lock().unwrap();
        let credential = credentials.get_mut(&id).ok_or(StoreError::NotFound)?;

        if let Some(name) = update.name {
            credential.name = name;
        }
        if let Some(data) = update.data {
            credential.data = data;
        }
        Ok(())
    }

    async fn list_credentials(&self) -> Result<Vec<Credential>, StoreError> {
        let mut all: Vec<Credential> = self.credentials.lock().unwrap().values().cloned().collect();
        all.sort_by_key(|c| c.id);
        Ok(all)
    }
}
