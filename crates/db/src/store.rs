//! `PgStore` — the production implementation of `engine::Store`.

use async_trait::async_trait;
use engine::{
    Credential, CredentialUpdate, Execution, ExecutionUpdate, Store, StoreError, Workflow,
};

use crate::{repository, DbError, DbPool};

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn get_workflow(&self, id: i64) -> Result<Workflow, StoreError> {
        let row = repository::workflows::get_workflow(&self.pool, id)
            .await
            .map_err(StoreError::from)?;
        row.try_into().map_err(|e: DbError| e.into())
    }

    async fn create_execution(&self, workflow_id: i64) -> Result<Execution, StoreError> {
        let row = repository::executions::create_execution(&self.pool, workflow_id)
            .await
            .map_err(StoreError::from)?;
        row.try_into().map_err(|e: DbError| e.into())
    }

    async fn update_execution(&self, id: i64, update: ExecutionUpdate) -> Result<(), StoreError> {
        repository::executions::update_execution(&self.pool, id, &update)
            .await
            .map_err(StoreError::from)
    }

    async fn get_credential(&self, id: i64) -> Result<Credential, StoreError> {
        let row = repository::credentials::get_credential(&self.pool, id)
            .await
            .map_err(StoreError::from)?;
        Ok(row.into())
    }

    async fn update_credential(
        &self,
        id: i64,
        update: CredentialUpdate,
    ) -> Result<(), StoreError> {
        repository::credentials::update_credential(&self.pool, id, &update)
            .await
            .map_err(StoreError::from)
    }

    async fn list_credentials(&self) -> Result<Vec<Credential>, StoreError> {
        let rows = repository::credentials::list_credentials(&self.pool)
            .await
            .map_err(StoreError::from)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}
