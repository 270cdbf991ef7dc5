//! Engine-level error types.

use thiserror::Error;

use crate::store::StoreError;

/// Errors produced by the workflow engine (validation + execution).
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Validation errors ------

    /// A node is missing a field its kind requires.
    #[error("Validation error: [{node_id}] Missing required field: {field}")]
    MissingField { node_id: String, field: String },

    /// Two or more nodes share the same ID.
    #[error("Validation error: duplicate node ID: '{0}'")]
    DuplicateNodeId(String),

    /// Strict mode only: an edge references a node ID that doesn't exist.
    #[error("Validation error: edge references unknown node '{node_id}' ({side} side)")]
    UnknownNodeReference {
        node_id: String,
        side: &'static str,
    },

    /// Topological sort detected a cycle.
    #[error("Validation error: workflow graph contains a cycle")]
    CycleDetected,

    // ------ Execution errors ------

    /// Persistence error from the store facade.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
