//! The dispatch seam between the scheduler and node handlers.
//!
//! The `nodes` crate implements [`NodeDispatcher`] for the real handler
//! set; scheduler tests use scripted stand-ins.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::models::{Context, Node};

/// A node handler failure, flattened to its message. The scheduler treats
/// every handler failure the same way: mark the node `error`, skip its
/// descendants, fail the execution.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct DispatchError(pub String);

impl DispatchError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Dispatches a node to the handler matching its kind.
#[async_trait]
pub trait NodeDispatcher: Send + Sync {
    /// Run `node` with the outputs of its ancestors in `context`. The
    /// returned value becomes `context[node.id]`.
    async fn dispatch(&self, node: &Node, context: &Context) -> Result<Value, DispatchError>;
}
